//! `codeindexer db init`: create the database if needed and run migrations.

use anyhow::Result;

use codeindexer_core::config::EngineConfig;
use codeindexer_db::pool;

pub async fn run_db_init(config: &EngineConfig) -> Result<()> {
    println!("Initializing codeindexer database...");

    pool::ensure_database_exists(&config.db).await?;
    let db_pool = pool::create_pool(&config.db).await?;
    pool::run_migrations(&db_pool, pool::default_migrations_path()).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;
    println!("codeindexer db init complete.");
    Ok(())
}
