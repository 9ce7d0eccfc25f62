mod codebase_cmd;
mod config;
mod db_cmd;
mod job_cmd;
mod project_cmd;
mod status_cmd;

use anyhow::Context;
use clap::{Parser, Subcommand};

use codeindexer_core::config::{ConfigOverrides, EngineConfig};
use codeindexer_db::pool;

#[derive(Parser)]
#[command(name = "codeindexer", about = "Code-knowledge-graph index job orchestrator")]
struct Cli {
    /// Database URL (overrides CODEINDEXER_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/codeindexer")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Database administration
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Project fixtures
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Codebase fixtures
    Codebase {
        #[command(subcommand)]
        command: CodebaseCommands,
    },
    /// Index job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// System-wide status
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Ensure the database exists and run migrations
    Init,
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project
    Create {
        /// Project name
        name: String,
    },
}

#[derive(Subcommand)]
enum CodebaseCommands {
    /// Create a codebase under a project
    Create {
        /// Project ID the codebase belongs to
        project_id: String,
        /// Git remote URL (or local path, for the bundled `ShellGitClient`)
        remote_url: String,
        /// Branch to track
        #[arg(long, default_value = "main")]
        branch: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Submit a new index job
    Create {
        /// Project ID the job runs under
        project_id: String,
        /// Job kind: codebase_full, codebase_incr, docs_full, docs_incr, api_analysis, userflow_analysis
        kind: String,
        /// Codebase ID (required for codebase_full/codebase_incr)
        #[arg(long)]
        codebase_id: Option<String>,
        /// Base commit to diff from (required for codebase_incr)
        #[arg(long)]
        base_commit: Option<String>,
        /// Scheduling priority (higher runs first)
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Free-form description
        #[arg(long)]
        description: Option<String>,
        /// Submit the job and return immediately instead of blocking until
        /// it reaches a terminal state. The job still runs to completion on
        /// the engine's worker pool, but nothing in this process observes
        /// that if the CLI process exits first — prefer the default.
        #[arg(long)]
        no_wait: bool,
    },
    /// Show a job's current state
    Get {
        /// Job ID
        id: String,
    },
    /// Request cancellation of a job
    Cancel {
        /// Job ID
        id: String,
    },
    /// List active and recent jobs for a codebase
    ListForCodebase {
        /// Codebase ID
        codebase_id: String,
    },
}

#[derive(Subcommand)]
enum SystemCommands {
    /// Show worker pool utilization and job counts
    Status,
}

fn resolve_config(cli_db_url: Option<&str>) -> anyhow::Result<EngineConfig> {
    let overrides = ConfigOverrides {
        database_url: cli_db_url.map(str::to_string),
        ..Default::default()
    };
    EngineConfig::resolve(&overrides)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            config::write_starter_config(&db_url, force)?;
            let path = codeindexer_core::config::config_path();
            println!("Config written to {}", path.display());
            println!("  database.url = {db_url}");
            println!();
            println!("Next: run `codeindexer db init` to create and migrate the database.");
        }
        Commands::Db { command: DbCommands::Init } => {
            let config = resolve_config(cli.database_url.as_deref())?;
            db_cmd::run_db_init(&config).await?;
        }
        Commands::Project {
            command: ProjectCommands::Create { name },
        } => {
            let config = resolve_config(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&config.db).await?;
            let result = project_cmd::run_create(&db_pool, &name).await;
            db_pool.close().await;
            result?;
        }
        Commands::Codebase {
            command:
                CodebaseCommands::Create {
                    project_id,
                    remote_url,
                    branch,
                },
        } => {
            let config = resolve_config(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&config.db).await?;
            let result = codebase_cmd::run_create(&db_pool, &project_id, &remote_url, &branch).await;
            db_pool.close().await;
            result?;
        }
        Commands::Job { command } => {
            let config = resolve_config(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&config.db).await?;
            let result = run_job_command(&db_pool, config, command).await;
            db_pool.close().await;
            result?;
        }
        Commands::System {
            command: SystemCommands::Status,
        } => {
            let config = resolve_config(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&config.db).await?;
            let result = status_cmd::run_status(&db_pool, config).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

async fn run_job_command(
    pool: &sqlx::PgPool,
    config: EngineConfig,
    command: JobCommands,
) -> anyhow::Result<()> {
    match command {
        JobCommands::Create {
            project_id,
            kind,
            codebase_id,
            base_commit,
            priority,
            description,
            no_wait,
        } => {
            job_cmd::run_create(
                pool,
                config,
                &project_id,
                codebase_id.as_deref(),
                &kind,
                base_commit.as_deref(),
                priority,
                description.as_deref(),
                !no_wait,
            )
            .await
            .context("job create failed")
        }
        JobCommands::Get { id } => job_cmd::run_get(pool, config, &id).await.context("job get failed"),
        JobCommands::Cancel { id } => job_cmd::run_cancel(pool, config, &id)
            .await
            .context("job cancel failed"),
        JobCommands::ListForCodebase { codebase_id } => job_cmd::run_list_for_codebase(pool, config, &codebase_id)
            .await
            .context("job list-for-codebase failed"),
    }
}
