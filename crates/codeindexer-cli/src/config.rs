//! `codeindexer init`: write a starter config file.
//!
//! The resolution chain itself (CLI flag > env var > config file > default)
//! lives in `codeindexer_core::config::EngineConfig::resolve`; this module
//! only handles writing the starter file an operator edits afterward.

use anyhow::{Context, Result};

use codeindexer_core::config::{ConfigFile, DatabaseSection, config_path};

/// Write a starter config file with just the database URL filled in.
/// Sets file permissions to 0600 on Unix.
pub fn write_starter_config(database_url: &str, force: bool) -> Result<()> {
    let path = config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let dir = path
        .parent()
        .context("config path has no parent directory")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let config = ConfigFile {
        database: Some(DatabaseSection {
            url: database_url.to_string(),
        }),
        jobs: None,
        graph: None,
        git: None,
        files: None,
        cleanup: None,
        storage: None,
    };
    let contents = toml::to_string_pretty(&config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}
