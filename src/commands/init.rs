use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory with a default `config.json` and an empty state store.
///
/// # Errors
/// - Returns an error if `config.json` already exists or if any file operation fails.
pub async fn init(home: &Path) -> Result<Out<()>> {
    let config = Config::create(home)
        .await
        .context("Unable to create the home directory and config")?;
    Ok(format!(
        "Created {} and {}",
        config.config_path().display(),
        config.sqlite_path().display()
    )
    .into())
}
