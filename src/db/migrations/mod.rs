//! State store schema migrations.
//!
//! Each migration is a pair of SQL files in this directory:
//! - `migration_NN_up.sql` moves the schema from version `NN-1` to `NN`
//! - `migration_NN_down.sql` moves it back from `NN` to `NN-1`

use crate::Result;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// The schema version this build of the program expects.
pub(crate) const CURRENT_VERSION: i32 = 1;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

fn find(version: i32) -> Result<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version} not found"))
}

/// Moves the schema from `from` to `to`, one version at a time. Every step runs in its own
/// transaction together with the `schema_version` update.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("State store already at schema version {to}");
        return Ok(());
    }
    if to > CURRENT_VERSION || to < 0 {
        bail!("Cannot migrate the state store to unknown schema version {to}");
    }
    if from > CURRENT_VERSION {
        bail!(
            "The state store has schema version {from} but this program only understands up to \
            {CURRENT_VERSION}, is a newer version of frollo-sync installed?"
        );
    }

    if from < to {
        for version in (from + 1)..=to {
            debug!("Running migration {version:02} (up)");
            apply(pool, find(version)?.up, version).await?;
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            debug!("Running migration {version:02} (down)");
            apply(pool, find(version)?.down, version - 1).await?;
        }
    }
    Ok(())
}

async fn apply(pool: &SqlitePool, sql: &str, new_version: i32) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;
    tx.execute(sql)
        .await
        .context("Failed to execute migration SQL")?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;
    tx.commit()
        .await
        .context("Failed to commit migration transaction")?;
    Ok(())
}
