//! This module is responsible for reading and writing the SQLite state store.
//!
//! The state store remembers which PocketSmith account each Frollo account was synced to, the
//! newest transaction known to exist at the destination, and a history of sync runs. Nothing in
//! here is needed for correctness: losing the file only means the next run falls back to
//! name-based account matching and full duplicate probing.

mod migrations;

use crate::Result;
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

/// The persisted link between a source account and its destination account.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AccountMapping {
    pub source_account_id: u64,
    pub destination_account_id: u64,
    pub transaction_account_id: u64,
    pub institution_id: u64,
    pub name: String,
}

/// The newest transaction known to exist at the destination for one source account.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Watermark {
    pub date: NaiveDate,
    pub memo: String,
}

/// One row of sync history.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RunRecord {
    pub source_account_id: u64,
    /// RFC 3339, `None` means now when recording.
    pub started_at: Option<String>,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub outcome: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Opens the SQLite file at `path`, creating it if it does not exist, and brings its schema
    /// up to date.
    pub(crate) async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Unable to open the state store at {}", path.display()))?;

        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Failed to create schema_version table")?;
        let (current,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(&pool)
            .await
            .context("Failed to read the schema version")?;
        let current = match current {
            Some(version) => version,
            None => {
                sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
                    .execute(&pool)
                    .await
                    .context("Failed to initialize schema_version")?;
                0
            }
        };
        migrations::run(&pool, current, migrations::CURRENT_VERSION).await?;
        debug!("Opened state store at {}", path.display());
        Ok(Self { pool })
    }

    pub(crate) async fn mapping(&self, source_account_id: u64) -> Result<Option<AccountMapping>> {
        let row: Option<(i64, i64, i64, String)> = sqlx::query_as(
            "SELECT destination_account_id, transaction_account_id, institution_id, name \
            FROM account_mappings WHERE source_account_id = ?",
        )
        .bind(to_sql(source_account_id)?)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read account mapping")?;

        row.map(|(destination, transaction_account, institution, name)| {
            Ok(AccountMapping {
                source_account_id,
                destination_account_id: from_sql(destination)?,
                transaction_account_id: from_sql(transaction_account)?,
                institution_id: from_sql(institution)?,
                name,
            })
        })
        .transpose()
    }

    pub(crate) async fn save_mapping(&self, mapping: &AccountMapping) -> Result<()> {
        sqlx::query(
            "INSERT INTO account_mappings \
            (source_account_id, destination_account_id, transaction_account_id, institution_id, \
            name, updated_at) VALUES (?, ?, ?, ?, ?, ?) \
            ON CONFLICT (source_account_id) DO UPDATE SET \
            destination_account_id = excluded.destination_account_id, \
            transaction_account_id = excluded.transaction_account_id, \
            institution_id = excluded.institution_id, \
            name = excluded.name, \
            updated_at = excluded.updated_at",
        )
        .bind(to_sql(mapping.source_account_id)?)
        .bind(to_sql(mapping.destination_account_id)?)
        .bind(to_sql(mapping.transaction_account_id)?)
        .bind(to_sql(mapping.institution_id)?)
        .bind(&mapping.name)
        .bind(now())
        .execute(&self.pool)
        .await
        .context("Failed to save account mapping")?;
        Ok(())
    }

    pub(crate) async fn delete_mapping(&self, source_account_id: u64) -> Result<()> {
        sqlx::query("DELETE FROM account_mappings WHERE source_account_id = ?")
            .bind(to_sql(source_account_id)?)
            .execute(&self.pool)
            .await
            .context("Failed to delete account mapping")?;
        Ok(())
    }

    pub(crate) async fn watermark(&self, source_account_id: u64) -> Result<Option<Watermark>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT last_date, last_memo FROM watermarks WHERE source_account_id = ?",
        )
        .bind(to_sql(source_account_id)?)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read watermark")?;

        row.map(|(date, memo)| {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Bad watermark date '{date}'"))?;
            Ok(Watermark { date, memo })
        })
        .transpose()
    }

    pub(crate) async fn save_watermark(
        &self,
        source_account_id: u64,
        watermark: &Watermark,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO watermarks (source_account_id, last_date, last_memo, updated_at) \
            VALUES (?, ?, ?, ?) \
            ON CONFLICT (source_account_id) DO UPDATE SET \
            last_date = excluded.last_date, \
            last_memo = excluded.last_memo, \
            updated_at = excluded.updated_at",
        )
        .bind(to_sql(source_account_id)?)
        .bind(watermark.date.format("%Y-%m-%d").to_string())
        .bind(&watermark.memo)
        .bind(now())
        .execute(&self.pool)
        .await
        .context("Failed to save watermark")?;
        Ok(())
    }

    pub(crate) async fn record_run(&self, record: &RunRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_runs \
            (source_account_id, started_at, imported, skipped, failed, outcome) \
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(to_sql(record.source_account_id)?)
        .bind(record.started_at.clone().unwrap_or_else(now))
        .bind(to_sql(record.imported)?)
        .bind(to_sql(record.skipped)?)
        .bind(to_sql(record.failed)?)
        .bind(&record.outcome)
        .execute(&self.pool)
        .await
        .context("Failed to record sync run")?;
        Ok(())
    }

    /// The most recent runs for `source_account_id`, newest first.
    pub(crate) async fn runs(&self, source_account_id: u64, limit: u32) -> Result<Vec<RunRecord>> {
        let rows: Vec<(String, i64, i64, i64, String)> = sqlx::query_as(
            "SELECT started_at, imported, skipped, failed, outcome FROM sync_runs \
            WHERE source_account_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(to_sql(source_account_id)?)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read sync runs")?;

        rows.into_iter()
            .map(|(started_at, imported, skipped, failed, outcome)| {
                Ok(RunRecord {
                    source_account_id,
                    started_at: Some(started_at),
                    imported: from_sql(imported)?,
                    skipped: from_sql(skipped)?,
                    failed: from_sql(failed)?,
                    outcome,
                })
            })
            .collect()
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// SQLite integers are signed.
fn to_sql(value: u64) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{value} is too large for the state store"))
}

fn from_sql(value: i64) -> Result<u64> {
    u64::try_from(value).with_context(|| format!("Unexpected negative id {value} in state store"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("state.sqlite")).await.unwrap();
        (dir, db)
    }

    fn mapping(destination: u64) -> AccountMapping {
        AccountMapping {
            source_account_id: 1657651,
            destination_account_id: destination,
            transaction_account_id: destination + 1,
            institution_id: 7,
            name: "Everyday".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_twice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.sqlite");
        let db = Db::open(&path).await.unwrap();
        db.save_mapping(&mapping(10)).await.unwrap();
        drop(db);
        let db = Db::open(&path).await.unwrap();
        assert_eq!(db.mapping(1657651).await.unwrap(), Some(mapping(10)));
    }

    #[tokio::test]
    async fn test_mapping_upsert_and_delete() {
        let (_dir, db) = open().await;
        assert_eq!(db.mapping(1657651).await.unwrap(), None);
        db.save_mapping(&mapping(10)).await.unwrap();
        db.save_mapping(&mapping(20)).await.unwrap();
        assert_eq!(db.mapping(1657651).await.unwrap(), Some(mapping(20)));
        db.delete_mapping(1657651).await.unwrap();
        assert_eq!(db.mapping(1657651).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_watermark() {
        let (_dir, db) = open().await;
        assert_eq!(db.watermark(5).await.unwrap(), None);
        let first = Watermark {
            date: NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            memo: "REF-1".to_string(),
        };
        db.save_watermark(5, &first).await.unwrap();
        assert_eq!(db.watermark(5).await.unwrap(), Some(first));
        let second = Watermark {
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            memo: "REF-2".to_string(),
        };
        db.save_watermark(5, &second).await.unwrap();
        assert_eq!(db.watermark(5).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_runs_newest_first() {
        let (_dir, db) = open().await;
        for imported in 0..3 {
            db.record_run(&RunRecord {
                source_account_id: 9,
                started_at: None,
                imported,
                skipped: 1,
                failed: 0,
                outcome: "synced".to_string(),
            })
            .await
            .unwrap();
        }
        let runs = db.runs(9, 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].imported, 2);
        assert_eq!(runs[1].imported, 1);
        assert!(runs[0].started_at.is_some());
        assert!(db.runs(10, 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_id_conversion() {
        assert_eq!(to_sql(42).unwrap(), 42);
        assert!(to_sql(u64::MAX).is_err());
        assert!(from_sql(-1).is_err());
    }
}
