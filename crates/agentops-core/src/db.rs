//! Database connection management

use crate::config::{default_database_path, expand_path};
use crate::{
    AgentStore, ContextStore, CostControlStore, Error, FeedbackStore, MetricsStore, QueryBuilder,
    Result, SolutionStore,
};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Database handle
///
/// This is the main entry point for all persistence. It owns the SQLite
/// connection pool and hands out store handles that share it. Build one at
/// start-up and pass it (or the stores) to whatever needs them.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path
    ///
    /// # Example
    ///
    /// ```no_run
    /// use agentops_core::Database;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let db = Database::open("~/.agentops/agentops.db").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_path(path)?;
        info!("Opening database at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Open database at the default location (~/.agentops/agentops.db)
    pub async fn open_default() -> Result<Self> {
        Self::open(default_database_path()?).await
    }

    async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;

        debug!("Migrations completed successfully");
        Ok(())
    }

    /// Agent and agent config storage
    pub fn agents(&self) -> AgentStore {
        AgentStore::new(self.pool.clone())
    }

    /// Solution catalog storage
    pub fn solutions(&self) -> SolutionStore {
        SolutionStore::new(self.pool.clone())
    }

    /// Monthly cost roll-ups and limit violations
    pub fn costs(&self) -> CostControlStore {
        CostControlStore::new(self.pool.clone())
    }

    /// Context document storage
    pub fn contexts(&self) -> ContextStore {
        ContextStore::new(self.pool.clone())
    }

    /// Feedback document storage
    pub fn feedback(&self) -> FeedbackStore {
        FeedbackStore::new(self.pool.clone())
    }

    /// Metric record storage, also the engine's [`crate::MetricsSource`]
    pub fn metrics(&self) -> MetricsStore {
        MetricsStore::new(self.pool.clone())
    }

    /// Search and statistics over context documents
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.pool.clone())
    }

    /// Get the underlying pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Fixed-width timestamp text so that columns sort chronologically
pub(crate) fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let db = Database::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_run() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("test.db")).await.unwrap();

        for table in [
            "agents",
            "agent_configs",
            "agent_solutions",
            "contexts",
            "contexts_fts",
            "cost_violations",
            "feedback",
            "metrics",
        ] {
            let result: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            )
            .bind(table)
            .fetch_one(db.pool())
            .await
            .unwrap();

            assert_eq!(result.0, 1, "{} table should exist", table);
        }

        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        Database::open(&db_path).await.unwrap().close().await;
        Database::open(&db_path).await.unwrap().close().await;
    }

    #[test]
    fn test_format_time_sorts() {
        let earlier = DateTime::parse_from_rfc3339("2025-10-27T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2025-10-27T10:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(format_time(&earlier), "2025-10-27T09:00:00.000000Z");
        assert!(format_time(&earlier) < format_time(&later));
    }
}
