//! SQLite-backed metric record storage

use crate::db::format_time;
use crate::metrics::{MetricRecord, MetricsFilter, MetricsSource};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Metric record storage
///
/// Records are kept verbatim; agent, intent and metric codes plus the
/// timestamp are lifted into columns for filtering.
#[derive(Clone)]
pub struct MetricsStore {
    pool: SqlitePool,
}

impl MetricsStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ingest raw records
    ///
    /// Every record needs a parseable timestamp; the whole batch is
    /// rejected otherwise.
    pub async fn record(&self, records: &[MetricRecord]) -> Result<usize> {
        info!("Recording {} metric records", records.len());

        let mut tx = self.pool.begin().await?;
        for (position, record) in records.iter().enumerate() {
            let recorded_at = record.timestamp().ok_or_else(|| {
                Error::Validation(format!(
                    "Metric record #{} has no valid Timestamp",
                    position
                ))
            })?;

            sqlx::query(
                r#"
                INSERT INTO metrics (agent_code, intent_code, metric_code, recorded_at, data_json)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.agent_code())
            .bind(record.intent_code())
            .bind(record.metric_code())
            .bind(format_time(&recorded_at))
            .bind(serde_json::to_string(record)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len())
    }
}

#[async_trait]
impl MetricsSource for MetricsStore {
    async fn fetch_metrics(&self, filter: &MetricsFilter) -> Result<Vec<MetricRecord>> {
        debug!("Fetching metrics: {:?}", filter);

        let mut sql = String::from(
            r#"
            SELECT data_json
            FROM metrics
            WHERE recorded_at >= ? AND recorded_at <= ?
            "#,
        );
        if filter.agent_code.is_some() {
            sql.push_str(" AND agent_code = ?");
        }
        // A blank intent code is stored as NULL, so it selects unscoped records
        let intent_code = filter.intent_code.as_deref().map(str::trim);
        match intent_code {
            Some("") => sql.push_str(" AND intent_code IS NULL"),
            Some(_) => sql.push_str(" AND intent_code = ?"),
            None => {}
        }
        if filter.metric_code.is_some() {
            sql.push_str(" AND LOWER(metric_code) = LOWER(?)");
        }
        sql.push_str(" ORDER BY recorded_at, id");

        let mut query_builder = sqlx::query_as::<_, (String,)>(&sql)
            .bind(format_time(&filter.start_time))
            .bind(format_time(&filter.end_time));
        if let Some(agent_code) = &filter.agent_code {
            query_builder = query_builder.bind(agent_code);
        }
        if let Some(intent_code) = intent_code.filter(|code| !code.is_empty()) {
            query_builder = query_builder.bind(intent_code);
        }
        if let Some(metric_code) = &filter.metric_code {
            query_builder = query_builder.bind(metric_code);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            records.push(serde_json::from_str(&data_json)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::parse_timestamp;
    use crate::Database;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path).await.unwrap();
        (db, temp_dir)
    }

    fn record(value: serde_json::Value) -> MetricRecord {
        MetricRecord::try_from(value).unwrap()
    }

    fn day_filter() -> MetricsFilter {
        MetricsFilter {
            agent_code: None,
            intent_code: None,
            metric_code: None,
            start_time: parse_timestamp("2025-10-27T00:00:00Z").unwrap(),
            end_time: parse_timestamp("2025-10-27T23:59:59Z").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_record_and_fetch_in_range() {
        let (db, _temp) = setup_db().await;
        let store = db.metrics();

        store
            .record(&[
                record(json!({"AgentCode": "A1", "MetricCode": "COST", "MetricValue": "5", "Timestamp": "2025-10-27T10:00:00Z"})),
                record(json!({"AgentCode": "A1", "MetricCode": "cost", "MetricValue": 2, "Timestamp": "2025-10-27T09:00:00Z"})),
                record(json!({"AgentCode": "A2", "MetricCode": "cost", "MetricValue": 1, "Timestamp": "2025-10-27T11:00:00Z"})),
                record(json!({"AgentCode": "A1", "MetricCode": "cost", "MetricValue": 9, "Timestamp": "2025-10-28T00:00:01Z"})),
            ])
            .await
            .unwrap();

        let all = store.fetch_metrics(&day_filter()).await.unwrap();
        assert_eq!(all.len(), 3);
        // ordered by time, verbatim fields
        assert_eq!(all[0].value(), Some(2.0));
        assert_eq!(all[1].get("MetricValue"), Some(&json!("5")));

        let mut filter = day_filter();
        filter.agent_code = Some("A1".to_string());
        filter.metric_code = Some("cost".to_string());
        let a1 = store.fetch_metrics(&filter).await.unwrap();
        assert_eq!(a1.len(), 2);
    }

    #[tokio::test]
    async fn test_record_requires_timestamp() {
        let (db, _temp) = setup_db().await;
        let store = db.metrics();

        let result = store
            .record(&[
                record(json!({"MetricValue": 1, "Timestamp": "2025-10-27T10:00:00Z"})),
                record(json!({"MetricValue": 2})),
            ])
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        assert!(store.fetch_metrics(&day_filter()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_intent_filter() {
        let (db, _temp) = setup_db().await;
        let store = db.metrics();

        store
            .record(&[
                record(json!({"IntentCode": "refund", "MetricValue": 1, "Timestamp": "2025-10-27T10:00:00Z"})),
                record(json!({"IntentCode": "", "MetricValue": 2, "Timestamp": "2025-10-27T10:00:00Z"})),
            ])
            .await
            .unwrap();

        let mut filter = day_filter();
        filter.intent_code = Some("refund".to_string());
        let refunds = store.fetch_metrics(&filter).await.unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].intent_code(), Some("refund"));

        filter.intent_code = Some(String::new());
        let unscoped = store.fetch_metrics(&filter).await.unwrap();
        assert_eq!(unscoped.len(), 1);
        assert_eq!(unscoped[0].get("IntentCode"), Some(&json!("")));
        assert_eq!(unscoped[0].value(), Some(2.0));
    }
}
