//! Monthly cost roll-ups and cost-limit violations
//!
//! Cost metrics are grouped by calendar month (UTC) and agent, optionally
//! split per user. An agent whose latest `cost` configuration carries a
//! `monthly_limit` is in violation for a month once its total exceeds it.
//! Violations stay open until resolved for the agent.

use crate::db::format_time;
use crate::metrics::{parse_timestamp, total_cost, MetricRecord, MetricsQuery, MetricsSource};
use crate::{AgentOperations, AgentStore, ConfigType, Error, MetricKind, MetricsStore, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Accepted spellings of the limit field in a cost configuration
pub const LIMIT_KEYS: [&str; 3] = ["monthly_limit", "MonthlyLimit", "monthlylimit"];

/// Total cost of one agent (and optionally one user) in one month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCost {
    /// `YYYY-MM`
    pub month: String,
    pub agent_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    pub metric_count: usize,
}

/// Group cost records by month and agent, and by user when `by_user` is set
///
/// Records without a usable timestamp cannot be placed in a month and are
/// skipped.
pub fn monthly_rollup(records: &[MetricRecord], by_user: bool) -> Vec<MonthlyCost> {
    let mut groups: BTreeMap<(String, Option<String>, Option<String>), Vec<MetricRecord>> =
        BTreeMap::new();

    for record in records {
        let Some(timestamp) = record.timestamp() else {
            warn!("Skipping cost record without timestamp");
            continue;
        };
        let user_id = if by_user {
            record.user_id().map(str::to_string)
        } else {
            None
        };
        let key = (
            timestamp.format("%Y-%m").to_string(),
            record.agent_code().map(str::to_string),
            user_id,
        );
        groups.entry(key).or_default().push(record.clone());
    }

    groups
        .into_iter()
        .map(|((month, agent_code, user_id), group)| MonthlyCost {
            month,
            agent_code,
            user_id,
            total_cost: total_cost(&group),
            metric_count: group.len(),
        })
        .collect()
}

/// Monthly cost totals for the query's range
///
/// The metric kind is forced to cost; value bounds do not apply.
pub async fn monthly_costs<S>(source: &S, query: &MetricsQuery, by_user: bool) -> Result<Vec<MonthlyCost>>
where
    S: MetricsSource + ?Sized,
{
    query.validate()?;

    let mut filter = query.filter();
    filter.metric_code = Some(MetricKind::Cost.as_str().to_string());

    let records = source.fetch_metrics(&filter).await?;
    debug!("Rolling up {} cost records", records.len());

    Ok(monthly_rollup(&records, by_user))
}

/// Spending limit read from a `cost` agent configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostPolicy {
    pub monthly_limit: f64,
}

impl CostPolicy {
    pub fn from_data(data: &Value) -> Option<Self> {
        LIMIT_KEYS
            .iter()
            .filter_map(|key| data.get(*key))
            .find_map(crate::metrics::coerce_number)
            .map(|monthly_limit| Self { monthly_limit })
    }
}

/// A month in which an agent spent more than its limit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostViolation {
    pub id: String,
    pub agent_code: String,
    pub month: String,
    pub total_cost: f64,
    pub monthly_limit: f64,
    pub detected_on: DateTime<Utc>,
    pub resolved_on: Option<DateTime<Utc>>,
}

type ViolationRow = (String, String, String, f64, f64, String, Option<String>);

impl CostViolation {
    fn from_row(row: ViolationRow) -> Result<Self> {
        let (id, agent_code, month, total_cost, monthly_limit, detected_on, resolved_on) = row;
        Ok(Self {
            id,
            agent_code,
            month,
            total_cost,
            monthly_limit,
            detected_on: parse_timestamp(&detected_on)?,
            resolved_on: resolved_on.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Cost control interface
#[async_trait]
pub trait CostOperations {
    /// Check monthly totals in the query's range against agent limits
    ///
    /// Returns the violations recorded or refreshed by this run.
    async fn detect_violations(&self, query: &MetricsQuery) -> Result<Vec<CostViolation>>;

    /// Open violations, or every violation when `include_resolved` is set
    async fn list_violations(&self, include_resolved: bool) -> Result<Vec<CostViolation>>;

    /// Close every open violation of an agent, returns how many were closed
    async fn resolve_violations(&self, agent_code: &str) -> Result<usize>;
}

/// SQLite cost control
#[derive(Clone)]
pub struct CostControlStore {
    pool: SqlitePool,
}

impl CostControlStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn policy_for(agents: &AgentStore, agent_code: &str) -> Result<Option<CostPolicy>> {
        match agents.list_configs(agent_code, ConfigType::Cost).await {
            Ok(configs) => Ok(configs
                .iter()
                .rev()
                .find_map(|config| CostPolicy::from_data(&config.data))),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CostOperations for CostControlStore {
    async fn detect_violations(&self, query: &MetricsQuery) -> Result<Vec<CostViolation>> {
        info!("Checking cost limits");

        let costs = monthly_costs(&MetricsStore::new(self.pool.clone()), query, false).await?;
        let agents = AgentStore::new(self.pool.clone());

        let mut policies: HashMap<String, Option<CostPolicy>> = HashMap::new();
        for agent_code in costs.iter().filter_map(|c| c.agent_code.as_deref()) {
            if !policies.contains_key(agent_code) {
                let policy = Self::policy_for(&agents, agent_code).await?;
                policies.insert(agent_code.to_string(), policy);
            }
        }

        let now = format_time(&Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut detected = Vec::new();

        for cost in &costs {
            let Some(agent_code) = cost.agent_code.as_deref() else {
                continue;
            };
            let Some(Some(policy)) = policies.get(agent_code) else {
                continue;
            };
            if cost.total_cost <= policy.monthly_limit {
                continue;
            }

            // Resolved months are left alone
            let row: Option<ViolationRow> = sqlx::query_as(
                r#"
                INSERT INTO cost_violations (id, agent_code, month, total_cost, monthly_limit, detected_on)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (agent_code, month) DO UPDATE
                SET total_cost = excluded.total_cost,
                    monthly_limit = excluded.monthly_limit,
                    detected_on = excluded.detected_on
                WHERE cost_violations.resolved_on IS NULL
                RETURNING id, agent_code, month, total_cost, monthly_limit, detected_on, resolved_on
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(agent_code)
            .bind(&cost.month)
            .bind(cost.total_cost)
            .bind(policy.monthly_limit)
            .bind(&now)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                detected.push(CostViolation::from_row(row)?);
            }
        }
        tx.commit().await?;

        debug!("Detected {} cost violations", detected.len());
        Ok(detected)
    }

    async fn list_violations(&self, include_resolved: bool) -> Result<Vec<CostViolation>> {
        let rows: Vec<ViolationRow> = sqlx::query_as(
            r#"
            SELECT id, agent_code, month, total_cost, monthly_limit, detected_on, resolved_on
            FROM cost_violations
            WHERE ? OR resolved_on IS NULL
            ORDER BY month, agent_code
            "#,
        )
        .bind(include_resolved)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CostViolation::from_row).collect()
    }

    async fn resolve_violations(&self, agent_code: &str) -> Result<usize> {
        info!("Resolving cost violations for agent: {}", agent_code);

        let result = sqlx::query(
            "UPDATE cost_violations SET resolved_on = ? WHERE agent_code = ? AND resolved_on IS NULL",
        )
        .bind(format_time(&Utc::now()))
        .bind(agent_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Agent, AgentConfig, Database};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path).await.unwrap();
        (db, temp_dir)
    }

    fn cost(agent: &str, user: &str, value: Value, at: &str) -> MetricRecord {
        MetricRecord::try_from(json!({
            "AgentCode": agent,
            "UserId": user,
            "MetricCode": "COST",
            "MetricValue": value,
            "Timestamp": at,
        }))
        .unwrap()
    }

    fn autumn() -> MetricsQuery {
        MetricsQuery::parse("2025-09-01T00:00:00Z", "2025-10-31T23:59:59Z").unwrap()
    }

    #[test]
    fn test_monthly_rollup() {
        let records = vec![
            cost("A1", "u1", json!(10), "2025-09-30T23:59:59Z"),
            cost("A1", "u2", json!("5"), "2025-10-01T00:00:00Z"),
            cost("A1", "u1", json!("n/a"), "2025-10-15T12:00:00Z"),
            cost("A2", "u1", json!(2.5), "2025-10-02T08:00:00Z"),
            MetricRecord::try_from(json!({"AgentCode": "A1", "MetricValue": 99})).unwrap(),
        ];

        let by_agent = monthly_rollup(&records, false);
        assert_eq!(by_agent.len(), 3);
        assert_eq!(by_agent[0].month, "2025-09");
        assert_eq!(by_agent[0].total_cost, 10.0);
        assert_eq!(by_agent[1].month, "2025-10");
        assert_eq!(by_agent[1].agent_code.as_deref(), Some("A1"));
        assert_eq!(by_agent[1].total_cost, 5.0);
        assert_eq!(by_agent[1].metric_count, 2);
        assert_eq!(by_agent[2].agent_code.as_deref(), Some("A2"));

        let by_user = monthly_rollup(&records, true);
        assert_eq!(by_user.len(), 4);
        assert!(by_user.iter().all(|c| c.user_id.is_some()));

        let json = serde_json::to_value(&by_agent[0]).unwrap();
        assert_eq!(json["TotalCost"], 10.0);
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_cost_policy_from_data() {
        assert_eq!(
            CostPolicy::from_data(&json!({"monthly_limit": 100})),
            Some(CostPolicy { monthly_limit: 100.0 })
        );
        assert_eq!(
            CostPolicy::from_data(&json!({"MonthlyLimit": "42.5"})),
            Some(CostPolicy { monthly_limit: 42.5 })
        );
        assert!(CostPolicy::from_data(&json!({"currency": "EUR"})).is_none());
    }

    #[tokio::test]
    async fn test_monthly_costs_only_counts_cost_metrics() {
        let (db, _temp) = setup_db().await;

        db.metrics()
            .record(&[
                cost("A1", "u1", json!(3), "2025-10-01T10:00:00Z"),
                MetricRecord::try_from(json!({
                    "AgentCode": "A1", "MetricCode": "performance", "MetricValue": 0.9,
                    "Timestamp": "2025-10-01T10:00:00Z"
                }))
                .unwrap(),
            ])
            .await
            .unwrap();

        let costs = monthly_costs(&db.metrics(), &autumn(), false).await.unwrap();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].total_cost, 3.0);
    }

    #[tokio::test]
    async fn test_detect_list_and_resolve_violations() {
        let (db, _temp) = setup_db().await;
        let agents = db.agents();
        let control = db.costs();

        agents.create(Agent::new("A1", "Billing")).await.unwrap();
        agents.create(Agent::new("A2", "Triage")).await.unwrap();
        agents
            .add_config(AgentConfig::new("A1", ConfigType::Cost, json!({"monthly_limit": 10})))
            .await
            .unwrap();

        db.metrics()
            .record(&[
                cost("A1", "u1", json!(6), "2025-09-10T10:00:00Z"),
                cost("A1", "u1", json!(8), "2025-10-10T10:00:00Z"),
                cost("A1", "u2", json!(7), "2025-10-11T10:00:00Z"),
                // no limit configured
                cost("A2", "u1", json!(500), "2025-10-11T10:00:00Z"),
                // unknown agent
                cost("A9", "u1", json!(500), "2025-10-11T10:00:00Z"),
            ])
            .await
            .unwrap();

        let detected = control.detect_violations(&autumn()).await.unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].agent_code, "A1");
        assert_eq!(detected[0].month, "2025-10");
        assert_eq!(detected[0].total_cost, 15.0);
        assert_eq!(detected[0].monthly_limit, 10.0);

        // re-running refreshes instead of duplicating
        let again = control.detect_violations(&autumn()).await.unwrap();
        assert_eq!(again[0].id, detected[0].id);
        assert_eq!(control.list_violations(false).await.unwrap().len(), 1);

        assert_eq!(control.resolve_violations("A1").await.unwrap(), 1);
        assert_eq!(control.resolve_violations("A1").await.unwrap(), 0);
        assert!(control.list_violations(false).await.unwrap().is_empty());

        let all = control.list_violations(true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved_on.is_some());

        // a resolved month is not reopened
        assert!(control.detect_violations(&autumn()).await.unwrap().is_empty());
    }
}
