//! Metric filtering and aggregation
//!
//! Metric records arrive from an external store as loosely-typed JSON
//! objects. This module resolves their values, applies value-bound
//! filtering and folds them into kind-specific aggregates:
//!
//! - `cost`: sum of values, unparseable values count as `0`
//! - `performance`: mean of values over records without an intent code
//! - anything else: the records themselves, unwrapped
//!
//! The bound filter and the cost sum deliberately treat unparseable values
//! differently: the filter drops them, the sum zeroes them.

use crate::{Error, MetricKind, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Accepted spellings of the value field, in lookup order
pub const VALUE_KEYS: [&str; 3] = ["MetricValue", "metricvalue", "metric_value"];

/// Accepted spellings of the intent code field
pub const INTENT_KEYS: [&str; 3] = ["IntentCode", "intentcode", "intent_code"];

/// Accepted spellings of the agent code field
pub const AGENT_KEYS: [&str; 3] = ["AgentCode", "agentcode", "agent_code"];

/// Accepted spellings of the metric code field
pub const METRIC_CODE_KEYS: [&str; 3] = ["MetricCode", "metriccode", "metric_code"];

/// Accepted spellings of the user id field
pub const USER_KEYS: [&str; 3] = ["UserId", "userid", "user_id"];

/// Accepted spellings of the timestamp field
pub const TIMESTAMP_KEYS: [&str; 3] = ["Timestamp", "timestamp", "recorded_at"];

/// One raw metric observation
///
/// The original field set is preserved verbatim so that responses echo
/// exactly what the store returned.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord(Map<String, Value>);

impl MetricRecord {
    /// Wrap a JSON object
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Raw fields of the record
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Get a raw field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First populated value among the accepted spellings
    fn lookup(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !is_blank(value))
    }

    fn lookup_str(&self, keys: &[&str]) -> Option<&str> {
        self.lookup(keys).and_then(Value::as_str)
    }

    /// Numeric value of the record, if it coerces to a finite number
    pub fn value(&self) -> Option<f64> {
        self.lookup(&VALUE_KEYS).and_then(coerce_number)
    }

    pub fn agent_code(&self) -> Option<&str> {
        self.lookup_str(&AGENT_KEYS)
    }

    /// Intent code; an empty value means the record has no intent
    pub fn intent_code(&self) -> Option<&str> {
        self.lookup_str(&INTENT_KEYS)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.lookup_str(&USER_KEYS)
    }

    pub fn metric_code(&self) -> Option<&str> {
        self.lookup_str(&METRIC_CODE_KEYS)
    }

    /// Observation time, if present and parseable
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.lookup_str(&TIMESTAMP_KEYS)
            .and_then(|raw| parse_timestamp(raw).ok())
    }

    /// Whether the record is scoped to an intent
    pub fn has_intent(&self) -> bool {
        self.lookup(&INTENT_KEYS).is_some()
    }
}

impl TryFrom<Value> for MetricRecord {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::Validation(format!(
                "Metric record must be a JSON object, got: {}",
                other
            ))),
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Coerce a JSON value into a finite number
///
/// Numbers are taken as is, strings are trimmed and parsed. Everything else
/// (booleans, arrays, objects, non-numeric strings) yields `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Keep only records whose value falls within the inclusive bounds
///
/// Records whose value cannot be coerced are dropped. An absent bound
/// places no constraint on that side. The input is left untouched.
pub fn filter_by_value_bounds(
    records: &[MetricRecord],
    min_value: Option<f64>,
    max_value: Option<f64>,
) -> Vec<MetricRecord> {
    records
        .iter()
        .filter(|record| match record.value() {
            Some(value) => {
                min_value.map_or(true, |min| value >= min) && max_value.map_or(true, |max| value <= max)
            }
            None => {
                debug!("Dropping metric record with non-numeric value");
                false
            }
        })
        .cloned()
        .collect()
}

/// Cost aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    #[serde(rename = "MetricCode")]
    pub metric_code: &'static str,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    #[serde(rename = "Metrics")]
    pub metrics: Vec<MetricRecord>,
}

/// Performance aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    #[serde(rename = "MetricCode")]
    pub metric_code: &'static str,
    pub average_performance: f64,
    #[serde(rename = "Metrics")]
    pub metrics: Vec<MetricRecord>,
}

/// Outcome of [`aggregate`]
///
/// Aggregates serialize as a one-element list holding the summary, the
/// passthrough case serializes as the bare record list.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    Cost(CostSummary),
    Performance(PerformanceSummary),
    Passthrough(Vec<MetricRecord>),
}

impl AggregationResult {
    /// Records carried by the result
    pub fn metrics(&self) -> &[MetricRecord] {
        match self {
            AggregationResult::Cost(summary) => &summary.metrics,
            AggregationResult::Performance(summary) => &summary.metrics,
            AggregationResult::Passthrough(records) => records,
        }
    }
}

impl Serialize for AggregationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AggregationResult::Cost(summary) => [summary].serialize(serializer),
            AggregationResult::Performance(summary) => [summary].serialize(serializer),
            AggregationResult::Passthrough(records) => records.serialize(serializer),
        }
    }
}

/// Sum of record values, unparseable values count as `0`
pub fn total_cost(records: &[MetricRecord]) -> f64 {
    records
        .iter()
        .map(|record| record.value().unwrap_or(0.0))
        .sum()
}

/// Fold records into the aggregate for `kind`
pub fn aggregate(records: Vec<MetricRecord>, kind: Option<&MetricKind>) -> AggregationResult {
    match kind {
        Some(MetricKind::Cost) => {
            let total_cost = total_cost(&records);
            debug!("Aggregated cost over {} records: {}", records.len(), total_cost);
            AggregationResult::Cost(CostSummary {
                metric_code: "COST",
                total_cost,
                metrics: records,
            })
        }
        Some(MetricKind::Performance) => {
            let values: Vec<f64> = records
                .iter()
                .filter(|record| !record.has_intent())
                .filter_map(MetricRecord::value)
                .collect();
            let average_performance = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            debug!(
                "Averaged performance over {} of {} records: {}",
                values.len(),
                records.len(),
                average_performance
            );
            AggregationResult::Performance(PerformanceSummary {
                metric_code: "PERFORMANCE",
                average_performance,
                metrics: records,
            })
        }
        Some(MetricKind::Other(_)) | None => AggregationResult::Passthrough(records),
    }
}

/// Store-side selection of metric records
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsFilter {
    pub agent_code: Option<String>,
    pub intent_code: Option<String>,
    pub metric_code: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Source of raw metric records
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch records matching the filter, ordered by time
    async fn fetch_metrics(&self, filter: &MetricsFilter) -> Result<Vec<MetricRecord>>;
}

/// A metrics query as received from a caller
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery {
    pub agent_code: Option<String>,
    pub intent_code: Option<String>,
    pub metric_kind: Option<MetricKind>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl MetricsQuery {
    /// Create a query over a time range
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            agent_code: None,
            intent_code: None,
            metric_kind: None,
            start_time,
            end_time,
            min_value: None,
            max_value: None,
        }
    }

    /// Create a query from ISO-8601 range bounds
    pub fn parse(start_time: &str, end_time: &str) -> Result<Self> {
        Ok(Self::new(
            parse_timestamp(start_time)?,
            parse_timestamp(end_time)?,
        ))
    }

    /// Set agent code filter
    pub fn agent_code(mut self, agent_code: impl Into<String>) -> Self {
        self.agent_code = Some(agent_code.into());
        self
    }

    /// Set intent code filter
    pub fn intent_code(mut self, intent_code: impl Into<String>) -> Self {
        self.intent_code = Some(intent_code.into());
        self
    }

    /// Set metric kind
    pub fn metric_kind(mut self, kind: MetricKind) -> Self {
        self.metric_kind = Some(kind);
        self
    }

    /// Set lower value bound
    pub fn min_value(mut self, min_value: f64) -> Self {
        self.min_value = Some(min_value);
        self
    }

    /// Set upper value bound
    pub fn max_value(mut self, max_value: f64) -> Self {
        self.max_value = Some(max_value);
        self
    }

    /// Reject inverted ranges
    pub fn validate(&self) -> Result<()> {
        if self.start_time > self.end_time {
            return Err(Error::Validation(format!(
                "start_time {} is after end_time {}",
                self.start_time.to_rfc3339(),
                self.end_time.to_rfc3339()
            )));
        }
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                return Err(Error::Validation(format!(
                    "min_value {} is greater than max_value {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    fn has_bounds(&self) -> bool {
        self.min_value.is_some() || self.max_value.is_some()
    }

    /// The part of the query the store is responsible for
    pub fn filter(&self) -> MetricsFilter {
        MetricsFilter {
            agent_code: self.agent_code.clone(),
            intent_code: self.intent_code.clone(),
            metric_code: self.metric_kind.as_ref().map(|kind| kind.as_str().to_string()),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Run a metrics query against `source`
///
/// The value-bound filter only runs when at least one bound is supplied;
/// aggregation always sees the post-filter set.
///
/// # Example
///
/// ```no_run
/// use agentops_core::{query_metrics, Database, MetricKind, MetricsQuery};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let db = Database::open_default().await?;
///
///     let query = MetricsQuery::parse("2025-10-27T00:00:00Z", "2025-10-27T23:59:59Z")?
///         .agent_code("A1")
///         .metric_kind(MetricKind::Cost);
///     let result = query_metrics(&db.metrics(), &query).await?;
///     println!("{}", serde_json::to_string_pretty(&result)?);
///
///     Ok(())
/// }
/// ```
pub async fn query_metrics<S>(source: &S, query: &MetricsQuery) -> Result<AggregationResult>
where
    S: MetricsSource + ?Sized,
{
    query.validate()?;

    let metrics = source.fetch_metrics(&query.filter()).await?;
    debug!("Fetched {} metric records", metrics.len());

    if metrics.is_empty() {
        return Ok(AggregationResult::Passthrough(Vec::new()));
    }

    let metrics = if query.has_bounds() {
        let filtered = filter_by_value_bounds(&metrics, query.min_value, query.max_value);
        if filtered.len() < metrics.len() {
            warn!(
                "Value bounds excluded {} of {} metric records",
                metrics.len() - filtered.len(),
                metrics.len()
            );
        }
        filtered
    } else {
        metrics
    };

    Ok(aggregate(metrics, query.metric_kind.as_ref()))
}

/// Parse an ISO-8601 UTC timestamp
///
/// Accepts RFC 3339 (`2025-10-27T00:00:00Z`, with offset or fractional
/// seconds) and naive timestamps, which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Validation(format!("Invalid timestamp '{}': {}", raw, e)))
}
