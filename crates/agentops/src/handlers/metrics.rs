//! Metrics commands

use super::{core_error, pretty, read_json};
use crate::state::AppState;
use agentops_core::{
    monthly_costs, query_metrics, CostOperations, MetricKind, MetricRecord, MetricsQuery,
    MonthlyCost,
};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use sen::{Args, CliError, CliResult, State};
use std::path::PathBuf;
use tracing::debug;

/// Query agent metrics over a time range
///
/// Usage:
///   agentops metrics --start 2025-10-27T00:00:00Z --end 2025-10-27T23:59:59Z
///   agentops metrics -a A1 -m cost --start ... --end ...
///   agentops metrics -m performance --min 0.5 --max 1 --start ... --end ...
///   agentops metrics monthly --start 2025-09-01T00:00:00Z --end 2025-10-31T23:59:59Z
///   agentops metrics violations
#[derive(Parser, Debug)]
pub struct MetricsArgs {
    #[command(subcommand)]
    pub command: Option<MetricsCommand>,

    /// Agent code filter
    #[arg(short, long)]
    pub agent_code: Option<String>,

    /// Intent code filter
    #[arg(short, long)]
    pub intent_code: Option<String>,

    /// Metric code (cost and performance are aggregated)
    #[arg(short, long)]
    pub metric_code: Option<MetricKind>,

    /// Start of the range, ISO-8601 UTC
    #[arg(long)]
    pub start: Option<String>,

    /// End of the range, ISO-8601 UTC
    #[arg(long)]
    pub end: Option<String>,

    /// Minimum metric value
    #[arg(long, allow_negative_numbers = true)]
    pub min: Option<f64>,

    /// Maximum metric value
    #[arg(long, allow_negative_numbers = true)]
    pub max: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum MetricsCommand {
    /// Cost totals per month and agent
    Monthly {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(short, long)]
        agent_code: Option<String>,
        /// Split each agent's total per user
        #[arg(long)]
        by_user: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check monthly totals against agent cost limits
    CheckLimits {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// List cost-limit violations
    Violations {
        /// Include resolved violations
        #[arg(long)]
        all: bool,
    },
    /// Resolve every open violation of an agent
    Resolve {
        agent_code: String,
    },
}

fn range_query(start: &str, end: &str) -> Result<MetricsQuery, CliError> {
    MetricsQuery::parse(start, end).map_err(|e| core_error("Invalid time range", e))
}

impl MetricsArgs {
    fn to_query(&self) -> Result<MetricsQuery, CliError> {
        let start = self
            .start
            .as_deref()
            .ok_or_else(|| CliError::user("Missing required argument: --start"))?;
        let end = self
            .end
            .as_deref()
            .ok_or_else(|| CliError::user("Missing required argument: --end"))?;

        let mut query = range_query(start, end)?;
        query.agent_code = self.agent_code.clone();
        query.intent_code = self.intent_code.clone();
        query.metric_kind = self.metric_code.clone();
        query.min_value = self.min;
        query.max_value = self.max;
        Ok(query)
    }
}

#[sen::handler]
pub async fn metrics(state: State<AppState>, Args(args): Args<MetricsArgs>) -> CliResult<String> {
    if let Some(command) = args.command {
        let app = state.read().await;
        return handle_cost(&app, command).await;
    }

    let query = args.to_query()?;
    debug!("Metrics query: {:?}", query);

    let app = state.read().await;
    let result = query_metrics(&app.db.metrics(), &query)
        .await
        .map_err(|e| core_error("Metrics query failed", e))?;

    pretty(&result)
}

async fn handle_cost(app: &AppState, command: MetricsCommand) -> CliResult<String> {
    let costs = app.db.costs();

    match command {
        MetricsCommand::Monthly {
            start,
            end,
            agent_code,
            by_user,
            json,
        } => {
            let mut query = range_query(&start, &end)?;
            query.agent_code = agent_code;

            let totals = monthly_costs(&app.db.metrics(), &query, by_user)
                .await
                .map_err(|e| core_error("Monthly cost roll-up failed", e))?;

            if json {
                pretty(&totals)
            } else {
                Ok(render_monthly(&totals, by_user))
            }
        }
        MetricsCommand::CheckLimits { start, end } => {
            let query = range_query(&start, &end)?;
            let detected = costs
                .detect_violations(&query)
                .await
                .map_err(|e| core_error("Cost limit check failed", e))?;
            pretty(&detected)
        }
        MetricsCommand::Violations { all } => {
            let violations = costs
                .list_violations(all)
                .await
                .map_err(|e| core_error("Failed to list violations", e))?;
            pretty(&violations)
        }
        MetricsCommand::Resolve { agent_code } => {
            let resolved = costs
                .resolve_violations(&agent_code)
                .await
                .map_err(|e| core_error("Failed to resolve violations", e))?;
            Ok(format!("✓ Resolved {} violations for {}", resolved, agent_code))
        }
    }
}

fn render_monthly(totals: &[MonthlyCost], by_user: bool) -> String {
    if totals.is_empty() {
        return "No cost metrics in range.".to_string();
    }

    let mut header = vec![
        Cell::new("Month").fg(Color::Green),
        Cell::new("Agent").fg(Color::Green),
    ];
    if by_user {
        header.push(Cell::new("User").fg(Color::Green));
    }
    header.push(Cell::new("Total Cost").fg(Color::Green));
    header.push(Cell::new("Records").fg(Color::Green));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for total in totals {
        let mut row = vec![
            total.month.clone(),
            total.agent_code.clone().unwrap_or_else(|| "-".to_string()),
        ];
        if by_user {
            row.push(total.user_id.clone().unwrap_or_else(|| "-".to_string()));
        }
        row.push(format!("{:.2}", total.total_cost));
        row.push(total.metric_count.to_string());
        table.add_row(row);
    }

    table.to_string()
}

/// Ingest metric records from a JSON file
///
/// Usage:
///   agentops record metrics.json
#[derive(Parser, Debug)]
pub struct RecordArgs {
    /// JSON file holding an array of metric objects
    pub file: PathBuf,
}

#[sen::handler]
pub async fn record(state: State<AppState>, Args(args): Args<RecordArgs>) -> CliResult<String> {
    let raw: Vec<serde_json::Value> = read_json(&args.file)?;
    let records = raw
        .into_iter()
        .map(MetricRecord::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| core_error("Invalid metric record", e))?;

    let app = state.read().await;
    let stored = app
        .db
        .metrics()
        .record(&records)
        .await
        .map_err(|e| core_error("Failed to record metrics", e))?;
    debug!("Recorded {} metrics from {}", stored, args.file.display());

    Ok(format!("✓ Recorded {} metric records", stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_query() {
        let args = MetricsArgs::parse_from([
            "metrics",
            "-a",
            "A1",
            "-m",
            "COST",
            "--start",
            "2025-10-27T00:00:00Z",
            "--end",
            "2025-10-27T23:59:59Z",
            "--min",
            "-1.5",
        ]);

        let query = args.to_query().unwrap();
        assert_eq!(query.agent_code.as_deref(), Some("A1"));
        assert_eq!(query.metric_kind, Some(MetricKind::Cost));
        assert_eq!(query.min_value, Some(-1.5));
        assert!(query.max_value.is_none());
    }

    #[test]
    fn test_args_reject_bad_timestamp() {
        let args = MetricsArgs::parse_from(["metrics", "--start", "today", "--end", "tomorrow"]);
        assert!(args.to_query().is_err());
    }

    #[test]
    fn test_args_require_range_without_subcommand() {
        let args = MetricsArgs::parse_from(["metrics", "-a", "A1"]);
        assert!(args.command.is_none());
        assert!(args.to_query().is_err());
    }

    #[test]
    fn test_monthly_subcommand() {
        let args = MetricsArgs::parse_from([
            "metrics",
            "monthly",
            "--start",
            "2025-09-01T00:00:00Z",
            "--end",
            "2025-10-31T23:59:59Z",
            "--by-user",
        ]);
        match args.command {
            Some(MetricsCommand::Monthly { by_user, agent_code, .. }) => {
                assert!(by_user);
                assert!(agent_code.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_render_monthly() {
        assert_eq!(render_monthly(&[], false), "No cost metrics in range.");

        let rendered = render_monthly(
            &[MonthlyCost {
                month: "2025-10".to_string(),
                agent_code: Some("A1".to_string()),
                user_id: Some("u1".to_string()),
                total_cost: 12.5,
                metric_count: 2,
            }],
            true,
        );
        assert!(rendered.contains("2025-10"));
        assert!(rendered.contains("u1"));
        assert!(rendered.contains("12.50"));
    }
}
