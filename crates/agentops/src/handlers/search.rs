//! Search command

use super::{core_error, truncate};
use crate::state::AppState;
use agentops_core::SearchOptions;
use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use sen::{Args, CliResult, State};

/// Search context documents
///
/// Usage:
///   agentops search "refund policy"
///   agentops search "refund" -a A1 --top 5
///   agentops search -a A1 --version-id v2
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Search text, `*` for everything
    pub query: Option<String>,

    /// Agent code, `*` for every agent
    #[arg(short, long, default_value = "*")]
    pub agent_code: String,

    /// Version id filter
    #[arg(long)]
    pub version_id: Option<String>,

    /// Maximum number of results
    #[arg(short, long, default_value_t = 10)]
    pub top: usize,
}

#[sen::handler]
pub async fn search(state: State<AppState>, Args(args): Args<SearchArgs>) -> CliResult<String> {
    let mut options = SearchOptions::new().agent_code(&args.agent_code).top(args.top);
    if let Some(version_id) = &args.version_id {
        options = options.version_id(version_id);
    }
    if let Some(query) = &args.query {
        options = options.query(query);
    }

    let app = state.read().await;

    let results = app
        .db
        .query()
        .search(options)
        .await
        .map_err(|e| core_error("Search failed", e))?;

    let label = args.query.as_deref().unwrap_or("*");
    if results.is_empty() {
        return Ok(format!("No results found for: {}", label));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Yellow),
            Cell::new("Agent").fg(Color::Yellow),
            Cell::new("Score").fg(Color::Yellow),
            Cell::new("Content").fg(Color::Yellow),
        ]);

    for item in &results {
        let score = item
            .score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            item.id.clone(),
            item.document.agent_code.clone().unwrap_or_default(),
            score,
            truncate(item.document.content.as_deref().unwrap_or_default(), 60),
        ]);
    }

    Ok(format!(
        "\nSearch: \"{}\"\n\n{}\n\nFound: {} results",
        label,
        table,
        results.len()
    ))
}
