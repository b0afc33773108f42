//! Document statistics

use super::{core_error, pretty};
use crate::state::AppState;
use clap::{Parser, Subcommand};
use sen::{Args, CliResult, State};
use serde_json::json;

/// Count stored documents
///
/// Usage:
///   agentops stats contexts
///   agentops stats memories
#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[command(subcommand)]
    pub command: StatsCommand,
}

#[derive(Subcommand, Debug)]
pub enum StatsCommand {
    /// Number of context documents
    Contexts,
    /// Number of memory-type context documents
    Memories,
}

#[sen::handler]
pub async fn stats(state: State<AppState>, Args(args): Args<StatsArgs>) -> CliResult<String> {
    let app = state.read().await;
    let query = app.db.query();

    let count = match args.command {
        StatsCommand::Contexts => query
            .count_contexts()
            .await
            .map_err(|e| core_error("Failed to count contexts", e))?,
        StatsCommand::Memories => query.count_memories().await,
    };

    pretty(&json!({ "count": count }))
}
