//! AgentOps CLI - Agent Metadata Management
//!
//! A command-line tool for agent metrics, context documents, feedback and configuration.

mod handlers;
mod state;

use handlers::{agent, context, feedback, metrics, search, solution, stats};
use sen::Router;
use state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Initialize application state
    let state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to initialize AgentOps: {}", e);
            std::process::exit(1);
        }
    };

    let router = Router::new()
        // Metrics
        .route("metrics", metrics::metrics())
        .route("record", metrics::record())

        // Documents
        .route("context", context::context())
        .route("feedback", feedback::feedback())
        .route("search", search::search())
        .route("stats", stats::stats())

        // Agents
        .route("agent", agent::agent())
        .route("solution", solution::solution())

        .with_state(state)
        .with_agent_mode(); // JSON output for LLM integration

    let response = router.execute().await;

    if response.agent_mode {
        println!("{}", response.to_agent_json());
    } else if !response.output.is_empty() {
        println!("{}", response.output);
    }

    std::process::exit(response.exit_code);
}
