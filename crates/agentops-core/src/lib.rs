//! # agentops-core
//!
//! Core library for AgentOps agent metadata management.
//!
//! ## Features
//!
//! - Metric filtering and cost/performance aggregation
//! - Context documents with versioning on update
//! - Good/bad feedback collections
//! - Agent metadata, typed agent configuration and the solution catalog
//! - Monthly cost roll-ups and cost-limit violations
//! - Full-text search over context documents with FTS5
//!
//! ## Example
//!
//! ```no_run
//! use agentops_core::{query_metrics, ContextDocument, ContextOperations, Database, MetricsQuery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Initialize database
//!     let db = Database::open("~/.agentops/agentops.db").await?;
//!
//!     // Store a context document
//!     let mut doc = ContextDocument::new("ctx-1");
//!     doc.agent_code = Some("A1".to_string());
//!     db.contexts().upload(vec![doc]).await?;
//!
//!     // Publish an edit as a new version
//!     let edited = ContextDocument::new("ctx-1");
//!     let outcome = db.contexts().update("ctx-1", edited, true).await?;
//!
//!     // Query metrics
//!     let query = MetricsQuery::parse("2025-10-27T00:00:00Z", "2025-10-27T23:59:59Z")?;
//!     let result = query_metrics(&db.metrics(), &query).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod config;
pub mod contexts;
pub mod cost;
pub mod db;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod metrics_store;
pub mod query;
pub mod solutions;
pub mod types;
pub mod versioning;

// Re-exports for convenience
pub use agents::{AgentFilter, AgentOperations, AgentStore};
pub use config::{Config, FeedbackIndexes};
pub use contexts::{ContextOperations, ContextStore, UpdateOutcome};
pub use cost::{
    monthly_costs, monthly_rollup, CostControlStore, CostOperations, CostPolicy, CostViolation,
    MonthlyCost,
};
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use feedback::{index_for, select_feedback_index, FeedbackOperations, FeedbackStore};
pub use metrics::{
    aggregate, filter_by_value_bounds, query_metrics, total_cost, AggregationResult, CostSummary,
    MetricRecord, MetricsFilter, MetricsQuery, MetricsSource, PerformanceSummary,
};
pub use metrics_store::MetricsStore;
pub use query::{QueryBuilder, SearchOptions, SearchResultItem};
pub use solutions::{SolutionOperations, SolutionStore};
pub use types::{
    parse_scopes, Agent, AgentConfig, AgentSolution, ConfigType, ContextDocument, Entity,
    FeedbackDocument, FeedbackKind, MetricKind, SolutionSupport, SolutionUpdate,
};
pub use versioning::{next_version, stamp_created, VersionDecision};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
