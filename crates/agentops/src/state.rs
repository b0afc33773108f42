//! Application state

use agentops_core::{Config, Database};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection
    pub db: Arc<Database>,
    /// Runtime configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState from the environment
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        let db = Database::open(&config.database_path).await?;

        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
        })
    }
}
