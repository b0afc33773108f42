//! Storage operations for agents and their configuration

use crate::db::format_time;
use crate::{Agent, AgentConfig, ConfigType, Error, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Agent listing filters (all optional, combined with AND)
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    pub status: Option<String>,
    pub provider: Option<String>,
    pub code: Option<String>,
    pub environment: Option<String>,
    /// Matches agents carrying any of these categories
    pub categories: Vec<String>,
}

impl AgentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Set categories from a comma-separated list
    pub fn categories(mut self, raw: &str) -> Self {
        self.categories = raw
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        self
    }
}

/// Agent storage interface
#[async_trait]
pub trait AgentOperations {
    /// Create a new agent
    async fn create(&self, agent: Agent) -> Result<Agent>;

    /// Get an active agent by id
    async fn get(&self, id: &str) -> Result<Option<Agent>>;

    /// Get an active agent by code
    async fn get_by_code(&self, code: &str) -> Result<Option<Agent>>;

    /// List active agents
    async fn list(&self, filter: &AgentFilter) -> Result<Vec<Agent>>;

    /// Replace an agent's metadata
    async fn update(&self, id: &str, agent: Agent) -> Result<Agent>;

    /// Flag an agent deleted without removing it
    async fn soft_delete(&self, id: &str) -> Result<()>;

    /// Attach a config to the agent named by `config.agent_code`
    async fn add_config(&self, config: AgentConfig) -> Result<AgentConfig>;

    /// List configs of one type for an agent code
    async fn list_configs(&self, agent_code: &str, config_type: ConfigType) -> Result<Vec<AgentConfig>>;

    /// Get a config by id
    async fn get_config(&self, id: &str) -> Result<Option<AgentConfig>>;
}

/// SQLite agent storage
#[derive(Clone)]
pub struct AgentStore {
    pool: SqlitePool,
}

impl AgentStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn code_taken(&self, code: &str, except_id: Option<&str>) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM agents
            WHERE code = ? AND is_deleted = 0 AND id != ?
            "#,
        )
        .bind(code)
        .bind(except_id.unwrap_or(""))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    async fn ensure_solution(&self, agent: &Agent) -> Result<()> {
        let Some(solution_id) = &agent.solution_id else {
            return Ok(());
        };

        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM agent_solutions WHERE id = ? AND is_deleted = 0",
        )
        .bind(solution_id)
        .fetch_one(&self.pool)
        .await?;

        if row.0 == 0 {
            return Err(Error::not_found("Solution", solution_id));
        }
        Ok(())
    }

    async fn write_categories(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        agent: &Agent,
    ) -> Result<()> {
        sqlx::query("DELETE FROM agent_categories WHERE agent_id = ?")
            .bind(&agent.id)
            .execute(&mut **tx)
            .await?;

        for category in &agent.category {
            sqlx::query("INSERT OR IGNORE INTO agent_categories (agent_id, category) VALUES (?, ?)")
                .bind(&agent.id)
                .bind(category)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AgentOperations for AgentStore {
    async fn create(&self, agent: Agent) -> Result<Agent> {
        info!("Creating agent: {} ({})", agent.code, agent.id);

        if self.code_taken(&agent.code, None).await? {
            return Err(Error::AlreadyExists {
                kind: "Agent",
                id: agent.code.clone(),
            });
        }
        self.ensure_solution(&agent).await?;

        let data_json = agent.to_json()?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, code, name, status, provider, environment, solution_id, is_deleted, created_on, modified_on, data_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.code)
        .bind(&agent.name)
        .bind(&agent.status)
        .bind(&agent.provider)
        .bind(&agent.environment)
        .bind(&agent.solution_id)
        .bind(format_time(&agent.created_on))
        .bind(format_time(&agent.modified_on))
        .bind(&data_json)
        .execute(&mut *tx)
        .await?;

        Self::write_categories(&mut tx, &agent).await?;
        tx.commit().await?;

        debug!("Created agent: {}", agent.id);
        Ok(agent)
    }

    async fn get(&self, id: &str) -> Result<Option<Agent>> {
        debug!("Getting agent: {}", id);

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data_json FROM agents WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data_json,)| Agent::from_json(&data_json)).transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Agent>> {
        debug!("Getting agent by code: {}", code);

        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT data_json
            FROM agents
            WHERE code = ? AND is_deleted = 0
            ORDER BY created_on
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data_json,)| Agent::from_json(&data_json)).transpose()
    }

    async fn list(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        debug!("Listing agents: {:?}", filter);

        let mut sql = String::from("SELECT a.data_json FROM agents a WHERE a.is_deleted = 0");
        let mut binds: Vec<String> = Vec::new();

        if let Some(name) = &filter.name {
            sql.push_str(" AND LOWER(a.name) LIKE ?");
            binds.push(format!("%{}%", name.to_lowercase()));
        }
        for (column, value) in [
            ("status", &filter.status),
            ("provider", &filter.provider),
            ("code", &filter.code),
            ("environment", &filter.environment),
        ] {
            if let Some(value) = value {
                sql.push_str(&format!(" AND a.{} = ?", column));
                binds.push(value.clone());
            }
        }
        if !filter.categories.is_empty() {
            let placeholders = vec!["?"; filter.categories.len()].join(", ");
            sql.push_str(&format!(
                " AND a.id IN (SELECT agent_id FROM agent_categories WHERE category IN ({}))",
                placeholders
            ));
            binds.extend(filter.categories.iter().cloned());
        }
        sql.push_str(" ORDER BY a.name, a.created_on");

        let mut query_builder = sqlx::query_as::<_, (String,)>(&sql);
        for value in &binds {
            query_builder = query_builder.bind(value);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;

        let mut agents = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            agents.push(Agent::from_json(&data_json)?);
        }

        debug!("Found {} agents", agents.len());
        Ok(agents)
    }

    async fn update(&self, id: &str, mut agent: Agent) -> Result<Agent> {
        info!("Updating agent: {}", id);

        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("Agent", id))?;

        if self.code_taken(&agent.code, Some(id)).await? {
            return Err(Error::AlreadyExists {
                kind: "Agent",
                id: agent.code.clone(),
            });
        }
        self.ensure_solution(&agent).await?;

        agent.id = existing.id;
        agent.created_on = existing.created_on;
        agent.is_deleted = false;
        agent.touch();
        let data_json = agent.to_json()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE agents
            SET code = ?, name = ?, status = ?, provider = ?, environment = ?, solution_id = ?, modified_on = ?, data_json = ?
            WHERE id = ?
            "#,
        )
        .bind(&agent.code)
        .bind(&agent.name)
        .bind(&agent.status)
        .bind(&agent.provider)
        .bind(&agent.environment)
        .bind(&agent.solution_id)
        .bind(format_time(&agent.modified_on))
        .bind(&data_json)
        .bind(&agent.id)
        .execute(&mut *tx)
        .await?;

        Self::write_categories(&mut tx, &agent).await?;
        tx.commit().await?;

        debug!("Updated agent: {}", agent.id);
        Ok(agent)
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        info!("Soft-deleting agent: {}", id);

        let mut agent = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("Agent", id))?;
        agent.is_deleted = true;
        agent.touch();

        sqlx::query("UPDATE agents SET is_deleted = 1, modified_on = ?, data_json = ? WHERE id = ?")
            .bind(format_time(&agent.modified_on))
            .bind(agent.to_json()?)
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!("Soft-deleted agent: {}", id);
        Ok(())
    }

    async fn add_config(&self, mut config: AgentConfig) -> Result<AgentConfig> {
        info!(
            "Adding {} config for agent: {}",
            config.config_type, config.agent_code
        );

        let agent = self
            .get_by_code(&config.agent_code)
            .await?
            .ok_or_else(|| Error::not_found("Agent", config.agent_code.clone()))?;
        config.agent_id = Some(agent.id.clone());

        sqlx::query(
            r#"
            INSERT INTO agent_configs (id, agent_id, agent_code, config_type, created_on, data_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.id)
        .bind(&agent.id)
        .bind(&config.agent_code)
        .bind(config.config_type.as_str())
        .bind(format_time(&config.created_on))
        .bind(config.to_json()?)
        .execute(&self.pool)
        .await?;

        debug!("Added config: {}", config.id);
        Ok(config)
    }

    async fn list_configs(&self, agent_code: &str, config_type: ConfigType) -> Result<Vec<AgentConfig>> {
        debug!("Listing {} configs for agent: {}", config_type, agent_code);

        let agent = self
            .get_by_code(agent_code)
            .await?
            .ok_or_else(|| Error::not_found("Agent", agent_code))?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT data_json
            FROM agent_configs
            WHERE agent_id = ? AND config_type = ?
            ORDER BY created_on
            "#,
        )
        .bind(&agent.id)
        .bind(config_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut configs = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            configs.push(AgentConfig::from_json(&data_json)?);
        }

        Ok(configs)
    }

    async fn get_config(&self, id: &str) -> Result<Option<AgentConfig>> {
        debug!("Getting config: {}", id);

        let row: Option<(String,)> = sqlx::query_as("SELECT data_json FROM agent_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(data_json,)| AgentConfig::from_json(&data_json))
            .transpose()
    }
}
