//! Storage operations for the agent solution catalog

use crate::db::format_time;
use crate::{Agent, AgentSolution, Error, Result, SolutionUpdate};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Solution catalog storage interface
#[async_trait]
pub trait SolutionOperations {
    /// Add a catalog entry
    async fn create(&self, solution: AgentSolution) -> Result<AgentSolution>;

    /// Get an active entry by id
    async fn get(&self, id: &str) -> Result<Option<AgentSolution>>;

    /// Every active entry
    async fn list(&self) -> Result<Vec<AgentSolution>>;

    /// Active agents linked to a solution
    async fn list_agents(&self, id: &str) -> Result<Vec<Agent>>;

    /// Merge a partial update
    async fn update(&self, id: &str, update: SolutionUpdate) -> Result<AgentSolution>;

    /// Replace only the description
    async fn update_description(&self, id: &str, description: &str) -> Result<AgentSolution>;

    /// Hide an entry from every read
    async fn soft_delete(&self, id: &str) -> Result<()>;
}

/// SQLite solution catalog
#[derive(Clone)]
pub struct SolutionStore {
    pool: SqlitePool,
}

impl SolutionStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn save(&self, solution: &AgentSolution) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_solutions
            SET name = ?, is_deleted = ?, modified_on = ?, data_json = ?
            WHERE id = ?
            "#,
        )
        .bind(&solution.name)
        .bind(solution.is_deleted)
        .bind(format_time(&solution.modified_on))
        .bind(solution.to_json()?)
        .bind(&solution.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn require(&self, id: &str) -> Result<AgentSolution> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found("Solution", id))
    }
}

#[async_trait]
impl SolutionOperations for SolutionStore {
    async fn create(&self, solution: AgentSolution) -> Result<AgentSolution> {
        info!("Creating solution: {} ({})", solution.name, solution.id);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO agent_solutions (id, name, is_deleted, created_on, modified_on, data_json)
            VALUES (?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&solution.id)
        .bind(&solution.name)
        .bind(format_time(&solution.created_on))
        .bind(format_time(&solution.modified_on))
        .bind(solution.to_json()?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists {
                kind: "Solution",
                id: solution.id.clone(),
            });
        }

        Ok(solution)
    }

    async fn get(&self, id: &str) -> Result<Option<AgentSolution>> {
        debug!("Getting solution: {}", id);

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data_json FROM agent_solutions WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data_json,)| AgentSolution::from_json(&data_json))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<AgentSolution>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data_json FROM agent_solutions WHERE is_deleted = 0 ORDER BY name, created_on",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut solutions = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            solutions.push(AgentSolution::from_json(&data_json)?);
        }
        Ok(solutions)
    }

    async fn list_agents(&self, id: &str) -> Result<Vec<Agent>> {
        debug!("Listing agents of solution: {}", id);

        self.require(id).await?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT data_json
            FROM agents
            WHERE solution_id = ? AND is_deleted = 0
            ORDER BY name, created_on
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut agents = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            agents.push(Agent::from_json(&data_json)?);
        }
        Ok(agents)
    }

    async fn update(&self, id: &str, update: SolutionUpdate) -> Result<AgentSolution> {
        info!("Updating solution: {}", id);

        let mut solution = self.require(id).await?;
        if update.apply(&mut solution) {
            solution.touch();
            self.save(&solution).await?;
        }
        Ok(solution)
    }

    async fn update_description(&self, id: &str, description: &str) -> Result<AgentSolution> {
        self.update(
            id,
            SolutionUpdate {
                description: Some(description.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        info!("Soft-deleting solution: {}", id);

        let mut solution = self.require(id).await?;
        solution.is_deleted = true;
        solution.touch();
        self.save(&solution).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentOperations, Database};
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path).await.unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_create_list_and_update() {
        let (db, _temp) = setup_db().await;
        let store = db.solutions();

        let mut claims = AgentSolution::new("Claims");
        claims.permission_scopes = vec!["claims.read".to_string()];
        let claims = store.create(claims).await.unwrap();
        store.create(AgentSolution::new("Billing")).await.unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Billing", "Claims"]);

        let updated = store
            .update_description(&claims.id, "First notice of loss intake")
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("First notice of loss intake"));
        assert_eq!(updated.permission_scopes, vec!["claims.read"]);
        assert!(updated.modified_on >= claims.modified_on);

        let stored = store.get(&claims.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);

        let duplicate = store.create(stored).await;
        assert!(matches!(duplicate, Err(Error::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_agents_by_solution() {
        let (db, _temp) = setup_db().await;
        let solutions = db.solutions();
        let agents = db.agents();

        let claims = solutions.create(AgentSolution::new("Claims")).await.unwrap();

        let mut intake = Agent::new("A1", "Intake");
        intake.solution_id = Some(claims.id.clone());
        let intake = agents.create(intake).await.unwrap();
        let mut triage = Agent::new("A2", "Triage");
        triage.solution_id = Some(claims.id.clone());
        agents.create(triage).await.unwrap();
        agents.create(Agent::new("A3", "Unrelated")).await.unwrap();

        let linked = solutions.list_agents(&claims.id).await.unwrap();
        let codes: Vec<&str> = linked.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["A1", "A2"]);

        agents.soft_delete(&intake.id).await.unwrap();
        assert_eq!(solutions.list_agents(&claims.id).await.unwrap().len(), 1);

        let err = solutions.list_agents("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let (db, _temp) = setup_db().await;
        let store = db.solutions();

        let claims = store.create(AgentSolution::new("Claims")).await.unwrap();
        store.soft_delete(&claims.id).await.unwrap();

        assert!(store.get(&claims.id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(
            store.soft_delete(&claims.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.update(&claims.id, SolutionUpdate::default()).await,
            Err(Error::NotFound { .. })
        ));

        // deleted entries can no longer take agents
        let mut agent = Agent::new("A1", "Intake");
        agent.solution_id = Some(claims.id.clone());
        assert!(db.agents().create(agent).await.is_err());
    }
}
