//! Storage operations for versioned context documents

use crate::db::format_time;
use crate::versioning::{next_version, stamp_created, VersionDecision};
use crate::{ContextDocument, Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Where an update ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    /// Id the document is now stored under
    pub id: String,
    /// Superseded document, when the update created a new version
    pub previous_id: Option<String>,
}

/// Context document storage interface
#[async_trait]
pub trait ContextOperations {
    /// Upload a batch of new documents, returns how many were stored
    async fn upload(&self, docs: Vec<ContextDocument>) -> Result<usize>;

    /// Get a document by id
    async fn get(&self, id: &str) -> Result<Option<ContextDocument>>;

    /// Replace a document, optionally as a new version
    async fn update(&self, id: &str, payload: ContextDocument, bump_version: bool) -> Result<UpdateOutcome>;

    /// Delete a document
    async fn delete(&self, id: &str) -> Result<()>;

    /// All documents (every version) for an agent
    async fn list_by_agent(&self, agent_code: &str) -> Result<Vec<ContextDocument>>;

    /// All documents (every version) for a prompt code
    async fn list_by_prompt_code(&self, prompt_code: &str) -> Result<Vec<ContextDocument>>;
}

/// SQLite context storage
#[derive(Clone)]
pub struct ContextStore {
    pool: SqlitePool,
}

impl ContextStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn exists(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contexts WHERE id = ?")
            .bind(id)
            .fetch_one(conn)
            .await?;
        Ok(row.0 > 0)
    }

    async fn insert(conn: &mut SqliteConnection, doc: &ContextDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contexts (id, agent_code, prompt_code, version_id, doc_type, content, is_latest, created_on, modified_on, data_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.agent_code)
        .bind(&doc.prompt_code)
        .bind(&doc.version_id)
        .bind(&doc.doc_type)
        .bind(&doc.content)
        .bind(doc.is_latest.unwrap_or(true))
        .bind(doc.created_on.as_ref().map(format_time))
        .bind(doc.modified_on.as_ref().map(format_time))
        .bind(doc.to_json()?)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn replace(conn: &mut SqliteConnection, doc: &ContextDocument) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contexts
            SET agent_code = ?, prompt_code = ?, version_id = ?, doc_type = ?, content = ?,
                is_latest = ?, created_on = ?, modified_on = ?, data_json = ?
            WHERE id = ?
            "#,
        )
        .bind(&doc.agent_code)
        .bind(&doc.prompt_code)
        .bind(&doc.version_id)
        .bind(&doc.doc_type)
        .bind(&doc.content)
        .bind(doc.is_latest.unwrap_or(true))
        .bind(doc.created_on.as_ref().map(format_time))
        .bind(doc.modified_on.as_ref().map(format_time))
        .bind(doc.to_json()?)
        .bind(&doc.id)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn fetch(conn: &mut SqliteConnection, id: &str) -> Result<Option<ContextDocument>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data_json FROM contexts WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        row.map(|(data_json,)| ContextDocument::from_json(&data_json))
            .transpose()
    }

    /// Flag every latest document of `previous`'s chain as superseded
    ///
    /// A chain is the set of documents sharing agent and prompt code. A
    /// document without a prompt code is a chain of its own.
    async fn demote_chain(conn: &mut SqliteConnection, previous: ContextDocument) -> Result<usize> {
        let mut superseded = vec![previous];

        if let Some(prompt_code) = superseded[0].prompt_code.clone() {
            let rows: Vec<(String,)> = sqlx::query_as(
                r#"
                SELECT data_json
                FROM contexts
                WHERE prompt_code = ? AND agent_code IS ? AND is_latest = 1 AND id != ?
                "#,
            )
            .bind(&prompt_code)
            .bind(&superseded[0].agent_code)
            .bind(&superseded[0].id)
            .fetch_all(&mut *conn)
            .await?;

            for (data_json,) in rows {
                superseded.push(ContextDocument::from_json(&data_json)?);
            }
        }

        for doc in superseded.iter_mut() {
            doc.is_latest = Some(false);
            Self::replace(&mut *conn, doc).await?;
        }

        debug!("Demoted {} context documents", superseded.len());
        Ok(superseded.len())
    }

    async fn fetch_where(&self, column: &str, value: &str) -> Result<Vec<ContextDocument>> {
        let sql = format!(
            "SELECT data_json FROM contexts WHERE {} = ? ORDER BY prompt_code, modified_on DESC",
            column
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            docs.push(ContextDocument::from_json(&data_json)?);
        }
        Ok(docs)
    }
}

#[async_trait]
impl ContextOperations for ContextStore {
    async fn upload(&self, mut docs: Vec<ContextDocument>) -> Result<usize> {
        info!("Uploading {} context documents", docs.len());

        stamp_created(&mut docs);

        let mut tx = self.pool.begin().await?;
        for doc in docs.iter_mut() {
            if doc.id.is_empty() {
                doc.id = uuid::Uuid::new_v4().to_string();
            }
            if doc.is_latest.is_none() {
                doc.is_latest = Some(true);
            }
            if Self::exists(&mut tx, &doc.id).await? {
                return Err(Error::AlreadyExists {
                    kind: "Document",
                    id: doc.id.clone(),
                });
            }
            Self::insert(&mut tx, doc).await?;
        }
        tx.commit().await?;

        debug!("Uploaded {} context documents", docs.len());
        Ok(docs.len())
    }

    async fn get(&self, id: &str) -> Result<Option<ContextDocument>> {
        debug!("Getting context: {}", id);

        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    async fn update(&self, id: &str, mut payload: ContextDocument, bump_version: bool) -> Result<UpdateOutcome> {
        info!("Updating context: {} (new version: {})", id, bump_version);

        let mut tx = self.pool.begin().await?;

        let existing = Self::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| Error::not_found("Document", id))?;

        payload.id = id.to_string();
        if payload.created_on.is_none() {
            payload.created_on = existing.created_on;
        }

        let outcome = match next_version(payload, bump_version) {
            VersionDecision::InPlace(mut doc) => {
                if doc.is_latest.is_none() {
                    doc.is_latest = existing.is_latest;
                }
                Self::replace(&mut tx, &doc).await?;
                UpdateOutcome {
                    id: doc.id,
                    previous_id: None,
                }
            }
            VersionDecision::NewVersion {
                previous_id,
                document,
            } => {
                Self::demote_chain(&mut tx, existing).await?;
                Self::insert(&mut tx, &document).await?;

                UpdateOutcome {
                    id: document.id,
                    previous_id: Some(previous_id),
                }
            }
        };
        tx.commit().await?;

        debug!("Updated context: {:?}", outcome);
        Ok(outcome)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        info!("Deleting context: {}", id);

        let result = sqlx::query("DELETE FROM contexts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Document", id));
        }

        debug!("Deleted context: {}", id);
        Ok(())
    }

    async fn list_by_agent(&self, agent_code: &str) -> Result<Vec<ContextDocument>> {
        debug!("Listing contexts for agent: {}", agent_code);
        self.fetch_where("agent_code", agent_code).await
    }

    async fn list_by_prompt_code(&self, prompt_code: &str) -> Result<Vec<ContextDocument>> {
        debug!("Listing contexts for prompt code: {}", prompt_code);
        self.fetch_where("prompt_code", prompt_code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path).await.unwrap();
        (db, temp_dir)
    }

    fn context(id: &str, agent_code: &str, prompt_code: &str, content: &str) -> ContextDocument {
        let mut doc = ContextDocument::new(id);
        doc.agent_code = Some(agent_code.to_string());
        doc.prompt_code = Some(prompt_code.to_string());
        doc.content = Some(content.to_string());
        doc
    }

    #[tokio::test]
    async fn test_upload_stamps_timestamps() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        let uploaded = store
            .upload(vec![
                context("ctx-1", "A1", "P1", "refund policy"),
                context("ctx-2", "A1", "P2", "tone of voice"),
            ])
            .await
            .unwrap();
        assert_eq!(uploaded, 2);

        let doc = store.get("ctx-1").await.unwrap().unwrap();
        assert!(doc.created_on.is_some());
        assert_eq!(doc.created_on, doc.modified_on);
        assert_eq!(doc.is_latest, Some(true));
    }

    #[tokio::test]
    async fn test_upload_duplicate_fails_atomically() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store.upload(vec![context("ctx-1", "A1", "P1", "a")]).await.unwrap();

        let result = store
            .upload(vec![
                context("ctx-2", "A1", "P1", "b"),
                context("ctx-1", "A1", "P1", "c"),
            ])
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));
        assert!(store.get("ctx-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store.upload(vec![context("ctx-1", "A1", "P1", "old")]).await.unwrap();
        let before = store.get("ctx-1").await.unwrap().unwrap();

        let payload = context("ignored", "A1", "P1", "new");
        let outcome = store.update("ctx-1", payload, false).await.unwrap();
        assert_eq!(outcome.id, "ctx-1");
        assert!(outcome.previous_id.is_none());

        let after = store.get("ctx-1").await.unwrap().unwrap();
        assert_eq!(after.content.as_deref(), Some("new"));
        assert_eq!(after.created_on, before.created_on);
        assert!(after.modified_on >= before.modified_on);
        assert_eq!(store.list_by_agent("A1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_with_new_version() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store.upload(vec![context("ctx-1", "A1", "P1", "v1")]).await.unwrap();

        let outcome = store
            .update("ctx-1", context("ctx-1", "A1", "P1", "v2"), true)
            .await
            .unwrap();
        assert_ne!(outcome.id, "ctx-1");
        assert_eq!(outcome.previous_id.as_deref(), Some("ctx-1"));

        let previous = store.get("ctx-1").await.unwrap().unwrap();
        assert_eq!(previous.content.as_deref(), Some("v1"));
        assert_eq!(previous.is_latest, Some(false));

        let latest = store.get(&outcome.id).await.unwrap().unwrap();
        assert_eq!(latest.content.as_deref(), Some("v2"));
        assert_eq!(latest.is_latest, Some(true));

        let chain = store.list_by_prompt_code("P1").await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain.iter().filter(|d| d.is_latest == Some(true)).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_bump_from_superseded_version_keeps_one_latest() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store
            .upload(vec![
                context("ctx-1", "A1", "P1", "v1"),
                context("ctx-other", "A2", "P1", "other agent"),
            ])
            .await
            .unwrap();

        let second = store
            .update("ctx-1", context("ctx-1", "A1", "P1", "v2"), true)
            .await
            .unwrap();
        let third = store
            .update("ctx-1", context("ctx-1", "A1", "P1", "v3"), true)
            .await
            .unwrap();

        let chain: Vec<ContextDocument> = store
            .list_by_agent("A1")
            .await
            .unwrap();
        assert_eq!(chain.len(), 3);
        let latest: Vec<&str> = chain
            .iter()
            .filter(|d| d.is_latest == Some(true))
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(latest, vec![third.id.as_str()]);

        let demoted = store.get(&second.id).await.unwrap().unwrap();
        assert_eq!(demoted.is_latest, Some(false));

        let (column,): (bool,) = sqlx::query_as("SELECT is_latest FROM contexts WHERE id = ?")
            .bind(&second.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(!column);

        // Same prompt code under another agent is a separate chain
        let other = store.get("ctx-other").await.unwrap().unwrap();
        assert_eq!(other.is_latest, Some(true));
    }

    #[tokio::test]
    async fn test_in_place_edit_keeps_superseded_flag() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store.upload(vec![context("ctx-1", "A1", "P1", "v1")]).await.unwrap();
        store
            .update("ctx-1", context("ctx-1", "A1", "P1", "v2"), true)
            .await
            .unwrap();

        let payload = context("ctx-1", "A1", "P1", "v1 typo fixed");
        assert!(payload.is_latest.is_none());
        store.update("ctx-1", payload, false).await.unwrap();

        let edited = store.get("ctx-1").await.unwrap().unwrap();
        assert_eq!(edited.content.as_deref(), Some("v1 typo fixed"));
        assert_eq!(edited.is_latest, Some(false));

        let (column,): (bool,) = sqlx::query_as("SELECT is_latest FROM contexts WHERE id = ?")
            .bind("ctx-1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(!column);

        let latest = store
            .list_by_prompt_code("P1")
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.is_latest == Some(true))
            .count();
        assert_eq!(latest, 1);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let (db, _temp) = setup_db().await;
        let result = db
            .contexts()
            .update("nope", ContextDocument::new("nope"), false)
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store.upload(vec![context("ctx-1", "A1", "P1", "a")]).await.unwrap();
        store.delete("ctx-1").await.unwrap();

        assert!(store.get("ctx-1").await.unwrap().is_none());
        assert!(matches!(
            store.delete("ctx-1").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_by_agent_and_prompt() {
        let (db, _temp) = setup_db().await;
        let store = db.contexts();

        store
            .upload(vec![
                context("ctx-1", "A1", "P1", "a"),
                context("ctx-2", "A1", "P2", "b"),
                context("ctx-3", "A2", "P1", "c"),
            ])
            .await
            .unwrap();

        assert_eq!(store.list_by_agent("A1").await.unwrap().len(), 2);
        assert_eq!(store.list_by_agent("A3").await.unwrap().len(), 0);
        assert_eq!(store.list_by_prompt_code("P1").await.unwrap().len(), 2);
    }
}
