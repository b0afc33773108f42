//! Storage operations for good/bad feedback documents
//!
//! Each feedback kind lives in its own collection, addressed by index name.

use crate::config::FeedbackIndexes;
use crate::db::format_time;
use crate::versioning::stamp_created;
use crate::{Error, FeedbackDocument, FeedbackKind, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Resolve a free-text discriminator to a collection name
///
/// Only the exact literal `"good"` selects the good-feedback collection.
/// Every other value, including `"GOOD"` and the empty string, selects the
/// bad-feedback collection.
pub fn select_feedback_index<'a>(discriminator: &str, indexes: &'a FeedbackIndexes) -> &'a str {
    index_for(FeedbackKind::from_discriminator(discriminator), indexes)
}

/// Collection name for a known feedback kind
pub fn index_for(kind: FeedbackKind, indexes: &FeedbackIndexes) -> &str {
    match kind {
        FeedbackKind::Good => &indexes.good,
        FeedbackKind::Bad => &indexes.bad,
    }
}

/// Feedback document storage interface
#[async_trait]
pub trait FeedbackOperations {
    /// Upload a batch of new documents into `index`
    async fn upload(&self, index: &str, docs: Vec<FeedbackDocument>) -> Result<usize>;

    /// Get a document by id
    async fn get(&self, index: &str, id: &str) -> Result<Option<FeedbackDocument>>;

    /// Replace a document in place, refreshing `modified_on`
    async fn update(&self, index: &str, id: &str, payload: FeedbackDocument) -> Result<FeedbackDocument>;

    /// Delete a document
    async fn delete(&self, index: &str, id: &str) -> Result<()>;

    /// All documents in `index` for an agent
    async fn list_by_agent(&self, index: &str, agent_code: &str) -> Result<Vec<FeedbackDocument>>;
}

/// SQLite feedback storage
#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedbackOperations for FeedbackStore {
    async fn upload(&self, index: &str, mut docs: Vec<FeedbackDocument>) -> Result<usize> {
        info!("Uploading {} feedback documents to {}", docs.len(), index);

        stamp_created(&mut docs);

        let mut tx = self.pool.begin().await?;
        for doc in docs.iter_mut() {
            if doc.id.is_empty() {
                doc.id = uuid::Uuid::new_v4().to_string();
            }

            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM feedback WHERE index_name = ? AND id = ?")
                    .bind(index)
                    .bind(&doc.id)
                    .fetch_one(&mut *tx)
                    .await?;
            if count > 0 {
                return Err(Error::AlreadyExists {
                    kind: "Feedback",
                    id: doc.id.clone(),
                });
            }

            sqlx::query(
                r#"
                INSERT INTO feedback (index_name, id, agent_code, created_on, modified_on, data_json)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(index)
            .bind(&doc.id)
            .bind(&doc.agent_code)
            .bind(doc.created_on.as_ref().map(format_time))
            .bind(doc.modified_on.as_ref().map(format_time))
            .bind(doc.to_json()?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(docs.len())
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<FeedbackDocument>> {
        debug!("Getting feedback: {} (index: {})", id, index);

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data_json FROM feedback WHERE index_name = ? AND id = ?")
                .bind(index)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data_json,)| FeedbackDocument::from_json(&data_json))
            .transpose()
    }

    async fn update(&self, index: &str, id: &str, mut payload: FeedbackDocument) -> Result<FeedbackDocument> {
        info!("Updating feedback: {} (index: {})", id, index);

        let existing = self
            .get(index, id)
            .await?
            .ok_or_else(|| Error::not_found("Feedback", id))?;

        payload.id = id.to_string();
        if payload.created_on.is_none() {
            payload.created_on = existing.created_on;
        }
        payload.modified_on = Some(Utc::now());

        sqlx::query(
            r#"
            UPDATE feedback
            SET agent_code = ?, created_on = ?, modified_on = ?, data_json = ?
            WHERE index_name = ? AND id = ?
            "#,
        )
        .bind(&payload.agent_code)
        .bind(payload.created_on.as_ref().map(format_time))
        .bind(payload.modified_on.as_ref().map(format_time))
        .bind(payload.to_json()?)
        .bind(index)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(payload)
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        info!("Deleting feedback: {} (index: {})", id, index);

        let result = sqlx::query("DELETE FROM feedback WHERE index_name = ? AND id = ?")
            .bind(index)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Feedback", id));
        }
        Ok(())
    }

    async fn list_by_agent(&self, index: &str, agent_code: &str) -> Result<Vec<FeedbackDocument>> {
        debug!("Listing feedback for agent: {} (index: {})", agent_code, index);

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT data_json
            FROM feedback
            WHERE index_name = ? AND agent_code = ?
            ORDER BY created_on DESC
            "#,
        )
        .bind(index)
        .bind(agent_code)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for (data_json,) in rows {
            docs.push(FeedbackDocument::from_json(&data_json)?);
        }
        Ok(docs)
    }
}
