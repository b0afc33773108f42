//! Search and statistics over context documents

use crate::{ContextDocument, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Wildcard accepted for agent code and query text
pub const WILDCARD: &str = "*";

/// Search options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Agent code filter, `*` or `None` for every agent
    pub agent_code: Option<String>,
    /// Version id filter
    pub version_id: Option<String>,
    /// Full-text query, `*` or `None` to match everything
    pub query: Option<String>,
    /// Maximum number of results
    pub top: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            agent_code: None,
            version_id: None,
            query: None,
            top: 10,
        }
    }
}

impl SearchOptions {
    /// Create a new SearchOptions
    pub fn new() -> Self {
        Self::default()
    }

    /// Set agent code filter
    pub fn agent_code(mut self, agent_code: impl Into<String>) -> Self {
        self.agent_code = Some(agent_code.into());
        self
    }

    /// Set version id filter
    pub fn version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    /// Set query text
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set result limit
    pub fn top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    fn agent_filter(&self) -> Option<&str> {
        self.agent_code.as_deref().filter(|code| *code != WILDCARD)
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    /// Relevance, higher is better; absent for match-all listings
    pub score: Option<f64>,
    pub document: ContextDocument,
}

/// Query builder for searching context documents
#[derive(Clone)]
pub struct QueryBuilder {
    pool: SqlitePool,
}

impl QueryBuilder {
    /// Create a new QueryBuilder
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Full-text search using FTS5
    ///
    /// # Example
    ///
    /// ```no_run
    /// use agentops_core::{Database, SearchOptions};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let db = Database::open_default().await?;
    ///
    ///     let options = SearchOptions::new().agent_code("A1").query("refund policy").top(5);
    ///     let results = db.query().search(options).await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn search(&self, options: SearchOptions) -> Result<Vec<SearchResultItem>> {
        let match_expr = options.query.as_deref().and_then(fts_query);
        debug!("Searching contexts: {:?} (match: {:?})", options, match_expr);

        let mut sql = match match_expr {
            Some(_) => String::from(
                r#"
                SELECT c.data_json, bm25(contexts_fts) AS score
                FROM contexts_fts
                JOIN contexts c ON c.id = contexts_fts.id
                WHERE contexts_fts MATCH ?
                "#,
            ),
            None => String::from(
                r#"
                SELECT c.data_json, NULL AS score
                FROM contexts c
                WHERE 1 = 1
                "#,
            ),
        };

        if options.agent_filter().is_some() {
            sql.push_str(" AND c.agent_code = ?");
        }
        if options.version_id.is_some() {
            sql.push_str(" AND c.version_id = ?");
        }
        if match_expr.is_some() {
            sql.push_str(" ORDER BY score");
        } else {
            sql.push_str(" ORDER BY c.modified_on DESC");
        }
        sql.push_str(" LIMIT ?");

        let mut query_builder = sqlx::query_as::<_, (String, Option<f64>)>(&sql);
        if let Some(expr) = &match_expr {
            query_builder = query_builder.bind(expr);
        }
        if let Some(agent_code) = options.agent_filter() {
            query_builder = query_builder.bind(agent_code);
        }
        if let Some(version_id) = &options.version_id {
            query_builder = query_builder.bind(version_id);
        }
        query_builder = query_builder.bind(sql_limit(options.top));

        let rows = query_builder.fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for (data_json, rank) in rows {
            let document = ContextDocument::from_json(&data_json)?;
            results.push(SearchResultItem {
                id: document.id.clone(),
                // bm25 is lower-is-better
                score: rank.map(|r| -r),
                document,
            });
        }

        debug!("Found {} results", results.len());
        Ok(results)
    }

    /// Count every context document
    pub async fn count_contexts(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contexts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Count context documents of type `memory`
    ///
    /// Failures are logged and reported as zero.
    pub async fn count_memories(&self) -> usize {
        let result: std::result::Result<(i64,), sqlx::Error> =
            sqlx::query_as("SELECT COUNT(*) FROM contexts WHERE doc_type = 'memory'")
                .fetch_one(&self.pool)
                .await;

        match result {
            Ok((count,)) => count as usize,
            Err(e) => {
                warn!("Failed to count memories: {}", e);
                0
            }
        }
    }
}

/// Clamp a result count into SQLite's LIMIT range; negative limits mean unlimited
fn sql_limit(top: usize) -> i64 {
    i64::try_from(top).unwrap_or(i64::MAX)
}

/// Turn free text into an FTS5 expression of quoted terms
///
/// Returns `None` for blank input and the wildcard.
fn fts_query(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == WILDCARD {
        return None;
    }

    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
