//! Runtime configuration
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file in the working directory.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Database path override
pub const DB_PATH_VAR: &str = "AGENTOPS_DB_PATH";
/// Good-feedback index name override
pub const GOOD_FEEDBACK_INDEX_VAR: &str = "AGENTOPS_GOOD_FEEDBACK_INDEX";
/// Bad-feedback index name override
pub const BAD_FEEDBACK_INDEX_VAR: &str = "AGENTOPS_BAD_FEEDBACK_INDEX";

/// Names of the two feedback collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackIndexes {
    pub good: String,
    pub bad: String,
}

impl Default for FeedbackIndexes {
    fn default() -> Self {
        Self {
            good: "good-feedback".to_string(),
            bad: "bad-feedback".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Feedback collection names
    pub feedback_indexes: FeedbackIndexes,
}

impl Config {
    /// Load configuration from `.env` and the environment
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = match lookup(DB_PATH_VAR).filter(|v| !v.is_empty()) {
            Some(path) => expand_path(path)?,
            None => default_database_path()?,
        };

        let defaults = FeedbackIndexes::default();
        let feedback_indexes = FeedbackIndexes {
            good: lookup(GOOD_FEEDBACK_INDEX_VAR)
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.good),
            bad: lookup(BAD_FEEDBACK_INDEX_VAR)
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.bad),
        };

        if feedback_indexes.good == feedback_indexes.bad {
            return Err(Error::Validation(format!(
                "Good and bad feedback indexes must differ (both '{}')",
                feedback_indexes.good
            )));
        }

        Ok(Self {
            database_path,
            feedback_indexes,
        })
    }
}

/// Default database location (~/.agentops/agentops.db)
pub fn default_database_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Other("Could not determine home directory".to_string()))?;
    Ok(home.join(".agentops").join("agentops.db"))
}

/// Expand a leading tilde
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path
        .to_str()
        .ok_or_else(|| Error::Other(format!("Invalid path: {}", path.display())))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.database_path.ends_with(".agentops/agentops.db"));
        assert_eq!(config.feedback_indexes, FeedbackIndexes::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (DB_PATH_VAR, "/tmp/agentops/test.db"),
            (GOOD_FEEDBACK_INDEX_VAR, "fb-good"),
            (BAD_FEEDBACK_INDEX_VAR, ""),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/agentops/test.db"));
        assert_eq!(config.feedback_indexes.good, "fb-good");
        assert_eq!(config.feedback_indexes.bad, "bad-feedback");
    }

    #[test]
    fn test_identical_indexes_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            (GOOD_FEEDBACK_INDEX_VAR, "feedback"),
            (BAD_FEEDBACK_INDEX_VAR, "feedback"),
        ]));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_expand_path() {
        let expanded = expand_path("~/test/path").unwrap();
        assert!(!expanded.to_str().unwrap().starts_with('~'));

        let normal = expand_path("/absolute/path").unwrap();
        assert_eq!(normal.to_str().unwrap(), "/absolute/path");
    }
}
