//! Command handlers

pub mod agent;
pub mod context;
pub mod feedback;
pub mod metrics;
pub mod search;
pub mod solution;
pub mod stats;

use agentops_core::ErrorKind;
use sen::CliError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Map a core error onto the CLI's user/system split
pub(crate) fn core_error(action: &str, err: agentops_core::Error) -> CliError {
    match err.kind() {
        ErrorKind::Validation | ErrorKind::NotFound => CliError::user(format!("{}: {}", action, err)),
        ErrorKind::Upstream => CliError::system(format!("{}: {}", action, err)),
    }
}

/// Read and parse a JSON file
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::user(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::user(format!("Invalid JSON in {}: {}", path.display(), e)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Read a file holding either a single document or a list of them
pub(crate) fn read_documents<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CliError> {
    Ok(match read_json::<OneOrMany<T>>(path)? {
        OneOrMany::Many(docs) => docs,
        OneOrMany::One(doc) => vec![doc],
    })
}

pub(crate) fn pretty<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::system(format!("Failed to render JSON: {}", e)))
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentops_core::ContextDocument;
    use std::io::Write;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn test_read_documents_accepts_one_or_many() {
        let mut single = tempfile::NamedTempFile::new().unwrap();
        write!(single, r#"{{"id": "ctx-1", "Content": "a"}}"#).unwrap();
        let docs: Vec<ContextDocument> = read_documents(single.path()).unwrap();
        assert_eq!(docs.len(), 1);

        let mut many = tempfile::NamedTempFile::new().unwrap();
        write!(many, r#"[{{"id": "ctx-1"}}, {{"id": "ctx-2"}}]"#).unwrap();
        let docs: Vec<ContextDocument> = read_documents(many.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id, "ctx-2");
    }
}
