//! Context document commands

use super::{core_error, pretty, read_documents, read_json, truncate};
use crate::state::AppState;
use agentops_core::{ContextDocument, ContextOperations};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use sen::{Args, CliError, CliResult, State};
use std::path::PathBuf;

/// Manage versioned context documents
///
/// Usage:
///   agentops context create docs.json
///   agentops context update ctx-1 edited.json --bump-version
///   agentops context list --agent A1
#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub command: ContextCommand,
}

#[derive(Subcommand, Debug)]
pub enum ContextCommand {
    /// Upload one document or a list of documents
    Create {
        /// JSON file
        file: PathBuf,
    },
    /// Show a document
    Get {
        id: String,
    },
    /// Replace a document, optionally publishing it as a new version
    Update {
        id: String,
        /// JSON file holding the replacement document
        file: PathBuf,
        /// Mint a new id and demote the existing document
        #[arg(long)]
        bump_version: bool,
    },
    /// Delete a document
    Delete {
        id: String,
    },
    /// List documents by agent or prompt code
    List {
        #[arg(short, long, conflicts_with = "prompt_code")]
        agent: Option<String>,
        #[arg(short, long)]
        prompt_code: Option<String>,
    },
}

#[sen::handler]
pub async fn context(state: State<AppState>, Args(args): Args<ContextArgs>) -> CliResult<String> {
    let app = state.read().await;
    let store = app.db.contexts();

    match args.command {
        ContextCommand::Create { file } => {
            let docs: Vec<ContextDocument> = read_documents(&file)?;
            let count = store
                .upload(docs)
                .await
                .map_err(|e| core_error("Failed to upload contexts", e))?;
            Ok(format!("✓ Uploaded {} context documents", count))
        }
        ContextCommand::Get { id } => {
            let doc = store
                .get(&id)
                .await
                .map_err(|e| core_error("Failed to load context", e))?
                .ok_or_else(|| CliError::user(format!("Context not found: {}", id)))?;
            pretty(&doc)
        }
        ContextCommand::Update {
            id,
            file,
            bump_version,
        } => {
            let payload: ContextDocument = read_json(&file)?;
            let outcome = store
                .update(&id, payload, bump_version)
                .await
                .map_err(|e| core_error("Failed to update context", e))?;
            pretty(&outcome)
        }
        ContextCommand::Delete { id } => {
            store
                .delete(&id)
                .await
                .map_err(|e| core_error("Failed to delete context", e))?;
            Ok(format!("✓ Deleted context: {}", id))
        }
        ContextCommand::List { agent, prompt_code } => {
            let docs = match (agent, prompt_code) {
                (Some(agent), _) => store.list_by_agent(&agent).await,
                (None, Some(prompt_code)) => store.list_by_prompt_code(&prompt_code).await,
                (None, None) => {
                    return Err(CliError::user("Specify --agent or --prompt-code"));
                }
            }
            .map_err(|e| core_error("Failed to list contexts", e))?;

            Ok(render_list(&docs))
        }
    }
}

fn render_list(docs: &[ContextDocument]) -> String {
    if docs.is_empty() {
        return "No context documents found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Green),
            Cell::new("Prompt").fg(Color::Green),
            Cell::new("Type").fg(Color::Green),
            Cell::new("Latest").fg(Color::Green),
            Cell::new("Content").fg(Color::Green),
        ]);

    for doc in docs {
        let latest = match doc.is_latest {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        table.add_row(vec![
            doc.id.clone(),
            doc.prompt_code.clone().unwrap_or_default(),
            doc.doc_type.clone().unwrap_or_default(),
            latest.to_string(),
            truncate(doc.content.as_deref().unwrap_or_default(), 50),
        ]);
    }

    format!("{}\n\nTotal: {} documents", table, docs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_list() {
        assert_eq!(render_list(&[]), "No context documents found.");

        let mut doc = ContextDocument::new("ctx-1");
        doc.is_latest = Some(true);
        doc.content = Some("Refunds above 500 need approval".to_string());
        let rendered = render_list(&[doc]);
        assert!(rendered.contains("ctx-1"));
        assert!(rendered.contains("Total: 1 documents"));
    }

    #[test]
    fn test_update_flag() {
        let args = ContextArgs::parse_from(["context", "update", "ctx-1", "doc.json", "--bump-version"]);
        match args.command {
            ContextCommand::Update { id, bump_version, .. } => {
                assert_eq!(id, "ctx-1");
                assert!(bump_version);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
