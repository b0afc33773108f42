//! Feedback commands

use super::{core_error, pretty, read_documents, read_json, truncate};
use crate::state::AppState;
use agentops_core::{index_for, select_feedback_index, FeedbackDocument, FeedbackKind, FeedbackOperations};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use sen::{Args, CliError, CliResult, State};
use std::path::PathBuf;

/// Manage good/bad feedback collections
///
/// Usage:
///   agentops feedback create good feedback.json
///   agentops feedback get bad fb-1
///   agentops feedback list good --agent A1
#[derive(Parser, Debug)]
pub struct FeedbackArgs {
    #[command(subcommand)]
    pub command: FeedbackCommand,
}

#[derive(Subcommand, Debug)]
pub enum FeedbackCommand {
    /// Upload one document or a list of documents (`good` or `bad`)
    Create {
        feedback_type: String,
        file: PathBuf,
    },
    /// Show a feedback document
    Get {
        feedback_type: String,
        id: String,
    },
    /// Replace a feedback document
    Update {
        feedback_type: String,
        id: String,
        file: PathBuf,
    },
    /// Delete a feedback document (`good` or `bad`)
    Delete {
        feedback_type: String,
        id: String,
    },
    /// List feedback for an agent
    List {
        feedback_type: String,
        #[arg(short, long)]
        agent: String,
    },
}

fn strict_kind(raw: &str) -> Result<FeedbackKind, CliError> {
    raw.parse::<FeedbackKind>()
        .map_err(|e| CliError::user(format!("{} (expected good or bad)", e)))
}

#[sen::handler]
pub async fn feedback(state: State<AppState>, Args(args): Args<FeedbackArgs>) -> CliResult<String> {
    let app = state.read().await;
    let store = app.db.feedback();
    let indexes = &app.config.feedback_indexes;

    match args.command {
        FeedbackCommand::Create { feedback_type, file } => {
            let index = index_for(strict_kind(&feedback_type)?, indexes);
            let docs: Vec<FeedbackDocument> = read_documents(&file)?;
            let count = store
                .upload(index, docs)
                .await
                .map_err(|e| core_error("Failed to upload feedback", e))?;
            Ok(format!("✓ Uploaded {} documents to {}", count, index))
        }
        FeedbackCommand::Get { feedback_type, id } => {
            let index = select_feedback_index(&feedback_type, indexes);
            let doc = store
                .get(index, &id)
                .await
                .map_err(|e| core_error("Failed to load feedback", e))?
                .ok_or_else(|| CliError::user(format!("Feedback not found in {}: {}", index, id)))?;
            pretty(&doc)
        }
        FeedbackCommand::Update {
            feedback_type,
            id,
            file,
        } => {
            let index = select_feedback_index(&feedback_type, indexes);
            let payload: FeedbackDocument = read_json(&file)?;
            let updated = store
                .update(index, &id, payload)
                .await
                .map_err(|e| core_error("Failed to update feedback", e))?;
            pretty(&updated)
        }
        FeedbackCommand::Delete { feedback_type, id } => {
            let index = index_for(strict_kind(&feedback_type)?, indexes);
            store
                .delete(index, &id)
                .await
                .map_err(|e| core_error("Failed to delete feedback", e))?;
            Ok(format!("✓ Deleted {} from {}", id, index))
        }
        FeedbackCommand::List {
            feedback_type,
            agent,
        } => {
            let index = select_feedback_index(&feedback_type, indexes);
            let docs = store
                .list_by_agent(index, &agent)
                .await
                .map_err(|e| core_error("Failed to list feedback", e))?;

            if docs.is_empty() {
                return Ok(format!("No feedback for {} in {}", agent, index));
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("ID").fg(Color::Green),
                    Cell::new("Intent").fg(Color::Green),
                    Cell::new("Reason").fg(Color::Green),
                    Cell::new("Content").fg(Color::Green),
                ]);

            for doc in &docs {
                table.add_row(vec![
                    doc.id.clone(),
                    doc.intent.clone().unwrap_or_default(),
                    truncate(doc.reason.as_deref().unwrap_or_default(), 40),
                    truncate(doc.content.as_deref().unwrap_or_default(), 40),
                ]);
            }

            Ok(format!("{}\n\n{}: {} documents", table, index, docs.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_kind() {
        assert_eq!(strict_kind("good").unwrap(), FeedbackKind::Good);
        assert_eq!(strict_kind("bad").unwrap(), FeedbackKind::Bad);
        assert!(strict_kind("neutral").is_err());
        assert!(strict_kind("Good").is_err());
    }
}
