//! Solution catalog commands

use super::{core_error, pretty, read_json, truncate};
use crate::state::AppState;
use agentops_core::{parse_scopes, AgentSolution, SolutionOperations, SolutionSupport, SolutionUpdate};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use sen::{Args, CliError, CliResult, State};
use std::path::PathBuf;

/// Manage the agent solution catalog
///
/// Usage:
///   agentops solution create "Claims" --scopes claims.read,claims.write --url https://claims.example.com
///   agentops solution agents <ID>
///   agentops solution describe <ID> "First notice of loss intake"
#[derive(Parser, Debug)]
pub struct SolutionArgs {
    #[command(subcommand)]
    pub command: SolutionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SolutionCommand {
    /// Add a catalog entry
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Comma-separated permission scopes
        #[arg(long, default_value = "")]
        scopes: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        support_email: Option<String>,
        #[arg(long)]
        support_phone: Option<String>,
    },
    /// List catalog entries
    List,
    /// Show one entry
    Show {
        id: String,
    },
    /// List agents linked to an entry
    Agents {
        id: String,
    },
    /// Apply a partial update from a JSON file
    Update {
        id: String,
        file: PathBuf,
    },
    /// Replace the description
    Describe {
        id: String,
        description: String,
    },
    /// Remove an entry from the catalog
    Delete {
        id: String,
    },
}

#[sen::handler]
pub async fn solution(state: State<AppState>, Args(args): Args<SolutionArgs>) -> CliResult<String> {
    let app = state.read().await;
    let store = app.db.solutions();

    match args.command {
        SolutionCommand::Create {
            name,
            description,
            scopes,
            url,
            support_email,
            support_phone,
        } => {
            let mut solution = AgentSolution::new(name);
            solution.description = description;
            solution.permission_scopes = parse_scopes(&scopes);
            solution.url = url;
            solution.support = SolutionSupport {
                email: support_email,
                phone: support_phone,
            };

            let solution = store
                .create(solution)
                .await
                .map_err(|e| core_error("Failed to create solution", e))?;
            Ok(format!("✓ Created solution: {} ({})", solution.name, solution.id))
        }
        SolutionCommand::List => {
            let solutions = store
                .list()
                .await
                .map_err(|e| core_error("Failed to list solutions", e))?;
            Ok(render_solutions(&solutions))
        }
        SolutionCommand::Show { id } => {
            let solution = store
                .get(&id)
                .await
                .map_err(|e| core_error("Failed to load solution", e))?
                .ok_or_else(|| CliError::user(format!("Solution not found: {}", id)))?;
            pretty(&solution)
        }
        SolutionCommand::Agents { id } => {
            let agents = store
                .list_agents(&id)
                .await
                .map_err(|e| core_error("Failed to list agents", e))?;
            pretty(&agents)
        }
        SolutionCommand::Update { id, file } => {
            let update: SolutionUpdate = read_json(&file)?;
            let solution = store
                .update(&id, update)
                .await
                .map_err(|e| core_error("Failed to update solution", e))?;
            pretty(&solution)
        }
        SolutionCommand::Describe { id, description } => {
            let solution = store
                .update_description(&id, &description)
                .await
                .map_err(|e| core_error("Failed to update description", e))?;
            pretty(&solution)
        }
        SolutionCommand::Delete { id } => {
            store
                .soft_delete(&id)
                .await
                .map_err(|e| core_error("Failed to delete solution", e))?;
            Ok(format!("✓ Deleted solution: {}", id))
        }
    }
}

fn render_solutions(solutions: &[AgentSolution]) -> String {
    if solutions.is_empty() {
        return "No solutions found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Green),
            Cell::new("Name").fg(Color::Green),
            Cell::new("Scopes").fg(Color::Green),
            Cell::new("Description").fg(Color::Green),
        ]);

    for solution in solutions {
        table.add_row(vec![
            solution.id.clone(),
            solution.name.clone(),
            solution.permission_scopes.join(", "),
            truncate(solution.description.as_deref().unwrap_or_default(), 50),
        ]);
    }

    format!("{}\n\nTotal: {} solutions", table, solutions.len())
}
