//! Agent metadata and configuration commands

use super::{core_error, pretty, read_json};
use crate::state::AppState;
use agentops_core::{Agent, AgentConfig, AgentFilter, AgentOperations, ConfigType};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use sen::{Args, CliError, CliResult, State};
use serde::Deserialize;
use std::path::PathBuf;

/// Manage agents and their typed configuration
///
/// Usage:
///   agentops agent create agent.json
///   agentops agent list --status active --category support,billing
///   agentops agent config-add A1 rbac --data '{"roles": ["admin"]}'
#[derive(Parser, Debug)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Register an agent from a JSON file
    Create {
        file: PathBuf,
    },
    /// List active agents
    List {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        environment: Option<String>,
        /// Comma-separated categories, any match
        #[arg(long)]
        category: Option<String>,
    },
    /// Show an agent by id or code
    Show {
        #[arg(required_unless_present = "code")]
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        code: Option<String>,
    },
    /// Replace an agent's metadata from a JSON file
    Update {
        id: String,
        file: PathBuf,
    },
    /// Soft-delete an agent
    Delete {
        id: String,
    },
    /// Attach a configuration (rbac, cost, model_routing, data_scope)
    ConfigAdd {
        agent_code: String,
        config_type: String,
        /// Configuration body as JSON
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// List configurations of one type for an agent
    ConfigList {
        agent_code: String,
        config_type: String,
    },
    /// Show one configuration
    ConfigShow {
        id: String,
    },
}

/// Agent fields accepted from files; identity and timestamps are managed by the store
#[derive(Debug, Deserialize)]
struct AgentPayload {
    code: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    category: Vec<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    solution_id: Option<String>,
}

impl AgentPayload {
    fn into_agent(self) -> Agent {
        let mut agent = Agent::new(self.code, self.name);
        agent.description = self.description;
        agent.status = self.status;
        agent.provider = self.provider;
        agent.environment = self.environment;
        agent.category = self.category;
        agent.version = self.version;
        agent.solution_id = self.solution_id;
        agent
    }
}

fn parse_config_type(raw: &str) -> Result<ConfigType, CliError> {
    raw.parse::<ConfigType>().map_err(|e| {
        let allowed: Vec<&str> = ConfigType::all().iter().map(|t| t.as_str()).collect();
        CliError::user(format!("{}\n\nAllowed types: {}", e, allowed.join(", ")))
    })
}

#[sen::handler]
pub async fn agent(state: State<AppState>, Args(args): Args<AgentArgs>) -> CliResult<String> {
    let app = state.read().await;
    let store = app.db.agents();

    match args.command {
        AgentCommand::Create { file } => {
            let payload: AgentPayload = read_json(&file)?;
            let agent = store
                .create(payload.into_agent())
                .await
                .map_err(|e| core_error("Failed to create agent", e))?;
            Ok(format!("✓ Created agent: {} ({})", agent.code, agent.id))
        }
        AgentCommand::List {
            name,
            status,
            provider,
            code,
            environment,
            category,
        } => {
            let mut filter = AgentFilter::new();
            if let Some(name) = name {
                filter = filter.name(name);
            }
            if let Some(status) = status {
                filter = filter.status(status);
            }
            if let Some(provider) = provider {
                filter = filter.provider(provider);
            }
            if let Some(code) = code {
                filter = filter.code(code);
            }
            if let Some(environment) = environment {
                filter = filter.environment(environment);
            }
            if let Some(category) = category {
                filter = filter.categories(&category);
            }

            let agents = store
                .list(&filter)
                .await
                .map_err(|e| core_error("Failed to list agents", e))?;

            Ok(render_agents(&agents))
        }
        AgentCommand::Show { id, code } => {
            let found = match (id, code) {
                (Some(id), _) => store.get(&id).await,
                (None, Some(code)) => store.get_by_code(&code).await,
                (None, None) => return Err(CliError::user("Specify an agent id or --code")),
            }
            .map_err(|e| core_error("Failed to load agent", e))?
            .ok_or_else(|| CliError::user("Agent not found"))?;
            pretty(&found)
        }
        AgentCommand::Update { id, file } => {
            let payload: AgentPayload = read_json(&file)?;
            let agent = store
                .update(&id, payload.into_agent())
                .await
                .map_err(|e| core_error("Failed to update agent", e))?;
            pretty(&agent)
        }
        AgentCommand::Delete { id } => {
            store
                .soft_delete(&id)
                .await
                .map_err(|e| core_error("Failed to delete agent", e))?;
            Ok(format!("✓ Deleted agent: {}", id))
        }
        AgentCommand::ConfigAdd {
            agent_code,
            config_type,
            data,
            version,
        } => {
            let config_type = parse_config_type(&config_type)?;
            let data: serde_json::Value = serde_json::from_str(&data)
                .map_err(|e| CliError::user(format!("Invalid --data JSON: {}", e)))?;

            let mut config = AgentConfig::new(agent_code, config_type, data);
            config.version = version;

            let config = store
                .add_config(config)
                .await
                .map_err(|e| core_error("Failed to add config", e))?;
            Ok(format!("✓ Added {} config: {}", config.config_type, config.id))
        }
        AgentCommand::ConfigList {
            agent_code,
            config_type,
        } => {
            let config_type = parse_config_type(&config_type)?;
            let configs = store
                .list_configs(&agent_code, config_type)
                .await
                .map_err(|e| core_error("Failed to list configs", e))?;
            pretty(&configs)
        }
        AgentCommand::ConfigShow { id } => {
            let config = store
                .get_config(&id)
                .await
                .map_err(|e| core_error("Failed to load config", e))?
                .ok_or_else(|| CliError::user(format!("Config not found: {}", id)))?;
            pretty(&config)
        }
    }
}

fn render_agents(agents: &[Agent]) -> String {
    if agents.is_empty() {
        return "No agents found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Code").fg(Color::Green),
            Cell::new("Name").fg(Color::Green),
            Cell::new("Status").fg(Color::Green),
            Cell::new("Provider").fg(Color::Green),
            Cell::new("Category").fg(Color::Green),
        ]);

    for agent in agents {
        table.add_row(vec![
            agent.code.clone(),
            agent.name.clone(),
            agent.status.clone().unwrap_or_default(),
            agent.provider.clone().unwrap_or_default(),
            agent.category.join(", "),
        ]);
    }

    format!("{}\n\nTotal: {} agents", table, agents.len())
}
