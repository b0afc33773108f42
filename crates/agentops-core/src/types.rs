//! Domain types shared by the stores and the metrics engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Metric kind selector for aggregation
///
/// Parsing is case-insensitive and never fails: unrecognised codes are kept
/// verbatim in [`MetricKind::Other`] and pass through unaggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Summed into a total cost
    Cost,
    /// Averaged into a performance score
    Performance,
    /// Any other metric code
    Other(String),
}

impl FromStr for MetricKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Infallible> {
        Ok(match s.to_lowercase().as_str() {
            "cost" => MetricKind::Cost,
            "performance" => MetricKind::Performance,
            _ => MetricKind::Other(s.to_string()),
        })
    }
}

impl MetricKind {
    /// Code used when filtering records in the store
    pub fn as_str(&self) -> &str {
        match self {
            MetricKind::Cost => "cost",
            MetricKind::Performance => "performance",
            MetricKind::Other(code) => code,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Agent configuration type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Rbac,
    Cost,
    ModelRouting,
    DataScope,
}

impl FromStr for ConfigType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, crate::Error> {
        match s {
            "rbac" => Ok(ConfigType::Rbac),
            "cost" => Ok(ConfigType::Cost),
            "model_routing" => Ok(ConfigType::ModelRouting),
            "data_scope" => Ok(ConfigType::DataScope),
            _ => Err(crate::Error::InvalidConfigType(s.to_string())),
        }
    }
}

impl ConfigType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Rbac => "rbac",
            ConfigType::Cost => "cost",
            ConfigType::ModelRouting => "model_routing",
            ConfigType::DataScope => "data_scope",
        }
    }

    /// Get all config types
    pub fn all() -> &'static [ConfigType] {
        &[
            ConfigType::Rbac,
            ConfigType::Cost,
            ConfigType::ModelRouting,
            ConfigType::DataScope,
        ]
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which feedback collection a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Good,
    Bad,
}

impl FeedbackKind {
    /// Lenient resolution used by lookups: only the exact literal `"good"`
    /// selects [`FeedbackKind::Good`], everything else falls back to `Bad`.
    ///
    /// Case variants such as `"GOOD"` resolve to `Bad` as well. This matches
    /// long-standing client behaviour and is kept as is.
    pub fn from_discriminator(discriminator: &str) -> Self {
        if discriminator == "good" {
            FeedbackKind::Good
        } else {
            FeedbackKind::Bad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Good => "good",
            FeedbackKind::Bad => "bad",
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, crate::Error> {
        match s {
            "good" => Ok(FeedbackKind::Good),
            "bad" => Ok(FeedbackKind::Bad),
            _ => Err(crate::Error::InvalidFeedbackType(s.to_string())),
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key/value pair attached to context and feedback documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Versioned knowledge/context entry for an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContextDocument {
    #[serde(rename = "id")]
    pub id: String,
    pub prompt_code: Option<String>,
    pub parent_prompt_code: Option<String>,
    pub agent_code: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "Type")]
    pub doc_type: Option<String>,
    pub intent: Option<String>,
    #[serde(rename = "Default", default)]
    pub is_default: bool,
    #[serde(rename = "Approved", default)]
    pub is_approved: bool,
    pub version_id: Option<String>,
    pub context_version: Option<String>,
    #[serde(rename = "Entity", default)]
    pub entities: Vec<Entity>,
    #[serde(rename = "Latest")]
    pub is_latest: Option<bool>,
    pub created_on: Option<DateTime<Utc>>,
    pub modified_on: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
}

impl ContextDocument {
    /// Create an empty document with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Convert to JSON for storage
    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Labelled quality record for an agent's output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedbackDocument {
    #[serde(rename = "id")]
    pub id: String,
    pub reason: Option<String>,
    pub agent_code: Option<String>,
    pub intent: Option<String>,
    #[serde(rename = "Entity", default)]
    pub entities: Vec<Entity>,
    pub content: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub modified_on: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
}

impl FeedbackDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Anything that carries creation/modification audit timestamps
pub trait Timestamped {
    fn set_created_on(&mut self, at: DateTime<Utc>);
    fn set_modified_on(&mut self, at: DateTime<Utc>);
}

impl Timestamped for ContextDocument {
    fn set_created_on(&mut self, at: DateTime<Utc>) {
        self.created_on = Some(at);
    }

    fn set_modified_on(&mut self, at: DateTime<Utc>) {
        self.modified_on = Some(at);
    }
}

impl Timestamped for FeedbackDocument {
    fn set_created_on(&mut self, at: DateTime<Utc>) {
        self.created_on = Some(at);
    }

    fn set_modified_on(&mut self, at: DateTime<Utc>) {
        self.modified_on = Some(at);
    }
}

/// Agent metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Catalog entry the agent belongs to
    #[serde(default)]
    pub solution_id: Option<String>,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Agent {
    /// Create a new agent with a generated id
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.into(),
            name: name.into(),
            description: None,
            status: None,
            provider: None,
            environment: None,
            category: Vec::new(),
            version: None,
            solution_id: None,
            created_on: now,
            modified_on: now,
            is_deleted: false,
        }
    }

    /// Update the modified_on timestamp
    pub fn touch(&mut self) {
        self.modified_on = Utc::now();
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Support contact of a solution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionSupport {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Catalog entry grouping agents into a published solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSolution {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub support: SolutionSupport,
    #[serde(default)]
    pub permission_scopes: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Image reference; uploads are handled elsewhere
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl AgentSolution {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            support: SolutionSupport::default(),
            permission_scopes: Vec::new(),
            url: None,
            thumbnail: None,
            created_on: now,
            modified_on: now,
            is_deleted: false,
        }
    }

    pub fn touch(&mut self) {
        self.modified_on = Utc::now();
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Partial update of a solution; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub support: Option<SolutionSupport>,
    #[serde(default)]
    pub permission_scopes: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
}

impl SolutionUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge into `solution`, returns whether anything was set
    pub fn apply(self, solution: &mut AgentSolution) -> bool {
        let changed = !self.is_empty();
        if let Some(name) = self.name {
            solution.name = name;
        }
        if let Some(description) = self.description {
            solution.description = Some(description);
        }
        if let Some(support) = self.support {
            solution.support = support;
        }
        if let Some(scopes) = self.permission_scopes {
            solution.permission_scopes = scopes;
        }
        if let Some(url) = self.url {
            solution.url = Some(url);
        }
        changed
    }
}

/// Split a comma-separated scope list, dropping blanks
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

/// Typed configuration attached to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    /// Resolved from `agent_code` when the config is stored
    #[serde(default)]
    pub agent_id: Option<String>,
    pub agent_code: String,
    pub config_type: ConfigType,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_on: DateTime<Utc>,
}

impl AgentConfig {
    pub fn new(agent_code: impl Into<String>, config_type: ConfigType, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: None,
            agent_code: agent_code.into(),
            config_type,
            version: None,
            data,
            created_on: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}
