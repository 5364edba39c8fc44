use crate::error::AisError;
use crate::validation::{require_non_empty, validate_env_map, validate_env_var_name};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type EnvMap = IndexMap<String, String>;
pub type ModelGroup = IndexMap<String, String>;

pub const DEFAULT_MODEL_KEY: &str = "DEFAULT_MODEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Claude,
    Codex,
    #[serde(rename = "CCR")]
    Ccr,
    Droids,
    Other,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        Self::Claude,
        Self::Codex,
        Self::Ccr,
        Self::Droids,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
            Self::Ccr => "CCR",
            Self::Droids => "Droids",
            Self::Other => "Other",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "ccr" => Ok(Self::Ccr),
            "droids" => Ok(Self::Droids),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "unsupported account type: {other} (claude|codex|ccr|droids|other)"
            )),
        }
    }
}

/// Provider-specific payload of an account, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountKind {
    Claude(ModelGroups),
    Codex(CodexSettings),
    #[serde(rename = "CCR")]
    Ccr(RouterSettings),
    Droids(SimpleModel),
    Other(ModelGroups),
}

impl AccountKind {
    pub fn account_type(&self) -> AccountType {
        match self {
            Self::Claude(_) => AccountType::Claude,
            Self::Codex(_) => AccountType::Codex,
            Self::Ccr(_) => AccountType::Ccr,
            Self::Droids(_) => AccountType::Droids,
            Self::Other(_) => AccountType::Other,
        }
    }

    /// Empty payload for `account_type`.
    pub fn empty(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Claude => Self::Claude(ModelGroups::default()),
            AccountType::Codex => Self::Codex(CodexSettings::default()),
            AccountType::Ccr => Self::Ccr(RouterSettings::default()),
            AccountType::Droids => Self::Droids(SimpleModel::default()),
            AccountType::Other => Self::Other(ModelGroups::default()),
        }
    }

    pub fn model_groups(&self) -> Option<&ModelGroups> {
        match self {
            Self::Claude(groups) | Self::Other(groups) => Some(groups),
            _ => None,
        }
    }

    pub fn model_groups_mut(&mut self) -> Option<&mut ModelGroups> {
        match self {
            Self::Claude(groups) | Self::Other(groups) => Some(groups),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelGroups {
    #[serde(default)]
    pub model_groups: IndexMap<String, ModelGroup>,
    #[serde(default)]
    pub active_model_group: Option<String>,
}

impl ModelGroups {
    pub fn active_group(&self) -> Option<&ModelGroup> {
        self.active_model_group
            .as_ref()
            .and_then(|name| self.model_groups.get(name))
    }

    /// Inserts or replaces a group. The first group becomes active when none is.
    pub fn insert_group(&mut self, name: &str, group: ModelGroup) {
        self.model_groups.insert(name.to_string(), group);
        let dangling = self
            .active_model_group
            .as_ref()
            .map(|active| !self.model_groups.contains_key(active))
            .unwrap_or(true);
        if dangling {
            self.active_model_group = Some(name.to_string());
        }
    }

    pub fn activate(&mut self, name: &str) -> bool {
        if !self.model_groups.contains_key(name) {
            return false;
        }
        self.active_model_group = Some(name.to_string());
        true
    }

    /// Removes a group; when it was active, activity moves to the first
    /// remaining group or to `None`.
    pub fn remove_group(&mut self, name: &str) -> bool {
        if self.model_groups.shift_remove(name).is_none() {
            return false;
        }
        if self.active_model_group.as_deref() == Some(name) {
            self.active_model_group = self.model_groups.keys().next().cloned();
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireApi {
    #[default]
    Responses,
    Chat,
}

impl WireApi {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Responses => "responses",
            Self::Chat => "chat",
        }
    }
}

impl std::str::FromStr for WireApi {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "responses" => Ok(Self::Responses),
            "chat" => Ok(Self::Chat),
            other => Err(format!("unsupported wire api: {other} (responses|chat)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodexAuthMode {
    /// Bearer token embedded in the provider's `http_headers`.
    #[default]
    HttpHeaders,
    /// Provider reads the key from `~/.codex/auth.json`.
    AuthJson,
    /// Provider reads the key from a named environment variable.
    EnvKey,
}

impl std::str::FromStr for CodexAuthMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "http_headers" | "header" => Ok(Self::HttpHeaders),
            "auth_json" | "auth_file" => Ok(Self::AuthJson),
            "env_key" | "env" => Ok(Self::EnvKey),
            other => Err(format!(
                "unsupported auth mode: {other} (http_headers|auth_json|env_key)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodexSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub wire_api: WireApi,
    #[serde(default)]
    pub auth_mode: CodexAuthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSettings {
    #[serde(default)]
    pub ccr_config: CcrConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcrConfig {
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub background_model: String,
    #[serde(default)]
    pub think_model: String,
}

impl CcrConfig {
    /// Configured models followed by any routing model missing from them,
    /// without duplicates.
    pub fn provider_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        let routed = [
            &self.default_model,
            &self.background_model,
            &self.think_model,
        ];
        for model in self.models.iter().chain(routed) {
            let model = model.trim();
            if !model.is_empty() && !models.iter().any(|item| item == model) {
                models.push(model.to_string());
            }
        }
        models
    }

    pub fn background_or_default(&self) -> &str {
        non_empty_or(&self.background_model, &self.default_model)
    }

    pub fn think_or_default(&self) -> &str {
        non_empty_or(&self.think_model, &self.default_model)
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: u64,
    pub name: String,
    #[serde(flatten)]
    pub kind: AccountKind,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_env: EnvMap,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Account {
    pub fn account_type(&self) -> AccountType {
        self.kind.account_type()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.api_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Everything an upsert replaces; identity and timestamps are owned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDraft {
    pub kind: AccountKind,
    pub api_key: String,
    pub api_url: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub custom_env: EnvMap,
}

impl AccountDraft {
    pub fn new(kind: AccountKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            api_url: None,
            email: None,
            description: None,
            custom_env: EnvMap::new(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_env.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), AisError> {
        require_non_empty("apiKey", &self.api_key)?;
        validate_env_map("customEnv", &self.custom_env)?;
        match &self.kind {
            AccountKind::Codex(settings) => {
                if settings.auth_mode == CodexAuthMode::EnvKey {
                    if let Some(env_key) = &settings.env_key {
                        validate_env_var_name("envKey", env_key)?;
                    }
                }
            }
            AccountKind::Ccr(settings) => {
                require_non_empty("ccrConfig.providerName", &settings.ccr_config.provider_name)?;
                require_non_empty("ccrConfig.defaultModel", &settings.ccr_config.default_model)?;
            }
            AccountKind::Claude(groups) | AccountKind::Other(groups) => {
                if let Some(active) = &groups.active_model_group {
                    if !groups.model_groups.contains_key(active) {
                        return Err(AisError::validation(format!(
                            "activeModelGroup '{active}' does not name a model group"
                        )));
                    }
                }
            }
            AccountKind::Droids(_) => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    #[default]
    Stdio,
    Sse,
    Http,
}

impl McpTransport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl std::str::FromStr for McpTransport {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http" | "streamable-http" | "streamable_http" => Ok(Self::Http),
            other => Err(format!("unsupported transport: {other} (stdio|sse|http)")),
        }
    }
}

/// Visibility tier of an MCP server definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpScope {
    /// Enabled per project, projected into the project's local settings only.
    #[default]
    Local,
    /// Shared with the project through `.mcp.json`.
    Project,
    /// Enabled in every project.
    User,
}

impl McpScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Project => "project",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for McpScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "project" => Ok(Self::Project),
            "user" | "global" => Ok(Self::User),
            other => Err(format!("unsupported scope: {other} (local|project|user)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub transport: McpTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: EnvMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: EnvMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: McpScope,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl McpServerDefinition {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransport::Stdio,
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: McpScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn validate(&self) -> Result<(), AisError> {
        require_non_empty("name", &self.name)?;
        match self.transport {
            McpTransport::Stdio => {
                require_non_empty("command", self.command.as_deref().unwrap_or_default())?;
            }
            McpTransport::Sse | McpTransport::Http => {
                require_non_empty("url", self.url.as_deref().unwrap_or_default())?;
            }
        }
        validate_env_map("env", &self.env)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBinding {
    pub active_account: String,
    pub project_path: String,
    #[serde(default)]
    pub set_at: String,
    #[serde(default)]
    pub enabled_mcp_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub project_mcp_servers: IndexMap<String, McpServerDefinition>,
}

impl ProjectBinding {
    pub fn is_enabled(&self, server_name: &str) -> bool {
        self.enabled_mcp_servers
            .iter()
            .any(|item| item == server_name)
    }

    /// Adds `server_name` to the enabled list; returns whether it was added.
    pub fn enable(&mut self, server_name: &str) -> bool {
        if self.is_enabled(server_name) {
            return false;
        }
        self.enabled_mcp_servers.push(server_name.to_string());
        true
    }

    pub fn disable(&mut self, server_name: &str) -> bool {
        let before = self.enabled_mcp_servers.len();
        self.enabled_mcp_servers.retain(|item| item != server_name);
        before != self.enabled_mcp_servers.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreData {
    #[serde(default)]
    pub accounts: IndexMap<String, Account>,
    #[serde(default)]
    pub mcp_servers: IndexMap<String, McpServerDefinition>,
    #[serde(default = "first_account_id")]
    pub next_account_id: u64,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            accounts: IndexMap::new(),
            mcp_servers: IndexMap::new(),
            next_account_id: first_account_id(),
        }
    }
}

fn first_account_id() -> u64 {
    1
}

/// Read-only join of a project binding with the account it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProject {
    pub project_root: PathBuf,
    pub account: Account,
    pub binding: ProjectBinding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_round_trips_with_flattened_type_tag() {
        let raw = r#"{
            "id": 3,
            "name": "acct1",
            "type": "CCR",
            "ccrConfig": {"providerName": "p1", "defaultModel": "m1", "backgroundModel": "m2", "thinkModel": "m1"},
            "apiKey": "sk-1",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        }"#;
        let account: Account = serde_json::from_str(raw).expect("parse account");
        assert_eq!(account.account_type(), AccountType::Ccr);
        let AccountKind::Ccr(settings) = &account.kind else {
            panic!("expected router payload");
        };
        assert_eq!(settings.ccr_config.provider_name, "p1");
        assert!(settings.ccr_config.models.is_empty());

        let value = serde_json::to_value(&account).expect("serialize");
        assert_eq!(value["type"], "CCR");
        assert_eq!(value["ccrConfig"]["backgroundModel"], "m2");
        assert!(value.get("apiUrl").is_none());
    }

    #[test]
    fn removing_active_group_moves_activity_to_remaining_group() {
        let mut groups = ModelGroups::default();
        groups.insert_group("g1", ModelGroup::new());
        groups.insert_group("g2", ModelGroup::new());
        assert_eq!(groups.active_model_group.as_deref(), Some("g1"));

        assert!(groups.remove_group("g1"));
        assert_eq!(groups.active_model_group.as_deref(), Some("g2"));

        assert!(groups.remove_group("g2"));
        assert_eq!(groups.active_model_group, None);
        assert!(!groups.remove_group("g2"));
    }

    #[test]
    fn provider_models_appends_routing_models_once() {
        let config = CcrConfig {
            provider_name: String::from("p1"),
            models: vec![String::from("m2"), String::from("m2")],
            default_model: String::from("m1"),
            background_model: String::from("m2"),
            think_model: String::from("m1"),
        };
        assert_eq!(config.provider_models(), vec!["m2", "m1"]);
        assert_eq!(config.think_or_default(), "m1");
    }

    #[test]
    fn server_validation_requires_connection_info() {
        let missing = McpServerDefinition {
            name: String::from("remote"),
            transport: McpTransport::Http,
            ..McpServerDefinition::default()
        };
        assert!(matches!(missing.validate(), Err(AisError::Validation(_))));
        let ok = McpServerDefinition::stdio("fs", "npx", vec![String::from("server-fs")]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn draft_rejects_bad_env_names() {
        let draft = AccountDraft::new(AccountKind::empty(AccountType::Claude), "sk")
            .with_env("lower_case", "1");
        assert!(matches!(draft.validate(), Err(AisError::Validation(_))));
    }
}
