use super::{RenderContext, RenderOutcome};
use crate::artifact::{load_json_object, object_entry, write_json, JsonObject};
use crate::error::AisError;
use crate::mcp_sync::servers_to_json;
use crate::models::{Account, EnvMap, McpServerDefinition, ModelGroup, DEFAULT_MODEL_KEY};
use crate::paths::claude_settings_path;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

pub const AUTH_TOKEN_KEY: &str = "ANTHROPIC_AUTH_TOKEN";
pub const BASE_URL_KEY: &str = "ANTHROPIC_BASE_URL";

/// Role keys resolved from the active model group, wiped and rewritten together.
pub const MODEL_ROLE_KEYS: [&str; 5] = [
    "ANTHROPIC_MODEL",
    "ANTHROPIC_DEFAULT_OPUS_MODEL",
    "ANTHROPIC_DEFAULT_SONNET_MODEL",
    "ANTHROPIC_DEFAULT_HAIKU_MODEL",
    "CLAUDE_CODE_SUBAGENT_MODEL",
];

const LEGACY_MODEL_KEYS: [&str; 1] = ["ANTHROPIC_SMALL_FAST_MODEL"];

#[derive(Debug, Clone, Copy)]
pub struct SettingsInput<'a> {
    pub auth_token: &'a str,
    pub base_url: Option<&'a str>,
    pub model_group: Option<&'a ModelGroup>,
    pub custom_env: &'a EnvMap,
    pub servers: &'a [McpServerDefinition],
}

impl<'a> SettingsInput<'a> {
    pub fn for_account(account: &'a Account, servers: &'a [McpServerDefinition]) -> Self {
        Self {
            auth_token: &account.api_key,
            base_url: account.base_url(),
            model_group: account
                .kind
                .model_groups()
                .and_then(|groups| groups.active_group()),
            custom_env: &account.custom_env,
            servers,
        }
    }
}

pub fn render(context: &RenderContext<'_>) -> Result<RenderOutcome, AisError> {
    let input = SettingsInput::for_account(context.account, &context.servers.settings);
    let mut outcome = RenderOutcome::default();
    let path = write_settings(context.project_root, &input, &mut outcome.warnings)?;
    outcome.written.push(path);
    Ok(outcome)
}

pub fn write_settings(
    project_root: &Path,
    input: &SettingsInput<'_>,
    warnings: &mut Vec<String>,
) -> Result<PathBuf, AisError> {
    let path = claude_settings_path(project_root);
    let existing = load_json_object(&path, warnings)?;
    let rendered = render_settings(existing, input);
    write_json(&path, &JsonValue::Object(rendered))?;
    Ok(path)
}

/// Resolves one role through the chain: explicit value, then the group's
/// default model, then unset.
pub fn resolve_role<'a>(group: &'a ModelGroup, role: &str) -> Option<&'a str> {
    let explicit = group
        .get(role)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty());
    explicit.or_else(|| {
        group
            .get(DEFAULT_MODEL_KEY)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    })
}

/// Pure merge of `input` into an existing settings document.
pub fn render_settings(mut root: JsonObject, input: &SettingsInput<'_>) -> JsonObject {
    let env = object_entry(&mut root, "env");

    let owned = [AUTH_TOKEN_KEY, BASE_URL_KEY]
        .into_iter()
        .chain(MODEL_ROLE_KEYS)
        .chain(LEGACY_MODEL_KEYS);
    for key in owned {
        env.shift_remove(key);
    }
    for key in input.custom_env.keys() {
        env.shift_remove(key);
    }

    env.insert(
        AUTH_TOKEN_KEY.to_string(),
        JsonValue::String(input.auth_token.to_string()),
    );
    if let Some(base_url) = input.base_url {
        env.insert(
            BASE_URL_KEY.to_string(),
            JsonValue::String(base_url.to_string()),
        );
    }
    if let Some(group) = input.model_group {
        for role in MODEL_ROLE_KEYS {
            if let Some(model) = resolve_role(group, role) {
                env.insert(role.to_string(), JsonValue::String(model.to_string()));
            }
        }
    }
    for (key, value) in input.custom_env {
        env.insert(key.clone(), JsonValue::String(value.clone()));
    }

    if input.servers.is_empty() {
        root.shift_remove("mcpServers");
    } else {
        root.insert(
            String::from("mcpServers"),
            JsonValue::Object(servers_to_json(input.servers)),
        );
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn group(pairs: &[(&str, &str)]) -> ModelGroup {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn env_holds_credential_url_roles_and_custom_vars() {
        let roles = group(&[
            ("DEFAULT_MODEL", "claude-sonnet"),
            ("ANTHROPIC_DEFAULT_OPUS_MODEL", "claude-opus"),
        ]);
        let custom = EnvMap::from([(String::from("API_TIMEOUT_MS"), String::from("600000"))]);
        let input = SettingsInput {
            auth_token: "sk-1",
            base_url: Some("https://proxy.example"),
            model_group: Some(&roles),
            custom_env: &custom,
            servers: &[],
        };

        let rendered = render_settings(JsonObject::new(), &input);
        assert_eq!(
            JsonValue::Object(rendered),
            json!({
                "env": {
                    "ANTHROPIC_AUTH_TOKEN": "sk-1",
                    "ANTHROPIC_BASE_URL": "https://proxy.example",
                    "ANTHROPIC_MODEL": "claude-sonnet",
                    "ANTHROPIC_DEFAULT_OPUS_MODEL": "claude-opus",
                    "ANTHROPIC_DEFAULT_SONNET_MODEL": "claude-sonnet",
                    "ANTHROPIC_DEFAULT_HAIKU_MODEL": "claude-sonnet",
                    "CLAUDE_CODE_SUBAGENT_MODEL": "claude-sonnet",
                    "API_TIMEOUT_MS": "600000"
                }
            })
        );
    }

    #[test]
    fn stale_model_keys_cleared_and_unrelated_fields_kept() {
        let existing = object(json!({
            "permissions": {"allow": ["Bash(ls:*)"]},
            "env": {
                "KEEP_ME": "1",
                "ANTHROPIC_MODEL": "old",
                "ANTHROPIC_SMALL_FAST_MODEL": "old-fast",
                "ANTHROPIC_BASE_URL": "https://old"
            }
        }));
        let empty = EnvMap::new();
        let input = SettingsInput {
            auth_token: "sk-2",
            base_url: None,
            model_group: None,
            custom_env: &empty,
            servers: &[],
        };

        let rendered = JsonValue::Object(render_settings(existing, &input));
        assert_eq!(rendered["permissions"]["allow"][0], "Bash(ls:*)");
        assert_eq!(
            rendered["env"],
            json!({"KEEP_ME": "1", "ANTHROPIC_AUTH_TOKEN": "sk-2"})
        );
    }

    #[test]
    fn role_without_value_or_default_stays_unset() {
        let roles = group(&[("ANTHROPIC_DEFAULT_HAIKU_MODEL", "haiku")]);
        assert_eq!(resolve_role(&roles, "ANTHROPIC_DEFAULT_HAIKU_MODEL"), Some("haiku"));
        assert_eq!(resolve_role(&roles, "ANTHROPIC_MODEL"), None);
    }

    #[test]
    fn rendering_twice_is_byte_identical() {
        let roles = group(&[("DEFAULT_MODEL", "m")]);
        let custom = EnvMap::from([(String::from("EXTRA"), String::from("x"))]);
        let servers = vec![McpServerDefinition::stdio("fs", "npx", Vec::new())];
        let input = SettingsInput {
            auth_token: "sk",
            base_url: Some("https://u"),
            model_group: Some(&roles),
            custom_env: &custom,
            servers: &servers,
        };
        let seed = object(json!({"env": {"A": "1"}, "permissions": {}}));

        let first = render_settings(seed, &input);
        let first_bytes = serde_json::to_vec_pretty(&first).expect("json");
        let second = render_settings(first, &input);
        let second_bytes = serde_json::to_vec_pretty(&second).expect("json");
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn empty_server_set_removes_section() {
        let existing = object(json!({"mcpServers": {"old": {"command": "x"}}}));
        let empty = EnvMap::new();
        let input = SettingsInput {
            auth_token: "sk",
            base_url: None,
            model_group: None,
            custom_env: &empty,
            servers: &[],
        };
        let rendered = render_settings(existing, &input);
        assert!(!rendered.contains_key("mcpServers"));
    }
}
