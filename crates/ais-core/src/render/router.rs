use super::claude_settings::{write_settings, SettingsInput};
use super::{RenderContext, RenderOutcome};
use crate::artifact::{load_json_object, object_entry, write_json, JsonObject};
use crate::error::AisError;
use crate::models::{AccountKind, CcrConfig};
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 3456;
const PROVIDERS_KEY: &str = "Providers";
const ROUTER_KEY: &str = "Router";

/// Writes the router provider entry, then points the project settings at the
/// router's loopback listener.
pub fn render(context: &RenderContext<'_>) -> Result<RenderOutcome, AisError> {
    let AccountKind::Ccr(settings) = &context.account.kind else {
        return Err(AisError::validation(format!(
            "account '{}' is not a router account",
            context.account.name
        )));
    };
    let mut outcome = RenderOutcome::default();

    let router_path = context.paths.ccr_config_path();
    let existing = load_json_object(&router_path, &mut outcome.warnings)?;
    let rendered = render_router_config(
        existing,
        &settings.ccr_config,
        context.account.base_url().unwrap_or_default(),
        &context.account.api_key,
    );
    write_json(&router_path, &JsonValue::Object(rendered))?;
    outcome.written.push(router_path.clone());

    let port = read_port(&router_path, &mut outcome.warnings)?;
    let base_url = format!("http://127.0.0.1:{port}");
    let input = SettingsInput {
        auth_token: &context.account.api_key,
        base_url: Some(&base_url),
        model_group: None,
        custom_env: &context.account.custom_env,
        servers: &context.servers.settings,
    };
    let settings_path = write_settings(context.project_root, &input, &mut outcome.warnings)?;
    outcome.written.push(settings_path);
    outcome
        .notes
        .push(format!("start the router with: ccr start (port {port})"));
    Ok(outcome)
}

pub fn render_router_config(
    mut root: JsonObject,
    config: &CcrConfig,
    api_base_url: &str,
    api_key: &str,
) -> JsonObject {
    upsert_provider(&mut root, config, api_base_url, api_key);

    let router = object_entry(&mut root, ROUTER_KEY);
    let routes = [
        ("default", config.default_model.as_str()),
        ("background", config.background_or_default()),
        ("think", config.think_or_default()),
    ];
    for (key, model) in routes {
        router.insert(
            key.to_string(),
            JsonValue::String(format!("{},{model}", config.provider_name)),
        );
    }
    root
}

fn upsert_provider(root: &mut JsonObject, config: &CcrConfig, api_base_url: &str, api_key: &str) {
    let slot = root
        .entry(PROVIDERS_KEY.to_string())
        .or_insert_with(|| JsonValue::Array(Vec::new()));
    if !slot.is_array() {
        *slot = JsonValue::Array(Vec::new());
    }
    let JsonValue::Array(providers) = slot else {
        return;
    };

    let models = JsonValue::Array(
        config
            .provider_models()
            .into_iter()
            .map(JsonValue::String)
            .collect(),
    );
    let position = providers.iter().position(|provider| {
        provider.get("name").and_then(JsonValue::as_str) == Some(config.provider_name.as_str())
    });
    let index = match position {
        Some(index) => index,
        None => {
            let mut entry = JsonObject::new();
            entry.insert(
                String::from("name"),
                JsonValue::String(config.provider_name.clone()),
            );
            providers.push(JsonValue::Object(entry));
            providers.len() - 1
        }
    };
    let Some(JsonValue::Object(entry)) = providers.get_mut(index) else {
        return;
    };
    entry.insert(
        String::from("api_base_url"),
        JsonValue::String(api_base_url.to_string()),
    );
    entry.insert(String::from("api_key"), JsonValue::String(api_key.to_string()));
    entry.insert(String::from("models"), models);
}

/// Reads `PORT` back from the router document on disk, accepting a number or
/// a numeric string.
pub fn read_port(path: &Path, warnings: &mut Vec<String>) -> Result<u16, AisError> {
    let document = load_json_object(path, warnings)?;
    let port = match document.get("PORT") {
        Some(JsonValue::Number(number)) => number.as_u64().and_then(|value| u16::try_from(value).ok()),
        Some(JsonValue::String(raw)) => raw.trim().parse::<u16>().ok(),
        _ => None,
    };
    Ok(port.unwrap_or_else(|| {
        debug!(path = %path.display(), "router PORT missing; using default");
        DEFAULT_PORT
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn acct1_config() -> CcrConfig {
        CcrConfig {
            provider_name: String::from("p1"),
            models: Vec::new(),
            default_model: String::from("m1"),
            background_model: String::from("m2"),
            think_model: String::from("m1"),
        }
    }

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn projecting_twice_keeps_one_provider_entry() {
        let config = acct1_config();
        let first = render_router_config(JsonObject::new(), &config, "https://p1.example", "sk-1");
        let second = render_router_config(first.clone(), &config, "https://p1.example", "sk-1");
        assert_eq!(first, second);

        let document = JsonValue::Object(second);
        let providers = document["Providers"].as_array().expect("providers");
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0]["name"], "p1");
        assert_eq!(providers[0]["models"], json!(["m1", "m2"]));
        assert_eq!(document["Router"]["default"], "p1,m1");
        assert_eq!(document["Router"]["background"], "p1,m2");
        assert_eq!(document["Router"]["think"], "p1,m1");
    }

    #[test]
    fn other_providers_and_router_keys_survive() {
        let existing = object(json!({
            "PORT": 4000,
            "Providers": [
                {"name": "other", "api_base_url": "https://o", "api_key": "k", "models": ["x"]},
                {"name": "p1", "api_base_url": "https://old", "api_key": "old", "models": [], "transformer": {"use": ["openrouter"]}}
            ],
            "Router": {"longContext": "other,x"}
        }));
        let rendered = JsonValue::Object(render_router_config(
            existing,
            &acct1_config(),
            "https://new",
            "sk-new",
        ));
        let providers = rendered["Providers"].as_array().expect("providers");
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0]["name"], "other");
        assert_eq!(providers[1]["api_key"], "sk-new");
        assert_eq!(providers[1]["transformer"]["use"][0], "openrouter");
        assert_eq!(rendered["Router"]["longContext"], "other,x");
        assert_eq!(rendered["PORT"], 4000);
    }

    #[test]
    fn port_is_read_back_with_fallback() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut warnings = Vec::new();

        assert_eq!(read_port(&path, &mut warnings).expect("missing"), DEFAULT_PORT);
        fs::write(&path, r#"{"PORT": "8080"}"#).expect("write");
        assert_eq!(read_port(&path, &mut warnings).expect("string"), 8080);
        fs::write(&path, r#"{"PORT": 9000}"#).expect("write");
        assert_eq!(read_port(&path, &mut warnings).expect("number"), 9000);
        fs::write(&path, "not json").expect("write");
        assert_eq!(read_port(&path, &mut warnings).expect("corrupt"), DEFAULT_PORT);
        assert_eq!(warnings.len(), 1);
    }
}
