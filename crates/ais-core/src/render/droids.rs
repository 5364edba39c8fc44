use super::{RenderContext, RenderOutcome};
use crate::artifact::{write_json, JsonObject};
use crate::error::AisError;
use crate::models::{Account, AccountKind};
use crate::paths::droids_config_path;
use serde_json::Value as JsonValue;

/// The droids config is owned entirely by this renderer and rewritten whole.
pub fn render(context: &RenderContext<'_>) -> Result<RenderOutcome, AisError> {
    let path = droids_config_path(context.project_root);
    write_json(&path, &JsonValue::Object(droids_document(context.account)))?;
    Ok(RenderOutcome {
        written: vec![path],
        ..RenderOutcome::default()
    })
}

pub fn droids_document(account: &Account) -> JsonObject {
    let mut document = JsonObject::new();
    document.insert(
        String::from("apiKey"),
        JsonValue::String(account.api_key.clone()),
    );
    if let Some(base_url) = account.base_url() {
        document.insert(String::from("baseUrl"), JsonValue::String(base_url.to_string()));
    }
    if let AccountKind::Droids(settings) = &account.kind {
        if let Some(model) = settings.model.as_deref().filter(|m| !m.trim().is_empty()) {
            document.insert(String::from("model"), JsonValue::String(model.to_string()));
        }
    }
    if !account.custom_env.is_empty() {
        let custom = account
            .custom_env
            .iter()
            .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
            .collect();
        document.insert(String::from("customSettings"), JsonValue::Object(custom));
    }
    document
}
