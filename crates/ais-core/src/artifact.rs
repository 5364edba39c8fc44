use crate::error::AisError;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub type JsonObject = JsonMap<String, JsonValue>;

/// Reads a file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>, AisError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(AisError::io(path, error)),
    }
}

/// Parses a JSON document that must be an object. Anything else is reported
/// through `warnings` and replaced by an empty object.
pub fn parse_json_object(raw: &str, origin: &Path, warnings: &mut Vec<String>) -> JsonObject {
    if raw.trim().is_empty() {
        return JsonObject::new();
    }
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(map)) => map,
        Ok(_) => {
            recovered(origin, "root is not a JSON object", warnings);
            JsonObject::new()
        }
        Err(error) => {
            recovered(origin, &error.to_string(), warnings);
            JsonObject::new()
        }
    }
}

pub fn load_json_object(path: &Path, warnings: &mut Vec<String>) -> Result<JsonObject, AisError> {
    Ok(read_optional(path)?
        .map(|raw| parse_json_object(&raw, path, warnings))
        .unwrap_or_default())
}

fn recovered(origin: &Path, reason: &str, warnings: &mut Vec<String>) {
    warn!(path = %origin.display(), reason, "treating malformed artifact as empty");
    warnings.push(format!(
        "Ignored malformed {}: {reason}",
        origin.display()
    ));
}

pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, AisError> {
    let mut payload = serde_json::to_vec_pretty(value)?;
    payload.push(b'\n');
    Ok(payload)
}

/// Writes `value` as pretty JSON, creating parent directories. Returns `false`
/// when the file already held exactly these bytes.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<bool, AisError> {
    let payload = to_pretty_json(value)?;
    write_bytes(path, &payload)
}

pub fn write_bytes(path: &Path, payload: &[u8]) -> Result<bool, AisError> {
    if let Ok(existing) = fs::read(path) {
        if existing == payload {
            debug!(path = %path.display(), "artifact unchanged");
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| AisError::io(parent, error))?;
    }
    fs::write(path, payload).map_err(|error| AisError::io(path, error))?;
    debug!(path = %path.display(), "artifact written");
    Ok(true)
}

pub fn remove_if_exists(path: &Path) -> Result<bool, AisError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(AisError::io(path, error)),
    }
}

/// Returns the object stored at `key`, replacing any non-object value.
pub fn object_entry<'a>(root: &'a mut JsonObject, key: &str) -> &'a mut JsonObject {
    let slot = root
        .entry(key.to_string())
        .or_insert_with(|| JsonValue::Object(JsonObject::new()));
    if !slot.is_object() {
        *slot = JsonValue::Object(JsonObject::new());
    }
    match slot {
        JsonValue::Object(map) => map,
        _ => unreachable!("slot was just replaced by an object"),
    }
}

pub fn iso8601_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
