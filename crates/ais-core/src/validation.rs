use crate::error::AisError;
use crate::models::EnvMap;

/// `[A-Z_][A-Z0-9_]*`
pub fn is_valid_env_var_name(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_uppercase() || first == '_') {
        return false;
    }
    chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

pub fn validate_env_var_name(field: &str, name: &str) -> Result<(), AisError> {
    if is_valid_env_var_name(name) {
        return Ok(());
    }
    Err(AisError::validation(format!(
        "{field}: invalid environment variable name '{name}' (expected [A-Z_][A-Z0-9_]*)"
    )))
}

pub fn validate_env_map(field: &str, env: &EnvMap) -> Result<(), AisError> {
    for key in env.keys() {
        validate_env_var_name(field, key)?;
    }
    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AisError> {
    if value.trim().is_empty() {
        return Err(AisError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Parses `KEY=VALUE` pairs as accepted on the command line.
pub fn parse_env_assignment(raw: &str) -> Result<(String, String), AisError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(AisError::validation(format!(
            "expected KEY=VALUE, got '{raw}'"
        )));
    };
    let key = key.trim();
    validate_env_var_name("env", key)?;
    Ok((key.to_string(), value.to_string()))
}
