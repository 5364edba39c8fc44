//! Atomic, owner-only writes for the one credential file kept outside the store.
//!
//! Each write goes to a temporary file in the destination directory, gets
//! `0600` permissions on Unix, and is renamed over the destination. Concurrent
//! writers are not merged; the last rename wins.

use crate::artifact::{parse_json_object, read_optional, to_pretty_json, JsonObject};
use crate::error::AisError;
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct SecretFileWriter<'a> {
    path: &'a Path,
}

impl<'a> SecretFileWriter<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }

    /// Current document; unreadable or corrupt content starts from empty.
    pub fn load(&self, warnings: &mut Vec<String>) -> JsonObject {
        match read_optional(self.path) {
            Ok(Some(raw)) => parse_json_object(&raw, self.path, warnings),
            Ok(None) => JsonObject::new(),
            Err(error) => {
                warnings.push(format!("Ignored unreadable secret file: {error}"));
                JsonObject::new()
            }
        }
    }

    /// Sets `key` to `value`, keeping every other key in the document.
    pub fn upsert(
        &self,
        key: &str,
        value: &str,
        warnings: &mut Vec<String>,
    ) -> Result<(), AisError> {
        let mut document = self.load(warnings);
        document.insert(key.to_string(), JsonValue::String(value.to_string()));
        self.write(&document)
    }

    pub fn write(&self, document: &JsonObject) -> Result<(), AisError> {
        let payload = to_pretty_json(document)?;
        write_atomic_restricted(self.path, &payload)
    }
}

pub fn write_atomic_restricted(path: &Path, payload: &[u8]) -> Result<(), AisError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(|error| AisError::io(directory, error))?;

    let mut temp = tempfile::NamedTempFile::new_in(directory)
        .map_err(|error| AisError::io(directory, error))?;
    temp.write_all(payload)
        .map_err(|error| AisError::io(temp.path(), error))?;
    temp.as_file()
        .sync_all()
        .map_err(|error| AisError::io(temp.path(), error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))
            .map_err(|error| AisError::io(temp.path(), error))?;
    }

    temp.persist(path)
        .map_err(|error| AisError::io(path, error.error))?;
    debug!(path = %path.display(), "secret file replaced");
    Ok(())
}
