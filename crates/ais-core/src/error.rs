use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AisError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),
    #[error("Model group '{group}' not found on account '{account}'")]
    ModelGroupNotFound { account: String, group: String },

    #[error("No project binding found from {0}")]
    ProjectNotBound(PathBuf),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl AisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::ServerNotFound(_)
                | Self::ModelGroupNotFound { .. }
                | Self::ProjectNotBound(_)
        )
    }
}
