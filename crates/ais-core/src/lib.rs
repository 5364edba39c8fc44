pub mod artifact;
pub mod binding;
pub mod engine;
pub mod error;
pub mod mcp_sync;
pub mod models;
pub mod paths;
pub mod render;
pub mod secret_file;
pub mod store;
pub mod validation;

pub use engine::{AisEngine, ProjectionReport};
pub use error::AisError;
pub use mcp_sync::{
    EnabledServers, ImportSource, McpExportReport, McpImportReport, McpSyncReport,
    McpSynchronizer,
};
pub use models::{
    Account, AccountDraft, AccountKind, AccountType, CcrConfig, CodexAuthMode, CodexSettings,
    McpScope, McpServerDefinition, McpTransport, ModelGroup, ModelGroups, ProjectBinding,
    ResolvedProject, RouterSettings, SimpleModel, WireApi,
};
pub use paths::AisPaths;
pub use store::GlobalStore;
