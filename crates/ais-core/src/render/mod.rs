//! Per-provider projection of an account into the tool's native config files.
//!
//! Renderers are plain functions selected from [`RENDERERS`] by account type.
//! Each one parses its existing artifacts defensively, keeps every field it
//! does not own, and produces the same output when run twice.

pub mod claude_settings;
pub mod codex_profile;
pub mod droids;
pub mod router;

use crate::error::AisError;
use crate::mcp_sync::EnabledServers;
use crate::models::{Account, AccountType};
use crate::paths::AisPaths;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub paths: &'a AisPaths,
    pub project_root: &'a Path,
    pub account: &'a Account,
    pub servers: &'a EnabledServers,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub written: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

pub type RenderFn = fn(&RenderContext<'_>) -> Result<RenderOutcome, AisError>;

pub const RENDERERS: [(AccountType, RenderFn); 5] = [
    (AccountType::Claude, claude_settings::render),
    (AccountType::Other, claude_settings::render),
    (AccountType::Codex, codex_profile::render),
    (AccountType::Ccr, router::render),
    (AccountType::Droids, droids::render),
];

pub fn renderer_for(account_type: AccountType) -> RenderFn {
    RENDERERS
        .iter()
        .find(|(kind, _)| *kind == account_type)
        .map(|(_, render)| *render)
        .unwrap_or(claude_settings::render)
}

pub fn render(context: &RenderContext<'_>) -> Result<RenderOutcome, AisError> {
    renderer_for(context.account.account_type())(context)
}
