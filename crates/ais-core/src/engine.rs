use crate::binding::{self, read_binding};
use crate::error::AisError;
use crate::mcp_sync::{effective_servers, McpImportReport, McpSyncReport, McpSynchronizer};
use crate::models::{AccountType, McpServerDefinition, ProjectBinding, ResolvedProject};
use crate::paths::{standardized, AisPaths};
use crate::render::{self, RenderContext};
use crate::store::{find_project_root, GlobalStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of projecting a project's account into its tool artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionReport {
    pub account: String,
    pub account_type: AccountType,
    pub project_root: PathBuf,
    pub written: Vec<PathBuf>,
    pub mcp_servers: Vec<String>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AisEngine {
    paths: AisPaths,
    store: GlobalStore,
}

impl Default for AisEngine {
    fn default() -> Self {
        Self::current()
    }
}

impl AisEngine {
    pub fn current() -> Self {
        Self::new(AisPaths::detect())
    }

    pub fn new(paths: AisPaths) -> Self {
        Self {
            store: GlobalStore::new(paths.clone()),
            paths,
        }
    }

    pub fn paths(&self) -> &AisPaths {
        &self.paths
    }

    pub fn store(&self) -> &GlobalStore {
        &self.store
    }

    pub fn find_project_root(&self, start: &Path) -> Option<PathBuf> {
        find_project_root(start)
    }

    /// Root of the bound project containing `dir`.
    pub fn bound_root(&self, dir: &Path) -> Result<PathBuf, AisError> {
        find_project_root(dir).ok_or_else(|| AisError::ProjectNotBound(standardized(dir)))
    }

    /// Binds `account_name` to the project containing `dir`. A directory outside
    /// any bound project becomes a new project root.
    pub fn bind(&self, account_name: &str, dir: &Path) -> Result<ProjectBinding, AisError> {
        let root = find_project_root(dir).unwrap_or_else(|| standardized(dir));
        binding::bind(&self.store, account_name, &root)
    }

    pub fn current_project(&self, dir: &Path) -> Option<ResolvedProject> {
        let root = find_project_root(dir)?;
        binding::resolve(&self.store, &root)
    }

    /// Bind, then project.
    pub fn use_account(
        &self,
        account_name: &str,
        dir: &Path,
    ) -> Result<ProjectionReport, AisError> {
        let binding = self.bind(account_name, dir)?;
        self.apply(Path::new(&binding.project_path))
    }

    /// Projects the account bound to the project containing `dir` into its
    /// tool artifacts and refreshes the project's `.mcp.json`.
    pub fn apply(&self, dir: &Path) -> Result<ProjectionReport, AisError> {
        let root = self.bound_root(dir)?;
        let bound = read_binding(&root)?.ok_or_else(|| AisError::ProjectNotBound(root.clone()))?;
        if self.store.get_account(&bound.active_account).is_none() {
            return Err(AisError::AccountNotFound(bound.active_account));
        }

        let synchronizer = McpSynchronizer::new(&self.store);
        let import = synchronizer.import(&root)?;
        let resolved = binding::resolve(&self.store, &root)
            .ok_or_else(|| AisError::AccountNotFound(bound.active_account.clone()))?;

        let servers = effective_servers(&self.store.load(), &resolved.binding);
        let context = RenderContext {
            paths: &self.paths,
            project_root: &root,
            account: &resolved.account,
            servers: &servers,
        };
        let mut outcome = render::render(&context)?;
        let export = synchronizer.export(&root, &servers)?;
        if !export.removed && !export.servers.is_empty() {
            outcome.written.push(export.path);
        }

        let mut warnings = import.warnings;
        warnings.extend(
            servers
                .missing
                .iter()
                .map(|name| format!("Enabled MCP server '{name}' has no definition")),
        );
        warnings.extend(outcome.warnings);

        info!(
            account = %resolved.account.name,
            project = %root.display(),
            files = outcome.written.len(),
            "account applied"
        );
        Ok(ProjectionReport {
            account: resolved.account.name.clone(),
            account_type: resolved.account.account_type(),
            project_root: root,
            written: outcome.written,
            mcp_servers: servers
                .settings
                .iter()
                .chain(&servers.project_shared)
                .map(|server| server.name.clone())
                .collect(),
            warnings,
            notes: outcome.notes,
        })
    }

    pub fn import_mcp(&self, dir: &Path) -> Result<McpImportReport, AisError> {
        let root = find_project_root(dir).unwrap_or_else(|| standardized(dir));
        McpSynchronizer::new(&self.store).import(&root)
    }

    pub fn sync_mcp(&self, dir: &Path) -> Result<McpSyncReport, AisError> {
        let root = find_project_root(dir).unwrap_or_else(|| standardized(dir));
        McpSynchronizer::new(&self.store).sync(&root)
    }

    pub fn enable_server(&self, dir: &Path, server_name: &str) -> Result<ProjectBinding, AisError> {
        self.update_project_servers(dir, |root| {
            binding::enable_server(&self.store, root, server_name)
        })
    }

    pub fn disable_server(&self, dir: &Path, server_name: &str) -> Result<ProjectBinding, AisError> {
        self.update_project_servers(dir, |root| binding::disable_server(root, server_name))
    }

    pub fn add_project_server(
        &self,
        dir: &Path,
        definition: McpServerDefinition,
    ) -> Result<ProjectBinding, AisError> {
        self.update_project_servers(dir, |root| binding::add_project_server(root, definition))
    }

    pub fn remove_project_server(
        &self,
        dir: &Path,
        server_name: &str,
    ) -> Result<ProjectBinding, AisError> {
        self.update_project_servers(dir, |root| binding::remove_project_server(root, server_name))
    }

    /// Imports first so unseen `.mcp.json` entries are not dropped, applies
    /// `update` to the binding, then rewrites `.mcp.json` to match it.
    fn update_project_servers<F>(&self, dir: &Path, update: F) -> Result<ProjectBinding, AisError>
    where
        F: FnOnce(&Path) -> Result<ProjectBinding, AisError>,
    {
        let root = self.bound_root(dir)?;
        let synchronizer = McpSynchronizer::new(&self.store);
        synchronizer.import(&root)?;
        let binding = update(&root)?;
        let servers = effective_servers(&self.store.load(), &binding);
        let export = synchronizer.export(&root, &servers)?;
        debug!(project = %root.display(), servers = export.servers.len(), "project mcp list refreshed");
        Ok(binding)
    }
}
