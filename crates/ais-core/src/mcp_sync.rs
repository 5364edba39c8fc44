//! Reconciliation between stored MCP server definitions and the server lists
//! kept by the assistant tools themselves.
//!
//! Import pulls definitions from `~/.claude.json` (top level and the current
//! project's sub-section) and from `<project>/.mcp.json`, never replacing a
//! name the store already has. Export writes the project-shared servers of a
//! binding back to `<project>/.mcp.json`.

use crate::artifact::{iso8601_now, load_json_object, remove_if_exists, write_json, JsonObject};
use crate::binding::{read_binding, write_binding};
use crate::error::AisError;
use crate::models::{
    EnvMap, McpScope, McpServerDefinition, McpTransport, ProjectBinding, StoreData,
};
use crate::paths::{project_mcp_path, AisPaths};
use crate::store::GlobalStore;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SERVERS_KEY: &str = "mcpServers";
const PROJECTS_KEY: &str = "projects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    ClaudeUserGlobal,
    ClaudeUserProject,
    ProjectMcpJson,
}

impl ImportSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeUserGlobal => "claude_user_global",
            Self::ClaudeUserProject => "claude_user_project",
            Self::ProjectMcpJson => "project_mcp_json",
        }
    }

    /// Scope given to a definition first seen in this source.
    pub fn scope(self) -> McpScope {
        match self {
            Self::ClaudeUserGlobal => McpScope::User,
            Self::ClaudeUserProject => McpScope::Local,
            Self::ProjectMcpJson => McpScope::Project,
        }
    }

    pub fn is_project_specific(self) -> bool {
        !matches!(self, Self::ClaudeUserGlobal)
    }
}

/// Servers a project should see, split by the artifact they land in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledServers {
    /// Local and user scoped servers, projected into the settings document.
    pub settings: Vec<McpServerDefinition>,
    /// Project-shared servers, projected into `.mcp.json`.
    pub project_shared: Vec<McpServerDefinition>,
    /// Enabled names with no definition anywhere.
    pub missing: Vec<String>,
}

impl EnabledServers {
    fn contains(&self, name: &str) -> bool {
        self.settings
            .iter()
            .chain(&self.project_shared)
            .any(|server| server.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedServer {
    pub name: String,
    pub source: ImportSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpImportReport {
    pub imported: Vec<ImportedServer>,
    pub already_known: Vec<String>,
    pub enabled: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpExportReport {
    pub path: PathBuf,
    pub servers: Vec<String>,
    pub removed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpSyncReport {
    pub import: McpImportReport,
    pub export: Option<McpExportReport>,
}

/// Computes the enabled server set for `binding`.
///
/// Names are taken in the binding's enabled order; a definition carried by
/// the binding itself wins over a stored one of the same name. Every
/// user-scoped stored server is added afterwards unless already present.
pub fn effective_servers(data: &StoreData, binding: &ProjectBinding) -> EnabledServers {
    let mut servers = EnabledServers::default();

    for name in &binding.enabled_mcp_servers {
        if servers.contains(name) {
            continue;
        }
        if let Some(definition) = binding.project_mcp_servers.get(name) {
            servers.project_shared.push(definition.clone());
            continue;
        }
        match data.mcp_servers.get(name) {
            Some(definition) if definition.scope == McpScope::Project => {
                servers.project_shared.push(definition.clone());
            }
            Some(definition) => servers.settings.push(definition.clone()),
            None => {
                warn!(server = %name, "enabled mcp server has no definition");
                servers.missing.push(name.clone());
            }
        }
    }

    for definition in data.mcp_servers.values() {
        if definition.scope == McpScope::User && !servers.contains(&definition.name) {
            servers.settings.push(definition.clone());
        }
    }
    servers
}

pub fn servers_to_json(servers: &[McpServerDefinition]) -> JsonObject {
    servers
        .iter()
        .map(|server| (server.name.clone(), server_to_json(server)))
        .collect()
}

pub fn server_to_json(server: &McpServerDefinition) -> JsonValue {
    let mut object = JsonObject::new();
    object.insert(
        String::from("type"),
        JsonValue::String(server.transport.as_str().to_string()),
    );
    if server.transport.is_remote() {
        if let Some(url) = &server.url {
            object.insert(String::from("url"), JsonValue::String(url.clone()));
        }
        if !server.headers.is_empty() {
            object.insert(String::from("headers"), string_map(&server.headers));
        }
    } else {
        if let Some(command) = &server.command {
            object.insert(String::from("command"), JsonValue::String(command.clone()));
        }
        if !server.args.is_empty() {
            object.insert(
                String::from("args"),
                JsonValue::Array(server.args.iter().cloned().map(JsonValue::String).collect()),
            );
        }
        if !server.env.is_empty() {
            object.insert(String::from("env"), string_map(&server.env));
        }
    }
    JsonValue::Object(object)
}

fn string_map(map: &EnvMap) -> JsonValue {
    JsonValue::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
            .collect(),
    )
}

/// Parses one entry of an `mcpServers` object. The transport comes from
/// `type` when present, otherwise `url` means http and `command` means stdio.
pub fn server_from_json(name: &str, value: &JsonValue, scope: McpScope) -> Option<McpServerDefinition> {
    let object = value.as_object()?;
    let text = |key: &str| {
        object
            .get(key)
            .and_then(JsonValue::as_str)
            .map(ToString::to_string)
    };
    let url = text("url");
    let command = text("command");

    let declared = object
        .get("type")
        .and_then(JsonValue::as_str)
        .and_then(|raw| raw.parse::<McpTransport>().ok());
    let transport = match (declared, &url, &command) {
        (Some(transport), _, _) => transport,
        (None, Some(_), _) => McpTransport::Http,
        (None, None, Some(_)) => McpTransport::Stdio,
        (None, None, None) => return None,
    };

    let args: Vec<String> = object
        .get("args")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    let strings = |key: &str| -> EnvMap {
        object
            .get(key)
            .and_then(JsonValue::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    };

    Some(McpServerDefinition {
        name: name.to_string(),
        transport,
        command,
        args,
        env: strings("env"),
        url,
        headers: strings("headers"),
        description: text("description"),
        scope,
        created_at: String::new(),
        updated_at: String::new(),
    })
}

pub struct McpSynchronizer<'a> {
    store: &'a GlobalStore,
}

impl<'a> McpSynchronizer<'a> {
    pub fn new(store: &'a GlobalStore) -> Self {
        Self { store }
    }

    fn paths(&self) -> &AisPaths {
        self.store.paths()
    }

    /// Scans every source in order and adds names the store does not know yet.
    ///
    /// Names the binding already defines for itself are left alone. Newly
    /// added names from a project-specific source are enabled in the binding
    /// when one exists. Every entry of `.mcp.json` is kept project-shared:
    /// when the stored definition of that name has another scope, the file's
    /// definition is carried into the binding instead.
    pub fn import(&self, project_root: &Path) -> Result<McpImportReport, AisError> {
        let mut report = McpImportReport::default();
        let mut binding = read_binding(project_root)?;
        let discovered = self.discover(project_root, &mut report.warnings)?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut project_names = Vec::new();
        let mut project_file = Vec::new();
        for (source, definition) in discovered {
            let held = binding
                .as_ref()
                .is_some_and(|binding| binding.project_mcp_servers.contains_key(&definition.name));
            if held {
                if seen.insert(definition.name.clone()) {
                    report.already_known.push(definition.name);
                }
                continue;
            }
            if source.is_project_specific() && !project_names.contains(&definition.name) {
                project_names.push(definition.name.clone());
            }
            if source == ImportSource::ProjectMcpJson {
                project_file.push(definition.clone());
            }
            if seen.insert(definition.name.clone()) {
                candidates.push((source, definition));
            }
        }

        let sources: Vec<(String, ImportSource)> = candidates
            .iter()
            .map(|(source, definition)| (definition.name.clone(), *source))
            .collect();
        let added = self
            .store
            .insert_missing_servers(candidates.into_iter().map(|(_, def)| def).collect())?;
        for (name, source) in sources {
            if added.contains(&name) {
                report.imported.push(ImportedServer { name, source });
            } else {
                report.already_known.push(name);
            }
        }

        if let Some(binding) = binding.as_mut() {
            let data = self.store.load();
            let mut changed = false;
            for definition in project_file {
                let shared = data
                    .mcp_servers
                    .get(&definition.name)
                    .is_some_and(|stored| stored.scope == McpScope::Project);
                if !shared {
                    debug!(server = %definition.name, "keeping .mcp.json entry in project binding");
                    binding
                        .project_mcp_servers
                        .insert(definition.name.clone(), stamp_imported(definition.clone()));
                    changed = true;
                }
                if !added.contains(&definition.name) && binding.enable(&definition.name) {
                    report.enabled.push(definition.name);
                }
            }
            for name in project_names.iter().filter(|name| added.contains(*name)) {
                if binding.enable(name) {
                    report.enabled.push(name.clone());
                }
            }
            if changed || !report.enabled.is_empty() {
                write_binding(project_root, binding)?;
            }
        }

        info!(
            imported = report.imported.len(),
            enabled = report.enabled.len(),
            project = %project_root.display(),
            "mcp import finished"
        );
        Ok(report)
    }

    fn discover(
        &self,
        project_root: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<(ImportSource, McpServerDefinition)>, AisError> {
        let mut discovered = Vec::new();

        let user_config = load_json_object(&self.paths().claude_user_config_path(), warnings)?;
        if let Some(servers) = user_config.get(SERVERS_KEY) {
            collect_servers(servers, ImportSource::ClaudeUserGlobal, &mut discovered);
        }
        let project_key = project_root.display().to_string();
        if let Some(servers) = user_config
            .get(PROJECTS_KEY)
            .and_then(|projects| projects.get(&project_key))
            .and_then(|project| project.get(SERVERS_KEY))
        {
            collect_servers(servers, ImportSource::ClaudeUserProject, &mut discovered);
        }

        let project_file = load_json_object(&project_mcp_path(project_root), warnings)?;
        if let Some(servers) = project_file.get(SERVERS_KEY) {
            collect_servers(servers, ImportSource::ProjectMcpJson, &mut discovered);
        }
        Ok(discovered)
    }

    /// Writes the binding's project-shared servers to `.mcp.json`, deleting the
    /// file when there are none.
    pub fn export(
        &self,
        project_root: &Path,
        servers: &EnabledServers,
    ) -> Result<McpExportReport, AisError> {
        let path = project_mcp_path(project_root);
        let names: Vec<String> = servers
            .project_shared
            .iter()
            .map(|server| server.name.clone())
            .collect();

        let mut warnings = Vec::new();
        let mut document = load_json_object(&path, &mut warnings)?;
        if servers.project_shared.is_empty() {
            document.shift_remove(SERVERS_KEY);
            if document.is_empty() {
                let removed = remove_if_exists(&path)?;
                debug!(path = %path.display(), removed, "project mcp list cleared");
                return Ok(McpExportReport {
                    path,
                    servers: names,
                    removed,
                });
            }
        } else {
            document.insert(
                SERVERS_KEY.to_string(),
                JsonValue::Object(servers_to_json(&servers.project_shared)),
            );
        }
        write_json(&path, &JsonValue::Object(document))?;
        Ok(McpExportReport {
            path,
            servers: names,
            removed: false,
        })
    }

    /// Import, then export for the project's binding. Without a binding only
    /// the import runs.
    pub fn sync(&self, project_root: &Path) -> Result<McpSyncReport, AisError> {
        let import = self.import(project_root)?;
        let Some(binding) = read_binding(project_root)? else {
            return Ok(McpSyncReport {
                import,
                export: None,
            });
        };
        let servers = effective_servers(&self.store.load(), &binding);
        let export = self.export(project_root, &servers)?;
        Ok(McpSyncReport {
            import,
            export: Some(export),
        })
    }
}

fn stamp_imported(mut definition: McpServerDefinition) -> McpServerDefinition {
    let now = iso8601_now();
    definition.scope = McpScope::Project;
    definition.created_at = now.clone();
    definition.updated_at = now;
    definition
}

fn collect_servers(
    servers: &JsonValue,
    source: ImportSource,
    discovered: &mut Vec<(ImportSource, McpServerDefinition)>,
) {
    let Some(map) = servers.as_object() else {
        warn!(source = source.as_str(), "mcpServers is not an object; skipping");
        return;
    };
    for (name, value) in map {
        match server_from_json(name, value, source.scope()) {
            Some(definition) => discovered.push((source, definition)),
            None => {
                warn!(server = %name, source = source.as_str(), "mcp server entry has no command or url");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::models::{AccountDraft, AccountKind, AccountType};
    use crate::paths::standardized;
    use serde_json::json;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        store: GlobalStore,
        project: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().expect("tempdir");
        let store = GlobalStore::new(AisPaths::from_home(dir.path().join("home")));
        let project = dir.path().join("project");
        fs::create_dir_all(&project).expect("project");
        let project = standardized(&project);
        Fixture {
            _dir: dir,
            store,
            project,
        }
    }

    fn write_user_config(fixture: &Fixture, value: JsonValue) {
        let path = fixture.store.paths().claude_user_config_path();
        fs::create_dir_all(path.parent().expect("parent")).expect("home");
        fs::write(path, serde_json::to_string_pretty(&value).expect("json")).expect("write");
    }

    #[test]
    fn import_dedups_across_sources_first_source_wins() {
        let fixture = fixture();
        write_user_config(
            &fixture,
            json!({
                "mcpServers": {"fs": {"command": "npx", "args": ["server-fs"]}},
                "projects": {
                    fixture.project.display().to_string(): {
                        "mcpServers": {"fs": {"url": "https://elsewhere"}}
                    }
                }
            }),
        );
        fs::write(
            project_mcp_path(&fixture.project),
            r#"{"mcpServers": {"fs": {"type": "sse", "url": "https://x"}}}"#,
        )
        .expect("mcp.json");

        let report = McpSynchronizer::new(&fixture.store)
            .import(&fixture.project)
            .expect("import");
        assert_eq!(
            report.imported,
            vec![ImportedServer {
                name: String::from("fs"),
                source: ImportSource::ClaudeUserGlobal,
            }]
        );
        let stored = fixture.store.list_servers();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].transport, McpTransport::Stdio);
        assert_eq!(stored[0].scope, McpScope::User);

        let again = McpSynchronizer::new(&fixture.store)
            .import(&fixture.project)
            .expect("import again");
        assert!(again.imported.is_empty());
        assert_eq!(again.already_known, vec![String::from("fs")]);
    }

    #[test]
    fn import_enables_project_sources_in_binding() {
        let fixture = fixture();
        fixture
            .store
            .upsert_account(
                "work",
                AccountDraft::new(AccountKind::empty(AccountType::Claude), "sk"),
            )
            .expect("account");
        bind(&fixture.store, "work", &fixture.project).expect("bind");
        fs::write(
            project_mcp_path(&fixture.project),
            r#"{"mcpServers": {"docs": {"url": "https://docs.example/mcp"}}}"#,
        )
        .expect("mcp.json");

        let report = McpSynchronizer::new(&fixture.store)
            .import(&fixture.project)
            .expect("import");
        assert_eq!(report.enabled, vec![String::from("docs")]);
        let binding = read_binding(&fixture.project)
            .expect("read")
            .expect("binding");
        assert!(binding.is_enabled("docs"));

        let sync = McpSynchronizer::new(&fixture.store)
            .sync(&fixture.project)
            .expect("sync");
        let export = sync.export.expect("export");
        assert_eq!(export.servers, vec![String::from("docs")]);
        let written: JsonValue =
            serde_json::from_str(&fs::read_to_string(&export.path).expect("read")).expect("json");
        assert_eq!(written["mcpServers"]["docs"]["type"], "http");
        assert_eq!(written["mcpServers"]["docs"]["url"], "https://docs.example/mcp");
    }

    #[test]
    fn local_scope_never_reaches_project_file() {
        let mut data = StoreData::default();
        for (name, scope) in [
            ("local", McpScope::Local),
            ("shared", McpScope::Project),
            ("everywhere", McpScope::User),
        ] {
            data.mcp_servers.insert(
                name.to_string(),
                McpServerDefinition::stdio(name, "run", Vec::new()).with_scope(scope),
            );
        }
        let binding = ProjectBinding {
            enabled_mcp_servers: vec![
                String::from("local"),
                String::from("shared"),
                String::from("ghost"),
            ],
            ..ProjectBinding::default()
        };

        let servers = effective_servers(&data, &binding);
        let names = |list: &[McpServerDefinition]| {
            list.iter().map(|s| s.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&servers.settings), vec!["local", "everywhere"]);
        assert_eq!(names(&servers.project_shared), vec!["shared"]);
        assert_eq!(servers.missing, vec![String::from("ghost")]);
    }

    #[test]
    fn binding_definition_wins_over_stored_one() {
        let mut data = StoreData::default();
        data.mcp_servers.insert(
            String::from("shared"),
            McpServerDefinition::stdio("shared", "global-cmd", Vec::new()),
        );
        let mut binding = ProjectBinding::default();
        binding.enable("shared");
        binding.project_mcp_servers.insert(
            String::from("shared"),
            McpServerDefinition::stdio("shared", "project-cmd", Vec::new())
                .with_scope(McpScope::Project),
        );

        let servers = effective_servers(&data, &binding);
        assert!(servers.settings.is_empty());
        assert_eq!(
            servers.project_shared[0].command.as_deref(),
            Some("project-cmd")
        );
    }

    #[test]
    fn empty_export_deletes_project_file() {
        let fixture = fixture();
        let path = project_mcp_path(&fixture.project);
        fs::write(&path, r#"{"mcpServers": {"old": {"command": "x"}}}"#).expect("seed");

        let report = McpSynchronizer::new(&fixture.store)
            .export(&fixture.project, &EnabledServers::default())
            .expect("export");
        assert!(report.removed);
        assert!(!path.exists());
    }

    #[test]
    fn transport_inferred_from_fields() {
        let remote = server_from_json("r", &json!({"url": "https://r"}), McpScope::Local)
            .expect("remote");
        assert_eq!(remote.transport, McpTransport::Http);

        let local = server_from_json(
            "l",
            &json!({"command": "uvx", "env": {"TOKEN": "t", "N": 1}}),
            McpScope::Local,
        )
        .expect("stdio");
        assert_eq!(local.transport, McpTransport::Stdio);
        assert_eq!(local.env.len(), 1);

        let sse = server_from_json("s", &json!({"type": "sse", "url": "https://s"}), McpScope::Local)
            .expect("sse");
        assert_eq!(sse.transport, McpTransport::Sse);

        assert!(server_from_json("none", &json!({"args": []}), McpScope::Local).is_none());
    }

    #[test]
    fn exported_entry_carries_connection_fields_only() {
        let mut server = McpServerDefinition::stdio("fs", "npx", vec![String::from("-y")]);
        server.description = Some(String::from("files"));
        server.env.insert(String::from("ROOT"), String::from("/tmp"));
        assert_eq!(
            server_to_json(&server),
            json!({"type": "stdio", "command": "npx", "args": ["-y"], "env": {"ROOT": "/tmp"}})
        );
    }
}
