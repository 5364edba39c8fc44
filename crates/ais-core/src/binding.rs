use crate::artifact::{iso8601_now, read_optional, write_json};
use crate::error::AisError;
use crate::models::{McpServerDefinition, ProjectBinding, ResolvedProject};
use crate::paths::{project_marker_path, standardized, PROJECT_MARKER_FILE};
use crate::store::GlobalStore;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Project-relative paths that hold credentials once an account is applied.
const GITIGNORE_ENTRIES: [&str; 3] = [PROJECT_MARKER_FILE, ".claude/settings.local.json", ".droids/"];

pub fn read_binding(project_root: &Path) -> Result<Option<ProjectBinding>, AisError> {
    let path = project_marker_path(project_root);
    let Some(raw) = read_optional(&path)? else {
        return Ok(None);
    };
    match serde_json::from_str::<ProjectBinding>(&raw) {
        Ok(binding) => Ok(Some(binding)),
        Err(error) => {
            warn!(path = %path.display(), %error, "project binding is malformed; ignoring it");
            Ok(None)
        }
    }
}

pub fn write_binding(project_root: &Path, binding: &ProjectBinding) -> Result<(), AisError> {
    write_json(&project_marker_path(project_root), binding)?;
    Ok(())
}

/// Points `project_root` at `account_name`, keeping the enabled server list
/// and project-shared definitions of any previous binding.
pub fn bind(
    store: &GlobalStore,
    account_name: &str,
    project_root: &Path,
) -> Result<ProjectBinding, AisError> {
    if store.get_account(account_name).is_none() {
        return Err(AisError::AccountNotFound(account_name.to_string()));
    }
    let project_root = standardized(project_root);
    let mut binding = read_binding(&project_root)?.unwrap_or_default();
    binding.active_account = account_name.to_string();
    binding.project_path = project_root.display().to_string();
    binding.set_at = iso8601_now();
    write_binding(&project_root, &binding)?;
    ensure_gitignore_entries(&project_root)?;
    info!(account = account_name, project = %project_root.display(), "project bound");
    Ok(binding)
}

/// Joins the binding at `project_root` with its account. Missing bindings and
/// bindings naming a deleted account both resolve to `None`.
pub fn resolve(store: &GlobalStore, project_root: &Path) -> Option<ResolvedProject> {
    let binding = match read_binding(project_root) {
        Ok(Some(binding)) => binding,
        Ok(None) => return None,
        Err(error) => {
            warn!(project = %project_root.display(), %error, "project binding unreadable");
            return None;
        }
    };
    let Some(account) = store.get_account(&binding.active_account) else {
        warn!(
            account = %binding.active_account,
            project = %project_root.display(),
            "project binding references a missing account"
        );
        return None;
    };
    Some(ResolvedProject {
        project_root: project_root.to_path_buf(),
        account,
        binding,
    })
}

/// Applies `update` to an existing binding and writes it back.
pub fn update_binding<F>(project_root: &Path, update: F) -> Result<ProjectBinding, AisError>
where
    F: FnOnce(&mut ProjectBinding) -> Result<(), AisError>,
{
    let mut binding = read_binding(project_root)?
        .ok_or_else(|| AisError::ProjectNotBound(project_root.to_path_buf()))?;
    update(&mut binding)?;
    write_binding(project_root, &binding)?;
    Ok(binding)
}

pub fn enable_server(
    store: &GlobalStore,
    project_root: &Path,
    server_name: &str,
) -> Result<ProjectBinding, AisError> {
    let known_globally = store.get_server(server_name).is_some();
    update_binding(project_root, |binding| {
        if !known_globally && !binding.project_mcp_servers.contains_key(server_name) {
            return Err(AisError::ServerNotFound(server_name.to_string()));
        }
        binding.enable(server_name);
        Ok(())
    })
}

pub fn disable_server(project_root: &Path, server_name: &str) -> Result<ProjectBinding, AisError> {
    update_binding(project_root, |binding| {
        if !binding.disable(server_name) {
            return Err(AisError::ServerNotFound(server_name.to_string()));
        }
        Ok(())
    })
}

/// Stores a project-shared definition inside the binding and enables it.
pub fn add_project_server(
    project_root: &Path,
    mut definition: McpServerDefinition,
) -> Result<ProjectBinding, AisError> {
    definition.validate()?;
    definition.scope = crate::models::McpScope::Project;
    update_binding(project_root, |binding| {
        let now = iso8601_now();
        definition.created_at = binding
            .project_mcp_servers
            .get(&definition.name)
            .map(|existing| existing.created_at.clone())
            .unwrap_or_else(|| now.clone());
        definition.updated_at = now;
        binding.enable(&definition.name);
        binding
            .project_mcp_servers
            .insert(definition.name.clone(), definition);
        Ok(())
    })
}

pub fn remove_project_server(
    project_root: &Path,
    server_name: &str,
) -> Result<ProjectBinding, AisError> {
    update_binding(project_root, |binding| {
        if binding.project_mcp_servers.shift_remove(server_name).is_none() {
            return Err(AisError::ServerNotFound(server_name.to_string()));
        }
        binding.disable(server_name);
        Ok(())
    })
}

/// Appends the credential-bearing paths to `.gitignore` of a git working tree.
pub fn ensure_gitignore_entries(project_root: &Path) -> Result<Vec<String>, AisError> {
    if !project_root.join(".git").exists() {
        return Ok(Vec::new());
    }
    let path = project_root.join(".gitignore");
    let existing = read_optional(&path)?.unwrap_or_default();
    let present: Vec<&str> = existing
        .lines()
        .map(|line| line.trim().trim_start_matches('/'))
        .collect();
    let missing: Vec<String> = GITIGNORE_ENTRIES
        .iter()
        .filter(|entry| !present.contains(*entry))
        .map(|entry| entry.to_string())
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str("\n# ai-account-switch\n");
    for entry in &missing {
        updated.push_str(entry);
        updated.push('\n');
    }
    fs::write(&path, updated).map_err(|error| AisError::io(&path, error))?;
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountDraft, AccountKind, AccountType};
    use crate::paths::AisPaths;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, GlobalStore, std::path::PathBuf) {
        let dir = tempdir().expect("tempdir");
        let store = GlobalStore::new(AisPaths::from_home(dir.path().join("home")));
        let project = dir.path().join("project");
        fs::create_dir_all(&project).expect("project");
        store
            .upsert_account(
                "work",
                AccountDraft::new(AccountKind::empty(AccountType::Claude), "sk-work"),
            )
            .expect("account");
        (dir, store, standardized(&project))
    }

    #[test]
    fn bind_preserves_enabled_servers() {
        let (_dir, store, project) = setup();
        bind(&store, "work", &project).expect("bind");
        update_binding(&project, |binding| {
            binding.enable("fs");
            Ok(())
        })
        .expect("enable");

        store
            .upsert_account(
                "home",
                AccountDraft::new(AccountKind::empty(AccountType::Codex), "sk-home"),
            )
            .expect("home");
        let rebound = bind(&store, "home", &project).expect("rebind");
        assert_eq!(rebound.active_account, "home");
        assert_eq!(rebound.enabled_mcp_servers, vec![String::from("fs")]);
        assert_eq!(rebound.project_path, project.display().to_string());
    }

    #[test]
    fn bind_unknown_account_is_not_found() {
        let (_dir, store, project) = setup();
        let error = bind(&store, "ghost", &project).expect_err("must fail");
        assert!(error.is_not_found());
        assert!(!project_marker_path(&project).exists());
    }

    #[test]
    fn resolve_tolerates_dangling_account() {
        let (_dir, store, project) = setup();
        bind(&store, "work", &project).expect("bind");
        let resolved = resolve(&store, &project).expect("resolved");
        assert_eq!(resolved.account.api_key, "sk-work");

        store.remove_account("work").expect("remove");
        assert!(resolve(&store, &project).is_none());
    }

    #[test]
    fn enable_requires_known_server() {
        let (_dir, store, project) = setup();
        bind(&store, "work", &project).expect("bind");
        let error = enable_server(&store, &project, "ghost").expect_err("unknown");
        assert!(matches!(error, AisError::ServerNotFound(_)));

        add_project_server(
            &project,
            McpServerDefinition::stdio("shared", "npx", Vec::new()),
        )
        .expect("project server");
        let binding = read_binding(&project).expect("read").expect("binding");
        assert!(binding.is_enabled("shared"));
        assert_eq!(
            binding.project_mcp_servers["shared"].scope,
            crate::models::McpScope::Project
        );
    }

    #[test]
    fn gitignore_entries_added_once_for_git_projects() {
        let (_dir, store, project) = setup();
        fs::create_dir_all(project.join(".git")).expect("git");
        fs::write(project.join(".gitignore"), "target\n").expect("gitignore");

        bind(&store, "work", &project).expect("bind");
        bind(&store, "work", &project).expect("bind again");

        let contents = fs::read_to_string(project.join(".gitignore")).expect("read");
        assert!(contents.starts_with("target\n"));
        assert_eq!(contents.matches(PROJECT_MARKER_FILE).count(), 1);
        assert_eq!(contents.matches(".claude/settings.local.json").count(), 1);
    }
}
