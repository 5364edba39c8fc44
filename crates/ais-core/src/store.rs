use crate::artifact::{iso8601_now, write_json};
use crate::error::AisError;
use crate::models::{
    Account, AccountDraft, McpServerDefinition, ModelGroup, ModelGroups, StoreData,
};
use crate::paths::{project_marker_path, standardized, AisPaths};
use crate::validation::{require_non_empty, validate_env_map};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Handle on the single JSON document holding every account and MCP server.
///
/// Every mutation is a full read-modify-write of the document; there is no
/// locking between processes.
#[derive(Debug, Clone)]
pub struct GlobalStore {
    paths: AisPaths,
}

impl Default for GlobalStore {
    fn default() -> Self {
        Self {
            paths: AisPaths::detect(),
        }
    }
}

impl GlobalStore {
    pub fn new(paths: AisPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AisPaths {
        &self.paths
    }

    pub fn load(&self) -> StoreData {
        let data = match std::fs::read(&self.paths.store_path) {
            Ok(data) => data,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.paths.store_path.display(), %error, "global store unreadable");
                }
                return StoreData::default();
            }
        };

        serde_json::from_slice(&data).unwrap_or_else(|error| {
            warn!(path = %self.paths.store_path.display(), %error, "global store is malformed; starting empty");
            StoreData::default()
        })
    }

    pub fn save(&self, data: &StoreData) -> Result<(), AisError> {
        self.paths
            .ensure_store_dir()
            .map_err(|e| AisError::io(&self.paths.store_directory, e))?;
        write_json(&self.paths.store_path, data)?;
        Ok(())
    }

    /// Creates or wholesale-replaces the account `name`. The ID is assigned
    /// only for new names and `createdAt` carries over on replacement.
    pub fn upsert_account(&self, name: &str, draft: AccountDraft) -> Result<Account, AisError> {
        let name = name.trim();
        require_non_empty("name", name)?;
        draft.validate()?;

        let mut data = self.load();
        let now = iso8601_now();
        let (id, created_at) = match data.accounts.get(name) {
            Some(existing) => (existing.id, existing.created_at.clone()),
            None => {
                let id = data.next_account_id;
                data.next_account_id += 1;
                (id, now.clone())
            }
        };

        let AccountDraft {
            kind,
            api_key,
            api_url,
            email,
            description,
            custom_env,
        } = draft;
        let account = Account {
            id,
            name: name.to_string(),
            kind,
            api_key,
            api_url,
            email,
            description,
            custom_env,
            created_at,
            updated_at: now,
        };
        data.accounts.insert(name.to_string(), account.clone());
        self.save(&data)?;
        info!(account = name, id, "account saved");
        Ok(account)
    }

    pub fn get_account(&self, name: &str) -> Option<Account> {
        self.load().accounts.get(name).cloned()
    }

    pub fn remove_account(&self, name: &str) -> Result<Account, AisError> {
        let mut data = self.load();
        let removed = data
            .accounts
            .shift_remove(name)
            .ok_or_else(|| AisError::AccountNotFound(name.to_string()))?;
        self.save(&data)?;
        info!(account = name, "account removed");
        Ok(removed)
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.load().accounts.into_values().collect()
    }

    pub fn add_model_group(
        &self,
        account_name: &str,
        group_name: &str,
        roles: ModelGroup,
    ) -> Result<Account, AisError> {
        require_non_empty("group", group_name)?;
        validate_env_map("modelGroup", &roles)?;
        self.update_model_groups(account_name, |_, groups| {
            groups.insert_group(group_name, roles);
            Ok(())
        })
    }

    pub fn set_active_model_group(
        &self,
        account_name: &str,
        group_name: &str,
    ) -> Result<Account, AisError> {
        self.update_model_groups(account_name, |account, groups| {
            if groups.activate(group_name) {
                Ok(())
            } else {
                Err(AisError::ModelGroupNotFound {
                    account: account.to_string(),
                    group: group_name.to_string(),
                })
            }
        })
    }

    pub fn remove_model_group(
        &self,
        account_name: &str,
        group_name: &str,
    ) -> Result<Account, AisError> {
        self.update_model_groups(account_name, |account, groups| {
            if groups.remove_group(group_name) {
                Ok(())
            } else {
                Err(AisError::ModelGroupNotFound {
                    account: account.to_string(),
                    group: group_name.to_string(),
                })
            }
        })
    }

    fn update_model_groups<F>(&self, account_name: &str, apply: F) -> Result<Account, AisError>
    where
        F: FnOnce(&str, &mut ModelGroups) -> Result<(), AisError>,
    {
        let mut data = self.load();
        let account = data
            .accounts
            .get_mut(account_name)
            .ok_or_else(|| AisError::AccountNotFound(account_name.to_string()))?;
        let account_type = account.account_type();
        let groups = account.kind.model_groups_mut().ok_or_else(|| {
            AisError::validation(format!(
                "{} accounts do not support model groups",
                account_type.as_str()
            ))
        })?;
        apply(account_name, groups)?;
        account.updated_at = iso8601_now();
        let updated = account.clone();
        self.save(&data)?;
        Ok(updated)
    }

    pub fn upsert_server(
        &self,
        definition: McpServerDefinition,
    ) -> Result<McpServerDefinition, AisError> {
        definition.validate()?;
        let mut data = self.load();
        let existing = data.mcp_servers.get(&definition.name).cloned();
        let stored = stamp_server(definition, existing.as_ref());
        data.mcp_servers
            .insert(stored.name.clone(), stored.clone());
        self.save(&data)?;
        info!(server = %stored.name, scope = stored.scope.as_str(), "mcp server saved");
        Ok(stored)
    }

    pub fn get_server(&self, name: &str) -> Option<McpServerDefinition> {
        self.load().mcp_servers.get(name).cloned()
    }

    pub fn remove_server(&self, name: &str) -> Result<McpServerDefinition, AisError> {
        let mut data = self.load();
        let removed = data
            .mcp_servers
            .shift_remove(name)
            .ok_or_else(|| AisError::ServerNotFound(name.to_string()))?;
        self.save(&data)?;
        info!(server = name, "mcp server removed");
        Ok(removed)
    }

    pub fn list_servers(&self) -> Vec<McpServerDefinition> {
        self.load().mcp_servers.into_values().collect()
    }

    /// Adds each definition whose name is not yet stored, in order, and
    /// returns the names that were added. Existing names are never replaced.
    pub fn insert_missing_servers(
        &self,
        definitions: Vec<McpServerDefinition>,
    ) -> Result<Vec<String>, AisError> {
        let mut data = self.load();
        let mut added = Vec::new();
        for definition in definitions {
            if data.mcp_servers.contains_key(&definition.name) {
                continue;
            }
            let stored = stamp_server(definition, None);
            added.push(stored.name.clone());
            data.mcp_servers.insert(stored.name.clone(), stored);
        }
        if !added.is_empty() {
            self.save(&data)?;
        }
        Ok(added)
    }
}

fn stamp_server(
    mut definition: McpServerDefinition,
    existing: Option<&McpServerDefinition>,
) -> McpServerDefinition {
    let now = iso8601_now();
    definition.created_at = existing
        .map(|item| item.created_at.clone())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| now.clone());
    definition.updated_at = now;
    definition
}

/// Walks from `start` towards the filesystem root (inclusive) and returns the
/// first directory holding the project marker file.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let start = standardized(start);
    start
        .ancestors()
        .find(|dir| project_marker_path(dir).is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountKind, AccountType, McpScope};
    use std::fs;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> GlobalStore {
        GlobalStore::new(AisPaths::from_home(dir.to_path_buf()))
    }

    fn claude_draft(key: &str) -> AccountDraft {
        AccountDraft::new(AccountKind::empty(AccountType::Claude), key)
    }

    #[test]
    fn upsert_assigns_monotonic_ids_and_keeps_created_at() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());

        let first = store.upsert_account("a", claude_draft("k1")).expect("a");
        let second = store.upsert_account("b", claude_draft("k2")).expect("b");
        assert_eq!((first.id, second.id), (1, 2));

        let mut data = store.load();
        data.accounts
            .get_mut("a")
            .expect("a stored")
            .created_at = String::from("2020-01-01T00:00:00Z");
        store.save(&data).expect("save");

        let replaced = store
            .upsert_account("a", claude_draft("k3").with_api_url("https://proxy"))
            .expect("replace");
        assert_eq!(replaced.id, 1);
        assert_eq!(replaced.created_at, "2020-01-01T00:00:00Z");
        assert_eq!(replaced.api_key, "k3");

        store.remove_account("b").expect("remove");
        let third = store.upsert_account("c", claude_draft("k4")).expect("c");
        assert_eq!(third.id, 3);
    }

    #[test]
    fn upsert_replaces_fields_wholesale() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store
            .upsert_account("a", claude_draft("k1").with_env("EXTRA", "1"))
            .expect("first");
        let replaced = store.upsert_account("a", claude_draft("k2")).expect("second");
        assert!(replaced.custom_env.is_empty());
    }

    #[test]
    fn upsert_validates_before_writing() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let error = store
            .upsert_account("a", claude_draft("k").with_env("bad-name", "1"))
            .expect_err("must fail");
        assert!(matches!(error, AisError::Validation(_)));
        assert!(!store.paths().store_path.exists());
    }

    #[test]
    fn remove_missing_account_is_typed_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let error = store.remove_account("ghost").expect_err("must fail");
        assert!(matches!(error, AisError::AccountNotFound(name) if name == "ghost"));
    }

    #[test]
    fn malformed_store_loads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::create_dir_all(&store.paths().store_directory).expect("dir");
        fs::write(&store.paths().store_path, "not json").expect("seed");
        let data = store.load();
        assert!(data.accounts.is_empty());
        assert_eq!(data.next_account_id, 1);
    }

    #[test]
    fn model_group_lifecycle_never_leaves_dangling_active() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.upsert_account("a", claude_draft("k")).expect("a");

        let roles = ModelGroup::from([(String::from("DEFAULT_MODEL"), String::from("m"))]);
        store.add_model_group("a", "g1", roles.clone()).expect("g1");
        store.add_model_group("a", "g2", roles).expect("g2");

        let account = store.remove_model_group("a", "g1").expect("remove g1");
        let groups = account.kind.model_groups().expect("groups");
        assert_eq!(groups.active_model_group.as_deref(), Some("g2"));

        let account = store.remove_model_group("a", "g2").expect("remove g2");
        let groups = account.kind.model_groups().expect("groups");
        assert_eq!(groups.active_model_group, None);

        let error = store.set_active_model_group("a", "g1").expect_err("gone");
        assert!(matches!(error, AisError::ModelGroupNotFound { .. }));
    }

    #[test]
    fn model_groups_rejected_for_simple_accounts() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store
            .upsert_account(
                "codex",
                AccountDraft::new(AccountKind::empty(AccountType::Codex), "k"),
            )
            .expect("codex");
        let error = store
            .add_model_group("codex", "g", ModelGroup::new())
            .expect_err("unsupported");
        assert!(matches!(error, AisError::Validation(_)));
    }

    #[test]
    fn insert_missing_servers_never_overwrites() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store
            .upsert_server(McpServerDefinition::stdio("fs", "npx", Vec::new()))
            .expect("seed");

        let added = store
            .insert_missing_servers(vec![
                McpServerDefinition::stdio("fs", "other", Vec::new()),
                McpServerDefinition::stdio("git", "uvx", Vec::new()).with_scope(McpScope::User),
            ])
            .expect("insert");
        assert_eq!(added, vec![String::from("git")]);
        assert_eq!(
            store.get_server("fs").and_then(|item| item.command),
            Some(String::from("npx"))
        );
    }

    #[test]
    fn find_project_root_walks_up_to_marker() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("repo");
        let nested = root.join("src").join("deep");
        fs::create_dir_all(&nested).expect("nested");
        assert_eq!(find_project_root(&nested), None);

        fs::write(project_marker_path(&root), "{}").expect("marker");
        assert_eq!(find_project_root(&nested), Some(standardized(&root)));
        assert_eq!(find_project_root(&root), Some(standardized(&root)));
    }
}
