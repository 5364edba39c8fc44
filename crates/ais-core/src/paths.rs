use std::path::{Path, PathBuf};

pub const PROJECT_MARKER_FILE: &str = ".ais-project-config";
pub const STORE_DIR_NAME: &str = ".ai-account-switch";
pub const STORE_FILE_NAME: &str = "config.json";

/// Filesystem locations the engine reads and writes.
///
/// Everything under the home directory is derived from `home_directory`, so
/// tests can point the whole engine at a sandbox with [`AisPaths::from_home`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AisPaths {
    pub home_directory: PathBuf,
    pub store_directory: PathBuf,
    pub store_path: PathBuf,
}

impl AisPaths {
    pub fn detect() -> Self {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        if let Ok(override_dir) = std::env::var("AIS_HOME") {
            if !override_dir.trim().is_empty() {
                return Self::with_store_directory(home, PathBuf::from(override_dir));
            }
        }
        Self::from_home(home)
    }

    pub fn from_home(home_directory: PathBuf) -> Self {
        let store_directory = home_directory.join(STORE_DIR_NAME);
        Self::with_store_directory(home_directory, store_directory)
    }

    pub fn with_store_directory(home_directory: PathBuf, store_directory: PathBuf) -> Self {
        let store_path = store_directory.join(STORE_FILE_NAME);
        Self {
            home_directory,
            store_directory,
            store_path,
        }
    }

    pub fn ensure_store_dir(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.store_directory)
    }

    pub fn claude_user_config_path(&self) -> PathBuf {
        self.home_directory.join(".claude.json")
    }

    pub fn codex_config_path(&self) -> PathBuf {
        self.home_directory.join(".codex").join("config.toml")
    }

    pub fn codex_auth_path(&self) -> PathBuf {
        self.home_directory.join(".codex").join("auth.json")
    }

    pub fn ccr_config_path(&self) -> PathBuf {
        self.home_directory
            .join(".claude-code-router")
            .join("config.json")
    }
}

pub fn project_marker_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_MARKER_FILE)
}

pub fn claude_settings_path(project_root: &Path) -> PathBuf {
    project_root.join(".claude").join("settings.local.json")
}

pub fn droids_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".droids").join("config.json")
}

pub fn project_mcp_path(project_root: &Path) -> PathBuf {
    project_root.join(".mcp.json")
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()))
}

/// Absolute, symlink-resolved form of `path` when it exists; otherwise the
/// path joined onto the current directory.
pub fn standardized(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_home_derives_store_and_targets() {
        let paths = AisPaths::from_home(PathBuf::from("/home/dev"));
        assert_eq!(
            paths.store_path,
            PathBuf::from("/home/dev/.ai-account-switch/config.json")
        );
        assert_eq!(
            paths.codex_config_path(),
            PathBuf::from("/home/dev/.codex/config.toml")
        );
        assert_eq!(
            paths.ccr_config_path(),
            PathBuf::from("/home/dev/.claude-code-router/config.json")
        );
    }

    #[test]
    fn project_paths_are_relative_to_root() {
        let root = Path::new("/work/app");
        assert_eq!(
            claude_settings_path(root),
            PathBuf::from("/work/app/.claude/settings.local.json")
        );
        assert_eq!(
            project_marker_path(root),
            PathBuf::from("/work/app/.ais-project-config")
        );
    }
}
