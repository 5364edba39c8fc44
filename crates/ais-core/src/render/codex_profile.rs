//! Codex `config.toml` profile projection.
//!
//! The file is edited line by line rather than parsed: for the current project
//! the `[profiles.ais_<project>]` section and the `[model_providers.ais_<account>]`
//! section it selects are cut out, then a freshly rendered pair is appended.
//! Every other line of the file is copied through untouched.

use super::{RenderContext, RenderOutcome};
use crate::artifact::{read_optional, write_bytes};
use crate::error::AisError;
use crate::models::{Account, AccountKind, CodexAuthMode, CodexSettings};
use crate::secret_file::SecretFileWriter;
use std::path::Path;
use tracing::warn;

pub const OWNER_COMMENT_PREFIX: &str = "# AIS";
pub const SECTION_PREFIX: &str = "ais_";
pub const AUTH_FILE_KEY: &str = "OPENAI_API_KEY";
pub const DEFAULT_ENV_KEY: &str = "OPENAI_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub fn render(context: &RenderContext<'_>) -> Result<RenderOutcome, AisError> {
    let mut outcome = RenderOutcome::default();
    let settings = match &context.account.kind {
        AccountKind::Codex(settings) => settings.clone(),
        _ => CodexSettings::default(),
    };

    let config_path = context.paths.codex_config_path();
    let existing = read_optional(&config_path)?.unwrap_or_default();
    let names = SectionNames::new(context.project_root, &context.account.name);
    let block = render_block(&names, context.project_root, context.account, &settings);
    let updated = upsert_profile(&existing, &names, &block);
    if let Err(error) = toml::from_str::<toml::Table>(&updated) {
        warn!(path = %config_path.display(), %error, "codex config is not valid TOML after update");
        outcome.warnings.push(format!(
            "{} does not parse as TOML: {error}",
            config_path.display()
        ));
    }
    write_bytes(&config_path, updated.as_bytes())?;
    outcome.written.push(config_path);

    if settings.auth_mode == CodexAuthMode::AuthJson {
        let auth_path = context.paths.codex_auth_path();
        SecretFileWriter::new(&auth_path).upsert(
            AUTH_FILE_KEY,
            &context.account.api_key,
            &mut outcome.warnings,
        )?;
        outcome.written.push(auth_path);
    }
    if settings.auth_mode == CodexAuthMode::EnvKey {
        outcome.notes.push(format!(
            "export {}=<api key> before starting codex",
            settings.env_key.as_deref().unwrap_or(DEFAULT_ENV_KEY)
        ));
    }
    outcome
        .notes
        .push(format!("run codex with: codex --profile {}", names.profile));
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNames {
    pub profile: String,
    pub provider: String,
}

impl SectionNames {
    pub fn new(project_root: &Path, account_name: &str) -> Self {
        let project = project_root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("root"));
        Self {
            profile: format!("{SECTION_PREFIX}{}", sanitize_section_name(&project)),
            provider: format!("{SECTION_PREFIX}{}", sanitize_section_name(account_name)),
        }
    }

    pub fn profile_header(&self) -> String {
        format!("[profiles.{}]", self.profile)
    }

    pub fn provider_header(&self) -> String {
        format!("[model_providers.{}]", self.provider)
    }
}

/// Maps everything outside `[A-Za-z0-9_-]` to `_` so the name is a bare TOML key.
pub fn sanitize_section_name(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

pub fn render_block(
    names: &SectionNames,
    project_root: &Path,
    account: &Account,
    settings: &CodexSettings,
) -> String {
    let project = project_root.display();
    let mut lines = vec![
        format!("{OWNER_COMMENT_PREFIX} profile for project: {project}"),
        names.profile_header(),
        format!("model_provider = {}", toml_string(&names.provider)),
    ];
    if let Some(model) = settings.model.as_deref().filter(|m| !m.trim().is_empty()) {
        lines.push(format!("model = {}", toml_string(model)));
    }
    lines.push(String::new());

    lines.push(format!(
        "{OWNER_COMMENT_PREFIX} provider for project: {project}"
    ));
    lines.push(names.provider_header());
    lines.push(format!("name = {}", toml_string(&account.name)));
    lines.push(format!(
        "base_url = {}",
        toml_string(account.base_url().unwrap_or(DEFAULT_BASE_URL))
    ));
    lines.push(format!(
        "wire_api = {}",
        toml_string(settings.wire_api.as_str())
    ));
    match settings.auth_mode {
        CodexAuthMode::HttpHeaders => lines.push(format!(
            "http_headers = {{ \"Authorization\" = {} }}",
            toml_string(&format!("Bearer {}", account.api_key))
        )),
        CodexAuthMode::AuthJson => lines.push(String::from("requires_openai_auth = true")),
        CodexAuthMode::EnvKey => lines.push(format!(
            "env_key = {}",
            toml_string(settings.env_key.as_deref().unwrap_or(DEFAULT_ENV_KEY))
        )),
    }

    let mut block = lines.join("\n");
    block.push('\n');
    block
}

/// Removes the sections owned by `names` from `existing` and appends `block`.
pub fn upsert_profile(existing: &str, names: &SectionNames, block: &str) -> String {
    let headers = [names.profile_header(), names.provider_header()];
    let remaining = remove_sections(existing, &headers);
    let body = remaining.trim_end();
    let combined = if body.is_empty() {
        block.to_string()
    } else {
        format!("{body}\n\n{block}")
    };
    collapse_blank_lines(&combined)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Copying,
    SkippingSection,
}

/// Deletes every section whose header line equals one of `headers`, together
/// with its ownership comment and the blank lines before it. A skipped section
/// ends at the next `[` line or the next ownership comment, which are kept.
pub fn remove_sections(content: &str, headers: &[String]) -> String {
    let normalized = content.replace("\r\n", "\n");
    let mut output: Vec<&str> = Vec::new();
    let mut state = ScanState::Copying;

    for line in normalized.lines() {
        let trimmed = line.trim();

        if state == ScanState::SkippingSection {
            if !(trimmed.starts_with('[') || is_owner_comment(trimmed)) {
                continue;
            }
            state = ScanState::Copying;
            if output.last().is_some_and(|last| !last.trim().is_empty()) {
                output.push("");
            }
        }

        if headers.iter().any(|header| header == trimmed) {
            if output.last().is_some_and(|last| is_owner_comment(last.trim())) {
                output.pop();
            }
            while output.last().is_some_and(|last| last.trim().is_empty()) {
                output.pop();
            }
            state = ScanState::SkippingSection;
            continue;
        }

        output.push(line);
    }

    let mut result = output.join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Collapses each run of blank lines to a single blank line and ends the text
/// with exactly one newline.
pub fn collapse_blank_lines(content: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in content.lines() {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        lines.push(if blank { "" } else { line });
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    let mut result = lines.join("\n");
    result.push('\n');
    result
}

fn is_owner_comment(line: &str) -> bool {
    line.starts_with(OWNER_COMMENT_PREFIX)
}

/// Quoted TOML string literal for `value`.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
