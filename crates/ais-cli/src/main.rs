use ais_core::validation::parse_env_assignment;
use ais_core::{
    AccountDraft, AccountKind, AccountType, AisEngine, CcrConfig, CodexAuthMode, CodexSettings,
    McpScope, McpServerDefinition, McpTransport, ModelGroup, ModelGroups, ProjectionReport,
    RouterSettings, SimpleModel, WireApi,
};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ais")]
#[command(about = "Per-project account switching for AI coding assistants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or replace an account.
    Add(AddAccount),
    Remove {
        name: String,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Show {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Bind an account to the project and write its tool config.
    Use {
        name: String,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Re-project the bound account.
    Apply {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    Current {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    Paths,
}

#[derive(Args, Debug)]
struct AddAccount {
    name: String,
    #[arg(long = "type", default_value = "claude")]
    account_type: String,
    #[arg(long = "key")]
    api_key: String,
    #[arg(long = "url")]
    api_url: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Extra environment variable, `KEY=VALUE`; repeatable.
    #[arg(long = "env")]
    env: Vec<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long = "wire-api", default_value = "responses")]
    wire_api: String,
    #[arg(long = "auth-mode", default_value = "http_headers")]
    auth_mode: String,
    #[arg(long = "env-key")]
    env_key: Option<String>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long = "models", value_delimiter = ',')]
    models: Vec<String>,
    #[arg(long = "default-model")]
    default_model: Option<String>,
    #[arg(long = "background-model")]
    background_model: Option<String>,
    #[arg(long = "think-model")]
    think_model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum GroupCommands {
    Add {
        account: String,
        group: String,
        /// Model role, `ROLE=MODEL`; repeatable.
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    Use {
        account: String,
        group: String,
    },
    Remove {
        account: String,
        group: String,
    },
}

#[derive(Subcommand, Debug)]
enum McpCommands {
    Add(AddServer),
    Remove {
        name: String,
        /// Remove the definition stored in the project binding.
        #[arg(long)]
        project: bool,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Enable {
        name: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    Disable {
        name: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    Sync {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct AddServer {
    name: String,
    #[arg(long, default_value = "stdio")]
    transport: String,
    #[arg(long)]
    command: Option<String>,
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long = "env")]
    env: Vec<String>,
    #[arg(long = "header")]
    headers: Vec<String>,
    #[arg(long, default_value = "local")]
    scope: String,
    #[arg(long)]
    description: Option<String>,
    /// Store the definition in the project binding instead of the global store.
    #[arg(long)]
    project: bool,
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let engine = AisEngine::current();
    debug!(store = %engine.paths().store_path.display(), "using global store");

    match cli.command {
        Commands::Add(args) => {
            let name = args.name.clone();
            let draft = account_draft(args)?;
            let account = engine.store().upsert_account(&name, draft)?;
            println!(
                "saved {} (id={}, type={})",
                account.name,
                account.id,
                account.account_type().as_str()
            );
        }
        Commands::Remove { name } => {
            let removed = engine.store().remove_account(&name)?;
            println!("removed {}", removed.name);
        }
        Commands::List { json } => {
            let accounts = engine.store().list_accounts();
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else {
                for account in accounts {
                    println!(
                        "{}\t{}\t{}\t{}",
                        account.id,
                        account.name,
                        account.account_type().as_str(),
                        account.base_url().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Show { name, json } => {
            let mut account = engine
                .store()
                .get_account(&name)
                .ok_or_else(|| anyhow!("account not found: {name}"))?;
            account.api_key = mask_secret(&account.api_key);
            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                println!("name={}", account.name);
                println!("id={}", account.id);
                println!("type={}", account.account_type().as_str());
                println!("key={}", account.api_key);
                println!("url={}", account.base_url().unwrap_or("-"));
                if let Some(groups) = account.kind.model_groups() {
                    for (group, roles) in &groups.model_groups {
                        let active = groups.active_model_group.as_deref() == Some(group.as_str());
                        let marker = if active { "*" } else { " " };
                        println!("group{marker} {group} {}", format_roles(roles));
                    }
                }
                for key in account.custom_env.keys() {
                    println!("env {key}");
                }
            }
        }
        Commands::Use { name, dir, json } => {
            let report = engine.use_account(&name, &working_dir(dir)?)?;
            print_report(&report, json)?;
        }
        Commands::Apply { dir, json } => {
            let report = engine.apply(&working_dir(dir)?)?;
            print_report(&report, json)?;
        }
        Commands::Current { dir, json } => {
            let dir = working_dir(dir)?;
            let Some(mut resolved) = engine.current_project(&dir) else {
                if json {
                    println!("null");
                } else {
                    println!("no account bound at {}", dir.display());
                }
                return Ok(());
            };
            resolved.account.api_key = mask_secret(&resolved.account.api_key);
            if json {
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            } else {
                println!("account={}", resolved.account.name);
                println!("type={}", resolved.account.account_type().as_str());
                println!("project={}", resolved.project_root.display());
                println!("since={}", resolved.binding.set_at);
                println!("mcp={}", resolved.binding.enabled_mcp_servers.join(","));
            }
        }
        Commands::Group { command } => match command {
            GroupCommands::Add {
                account,
                group,
                roles,
            } => {
                let roles = parse_assignments(&roles)?;
                engine.store().add_model_group(&account, &group, roles)?;
                println!("group {group} saved on {account}");
            }
            GroupCommands::Use { account, group } => {
                engine.store().set_active_model_group(&account, &group)?;
                println!("group {group} active on {account}");
            }
            GroupCommands::Remove { account, group } => {
                let updated = engine.store().remove_model_group(&account, &group)?;
                let active = updated
                    .kind
                    .model_groups()
                    .and_then(|groups| groups.active_model_group.clone())
                    .unwrap_or_else(|| String::from("-"));
                println!("group {group} removed from {account}; active={active}");
            }
        },
        Commands::Mcp { command } => match command {
            McpCommands::Add(args) => {
                let project = args.project;
                let dir = args.dir.clone();
                let definition = server_definition(args)?;
                if project {
                    let binding = engine.add_project_server(&working_dir(dir)?, definition)?;
                    println!(
                        "project server saved in {}; enabled={}",
                        binding.project_path,
                        binding.enabled_mcp_servers.join(",")
                    );
                } else {
                    let stored = engine.store().upsert_server(definition)?;
                    println!("mcp server {} saved ({})", stored.name, stored.scope.as_str());
                }
            }
            McpCommands::Remove { name, project, dir } => {
                if project {
                    engine.remove_project_server(&working_dir(dir)?, &name)?;
                } else {
                    engine.store().remove_server(&name)?;
                }
                println!("mcp server {name} removed");
            }
            McpCommands::List { json } => {
                let servers = engine.store().list_servers();
                if json {
                    println!("{}", serde_json::to_string_pretty(&servers)?);
                } else {
                    for server in servers {
                        let target = server
                            .url
                            .clone()
                            .or_else(|| server.command.clone())
                            .unwrap_or_default();
                        println!(
                            "{}\t{}\t{}\t{}",
                            server.name,
                            server.transport.as_str(),
                            server.scope.as_str(),
                            target
                        );
                    }
                }
            }
            McpCommands::Enable { name, dir } => {
                let binding = engine.enable_server(&working_dir(dir)?, &name)?;
                println!("enabled: {}", binding.enabled_mcp_servers.join(","));
            }
            McpCommands::Disable { name, dir } => {
                let binding = engine.disable_server(&working_dir(dir)?, &name)?;
                println!("enabled: {}", binding.enabled_mcp_servers.join(","));
            }
            McpCommands::Sync { dir, json } => {
                let report = engine.sync_mcp(&working_dir(dir)?)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    for item in &report.import.imported {
                        println!("imported {} from {}", item.name, item.source.as_str());
                    }
                    match &report.export {
                        Some(export) if export.removed => {
                            println!("removed {}", export.path.display())
                        }
                        Some(export) => println!(
                            "wrote {} ({} servers)",
                            export.path.display(),
                            export.servers.len()
                        ),
                        None => println!("no project binding; export skipped"),
                    }
                    for warning in &report.import.warnings {
                        eprintln!("warning: {warning}");
                    }
                }
            }
        },
        Commands::Paths => {
            let paths = engine.paths();
            println!("home={}", paths.home_directory.display());
            println!("store={}", paths.store_path.display());
            println!("claude_user={}", paths.claude_user_config_path().display());
            println!("codex={}", paths.codex_config_path().display());
            println!("codex_auth={}", paths.codex_auth_path().display());
            println!("ccr={}", paths.ccr_config_path().display());
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("AIS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

fn working_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("failed to read current directory"),
    }
}

fn account_draft(args: AddAccount) -> Result<AccountDraft> {
    let account_type = args
        .account_type
        .parse::<AccountType>()
        .map_err(anyhow::Error::msg)?;
    let kind = match account_type {
        AccountType::Claude => AccountKind::Claude(ModelGroups::default()),
        AccountType::Other => AccountKind::Other(ModelGroups::default()),
        AccountType::Codex => AccountKind::Codex(CodexSettings {
            model: args.model,
            wire_api: args.wire_api.parse::<WireApi>().map_err(anyhow::Error::msg)?,
            auth_mode: args
                .auth_mode
                .parse::<CodexAuthMode>()
                .map_err(anyhow::Error::msg)?,
            env_key: args.env_key,
        }),
        AccountType::Droids => AccountKind::Droids(SimpleModel { model: args.model }),
        AccountType::Ccr => AccountKind::Ccr(RouterSettings {
            ccr_config: CcrConfig {
                provider_name: args.provider.unwrap_or_default(),
                models: args.models,
                default_model: args.default_model.unwrap_or_default(),
                background_model: args.background_model.unwrap_or_default(),
                think_model: args.think_model.unwrap_or_default(),
            },
        }),
    };

    let mut draft = AccountDraft::new(kind, args.api_key);
    draft.api_url = args.api_url;
    draft.email = args.email;
    draft.description = args.description;
    draft.custom_env = parse_assignments(&args.env)?;
    Ok(draft)
}

fn server_definition(args: AddServer) -> Result<McpServerDefinition> {
    let transport = args
        .transport
        .parse::<McpTransport>()
        .map_err(anyhow::Error::msg)?;
    let scope = args.scope.parse::<McpScope>().map_err(anyhow::Error::msg)?;
    Ok(McpServerDefinition {
        name: args.name,
        transport,
        command: args.command,
        args: args.args,
        env: parse_assignments(&args.env)?,
        url: args.url,
        headers: parse_headers(&args.headers)?,
        description: args.description,
        scope,
        ..McpServerDefinition::default()
    })
}

fn parse_assignments(raw: &[String]) -> Result<ModelGroup> {
    raw.iter()
        .map(|item| parse_env_assignment(item).map_err(anyhow::Error::from))
        .collect()
}

/// Header names are free-form, so only the `NAME=VALUE` shape is checked.
fn parse_headers(raw: &[String]) -> Result<ModelGroup> {
    raw.iter()
        .map(|item| {
            item.split_once('=')
                .map(|(name, value)| (name.trim().to_string(), value.to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| anyhow!("header must look like NAME=VALUE: {item}"))
        })
        .collect()
}

fn print_report(report: &ProjectionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{} ({}) -> {}",
        report.account,
        report.account_type.as_str(),
        report.project_root.display()
    );
    for path in &report.written {
        println!("  wrote {}", path.display());
    }
    if !report.mcp_servers.is_empty() {
        println!("  mcp: {}", report.mcp_servers.join(", "));
    }
    for note in &report.notes {
        println!("  {note}");
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn format_roles(roles: &ModelGroup) -> String {
    roles
        .iter()
        .map(|(role, model)| format!("{role}={model}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        return String::from("****");
    }
    format!("****{visible}")
}
