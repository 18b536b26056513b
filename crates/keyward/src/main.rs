// CLI for secret access management

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use keyward::config::DEFAULT_CONFIG_FILE;
use keyward::{
    AgeRecipient, FileStore, HostId, HostKeySource, KeyName, KeyOwner, Keyward, Settings, UserId,
};

#[derive(Parser)]
#[command(name = "keyward", version)]
#[command(about = "Keyward - who may decrypt which secrets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    paths: PathOverrides,
}

/// Overrides for the paths in the config file.
#[derive(Args)]
struct PathOverrides {
    /// Privilege declaration document
    #[arg(long, global = true)]
    privileges: Option<PathBuf>,

    /// Published SSH public keys
    #[arg(long, global = true)]
    public_keys: Option<PathBuf>,

    /// Key-access document (.sops.yaml)
    #[arg(long, global = true)]
    key_access: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive user keys and update every creation rule
    SyncUsers {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print effective privileges
    Resolve {
        /// Only this user
        #[arg(short, long)]
        user: Option<String>,

        /// Only this host
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the audit tables
    Audit,

    /// Key directory maintenance
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },

    /// Creation rule maintenance
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Add a host key and a rule for the host's secrets file
    EnrollHost {
        /// Host name
        host: String,

        /// Existing age recipient of the host
        #[arg(long, conflicts_with = "generate_identity", required_unless_present = "generate_identity")]
        recipient: Option<String>,

        /// Generate a new identity and write it to this file
        #[arg(long)]
        generate_identity: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum KeysCommand {
    /// List keys
    List {
        /// Only keys with this prefix (host_ or user_)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Add or replace a key
    Set {
        /// Key name (host_* or user_*)
        name: String,

        /// Age recipient
        recipient: String,

        /// Overwrite an existing key
        #[arg(long)]
        replace: bool,
    },

    /// Delete a key no rule uses
    Delete {
        /// Key name
        name: String,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List creation rules
    List,

    /// Create or replace a rule
    Set {
        /// Path pattern
        path_regex: String,

        /// Key names allowed to decrypt
        #[arg(required = true)]
        keys: Vec<String>,

        /// Overwrite an existing rule
        #[arg(long)]
        replace: bool,
    },

    /// Delete a rule
    Delete {
        /// Path pattern
        path_regex: String,
    },
}

#[derive(Serialize)]
struct KeyView<'a> {
    name: &'a KeyName,
    value: &'a str,
}

#[derive(Serialize)]
struct RuleView<'a> {
    path_regex: &'a str,
    keys: &'a [KeyName],
}

#[derive(Serialize)]
struct GrantView<'a> {
    user: &'a UserId,
    host: &'a HostId,
    #[serde(flatten)]
    grant: &'a keyward::policy::EffectiveGrant,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_owner(prefix: &str) -> anyhow::Result<KeyOwner> {
    match prefix.trim_end_matches('_') {
        "host" => Ok(KeyOwner::Host),
        "user" => Ok(KeyOwner::User),
        other => anyhow::bail!("unknown key prefix `{other}`, expected host_ or user_"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(path) = cli.paths.privileges {
        settings.paths.privileges = path;
    }
    if let Some(path) = cli.paths.public_keys {
        settings.paths.public_keys = path;
    }
    if let Some(path) = cli.paths.key_access {
        settings.paths.key_access = path;
    }

    let keyward: Keyward<FileStore> = Keyward::open(settings);

    match cli.command {
        Commands::SyncUsers { dry_run } => {
            let report = keyward.sync_users(dry_run).context("user sync failed")?;
            print_json(&report)?;
        }
        Commands::Resolve { user, host } => {
            let grants = keyward.resolve()?;
            let user = user.map(UserId::new);
            let host = host.map(HostId::new);
            let view: Vec<GrantView<'_>> = grants
                .iter()
                .filter(|(u, h, _)| {
                    user.as_ref().map_or(true, |want| want == *u)
                        && host.as_ref().map_or(true, |want| want == *h)
                })
                .map(|(user, host, grant)| GrantView { user, host, grant })
                .collect();
            print_json(&view)?;
        }
        Commands::Audit => {
            print_json(&keyward.audit()?)?;
        }
        Commands::Keys { command } => match command {
            KeysCommand::List { prefix } => {
                let owner = prefix.as_deref().map(parse_owner).transpose()?;
                let keys = keyward.list_keys(owner)?;
                let view: Vec<KeyView<'_>> = keys
                    .iter()
                    .map(|entry| KeyView {
                        name: entry.name(),
                        value: entry.value(),
                    })
                    .collect();
                print_json(&view)?;
            }
            KeysCommand::Set {
                name,
                recipient,
                replace,
            } => {
                let name = KeyName::parse(&name)?;
                let recipient = AgeRecipient::parse(&recipient)?;
                let outcome = keyward.set_key(name.clone(), &recipient, replace)?;
                tracing::info!(key = %name, ?outcome, "Key set");
            }
            KeysCommand::Delete { name } => {
                let name = KeyName::parse(&name)?;
                keyward.delete_key(&name)?;
                tracing::info!(key = %name, "Key deleted");
            }
        },
        Commands::Rules { command } => match command {
            RulesCommand::List => {
                let rules = keyward.list_rules()?;
                let view: Vec<RuleView<'_>> = rules
                    .iter()
                    .map(|rule| RuleView {
                        path_regex: rule.path_regex(),
                        keys: rule.keys(),
                    })
                    .collect();
                print_json(&view)?;
            }
            RulesCommand::Set {
                path_regex,
                keys,
                replace,
            } => {
                let keys = keys
                    .iter()
                    .map(|k| KeyName::parse(k))
                    .collect::<Result<Vec<_>, _>>()?;
                let outcome = keyward.set_rule(&path_regex, &keys, replace)?;
                tracing::info!(rule = %path_regex, ?outcome, "Rule set");
            }
            RulesCommand::Delete { path_regex } => {
                keyward.delete_rule(&path_regex)?;
                tracing::info!(rule = %path_regex, "Rule deleted");
            }
        },
        Commands::EnrollHost {
            host,
            recipient,
            generate_identity,
        } => {
            let source = match (recipient, generate_identity) {
                (Some(recipient), _) => HostKeySource::Recipient(AgeRecipient::parse(&recipient)?),
                (None, Some(path)) => HostKeySource::Generate(path),
                (None, None) => anyhow::bail!("either --recipient or --generate-identity is required"),
            };
            let report = keyward.enroll_host(&HostId::new(host), source)?;
            print_json(&report)?;
        }
    }

    Ok(())
}
