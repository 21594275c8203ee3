//! CLI surface for the serverless management layer.
//!
//! Clap-derived types plus dispatch. The commands here are thin: each
//! resolves a `ServerlessService` and delegates; all real logic lives
//! under `core`.

use crate::core::error::ServerlessError;
use crate::core::namespaces::HttpControlPlane;
use crate::core::service::ServerlessService;
use crate::core::status::InstallState;
use clap::{Parser, Subcommand};
use colored::Colorize;
use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "doctl-serverless",
    version = env!("CARGO_PKG_VERSION"),
    about = "Install, connect, and drive the local serverless toolchain"
)]
struct Cli {
    /// Control-plane access token.
    #[clap(long, env = "DIGITALOCEAN_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,
    /// Control-plane API base URL.
    #[clap(long, env = "DIGITALOCEAN_API_URL", default_value = "https://api.digitalocean.com")]
    api_url: String,
    /// Toolchain install root (defaults to the doctl config area).
    #[clap(long)]
    serverless_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the serverless toolchain
    Install,
    /// Upgrade the serverless toolchain to the required version
    Upgrade,
    /// Report the state of the local install
    Status,
    /// Connect to a functions namespace and cache its credentials
    Connect {
        /// Namespace name; when omitted, the namespace assigned to the
        /// access token is used.
        name: Option<String>,
    },
    /// Operate on functions namespaces
    Namespaces {
        #[clap(subcommand)]
        command: NamespacesCommand,
    },
    /// Run a toolchain action and print its structured envelope
    Exec {
        action: String,
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a toolchain action with pass-through output
    Stream {
        action: String,
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Show the runtime catalog of an API host
    HostInfo {
        /// API host; defaults to the connected namespace's host.
        host: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum NamespacesCommand {
    /// List namespaces visible to the access token
    List,
    /// Create a namespace and cache its credentials
    Create {
        #[clap(long)]
        label: String,
        #[clap(long)]
        region: String,
    },
    /// Delete a namespace (the local credential cache is untouched)
    Delete { name: String },
}

pub fn run() -> Result<(), ServerlessError> {
    let cli = Cli::parse();
    let usual_dir = match &cli.serverless_dir {
        Some(dir) => dir.clone(),
        None => default_serverless_dir()?,
    };
    let leaf = token_leaf(&cli.access_token);
    let control_plane = HttpControlPlane::new(&cli.api_url, &cli.access_token);
    let service = ServerlessService::new(Box::new(control_plane), &usual_dir, &leaf);

    match cli.command {
        Command::Install => {
            if service.install_state() != InstallState::Absent {
                println!("Serverless support is already installed");
                return Ok(());
            }
            service.install_serverless(false)
        }
        Command::Upgrade => match service.install_state() {
            InstallState::Absent => Err(ServerlessError::NotInstalled),
            _ => service.install_serverless(true),
        },
        Command::Status => {
            match service.check_serverless_status() {
                Ok(()) => println!(
                    "{}",
                    "Serverless support is installed and connected".green()
                ),
                Err(
                    err @ (ServerlessError::NotInstalled
                    | ServerlessError::NeedsUpgrade
                    | ServerlessError::NotConnected),
                ) => println!("{}", err),
                Err(err) => return Err(err),
            }
            Ok(())
        }
        Command::Connect { name } => {
            // Connecting only needs an installed, current toolchain.
            match service.install_state() {
                InstallState::Absent => return Err(ServerlessError::NotInstalled),
                InstallState::Stale => return Err(ServerlessError::NeedsUpgrade),
                _ => {}
            }
            let creds = match name {
                Some(name) => service.get_namespace(&name)?,
                None => service.get_serverless_namespace()?,
            };
            let namespace = creds.namespace.clone();
            let host = creds.api_host.clone();
            service.write_credentials(creds)?;
            println!("Connected to namespace '{}' on {}", namespace.bold(), host);
            Ok(())
        }
        Command::Namespaces { command } => match command {
            NamespacesCommand::List => {
                let list = service.list_namespaces()?;
                for ns in list.namespaces {
                    println!("{}\t{}\t{}\t{}", ns.namespace, ns.region, ns.label, ns.api_host);
                }
                Ok(())
            }
            NamespacesCommand::Create { label, region } => {
                let creds = service.create_namespace(&label, &region)?;
                let namespace = creds.namespace.clone();
                service.write_credentials(creds)?;
                println!("Created and connected to namespace '{}'", namespace.bold());
                Ok(())
            }
            NamespacesCommand::Delete { name } => {
                service.delete_namespace(&name)?;
                println!("Deleted namespace '{}'", name);
                Ok(())
            }
        },
        Command::Exec { action, args } => {
            service.check_serverless_status()?;
            let output = service.exec(&mut service.cmd(&action, &args))?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Stream { action, args } => {
            service.check_serverless_status()?;
            service.stream(&mut service.cmd(&action, &args))
        }
        Command::HostInfo { host } => {
            let host = match host {
                Some(host) => host,
                None => service.get_connected_api_host()?,
            };
            let info = service.get_host_info(&host)?;
            for (kind, runtimes) in info.runtimes {
                let kinds: Vec<_> = runtimes.iter().map(|r| r.kind.as_str()).collect();
                println!("{}: {}", kind.bold(), kinds.join(", "));
            }
            Ok(())
        }
    }
}

/// The usual toolchain root: `<config home>/doctl/sandbox`.
fn default_serverless_dir() -> Result<PathBuf, ServerlessError> {
    let config_home = match env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = env::var("HOME")
                .map_err(|_| ServerlessError::Path("HOME is not set".to_string()))?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(config_home.join("doctl").join("sandbox"))
}

/// Token-scoped leaf directory name: a short digest prefix of the
/// access token, so credential caches separate per identity without
/// writing token material into the filesystem.
fn token_leaf(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}
