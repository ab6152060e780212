//! kforward CLI
//!
//! Runs local TCP port forwards into Kubernetes pods and services:
//! - `run` starts every forward of a template file
//! - `forward` starts a single ad-hoc forward
//! - `templates` and `config` inspect local files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kforward::cluster::ClusterArgs;
use kforward::commands;
use kf_core::config;

#[derive(Parser)]
#[command(name = "kforward")]
#[command(author, version, about = "Kubernetes port-forward manager")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every forward of a template and keep them running
    Run {
        /// Template file path, or a template name from the templates directory
        template: String,
        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Forward a local port to a pod or service port
    Forward {
        /// Target resource: pod/NAME, svc/NAME or a bare pod name
        target: String,
        /// Ports as LOCAL:REMOTE, :REMOTE (any local port) or PORT
        ports: String,
        /// Display name for the forward (defaults to the resource name)
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Inspect forward templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TemplatesAction {
    /// List templates in the templates directory
    List {
        /// Templates directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Show the forwards of one template
    Show {
        /// Template file path or name
        template: String,
        /// Templates directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config directory path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run { template, cluster } => {
            let config_file = load_config_file(config_path)?;
            let cluster = cluster.connection_info()?;
            commands::run_command(
                &template,
                &config_file.templates_dir,
                cluster,
                config_file.forward,
            )
            .await?;
        }

        Commands::Forward {
            target,
            ports,
            name,
            cluster,
        } => {
            let config_file = load_config_file(config_path)?;
            let cluster = cluster.connection_info()?;
            commands::forward_command(
                &target,
                &ports,
                name.as_deref(),
                cluster,
                config_file.forward,
            )
            .await?;
        }

        Commands::Templates { action } => match action {
            TemplatesAction::List { dir } => {
                let dir = templates_dir(config_path, dir)?;
                commands::templates_list(&dir)?;
            }
            TemplatesAction::Show { template, dir } => {
                let dir = templates_dir(config_path, dir)?;
                commands::templates_show(&template, &dir)?;
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Path => commands::config_path(),
            ConfigAction::Init { force } => commands::config_init(config_path, force)?,
        },
    }

    Ok(())
}

fn load_config_file(path: Option<&std::path::Path>) -> Result<config::ConfigFile> {
    config::load_or_default(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load default config".to_string(),
    })
}

fn templates_dir(config_path: Option<&std::path::Path>, dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(load_config_file(config_path)?.templates_dir),
    }
}
