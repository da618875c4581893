//! dombind CLI
//!
//! Command-line client for dombind - keeps a page in sync with its server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::connect::ConnectArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "dombind")]
#[command(about = "dombind - Client for server-driven UI trees")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and sync a page
    Connect {
        /// Read the initial page from a file instead of fetching it
        #[arg(long)]
        page: Option<PathBuf>,
        /// Server URL (ws:// or wss://)
        #[arg(long)]
        url: Option<String>,
        /// Document path on the server
        #[arg(long)]
        path: Option<String>,
        /// Root reference to synchronize
        #[arg(long = "ref")]
        root_ref: Option<String>,
        /// Print the final document on exit
        #[arg(long)]
        dump: bool,
    },
    /// Apply JSON-lines changes to a page offline
    Apply {
        /// Page to start from
        #[arg(long)]
        page: PathBuf,
        /// Changes file (stdin if omitted)
        changes: Option<PathBuf>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file path
    Path,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, path, root_ref, reconnect_initial_ms, reconnect_max_ms)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    init_logging();

    match cli.command {
        Commands::Connect {
            page,
            url,
            path,
            root_ref,
            dump,
        } => {
            let args = ConnectArgs {
                page,
                url,
                path,
                root_ref,
                dump,
            };
            commands::connect::connect(args, &output).await
        }
        Commands::Apply { page, changes } => commands::apply::apply(page, changes, &output),
        Commands::Config { command } => handle_config_command(command, &output),
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Path) => commands::config::path(),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Log to stderr, filtered by RUST_LOG
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dombind_core=info,dombind_cli=info"));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
