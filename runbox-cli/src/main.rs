//! Runbox CLI — sign in to the sandbox service and call sandbox tools.

mod commands;
mod prompt;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Runbox: sandboxed Python and Bash execution for agents
#[derive(Parser, Debug)]
#[command(name = "runbox", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage sandbox authentication
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// List the sandbox tools and their parameters
    Tools {
        /// Print full definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Invoke one sandbox tool
    Call {
        /// Tool name (e.g. sandbox_execute)
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
        /// Call identifier passed to the tool
        #[arg(long)]
        call_id: Option<String>,
        /// Print the full { content, details } result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum AuthAction {
    /// Sign in with the OAuth browser flow
    Login {
        /// Headless mode: print the URL and paste the redirect back instead of
        /// listening on the local callback port
        #[arg(long)]
        remote: bool,
    },
    /// Show which credential tool calls would use
    Status,
    /// Refresh the stored access token now
    Refresh,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show where configuration files are read from
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "runbox", "runbox")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "runbox.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
