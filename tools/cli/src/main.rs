//! drivetool CLI - Google Drive tools for shells and agents.
//!
//! Every subcommand shares one authorizer, so a stored grant is reused and
//! refreshed in place. `serve` exposes the same tools over stdio JSON-RPC.

mod exit;
mod protocol;
mod serve;
mod source;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use drivetool_storage::gdrive::DriveSettings;
use drivetool_tools::{drive_tools, ToolOutcome, ToolRegistry};

use source::DriveSource;

#[derive(Parser)]
#[command(name = "drivetool")]
#[command(about = "drivetool - Google Drive file tools")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// OAuth client secrets file.
    #[arg(long, env = "DRIVETOOL_CREDENTIALS", global = true)]
    credentials: Option<PathBuf>,

    /// Where the authorization grant is stored.
    #[arg(long, env = "DRIVETOOL_TOKEN", global = true)]
    token: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize access, reusing a stored grant when possible.
    Auth {
        /// Forget the stored grant and authorize again.
        #[arg(long)]
        reset: bool,
    },

    /// List recent files.
    List {
        /// Number of files to return (max 100).
        #[arg(short = 'n', long, default_value_t = 10, allow_negative_numbers = true)]
        page_size: i64,
    },

    /// Upload a local file.
    Upload {
        /// File to upload.
        path: PathBuf,

        /// Folder ID to upload into (default: root).
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Create a folder.
    Mkdir {
        /// Folder name.
        name: String,

        /// Parent folder ID (default: root).
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Print the tool descriptions as JSON.
    Tools,

    /// Serve the tools as JSON-RPC over stdin/stdout.
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit::for_error(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    // Logs go to stderr; stdout carries tool output and protocol messages.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = load_settings(cli.credentials, cli.token)?;
    let max_page_size = settings.max_page_size;
    let source = Arc::new(DriveSource::new(settings));
    let registry = drive_tools(source.clone(), max_page_size)?;

    match cli.command {
        Commands::Auth { reset } => cmd_auth(&source, reset).await,

        Commands::List { page_size } => {
            cmd_tool(&registry, "list_drive_files", json!({"page_size": page_size})).await
        }

        Commands::Upload { path, parent } => {
            let args = json!({
                "file_path": path.to_string_lossy(),
                "folder_id": parent.unwrap_or_default()
            });
            cmd_tool(&registry, "upload_to_drive", args).await
        }

        Commands::Mkdir { name, parent } => {
            let args = json!({
                "folder_name": name,
                "parent_id": parent.unwrap_or_default()
            });
            cmd_tool(&registry, "create_drive_folder", args).await
        }

        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&registry.descriptors())?);
            Ok(exit::SUCCESS)
        }

        Commands::Serve => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            serve::serve(&registry, stdin, tokio::io::stdout()).await?;
            Ok(exit::SUCCESS)
        }
    }
}

fn load_settings(credentials: Option<PathBuf>, token: Option<PathBuf>) -> Result<DriveSettings> {
    let mut settings = DriveSettings::new().context("Failed to resolve settings")?;
    if let Some(path) = credentials {
        settings = settings.with_client_secrets(path);
    }
    if let Some(path) = token {
        settings = settings.with_token_path(path);
    }
    Ok(settings)
}

/// Authorize and report the active grant.
async fn cmd_auth(source: &DriveSource, reset: bool) -> Result<u8> {
    let authorizer = source.authorizer().await?;

    if reset && authorizer.reset().await.context("Failed to remove stored grant")? {
        info!("Removed stored grant");
    }

    let grant = authorizer.obtain().await.context("Authorization failed")?;

    println!("Authorized.");
    println!("  Client secrets: {}", source.settings().client_secrets_path.display());
    println!("  Token file: {}", authorizer.store().path().display());
    println!("  Valid until: {}", grant.expiry.to_rfc3339());
    println!(
        "  Scopes: {}",
        grant.scopes.iter().cloned().collect::<Vec<_>>().join(" ")
    );

    Ok(exit::SUCCESS)
}

/// Run one tool and print its outcome.
async fn cmd_tool(registry: &ToolRegistry, name: &str, args: serde_json::Value) -> Result<u8> {
    let outcome = registry.call(name, &args).await;
    match &outcome {
        ToolOutcome::Success { .. } => {
            println!("{}", outcome.render());
            Ok(exit::SUCCESS)
        }
        ToolOutcome::Failure { kind, .. } => {
            eprintln!("{}", outcome.render());
            Ok(exit::for_kind(*kind))
        }
    }
}
