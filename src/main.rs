use clap::{Parser, Subcommand};
use iamship::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "iamship")]
#[command(about = "Ships GCP IAM audit logs to Azure Log Analytics", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ship everything logged since the stored cursor, then exit
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[derive(Subcommand)]
enum CursorAction {
    Show,
    /// Overwrite the cursor with an RFC 3339 timestamp
    Set { timestamp: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iamship=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            iamship::cli::run::run(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                iamship::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                iamship::cli::config::validate(config_path)?;
            }
        },
        Some(Commands::Cursor { action }) => match action {
            CursorAction::Show => {
                iamship::cli::cursor::show(config_path).await?;
            }
            CursorAction::Set { timestamp } => {
                iamship::cli::cursor::set(config_path, &timestamp).await?;
            }
        },
    }

    Ok(())
}
