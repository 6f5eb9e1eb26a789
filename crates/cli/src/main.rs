//! Taconite CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive chat (default when no command is given)
//! - `ask`    — Send a single message and print the reply
//! - `serve`  — Start the REST API server
//! - `saved`  — List saved conversations
//! - `init`   — Write the default config file

use clap::{Parser, Subcommand};

mod commands;
mod input;
mod render;
mod repl;

#[derive(Parser)]
#[command(
    name = "taconite",
    about = "Taconite — terminal chat client for Ollama",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively
    Chat,

    /// Ask a single question
    Ask {
        /// The message to send
        message: String,

        /// Wait for the whole reply instead of streaming it
        #[arg(short, long)]
        batch: bool,
    },

    /// Start the REST API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List saved conversations
    Saved,

    /// Write the default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing. Logs go to stderr; stdout belongs to the chat.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run().await?,
        Commands::Ask { message, batch } => commands::ask::run(message, batch).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Saved => commands::saved::run().await?,
        Commands::Init => commands::init::run().await?,
    }

    Ok(())
}
