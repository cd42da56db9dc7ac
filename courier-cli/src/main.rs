//! Courier CLI: runs the demo API.
//!
//! ```bash
//! courier serve --port 3000
//! courier routes
//! ```
//!
//! See `courier --help` for all available commands and options.

mod commands;
mod demo;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "courier", about = "Courier request dispatch demo server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the demo API
    Serve {
        /// Configuration file (defaults to ./courier.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on (overrides the config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the demo route table in matching order
    Routes,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, host, port } => {
            commands::serve::run(config.as_deref(), host, port).await
        }
        Commands::Routes => commands::routes::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
