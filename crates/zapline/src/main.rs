// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapline - a multi-tenant WhatsApp auto-reply gateway.
//!
//! This is the binary entry point.

use clap::{Parser, Subcommand};

mod driver;
mod serve;

/// Zapline - a multi-tenant WhatsApp auto-reply gateway.
#[derive(Parser, Debug)]
#[command(name = "zapline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway: restore sessions, serve the operator API.
    Serve,
    /// Print the effective configuration after file and env merging.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match zapline_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            zapline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("zapline serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("failed to render config: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("zapline: use --help for available commands");
        }
    }
}
