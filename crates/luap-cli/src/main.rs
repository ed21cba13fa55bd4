// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use luap_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luap")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Lua server pages over HTTP or CGI", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the site in the current directory over HTTP
    Serve {
        /// Port to run the server on (default: from luap.toml)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: from luap.toml)
        #[arg(long)]
        host: Option<String>,
    },
    /// Handle one request from the CGI environment
    Cgi {
        /// Site root (defaults to the current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Precompile pages into the page cache
    Compile {
        /// Pages to compile (defaults to every page)
        pages: Vec<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs go to stderr: stdout carries the CGI response.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(host, port).await,
        Commands::Cgi { root } => commands::cgi::run(root),
        Commands::Compile { pages, json } => commands::compile::run(pages, json),
    }
}
