// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server command.
//!
//! Serves the site in the current directory. Pages are compiled on first
//! request and recompiled whenever their source changes.

use std::sync::Arc;

use console::style;

use crate::config::Config;
use crate::server::http::{create_server, AppState};

/// Runs the server. Flags override the configured host and port.
pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let site_root = std::env::current_dir()?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let engine = config.build_engine(&site_root)?;
    println!("{}", style("Starting luap server...").cyan().bold());
    println!("{} {}", style("Pages:").dim(), engine.pages_dir().display());
    println!("{} {}", style("Cache:").dim(), engine.cache_dir().display());
    for root in engine.page_roots() {
        println!("  /{} {}", root.prefix(), style("(page root)").dim());
    }

    let state = Arc::new(AppState::new(
        engine,
        host.clone(),
        port,
        config.static_dir(&site_root),
    ));

    let addr = format!("{}:{}", host, port);
    println!();
    println!(
        "{} {}",
        style("Server running at").green().bold(),
        style(format!("http://{}", addr)).cyan().underlined()
    );
    println!("{}", style("Press Ctrl+C to stop").dim());

    create_server(&addr, state).await
}
