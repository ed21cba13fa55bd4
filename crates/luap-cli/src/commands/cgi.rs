// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CGI request command.
//!
//! Handles exactly one request: parameters come from the process
//! environment and the response is written to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use luap::CgiTransport;

use crate::config::Config;

/// Handles the request described by the environment.
///
/// The site root is `root` when given, otherwise the current directory.
pub fn run(root: Option<PathBuf>) -> anyhow::Result<()> {
    let site_root = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let config = Config::load_from(&site_root)?;
    let engine = config.build_engine(&site_root)?;
    engine.handle_request(Arc::new(CgiTransport::new()))?;
    Ok(())
}
