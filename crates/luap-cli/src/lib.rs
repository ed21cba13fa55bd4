// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! LUAP CLI library.
//!
//! This crate provides the command-line interface for the LUAP page engine.
//! It serves a site over HTTP, runs a single request as a CGI program, or
//! precompiles pages into the page cache.
//!
//! # Usage
//!
//! This crate is primarily used through the `luap` binary:
//!
//! ```bash
//! luap serve      # Serve the site over HTTP
//! luap cgi        # Handle one request from the CGI environment
//! luap compile    # Precompile pages into the cache
//! ```
//!
//! # Configuration
//!
//! Sites are configured via `luap.toml` at the site root.

/// CLI commands (serve, cgi, compile).
pub mod commands;
/// Site configuration from `luap.toml`.
pub mod config;
/// HTTP server adapter.
pub mod server;
