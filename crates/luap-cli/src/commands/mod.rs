// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `serve`: Serve the site over HTTP
//! - `cgi`: Handle the request described by the process environment
//! - `compile`: Precompile pages into the page cache

/// CGI request command.
pub mod cgi;
/// Page precompilation command.
pub mod compile;
/// HTTP server command.
pub mod serve;
