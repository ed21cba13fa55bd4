// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

//! # LUAP
//!
//! Server-side page templating and request dispatch for Rust, with Lua as
//! the page language.
//!
//! Pages are HTML files with embedded script blocks (`<?js ... ?>`) and
//! expression blocks (`<?= ... ?>`). They are compiled to Lua chunks,
//! cached on disk next to the site, and executed once per request with a
//! small set of page primitives (`echo`, `include`, `setHeader`, ...).
//!
//! ## Features
//!
//! - Template compiler with an mtime-validated compiled page cache
//! - Request handlers keyed by PascalCased path segments
//! - Page roots and resolver functions per URL prefix
//! - Nested includes with `includeOnce` and `exit()`
//! - CGI-style response emission through a pluggable transport
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use luap::{CgiTransport, Engine, EngineConfig};
//!
//! let engine = Engine::with_local_store(EngineConfig::new("./site"))?;
//! engine.handle_request(Arc::new(CgiTransport::new()))?;
//! ```

/// Compiled page caching.
pub mod cache;
/// Template compiler.
pub mod compiler;
/// Per-request dispatch.
pub mod dispatcher;
/// Main page engine.
pub mod engine;
/// Scoped page primitives.
pub mod environment;
/// Error types.
pub mod error;
/// Lua runtime extensions.
pub mod extensions;
/// Include frame tracking.
pub mod include;
/// Request and response state.
pub mod request;
/// File storage capability.
pub mod store;
/// HTTP transport capability.
pub mod transport;

pub use cache::CompiledPageCache;
pub use compiler::{compile, parse, CompiledUnit, Fragment};
pub use dispatcher::{handler_keys, html_escape, RequestDispatcher};
pub use engine::{
    Engine, EngineConfig, ErrorHandler, Next, PageResolver, PageRoot, RequestController,
    RequestHandler, DEFAULT_PAGE,
};
pub use environment::{EnvGuard, PageBindings, PageEnvironment, PAGE_PRIMITIVES};
pub use error::{ExitSignal, LuapError, Result};
pub use include::IncludeStack;
pub use request::{Headers, Request};
pub use store::{FileStore, LocalFileStore, MemoryFileStore};
pub use transport::{CgiTransport, HttpTransport, MemoryTransport, TRANSPORT_ACCESSORS};
