// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server components.
//!
//! The server is a thin adapter: each HTTP request becomes a CGI-style
//! parameter set, the engine writes its wire response into memory, and the
//! adapter turns that back into an HTTP response.

/// HTTP server implementation using Axum.
pub mod http;
