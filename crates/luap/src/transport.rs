// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Request parameter and raw output capability.
//!
//! The engine reads CGI-style parameters (`SCRIPT_NAME`, `QUERY_STRING`,
//! `HTTP_*` headers, ...) and emits the response as raw text through the
//! [`HttpTransport`] trait.
//!
//! # Implementations
//!
//! - [`MemoryTransport`]: parameters from a list, output captured in memory
//! - [`CgiTransport`]: parameters from the process environment, output to stdout

use std::io::Write;
use std::sync::Mutex;

use crate::error::Result;

/// Transport parameters exposed to pages through a generated accessor,
/// paired with the accessor's name.
pub const TRANSPORT_ACCESSORS: &[(&str, &str)] = &[
    ("GATEWAY_INTERFACE", "getGatewayInterface"),
    ("SERVER_SOFTWARE", "getServerSoftware"),
    ("QUERY_STRING", "getQueryString"),
    ("REQUEST_METHOD", "getRequestMethod"),
    ("CONTENT_TYPE", "getContentType"),
    ("CONTENT_LENGTH", "getContentLength"),
    ("SCRIPT_FILENAME", "getScriptFilename"),
    ("SCRIPT_NAME", "getScriptName"),
    ("REQUEST_URI", "getRequestUri"),
    ("DOCUMENT_URI", "getDocumentUri"),
    ("DOCUMENT_ROOT", "getDocumentRoot"),
    ("SERVER_PROTOCOL", "getServerProtocol"),
    ("REMOTE_ADDR", "getRemoteAddr"),
    ("REMOTE_PORT", "getRemotePort"),
    ("SERVER_ADDR", "getServerAddr"),
    ("SERVER_PORT", "getServerPort"),
    ("SERVER_NAME", "getServerName"),
];

/// Prefix of parameters carrying inbound HTTP headers.
pub const HEADER_PREFIX: &str = "HTTP_";

/// Host capability providing request parameters and raw output.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait HttpTransport: Send + Sync {
    /// Returns the parameter `name`, or `default` when it is not set.
    fn param(&self, name: &str, default: Option<&str>) -> Option<String>;

    /// Returns every parameter as a `name=value` entry.
    fn params(&self) -> Vec<String>;

    /// Emits raw response text.
    fn print(&self, text: &str) -> Result<()>;
}

/// Converts an `HTTP_X_CUSTOM_ID` style parameter name to `X-Custom-Id`.
///
/// Returns `None` for parameters that do not carry a header.
pub fn header_name(param: &str) -> Option<String> {
    let raw = param.strip_prefix(HEADER_PREFIX)?;
    let mut name = String::with_capacity(raw.len());
    let mut segment_start = true;
    for c in raw.chars() {
        if c == '_' || c == '-' {
            name.push('-');
            segment_start = true;
        } else if segment_start {
            name.push(c);
            segment_start = false;
        } else {
            name.extend(c.to_lowercase());
        }
    }
    Some(name)
}

/// Converts a header name such as `X-Custom-Id` to its `HTTP_X_CUSTOM_ID` parameter.
pub fn header_param(header: &str) -> String {
    format!("{}{}", HEADER_PREFIX, header.replace('-', "_").to_uppercase())
}

/// [`HttpTransport`] over an explicit parameter list, capturing output.
///
/// Used by the development server and by tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    params: Vec<(String, String)>,
    output: Mutex<String>,
}

impl MemoryTransport {
    /// Creates a transport with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Sets (or replaces) a parameter in place.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name, value)),
        }
    }

    /// Returns everything printed so far.
    pub fn output(&self) -> String {
        self.output
            .lock()
            .map(|out| out.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl HttpTransport for MemoryTransport {
    fn param(&self, name: &str, default: Option<&str>) -> Option<String> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .or_else(|| default.map(str::to_string))
    }

    fn params(&self) -> Vec<String> {
        self.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    fn print(&self, text: &str) -> Result<()> {
        let mut out = self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.push_str(text);
        Ok(())
    }
}

/// [`HttpTransport`] for CGI execution: process environment in, stdout out.
#[derive(Debug, Default)]
pub struct CgiTransport;

impl CgiTransport {
    /// Creates a CGI transport.
    pub fn new() -> Self {
        Self
    }
}

impl HttpTransport for CgiTransport {
    fn param(&self, name: &str, default: Option<&str>) -> Option<String> {
        std::env::var(name).ok().or_else(|| default.map(str::to_string))
    }

    fn params(&self) -> Vec<String> {
        std::env::vars().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    fn print(&self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
