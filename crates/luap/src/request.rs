// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Per-request state: inbound parameters and the response being built.
//!
//! A [`Request`] is created at the start of every dispatch and handed to
//! request handlers, controllers and the error handler. Pages reach the
//! same state through their primitives (`echo`, `setHeader`, ...).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{LuapError, Result};
use crate::transport::{header_param, HttpTransport};

/// Response headers in insertion order with case-insensitive replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Sets a header, replacing any value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => *entry = (name, value),
            None => self.0.push((name, value)),
        }
    }

    /// Returns the value of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the header is set.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no header is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One request and the response assembled for it.
pub struct Request {
    path: String,
    query: HashMap<String, String>,
    transport: Arc<dyn HttpTransport>,
    status_code: u16,
    status_text: Option<String>,
    headers: Headers,
    body: String,
    sent: bool,
    handled: bool,
    page_stack: Vec<PathBuf>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("path", &self.path)
            .field("query", &self.query)
            .field("status_code", &self.status_code)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("sent", &self.sent)
            .field("handled", &self.handled)
            .finish()
    }
}

impl Request {
    /// Starts a request from transport parameters.
    ///
    /// The path comes from `SCRIPT_NAME` and the query map from
    /// `QUERY_STRING`. The response starts as `200 OK` with no headers.
    pub fn from_transport(transport: Arc<dyn HttpTransport>) -> Self {
        let path = transport.param("SCRIPT_NAME", Some("")).unwrap_or_default();
        let query_string = transport.param("QUERY_STRING", Some("")).unwrap_or_default();
        Self {
            path,
            query: parse_query(&query_string),
            transport,
            status_code: 200,
            status_text: Some("OK".to_string()),
            headers: Headers::default(),
            body: String::new(),
            sent: false,
            handled: false,
            page_stack: Vec::new(),
        }
    }

    /// The request path (e.g. `/blog/post.html`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The transport this request arrived on.
    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Returns a raw transport parameter.
    pub fn transport_param(&self, name: &str) -> Option<String> {
        self.transport.param(name, None)
    }

    /// Returns a query-string parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Returns all query-string parameters.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Returns an inbound HTTP header (`HTTP_<NAME>` parameter).
    pub fn header(&self, name: &str) -> Option<String> {
        self.transport.param(&header_param(name), None)
    }

    /// Appends text to the response body.
    pub fn echo(&mut self, text: &str) {
        self.body.push_str(text);
    }

    /// Appends text to the response body, clearing it first if `clear` is set.
    pub fn response(&mut self, text: &str, clear: bool) {
        if clear {
            self.body.clear();
        }
        self.body.push_str(text);
    }

    /// The response body accumulated so far.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Sets the response status.
    ///
    /// Any code other than 200 drops the default `OK` text unless `text`
    /// is given.
    pub fn response_status(&mut self, code: u16, text: Option<&str>) -> Result<()> {
        if !(100..=999).contains(&code) {
            return Err(LuapError::handler(format!("invalid response status code: {}", code)));
        }
        self.status_code = code;
        if code != 200 {
            self.status_text = None;
        }
        if let Some(text) = text {
            self.status_text = Some(text.to_string());
        }
        Ok(())
    }

    /// The response status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The response status text, if any.
    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// Sets a response header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// The response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Marks the request as handled by a script handler, skipping page rendering.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    /// Returns true if a handler took the request.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Returns true once the response has been emitted.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Pages rendering when the current error was raised, outermost first.
    pub fn page_stack(&self) -> &[PathBuf] {
        &self.page_stack
    }

    pub(crate) fn set_page_stack(&mut self, frames: &[PathBuf]) {
        self.page_stack = frames.to_vec();
    }

    /// Emits the response through the transport.
    ///
    /// Writes the status line, every header (adding `Content-Length` when
    /// missing), a blank line and the body. A second call is a no-op.
    pub fn write_response(&mut self) -> Result<()> {
        if self.sent {
            return Ok(());
        }
        if !self.headers.contains("Content-Length") {
            self.headers.set("Content-Length", self.body.len().to_string());
        }

        let mut status = format!("Status: {}", self.status_code);
        if let Some(text) = &self.status_text {
            status.push(' ');
            status.push_str(text);
        }
        status.push_str("\r\n");
        self.transport.print(&status)?;

        for (name, value) in self.headers.iter() {
            self.transport.print(&format!("{}: {}\r\n", name, value))?;
        }
        if self.body.is_empty() {
            self.transport.print("\r\n")?;
        } else {
            self.transport.print(&format!("\r\n{}", self.body))?;
        }
        self.sent = true;
        tracing::debug!("Sent {} response for {}", self.status_code, self.path);
        Ok(())
    }
}

/// Parses a query string into a map (`application/x-www-form-urlencoded`).
pub fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
