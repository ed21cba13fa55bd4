// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server for LUAP sites.
//!
//! This is a thin adapter that converts HTTP requests to CGI-style
//! transport parameters, calls `engine.handle_request()`, and parses the
//! emitted wire response back into HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Router,
};
use luap::transport::header_param;
use luap::{html_escape, Engine, MemoryTransport};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;

/// Shared application state for the server.
pub struct AppState {
    /// Page engine; requests are handled one at a time.
    pub engine: Mutex<Engine>,
    /// Host name reported to pages as `SERVER_NAME`.
    pub host: String,
    /// Port reported to pages as `SERVER_PORT`.
    pub port: u16,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
}

impl AppState {
    /// Wraps an engine for serving.
    pub fn new(engine: Engine, host: impl Into<String>, port: u16, static_dir: PathBuf) -> Self {
        Self {
            engine: Mutex::new(engine),
            host: host.into(),
            port,
            static_dir,
        }
    }
}

/// Builds the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest_service("/static", ServeDir::new(&state.static_dir))
        .fallback(fallback_handler)
        .with_state(state)
}

/// Creates and starts the HTTP server.
pub async fn create_server(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Hands every non-static request to the page engine.
async fn fallback_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let transport = Arc::new(to_transport(&state, &request));

    let result = {
        let engine = state.engine.lock().await;
        engine.handle_request(transport.clone())
    };
    if let Err(e) = result {
        tracing::error!("Failed to emit response for {}: {}", request.uri(), e);
        return error_page(&e.to_string());
    }

    match parse_wire_response(&transport.output()) {
        Ok(response) => response,
        Err(message) => {
            tracing::error!("Malformed response for {}: {}", request.uri(), message);
            error_page(&message)
        }
    }
}

/// Convert an HTTP request to transport parameters.
fn to_transport(state: &AppState, request: &Request<Body>) -> MemoryTransport {
    let uri = request.uri();
    let path = uri.path().to_string();
    let query = uri.query().unwrap_or_default().to_string();
    let request_uri = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let mut transport = MemoryTransport::new()
        .with_param("GATEWAY_INTERFACE", "CGI/1.1")
        .with_param("SERVER_SOFTWARE", concat!("luap/", env!("CARGO_PKG_VERSION")))
        .with_param("SERVER_PROTOCOL", format!("{:?}", request.version()))
        .with_param("SERVER_NAME", state.host.clone())
        .with_param("SERVER_PORT", state.port.to_string())
        .with_param("REQUEST_METHOD", request.method().as_str())
        .with_param("REQUEST_URI", request_uri)
        .with_param("DOCUMENT_URI", path.clone())
        .with_param("SCRIPT_NAME", path)
        .with_param("QUERY_STRING", query);

    for (name, value) in request.headers() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        match name.as_str() {
            "content-type" => transport.set_param("CONTENT_TYPE", value),
            "content-length" => transport.set_param("CONTENT_LENGTH", value),
            _ => transport.set_param(header_param(name.as_str()), value),
        }
    }
    transport
}

/// Parses `Status: ...` + headers + body wire output into a response.
pub fn parse_wire_response(output: &str) -> Result<Response, String> {
    let (head, body) = output
        .split_once("\r\n\r\n")
        .ok_or_else(|| "response has no header terminator".to_string())?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .strip_prefix("Status: ")
        .and_then(|rest| rest.split(' ').next())
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| format!("invalid status line: {}", status_line))?;

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    for line in lines {
        let Some((name, value)) = line.split_once(": ") else {
            return Err(format!("invalid header line: {}", line));
        };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| e.to_string())?;
        let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
        response.headers_mut().insert(name, value);
    }
    Ok(response)
}

fn error_page(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>Error - Luap</title>
    <style>
        body {{ font-family: system-ui, sans-serif; padding: 2rem; background: #1a1a2e; color: #eee; }}
        pre {{ background: #0f0f1a; padding: 1rem; overflow-x: auto; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>Error</h1>
    <pre>{}</pre>
</body>
</html>"#,
            html_escape(message)
        )),
    )
        .into_response()
}
