// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Per-request dispatch: controller chain, page rendering and emission.
//!
//! A [`RequestDispatcher`] lives for exactly one request. It runs the
//! controller chain, renders the resolved page when no handler took the
//! request, reports any error into the response and finally emits it.
//!
//! Page primitives are Lua functions sharing a render scope with the
//! dispatcher. Locks on the scope are never held while a page chunk runs,
//! so nested includes can reach the same state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use mlua::{Function, Lua, Table, Value};

use crate::engine::{Engine, ErrorHandler, Next, PageLoader};
use crate::environment::{PageBindings, PageEnvironment};
use crate::error::{ExitSignal, LuapError, Result};
use crate::include::IncludeStack;
use crate::request::Request;
use crate::transport::{header_name, header_param, HttpTransport, TRANSPORT_ACCESSORS};

/// State shared between the dispatcher and the page primitives.
pub(crate) struct RenderScope {
    request: Mutex<Request>,
    stack: Mutex<IncludeStack>,
    transport: Arc<dyn HttpTransport>,
    loader: Arc<PageLoader>,
    error_handler: Option<ErrorHandler>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RenderScope {
    fn request(&self) -> MutexGuard<'_, Request> {
        lock(&self.request)
    }

    fn stack(&self) -> MutexGuard<'_, IncludeStack> {
        lock(&self.stack)
    }

    /// Writes an error into the response.
    ///
    /// Exit signals are not failures and produce nothing.
    fn report(&self, err: &LuapError) {
        if err.is_exit() {
            return;
        }
        let mut request = self.request();
        match &self.error_handler {
            Some(handler) => {
                if let Err(secondary) = handler(&mut *request, err) {
                    tracing::error!("error in error handler: {}", secondary);
                    request.echo(&format!(
                        "error in error handler: {}. Original error: {}",
                        secondary, err
                    ));
                }
            }
            None => {
                tracing::warn!("Error while handling {}: {}", request.path(), err);
                request.echo(&format!("<pre>{}</pre>", html_escape(&err.to_string())));
            }
        }
        request.set_page_stack(&[]);
    }

    /// Pushes a frame, loads and executes the page, and pops the frame.
    fn render_frame(&self, lua: &Lua, path: &Path, once: bool) -> Result<()> {
        self.stack().push(path, once);
        tracing::debug!("Rendering page {}", path.display());

        let result = self
            .loader
            .load(path)
            .and_then(|unit| self.loader.execute(lua, &unit));

        let mut stack = self.stack();
        if let Err(e) = &result {
            let mut request = self.request();
            if !e.is_exit() && request.page_stack().is_empty() {
                request.set_page_stack(stack.frames());
            }
        }
        stack.pop();
        result
    }

    /// Backs the `include` and `includeOnce` primitives.
    fn include(&self, lua: &Lua, path: &str, once: bool, halt: bool) -> mlua::Result<()> {
        let target = {
            let stack = self.stack();
            let target = stack.resolve(path);
            if once && stack.was_included_once(&target) {
                tracing::debug!("Skipping {}: already included", target.display());
                return Ok(());
            }
            target
        };

        match self.render_frame(lua, &target, once) {
            Ok(()) => Ok(()),
            Err(e) if e.is_exit() => Err(ExitSignal.into_lua()),
            Err(e) => {
                self.report(&e);
                if halt {
                    Err(ExitSignal.into_lua())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Directory of `SCRIPT_NAME` joined with `suffix`.
    fn url(&self, suffix: &str) -> String {
        let script = self.transport.param("SCRIPT_NAME", Some("")).unwrap_or_default();
        let dir = match script.rfind('/') {
            Some(idx) => &script[..idx],
            None => "",
        };
        format!("{}/{}", dir, suffix)
    }
}

/// Converts a Lua value to text the way `tostring` does.
fn lua_text(lua: &Lua, value: Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(s.to_string_lossy()),
        other => {
            let tostring: Function = lua.globals().get("tostring")?;
            tostring.call(other)
        }
    }
}

/// Builds the page primitives and transport accessors for one request.
///
/// The bound names are exactly [`crate::environment::PAGE_PRIMITIVES`] followed by the
/// accessors of [`TRANSPORT_ACCESSORS`].
fn page_bindings(lua: &Lua, scope: &Arc<RenderScope>) -> mlua::Result<PageBindings> {
    let mut bindings = PageBindings::new();

    let s = scope.clone();
    bindings.bind(
        "echo",
        lua.create_function(move |lua, text: Value| {
            let text = lua_text(lua, text)?;
            s.request().echo(&text);
            Ok(())
        })?,
    );

    bindings.bind(
        "exit",
        lua.create_function(|_, ()| -> mlua::Result<()> { Err(ExitSignal.into_lua()) })?,
    );

    let s = scope.clone();
    bindings.bind(
        "url",
        lua.create_function(move |_, suffix: String| Ok(s.url(&suffix)))?,
    );

    let s = scope.clone();
    bindings.bind(
        "include",
        lua.create_function(move |lua, (path, halt): (String, Option<bool>)| {
            s.include(lua, &path, false, halt.unwrap_or(false))
        })?,
    );

    let s = scope.clone();
    bindings.bind(
        "includeOnce",
        lua.create_function(move |lua, (path, halt): (String, Option<bool>)| {
            s.include(lua, &path, true, halt.unwrap_or(false))
        })?,
    );

    let s = scope.clone();
    bindings.bind(
        "setHeader",
        lua.create_function(move |lua, (name, value): (String, Value)| {
            let value = lua_text(lua, value)?;
            s.request().set_header(name, value);
            Ok(())
        })?,
    );

    let s = scope.clone();
    bindings.bind(
        "getHeader",
        lua.create_function(move |_, name: String| {
            Ok(s.transport.param(&header_param(&name), None))
        })?,
    );

    let s = scope.clone();
    bindings.bind(
        "getHeaders",
        lua.create_function(move |lua, ()| {
            let headers = lua.create_table()?;
            for entry in s.transport.params() {
                let Some((param, value)) = entry.split_once('=') else {
                    continue;
                };
                if let Some(name) = header_name(param) {
                    headers.set(name, value)?;
                }
            }
            Ok(headers)
        })?,
    );

    let s = scope.clone();
    bindings.bind(
        "getParam",
        lua.create_function(move |_, name: String| {
            Ok(s.request().param(&name).map(str::to_string))
        })?,
    );

    let s = scope.clone();
    bindings.bind(
        "getParams",
        lua.create_function(move |lua, ()| {
            let params: Table = lua.create_table()?;
            for (name, value) in s.request().params() {
                params.set(name.as_str(), value.as_str())?;
            }
            Ok(params)
        })?,
    );

    for &(param, accessor) in TRANSPORT_ACCESSORS {
        let transport = scope.transport.clone();
        bindings.bind(
            accessor,
            lua.create_function(move |_, ()| Ok(transport.param(param, None)))?,
        );
    }

    Ok(bindings)
}

/// Splits a request path into handler keys: `/blog/post.html` yields
/// `Blog` then `BlogPost`.
pub fn handler_keys(path: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut key = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let stem = segment.split('.').next().unwrap_or_default();
        let mut chars = stem.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_uppercase());
            key.push_str(&chars.as_str().to_lowercase());
        }
        keys.push(key.clone());
    }
    keys
}

/// Handles a single request against an [`Engine`].
pub struct RequestDispatcher<'e> {
    engine: &'e Engine,
    scope: Arc<RenderScope>,
}

impl<'e> RequestDispatcher<'e> {
    /// Starts a request: reads the path and query and resets the response.
    pub fn new(engine: &'e Engine, transport: Arc<dyn HttpTransport>) -> Self {
        let request = Request::from_transport(transport.clone());
        let scope = Arc::new(RenderScope {
            request: Mutex::new(request),
            stack: Mutex::new(IncludeStack::new()),
            transport,
            loader: engine.loader().clone(),
            error_handler: engine.error_handler().cloned(),
        });
        Self { engine, scope }
    }

    /// Runs the request to completion and emits the response.
    ///
    /// # Errors
    ///
    /// Only fails when the response cannot be written to the transport.
    ///
    /// Holds the engine's render lock until the response is emitted.
    pub fn run(self) -> Result<()> {
        let _render = self.engine.render_lock();
        tracing::debug!("Dispatching {}", self.scope.request().path());
        self.run_controllers();
        if !self.scope.request().is_handled() {
            self.handle_page();
        }
        let mut request = self.scope.request();
        request.write_response()
    }

    /// Runs the default controller, then the registered ones.
    ///
    /// A `Next::Stop` or an error from any controller, the default one
    /// included, ends the chain: later controllers do not run.
    fn run_controllers(&self) {
        if self.run_default_controller() == Next::Stop {
            return;
        }
        for controller in self.engine.request_controllers() {
            let result = {
                let mut request = self.scope.request();
                controller(&mut *request)
            };
            match result {
                Ok(Next::Continue) => {}
                Ok(Next::Stop) => return,
                Err(e) => {
                    self.scope.report(&e);
                    return;
                }
            }
        }
    }

    fn run_default_controller(&self) -> Next {
        let path = self.scope.request().path().to_string();
        for key in handler_keys(&path) {
            let Some(handler) = self.engine.request_handlers().get(&key) else {
                continue;
            };
            tracing::debug!("Calling request handler {}", key);
            let result = {
                let mut request = self.scope.request();
                request.mark_handled();
                handler(&mut *request)
            };
            match result {
                Ok(Next::Continue) => {}
                Ok(Next::Stop) => return Next::Stop,
                Err(e) => {
                    self.scope.report(&e);
                    return Next::Stop;
                }
            }
        }
        Next::Continue
    }

    /// Resolves and renders the page for the request path.
    fn handle_page(&self) {
        if let Err(e) = self.render_page() {
            self.scope.report(&e);
        }
    }

    fn render_page(&self) -> Result<()> {
        let path = self.scope.request().path().to_string();
        let page: PathBuf = self.engine.resolve_page(&path)?;
        self.scope.request().set_header("Content-Type", "text/html");
        self.scope.stack().reset();

        let lua = self.engine.lua();
        let bindings = page_bindings(lua, &self.scope)?;
        let mut env = PageEnvironment::new(lua.globals());
        let _guard = env.activate(&bindings)?;
        self.scope.render_frame(lua, &page, false)
    }
}

/// Escapes text for inclusion in HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
