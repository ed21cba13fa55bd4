// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! LUAP engine: long-lived registrations and the shared Lua state.
//!
//! The [`Engine`] owns everything that outlives a request: the Lua
//! runtime, the compiled page cache, page roots, request handlers,
//! controllers and the error handler. Each call to
//! [`handle_request`](Engine::handle_request) builds a fresh
//! [`RequestDispatcher`] carrying the per-request state.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use luap::{Engine, EngineConfig, MemoryTransport, Next};
//!
//! let mut engine = Engine::with_local_store(EngineConfig::new("./site"))?;
//! engine.add_request_handler("Ping", |req| {
//!     req.echo("pong");
//!     Ok(Next::Stop)
//! });
//!
//! let transport = Arc::new(MemoryTransport::new().with_param("SCRIPT_NAME", "/ping"));
//! engine.handle_request(transport.clone())?;
//! assert!(transport.output().ends_with("pong"));
//! ```
//!
//! # Thread Safety
//!
//! The Lua state is shared by every request. [`Engine::handle_request`]
//! takes an internal lock, so concurrent callers on one engine are served
//! one at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use mlua::Lua;

use crate::cache::CompiledPageCache;
use crate::compiler::{compile, CompiledUnit};
use crate::dispatcher::RequestDispatcher;
use crate::error::{LuapError, Result};
use crate::include::normalize_path;
use crate::request::Request;
use crate::store::{FileStore, LocalFileStore};
use crate::transport::HttpTransport;

/// Page served for a directory request.
pub const DEFAULT_PAGE: &str = "index.html";

/// Continuation signal returned by handlers and controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Keep running the chain.
    Continue,
    /// Stop the chain here.
    Stop,
}

/// Handler registered under a request key such as `BlogPost`.
pub type RequestHandler = Arc<dyn Fn(&mut Request) -> Result<Next> + Send + Sync>;

/// Controller run after the default controller, in registration order.
pub type RequestController = Arc<dyn Fn(&mut Request) -> Result<Next> + Send + Sync>;

/// Receives every error raised while handling a request.
pub type ErrorHandler = Arc<dyn Fn(&mut Request, &LuapError) -> Result<()> + Send + Sync>;

/// Maps a request path (without its leading `/`) to a page file, or declines.
pub type PageResolver = Arc<dyn Fn(&str) -> Option<PathBuf> + Send + Sync>;

/// Where pages under a URL prefix come from.
#[derive(Clone)]
pub enum PageRoot {
    /// Pages are files under a directory.
    Dir {
        /// URL prefix, without a leading `/`.
        prefix: String,
        /// Directory the rest of the path is joined to.
        dir: PathBuf,
    },
    /// Pages are located by a function.
    Resolver {
        /// URL prefix, without a leading `/`.
        prefix: String,
        /// Resolver called with the whole path.
        resolver: PageResolver,
    },
}

impl PageRoot {
    /// The URL prefix of this root.
    pub fn prefix(&self) -> &str {
        match self {
            PageRoot::Dir { prefix, .. } | PageRoot::Resolver { prefix, .. } => prefix,
        }
    }
}

impl std::fmt::Debug for PageRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageRoot::Dir { prefix, dir } => f
                .debug_struct("Dir")
                .field("prefix", prefix)
                .field("dir", dir)
                .finish(),
            PageRoot::Resolver { prefix, .. } => {
                f.debug_struct("Resolver").field("prefix", prefix).finish()
            }
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the site; page and cache paths derive from it.
    pub server_root: PathBuf,
    /// Directory of compiled pages (default: `<server_root>/cache`).
    pub cache_dir: Option<PathBuf>,
    /// Default page directory under the server root (default: `pages`).
    ///
    /// Also where the CLI looks for pages to precompile.
    pub pages_dir: String,
    /// Page served for directory requests (default: `index.html`).
    pub default_page: String,
    /// Size of the in-memory compiled page layer (default: 100, `0` disables it).
    pub memory_cache_capacity: usize,
}

impl EngineConfig {
    /// Creates a configuration rooted at `server_root` with defaults.
    pub fn new(server_root: impl Into<PathBuf>) -> Self {
        Self {
            server_root: server_root.into(),
            cache_dir: None,
            pages_dir: "pages".to_string(),
            default_page: DEFAULT_PAGE.to_string(),
            memory_cache_capacity: 100,
        }
    }

    /// Sets the compiled page directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the default page directory.
    pub fn with_pages_dir(mut self, dir: impl Into<String>) -> Self {
        self.pages_dir = dir.into();
        self
    }

    /// Sets the page served for directories.
    pub fn with_default_page(mut self, page: impl Into<String>) -> Self {
        self.default_page = page.into();
        self
    }

    /// Sets the memory layer capacity.
    pub fn with_memory_cache(mut self, capacity: usize) -> Self {
        self.memory_cache_capacity = capacity;
        self
    }
}

/// Loads compiled pages and runs them on a Lua state.
#[derive(Debug)]
pub(crate) struct PageLoader {
    store: Arc<dyn FileStore>,
    cache: CompiledPageCache,
}

impl PageLoader {
    /// Returns the compiled unit for a page, compiling and caching on a miss.
    pub(crate) fn load(&self, path: &Path) -> Result<Arc<CompiledUnit>> {
        if !self.store.is_file_and_readable(path) {
            return Err(LuapError::PageNotFound(path.to_path_buf()));
        }
        if let Some(unit) = self.cache.get(path)? {
            return Ok(unit);
        }
        let source = self.store.read_file(path)?;
        let unit = Arc::new(compile(&source, path)?);
        self.cache.put(path, unit.clone())?;
        Ok(unit)
    }

    /// Executes a compiled unit in the current Lua globals.
    pub(crate) fn execute(&self, lua: &Lua, unit: &CompiledUnit) -> Result<()> {
        lua.load(&unit.code)
            .set_name(format!("@{}", unit.source_path.display()))
            .exec()
            .map_err(LuapError::from_lua)
    }
}

/// Main LUAP engine.
pub struct Engine {
    lua: Lua,
    config: EngineConfig,
    store: Arc<dyn FileStore>,
    loader: Arc<PageLoader>,
    roots: Vec<PageRoot>,
    handlers: HashMap<String, RequestHandler>,
    controllers: Vec<RequestController>,
    error_handler: Option<ErrorHandler>,
    /// Held for the whole of a request; the Lua globals admit one render.
    render_lock: Mutex<()>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("roots", &self.roots)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("controllers", &self.controllers.len())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl Engine {
    /// Creates an engine over the given file store.
    ///
    /// # Errors
    ///
    /// Returns an error if the Lua runtime fails to initialize.
    pub fn new(config: EngineConfig, store: Arc<dyn FileStore>) -> Result<Self> {
        let lua = Lua::new();
        crate::extensions::json::register_json_module(&lua)?;

        let cache_dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(|| config.server_root.join("cache"));
        let cache = CompiledPageCache::new(
            store.clone(),
            config.server_root.clone(),
            cache_dir,
            config.memory_cache_capacity,
        );
        let loader = Arc::new(PageLoader {
            store: store.clone(),
            cache,
        });

        Ok(Self {
            lua,
            config,
            store,
            loader,
            roots: Vec::new(),
            handlers: HashMap::new(),
            controllers: Vec::new(),
            error_handler: None,
            render_lock: Mutex::new(()),
        })
    }

    /// Creates an engine over the local filesystem.
    pub fn with_local_store(config: EngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(LocalFileStore::new()))
    }

    /// The engine's Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Root of the site.
    pub fn server_root(&self) -> &Path {
        &self.config.server_root
    }

    /// The default page directory.
    pub fn pages_dir(&self) -> PathBuf {
        self.config.server_root.join(&self.config.pages_dir)
    }

    /// Directory of compiled pages.
    pub fn cache_dir(&self) -> &Path {
        self.loader.cache.cache_root()
    }

    /// Where the compiled artifact of a page source is stored.
    pub fn cache_path(&self, source: impl AsRef<Path>) -> PathBuf {
        self.loader.cache.cache_path(source.as_ref())
    }

    /// The file store used for pages and compiled artifacts.
    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Serves pages under `prefix` from `dir`.
    pub fn add_page_root(&mut self, prefix: impl AsRef<str>, dir: impl Into<PathBuf>) {
        self.roots.push(PageRoot::Dir {
            prefix: prefix.as_ref().trim_start_matches('/').to_string(),
            dir: dir.into(),
        });
    }

    /// Resolves pages under `prefix` with a function that may decline.
    pub fn add_page_resolver<F>(&mut self, prefix: impl AsRef<str>, resolver: F)
    where
        F: Fn(&str) -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.roots.push(PageRoot::Resolver {
            prefix: prefix.as_ref().trim_start_matches('/').to_string(),
            resolver: Arc::new(resolver),
        });
    }

    /// Registered page roots, in lookup order.
    pub fn page_roots(&self) -> &[PageRoot] {
        &self.roots
    }

    /// Registers a handler under a request key (e.g. `Blog` or `BlogPost`).
    pub fn add_request_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Request) -> Result<Next> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Registered handlers by request key.
    pub fn request_handlers(&self) -> &HashMap<String, RequestHandler> {
        &self.handlers
    }

    /// Adds a controller run after the default one.
    pub fn add_request_controller<F>(&mut self, controller: F)
    where
        F: Fn(&mut Request) -> Result<Next> + Send + Sync + 'static,
    {
        self.controllers.push(Arc::new(controller));
    }

    /// Additional controllers, in registration order.
    pub fn request_controllers(&self) -> &[RequestController] {
        &self.controllers
    }

    /// Installs the handler receiving request errors.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&mut Request, &LuapError) -> Result<()> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
    }

    /// Removes the error handler, restoring the default error output.
    pub fn clear_error_handler(&mut self) {
        self.error_handler = None;
    }

    /// Maps a request path to a page file.
    ///
    /// Page roots are tried in registration order; the first matching
    /// directory root or accepting resolver wins. Otherwise the page comes
    /// from the default page directory. A directory holding the default
    /// page resolves to that page.
    ///
    /// # Errors
    ///
    /// Returns [`LuapError::PageNotFound`] for paths escaping their root.
    pub fn resolve_page(&self, request_path: &str) -> Result<PathBuf> {
        let page = request_path.trim_start_matches('/');
        let mut resolved = None;

        for root in &self.roots {
            if !page.starts_with(root.prefix()) {
                continue;
            }
            match root {
                PageRoot::Dir { prefix, dir } => {
                    let rest = page[prefix.len()..].trim_start_matches('/');
                    resolved = Some(confine(dir, rest)?);
                    break;
                }
                PageRoot::Resolver { resolver, .. } => {
                    if let Some(path) = resolver(page) {
                        resolved = Some(path);
                        break;
                    }
                }
            }
        }

        let mut path = match resolved {
            Some(path) => path,
            None => confine(&self.pages_dir(), page)?,
        };

        let index = path.join(&self.config.default_page);
        if self.store.is_dir_and_readable(&path) && self.store.is_file_and_readable(&index) {
            path = index;
        }
        tracing::debug!("Resolved page for '{}': {}", request_path, path.display());
        Ok(path)
    }

    /// Returns the compiled unit of a page, compiling it on a cache miss.
    pub fn compile_page(&self, path: impl AsRef<Path>) -> Result<Arc<CompiledUnit>> {
        self.loader.load(path.as_ref())
    }

    /// Handles one request end to end and emits its response.
    ///
    /// Handler and page errors end up in the response; an error is only
    /// returned when the response itself cannot be emitted.
    ///
    /// Blocks while another request is being handled by this engine.
    pub fn handle_request(&self, transport: Arc<dyn HttpTransport>) -> Result<()> {
        RequestDispatcher::new(self, transport).run()
    }

    /// Serializes renders on the shared Lua state.
    pub(crate) fn render_lock(&self) -> MutexGuard<'_, ()> {
        self.render_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn loader(&self) -> &Arc<PageLoader> {
        &self.loader
    }

    pub(crate) fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.as_ref()
    }
}

/// Joins `rest` to `base`, refusing results outside `base`.
fn confine(base: &Path, rest: &str) -> Result<PathBuf> {
    let base = normalize_path(base);
    let joined = normalize_path(&base.join(rest));
    if joined.starts_with(&base) {
        Ok(joined)
    } else {
        Err(LuapError::PageNotFound(joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFileStore;

    fn engine(store: &MemoryFileStore) -> Engine {
        Engine::new(EngineConfig::new("/site"), Arc::new(store.clone())).unwrap()
    }

    #[test]
    fn test_default_pages_dir() {
        let store = MemoryFileStore::new();
        let engine = engine(&store);
        assert_eq!(
            engine.resolve_page("/blog/post.html").unwrap(),
            PathBuf::from("/site/pages/blog/post.html")
        );
        assert_eq!(engine.cache_dir(), Path::new("/site/cache"));
        assert_eq!(
            engine.cache_path("/site/pages/blog/post.html"),
            PathBuf::from("/site/cache/pages/blog/post.html")
        );
    }

    #[test]
    fn test_directory_uses_default_page() {
        let store = MemoryFileStore::new();
        store.add_file("/site/pages/index.html", "home");
        store.add_file("/site/pages/docs/index.html", "docs");
        store.add_file("/site/pages/empty/other.html", "");
        let engine = engine(&store);
        assert_eq!(engine.resolve_page("/").unwrap(), PathBuf::from("/site/pages/index.html"));
        assert_eq!(
            engine.resolve_page("/docs").unwrap(),
            PathBuf::from("/site/pages/docs/index.html")
        );
        assert_eq!(engine.resolve_page("/empty").unwrap(), PathBuf::from("/site/pages/empty"));
    }

    #[test]
    fn test_page_roots_first_match_wins() {
        let store = MemoryFileStore::new();
        let mut engine = engine(&store);
        engine.add_page_resolver("/admin", |page| {
            (page == "admin/secret.html").then(|| PathBuf::from("/vault/secret.html"))
        });
        engine.add_page_root("/admin", "/srv/admin");
        engine.add_page_root("/admin", "/never");

        assert_eq!(
            engine.resolve_page("/admin/secret.html").unwrap(),
            PathBuf::from("/vault/secret.html")
        );
        // Resolver declines, so the next root takes it.
        assert_eq!(
            engine.resolve_page("/admin/users.html").unwrap(),
            PathBuf::from("/srv/admin/users.html")
        );
        assert_eq!(engine.page_roots().len(), 3);
    }

    #[test]
    fn test_traversal_is_rejected() {
        let store = MemoryFileStore::new();
        let engine = engine(&store);
        let err = engine.resolve_page("/../../etc/passwd").unwrap_err();
        assert!(matches!(err, LuapError::PageNotFound(_)));
    }

    #[test]
    fn test_compile_page_caches() {
        let store = MemoryFileStore::new();
        store.add_file("/site/pages/a.html", "hi");
        let engine = engine(&store);
        let unit = engine.compile_page("/site/pages/a.html").unwrap();
        assert_eq!(unit.code, "echo('hi');");
        assert!(store.content("/site/cache/pages/a.html").is_some());

        let err = engine.compile_page("/site/pages/missing.html").unwrap_err();
        assert!(matches!(err, LuapError::PageNotFound(_)));
    }
}
