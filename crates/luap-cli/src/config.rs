// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! LUAP site configuration.
//!
//! Configuration is loaded from `luap.toml` at the site root.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! static_dir = "public"
//!
//! [pages]
//! dir = "pages"
//! default_page = "index.html"
//! cache_dir = "cache"
//! memory_cache = 100
//!
//! [[roots]]
//! prefix = "/docs"
//! dir = "manual"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use luap::{Engine, EngineConfig};
use serde::Deserialize;

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "luap.toml";

/// Main configuration structure loaded from `luap.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Page location and caching.
    #[serde(default)]
    pub pages: PagesConfig,
    /// Extra page roots, tried in order before the default page directory.
    #[serde(default)]
    pub roots: Vec<RootConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory of static files served under `/static` (default: "public").
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

/// Page configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PagesConfig {
    /// Default page directory (default: "pages").
    #[serde(default = "default_pages_dir")]
    pub dir: String,
    /// Page served for directory requests (default: "index.html").
    #[serde(default = "default_page")]
    pub default_page: String,
    /// Compiled page directory (default: "cache").
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Compiled pages kept in memory (default: 100, 0 disables).
    #[serde(default = "default_memory_cache")]
    pub memory_cache: usize,
}

/// A directory serving pages under a URL prefix.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RootConfig {
    /// URL prefix (e.g. "/docs").
    pub prefix: String,
    /// Directory, relative to the site root unless absolute.
    pub dir: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_pages_dir() -> String {
    "pages".to_string()
}

fn default_page() -> String {
    luap::DEFAULT_PAGE.to_string()
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

fn default_memory_cache() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            dir: default_pages_dir(),
            default_page: default_page(),
            cache_dir: default_cache_dir(),
            memory_cache: default_memory_cache(),
        }
    }
}

impl Config {
    /// Loads configuration from `luap.toml` in the current directory.
    ///
    /// If no configuration file exists, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Loads configuration from `luap.toml` in `site_root`.
    pub fn load_from(site_root: &Path) -> anyhow::Result<Self> {
        let config_path = site_root.join(CONFIG_FILE);

        if !config_path.exists() {
            tracing::debug!("No {} found, using defaults", config_path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Engine settings for a site rooted at `site_root`.
    pub fn engine_config(&self, site_root: &Path) -> EngineConfig {
        EngineConfig::new(site_root)
            .with_cache_dir(resolve(site_root, &self.pages.cache_dir))
            .with_pages_dir(self.pages.dir.clone())
            .with_default_page(self.pages.default_page.clone())
            .with_memory_cache(self.pages.memory_cache)
    }

    /// Builds an engine over the local filesystem with the configured roots.
    pub fn build_engine(&self, site_root: &Path) -> anyhow::Result<Engine> {
        let mut engine = Engine::with_local_store(self.engine_config(site_root))?;
        for root in &self.roots {
            engine.add_page_root(&root.prefix, resolve(site_root, &root.dir));
        }
        Ok(engine)
    }

    /// Static file directory for a site rooted at `site_root`.
    pub fn static_dir(&self, site_root: &Path) -> PathBuf {
        resolve(site_root, &self.server.static_dir)
    }
}

fn resolve(site_root: &Path, dir: &str) -> PathBuf {
    let dir = Path::new(dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        site_root.join(dir)
    }
}
