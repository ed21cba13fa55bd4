// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compiled page caching.
//!
//! Compiled units are written under a cache root that mirrors the page
//! source tree: the artifact for `<server root>/pages/a.html` lives at
//! `<cache root>/pages/a.html`. An artifact is fresh while its
//! modification time is not older than the source's. There is no explicit
//! invalidation; editing a source file is what triggers recompilation.
//!
//! An in-memory LRU layer sits in front of the store. Its entries are
//! stamped with the artifact's modification time and are checked against
//! the source with the same rule.

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use lru::LruCache;

use crate::compiler::CompiledUnit;
use crate::error::{LuapError, Result};
use crate::store::FileStore;

/// Cache subdirectory holding artifacts of sources outside the server root.
pub const OUTSIDE_ROOT_DIR: &str = "_abs";

#[derive(Debug, Clone)]
struct CachedUnit {
    stamp: SystemTime,
    unit: Arc<CompiledUnit>,
}

/// Persistent cache of compiled pages with a memory layer.
#[derive(Debug)]
pub struct CompiledPageCache {
    store: Arc<dyn FileStore>,
    server_root: PathBuf,
    cache_root: PathBuf,
    memory: Option<Mutex<LruCache<PathBuf, CachedUnit>>>,
}

impl CompiledPageCache {
    /// Creates a cache writing under `cache_root`.
    ///
    /// # Arguments
    ///
    /// * `store` - Storage for sources and artifacts
    /// * `server_root` - Root that source paths are made relative to
    /// * `cache_root` - Directory receiving the mirrored artifacts
    /// * `memory_capacity` - Size of the in-memory layer (`0` disables it)
    pub fn new(
        store: Arc<dyn FileStore>,
        server_root: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
        memory_capacity: usize,
    ) -> Self {
        Self {
            store,
            server_root: server_root.into(),
            cache_root: cache_root.into(),
            memory: NonZeroUsize::new(memory_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// The directory receiving compiled artifacts.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Returns the artifact path for a source path.
    ///
    /// Sources outside the server root are mirrored by their absolute
    /// components under [`OUTSIDE_ROOT_DIR`]. A relative path whose first
    /// component starts with `_` gets one more `_`, so the two trees never
    /// share an artifact.
    pub fn cache_path(&self, source: &Path) -> PathBuf {
        let mut path = self.cache_root.clone();
        let (relative, outside) = match source.strip_prefix(&self.server_root) {
            Ok(relative) => (relative, false),
            Err(_) => (source, true),
        };
        if outside {
            path.push(OUTSIDE_ROOT_DIR);
        }
        let mut first = !outside;
        for comp in relative.components() {
            if let Component::Normal(seg) = comp {
                if first && seg.as_encoded_bytes().starts_with(b"_") {
                    let mut escaped = OsString::from("_");
                    escaped.push(seg);
                    path.push(escaped);
                } else {
                    path.push(seg);
                }
                first = false;
            }
        }
        path
    }

    /// Returns the cached unit for `source` if it is still fresh.
    ///
    /// A missing, unreadable or stale artifact is a miss, not an error.
    pub fn get(&self, source: &Path) -> Result<Option<Arc<CompiledUnit>>> {
        let Ok(source_mtime) = self.store.last_modified(source) else {
            return Ok(None);
        };

        if let Some(memory) = &self.memory {
            let mut memory = memory
                .lock()
                .map_err(|_| LuapError::StorageError("Failed to acquire cache lock".to_string()))?;
            match memory.get(source) {
                Some(entry) if entry.stamp >= source_mtime => {
                    tracing::debug!("Memory cache hit for {}", source.display());
                    return Ok(Some(entry.unit.clone()));
                }
                Some(_) => {
                    memory.pop(source);
                }
                None => {}
            }
        }

        let cache_path = self.cache_path(source);
        if !self.store.is_file_and_readable(&cache_path) {
            tracing::debug!("Cache miss for {}", source.display());
            return Ok(None);
        }
        let Ok(cache_mtime) = self.store.last_modified(&cache_path) else {
            return Ok(None);
        };
        if cache_mtime < source_mtime {
            tracing::debug!("Cached page for {} is stale", source.display());
            return Ok(None);
        }
        let Ok(code) = self.store.read_file(&cache_path) else {
            return Ok(None);
        };

        tracing::debug!("Cache hit for {} at {}", source.display(), cache_path.display());
        let unit = Arc::new(CompiledUnit::new(source, code));
        self.remember(source, cache_mtime, unit.clone())?;
        Ok(Some(unit))
    }

    /// Persists a compiled unit for `source`.
    pub fn put(&self, source: &Path, unit: Arc<CompiledUnit>) -> Result<()> {
        let cache_path = self.cache_path(source);
        if let Some(dir) = cache_path.parent() {
            if !self.store.is_dir_and_readable(dir) {
                self.store.mkpath(dir).map_err(|e| {
                    LuapError::StorageError(format!(
                        "Error creating cache directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }
        self.store.write_file(&cache_path, &unit.code).map_err(|e| {
            LuapError::StorageError(format!(
                "Failed to write cache file {}: {}",
                cache_path.display(),
                e
            ))
        })?;
        tracing::debug!("Cached {} at {}", source.display(), cache_path.display());

        if let Ok(stamp) = self.store.last_modified(&cache_path) {
            self.remember(source, stamp, unit)?;
        }
        Ok(())
    }

    fn remember(&self, source: &Path, stamp: SystemTime, unit: Arc<CompiledUnit>) -> Result<()> {
        if let Some(memory) = &self.memory {
            let mut memory = memory
                .lock()
                .map_err(|_| LuapError::StorageError("Failed to acquire cache lock".to_string()))?;
            memory.put(source.to_path_buf(), CachedUnit { stamp, unit });
        }
        Ok(())
    }
}
