// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File storage capability used for template sources and compiled pages.
//!
//! The engine never touches `std::fs` directly; it goes through the
//! [`FileStore`] trait so hosts can substitute their own storage.
//!
//! # Implementations
//!
//! - [`LocalFileStore`]: the local filesystem
//! - [`MemoryFileStore`]: in-memory files with a logical clock (testing)

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Filesystem operations consumed by the engine.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait FileStore: Send + Sync + std::fmt::Debug {
    /// Returns true if `path` is a regular file that can be read.
    fn is_file_and_readable(&self, path: &Path) -> bool;
    /// Returns true if `path` is a directory that can be listed.
    fn is_dir_and_readable(&self, path: &Path) -> bool;
    /// Returns the modification time of `path`.
    fn last_modified(&self, path: &Path) -> io::Result<SystemTime>;
    /// Reads `path` as UTF-8 text.
    fn read_file(&self, path: &Path) -> io::Result<String>;
    /// Writes `content` to `path`, replacing any previous content.
    fn write_file(&self, path: &Path, content: &str) -> io::Result<()>;
    /// Creates `path` and all missing parent directories.
    fn mkpath(&self, path: &Path) -> io::Result<()>;
}

/// [`FileStore`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    /// Creates a new local store.
    pub fn new() -> Self {
        Self
    }
}

impl FileStore for LocalFileStore {
    fn is_file_and_readable(&self, path: &Path) -> bool {
        path.is_file() && std::fs::File::open(path).is_ok()
    }

    fn is_dir_and_readable(&self, path: &Path) -> bool {
        path.is_dir() && std::fs::read_dir(path).is_ok()
    }

    fn last_modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn mkpath(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: HashMap<PathBuf, (String, SystemTime)>,
    dirs: BTreeSet<PathBuf>,
    clock: u64,
    fail_writes: bool,
}

impl MemoryFiles {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock)
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
    }
}

/// In-memory [`FileStore`] with a logical clock.
///
/// Every write advances the clock by one second, so modification times
/// are strictly increasing and cache staleness is deterministic in tests.
/// Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    inner: Arc<Mutex<MemoryFiles>>,
}

impl MemoryFileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds or replaces a file, creating its parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref();
        let mut files = self.files();
        let stamp = files.tick();
        files.add_parents(path);
        files.files.insert(path.to_path_buf(), (content.into(), stamp));
    }

    /// Advances the modification time of an existing file without changing it.
    pub fn touch(&self, path: impl AsRef<Path>) -> bool {
        let mut files = self.files();
        let stamp = files.tick();
        match files.files.get_mut(path.as_ref()) {
            Some(entry) => {
                entry.1 = stamp;
                true
            }
            None => false,
        }
    }

    /// Returns the content of a file, if present.
    pub fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files().files.get(path.as_ref()).map(|(c, _)| c.clone())
    }

    /// Makes every subsequent write and `mkpath` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.files().fail_writes = fail;
    }
}

impl FileStore for MemoryFileStore {
    fn is_file_and_readable(&self, path: &Path) -> bool {
        self.files().files.contains_key(path)
    }

    fn is_dir_and_readable(&self, path: &Path) -> bool {
        self.files().dirs.contains(path)
    }

    fn last_modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.files()
            .files
            .get(path)
            .map(|(_, stamp)| *stamp)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.content(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        let mut files = self.files();
        if files.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "writes disabled"));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !files.dirs.contains(parent) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such directory: {}", parent.display()),
                ));
            }
        }
        let stamp = files.tick();
        files.files.insert(path.to_path_buf(), (content.to_string(), stamp));
        Ok(())
    }

    fn mkpath(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files();
        if files.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "writes disabled"));
        }
        files.add_parents(path);
        files.dirs.insert(path.to_path_buf());
        Ok(())
    }
}
