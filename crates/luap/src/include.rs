// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The chain of pages currently rendering.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Stack of include frames for one top-level page render.
///
/// The top frame is the "current page"; relative includes resolve against
/// its directory. Targets pushed with `once = true` are remembered until
/// [`reset`](Self::reset) so `includeOnce` can skip them.
#[derive(Debug, Default, Clone)]
pub struct IncludeStack {
    frames: Vec<PathBuf>,
    once: HashSet<PathBuf>,
}

impl IncludeStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears frames and the include-once set.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.once.clear();
    }

    /// Enters a page.
    pub fn push(&mut self, path: impl Into<PathBuf>, once: bool) {
        let path = path.into();
        if once {
            self.once.insert(path.clone());
        }
        self.frames.push(path);
    }

    /// Leaves the current page.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty: every pop must match a push.
    pub fn pop(&mut self) -> PathBuf {
        match self.frames.pop() {
            Some(path) => path,
            None => panic!("include stack underflow: pop without matching push"),
        }
    }

    /// Returns the page currently rendering.
    pub fn current(&self) -> Option<&Path> {
        self.frames.last().map(PathBuf::as_path)
    }

    /// Resolves `relative` against the directory of the current page.
    ///
    /// Absolute paths are only normalized. With no current page the path
    /// is resolved against the filesystem root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            return normalize_path(relative);
        }
        let base = self
            .current()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        normalize_path(&base.join(relative))
    }

    /// Returns true if `path` was already entered through `includeOnce`.
    pub fn was_included_once(&self, path: impl AsRef<Path>) -> bool {
        self.once.contains(path.as_ref())
    }

    /// Number of pages currently rendering.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the outermost page to the current one.
    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }
}

/// Lexically normalizes a path, removing `.` and resolving `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(seg) => normalized.push(seg),
        }
    }
    normalized
}
