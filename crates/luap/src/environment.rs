// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Scoped installation of page primitives into a Lua namespace.
//!
//! Page primitives (`echo`, `include`, ...) exist in the Lua globals only
//! while a page renders. [`PageEnvironment::activate`] backs up whatever
//! the namespace held under those names and installs the bindings; the
//! returned [`EnvGuard`] puts the old values back when dropped.
//!
//! Activation nests: only the outermost activation takes the backup and
//! only the outermost deactivation restores it. Inner activations see the
//! bindings installed by the outer one unchanged.

use std::ops::{Deref, DerefMut};

use mlua::{Function, Table, Value};

use crate::error::{LuapError, Result};

/// Names of the fixed page primitives.
pub const PAGE_PRIMITIVES: &[&str] = &[
    "echo",
    "exit",
    "url",
    "include",
    "includeOnce",
    "setHeader",
    "getHeader",
    "getHeaders",
    "getParam",
    "getParams",
];

/// The set of functions installed for one render.
#[derive(Debug, Clone, Default)]
pub struct PageBindings {
    entries: Vec<(String, Function)>,
}

impl PageBindings {
    /// Creates an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding (replacing an earlier one with the same name).
    pub fn bind(&mut self, name: impl Into<String>, function: Function) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = function,
            None => self.entries.push((name, function)),
        }
    }

    /// Bound names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Request-scoped swap of page primitives into a namespace table.
#[derive(Debug)]
pub struct PageEnvironment {
    namespace: Table,
    backup: Option<Vec<(String, Value)>>,
    depth: usize,
}

impl PageEnvironment {
    /// Creates an environment over `namespace` (normally `lua.globals()`).
    pub fn new(namespace: Table) -> Self {
        Self {
            namespace,
            backup: None,
            depth: 0,
        }
    }

    /// Installs `bindings`, returning a guard that deactivates on drop.
    ///
    /// Nested calls while already active only deepen the activation.
    pub fn activate(&mut self, bindings: &PageBindings) -> Result<EnvGuard<'_>> {
        if self.depth == 0 {
            let mut backup = Vec::with_capacity(bindings.len());
            for (name, _) in &bindings.entries {
                let previous: Value = self.namespace.raw_get(name.as_str())?;
                backup.push((name.clone(), previous));
            }
            // Keep the backup before installing so a failed install still restores.
            self.backup = Some(backup);
            self.depth = 1;
            for (name, function) in &bindings.entries {
                if let Err(e) = self.namespace.raw_set(name.as_str(), function.clone()) {
                    self.deactivate()?;
                    return Err(LuapError::from(e));
                }
            }
            tracing::debug!("Page environment activated with {} binding(s)", bindings.len());
        } else {
            self.depth += 1;
        }
        Ok(EnvGuard { env: self })
    }

    /// Ends one activation, restoring the namespace at the outermost one.
    pub fn deactivate(&mut self) -> Result<()> {
        match self.depth {
            0 => Ok(()),
            1 => {
                self.depth = 0;
                if let Some(backup) = self.backup.take() {
                    for (name, value) in backup {
                        self.namespace.raw_set(name.as_str(), value)?;
                    }
                }
                tracing::debug!("Page environment restored");
                Ok(())
            }
            _ => {
                self.depth -= 1;
                Ok(())
            }
        }
    }

    /// Returns true while at least one activation is live.
    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// Current activation depth.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Live activation of a [`PageEnvironment`]; deactivates when dropped.
///
/// Dereferences to the environment so activations can nest.
#[derive(Debug)]
pub struct EnvGuard<'a> {
    env: &'a mut PageEnvironment,
}

impl Deref for EnvGuard<'_> {
    type Target = PageEnvironment;

    fn deref(&self) -> &Self::Target {
        self.env
    }
}

impl DerefMut for EnvGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.env
    }
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.env.deactivate() {
            tracing::warn!("Failed to restore page environment: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn bindings(lua: &Lua, marker: &'static str) -> PageBindings {
        let mut bindings = PageBindings::new();
        bindings.bind("echo", lua.create_function(move |_, ()| Ok(marker)).unwrap());
        bindings.bind("exit", lua.create_function(|_, ()| Ok(())).unwrap());
        bindings
    }

    #[test]
    fn test_activate_installs_and_restores() {
        let lua = Lua::new();
        lua.globals().set("echo", "previous").unwrap();
        let mut env = PageEnvironment::new(lua.globals());
        {
            let _guard = env.activate(&bindings(&lua, "page")).unwrap();
            let out: String = lua.load("return echo()").eval().unwrap();
            assert_eq!(out, "page");
        }
        let echo: String = lua.globals().get("echo").unwrap();
        assert_eq!(echo, "previous");
        let exit: Value = lua.globals().get("exit").unwrap();
        assert!(exit.is_nil());
        assert!(!env.is_active());
    }

    #[test]
    fn test_nested_activation_keeps_outer_bindings() {
        let lua = Lua::new();
        lua.globals().set("echo", 7).unwrap();
        let mut env = PageEnvironment::new(lua.globals());
        {
            let mut outer = env.activate(&bindings(&lua, "outer")).unwrap();
            {
                let inner = outer.activate(&bindings(&lua, "inner")).unwrap();
                assert_eq!(inner.depth(), 2);
                let out: String = lua.load("return echo()").eval().unwrap();
                assert_eq!(out, "outer");
            }
            // Inner completion must not restore anything yet.
            let out: String = lua.load("return echo()").eval().unwrap();
            assert_eq!(out, "outer");
            assert_eq!(outer.depth(), 1);
        }
        let echo: i64 = lua.globals().get("echo").unwrap();
        assert_eq!(echo, 7);
    }

    #[test]
    fn test_guard_restores_on_error_path() {
        let lua = Lua::new();
        let mut env = PageEnvironment::new(lua.globals());
        let result: Result<()> = (|| {
            let _guard = env.activate(&bindings(&lua, "page"))?;
            lua.load("error('boom')").exec()?;
            Ok(())
        })();
        assert!(result.is_err());
        let echo: Value = lua.globals().get("echo").unwrap();
        assert!(echo.is_nil());
    }

    #[test]
    fn test_page_reassignment_is_undone() {
        let lua = Lua::new();
        lua.globals().set("getParam", "host value").unwrap();
        let mut env = PageEnvironment::new(lua.globals());
        let mut page = bindings(&lua, "page");
        page.bind("getParam", lua.create_function(|_, ()| Ok(1)).unwrap());
        {
            let _guard = env.activate(&page).unwrap();
            lua.load("echo = nil; getParam = 'overwritten'").exec().unwrap();
        }
        let value: String = lua.globals().get("getParam").unwrap();
        assert_eq!(value, "host value");
        assert!(lua.globals().get::<Value>("echo").unwrap().is_nil());
    }
}
