// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the LUAP page engine.
//!
//! This module defines [`LuapError`], the main error enum, and
//! [`ExitSignal`], the marker raised by the `exit()` page primitive.
//!
//! # Error Categories
//!
//! - **Page not found**: the resolved template does not exist
//! - **Render errors**: malformed templates (unterminated script tag)
//! - **Storage errors**: cache directory or file I/O failures
//! - **Exit**: not a failure, a request to stop rendering immediately
//! - **Handler errors**: failures raised by request handlers
//! - **Lua errors**: runtime failures inside compiled pages
//!
//! Exit signals travel through Lua as an external error. Use
//! [`LuapError::from_lua`] (or the `From<mlua::Error>` impl) at every Lua
//! boundary so they come back out as [`LuapError::Exit`] instead of being
//! reported as a runtime fault.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Marker error carried through the Lua stack by `exit()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitSignal;

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page exit")
    }
}

impl std::error::Error for ExitSignal {}

impl ExitSignal {
    /// Wraps the signal as an `mlua` error so it can unwind a Lua call.
    pub fn into_lua(self) -> mlua::Error {
        mlua::Error::external(self)
    }

    /// Returns true if `err` (or any error it wraps) is an exit signal.
    pub fn is_in(err: &mlua::Error) -> bool {
        match err {
            mlua::Error::ExternalError(inner) => inner.downcast_ref::<ExitSignal>().is_some(),
            mlua::Error::CallbackError { cause, .. } => Self::is_in(cause),
            mlua::Error::WithContext { cause, .. } => Self::is_in(cause),
            _ => false,
        }
    }
}

/// The main error type for LUAP operations.
#[derive(Error, Debug)]
pub enum LuapError {
    /// The requested template does not exist or is not readable.
    #[error("page not found: {}", .0.display())]
    PageNotFound(PathBuf),

    /// The template could not be compiled.
    #[error("page render error in {}: {message}", path.display())]
    RenderError {
        /// The template being compiled.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Cache directory or file operation failed.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Rendering was stopped by `exit()`. Never reported as a failure.
    #[error("page exit")]
    Exit,

    /// A request handler, controller or error handler failed.
    #[error("handler error: {0}")]
    HandlerError(String),

    /// Lua runtime error raised while executing a compiled page.
    #[error("Lua execution error: {0}")]
    Lua(mlua::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LuapError {
    /// Converts an `mlua` error, unwrapping exit signals.
    pub fn from_lua(err: mlua::Error) -> Self {
        if ExitSignal::is_in(&err) {
            LuapError::Exit
        } else {
            LuapError::Lua(err)
        }
    }

    /// Returns true for the exit control signal.
    pub fn is_exit(&self) -> bool {
        matches!(self, LuapError::Exit)
    }

    /// Converts back into an `mlua` error for propagation out of a Lua callback.
    pub fn into_lua(self) -> mlua::Error {
        match self {
            LuapError::Exit => ExitSignal.into_lua(),
            LuapError::Lua(err) => err,
            other => mlua::Error::external(other),
        }
    }

    /// Creates a handler error from any displayable message.
    pub fn handler(message: impl fmt::Display) -> Self {
        LuapError::HandlerError(message.to_string())
    }
}

impl From<mlua::Error> for LuapError {
    fn from(err: mlua::Error) -> Self {
        LuapError::from_lua(err)
    }
}

/// Convenience type alias for Results with [`LuapError`].
pub type Result<T> = std::result::Result<T, LuapError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn exit_signal_survives_callback_wrapping() {
        let wrapped = mlua::Error::CallbackError {
            traceback: String::new(),
            cause: Arc::new(ExitSignal.into_lua()),
        };
        assert!(ExitSignal::is_in(&wrapped));
        assert!(LuapError::from(wrapped).is_exit());
    }

    #[test]
    fn runtime_errors_are_not_exits() {
        let err = LuapError::from(mlua::Error::RuntimeError("boom".into()));
        assert!(!err.is_exit());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn exit_round_trips_through_lua() {
        let lua = mlua::Lua::new();
        let exit = lua
            .create_function(|_, ()| Err::<(), _>(LuapError::Exit.into_lua()))
            .unwrap();
        lua.globals().set("exit", exit).unwrap();
        let err = lua.load("local x = 1; exit(); error('unreachable')").exec().unwrap_err();
        assert!(LuapError::from(err).is_exit());
    }
}
