// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template compiler: markup with embedded script tags to a Lua chunk.
//!
//! A template mixes literal text with three tags:
//!
//! - `<?js ... ?>`: a script block, copied verbatim into the chunk
//! - `<?= ... ?>`: an expression whose string value is echoed
//! - `?>`: closes either block
//!
//! The compiler does not parse the embedded Lua; it only finds tag
//! boundaries and splices literal output statements around the script.
//!
//! ```rust
//! use luap::compile;
//!
//! let unit = compile("<p><?= 1 + 1 ?></p>", "/pages/index.html").unwrap();
//! assert_eq!(unit.code, "echo('<p>');echo(tostring( 1 + 1 ));echo('</p>');");
//! ```

use std::path::{Path, PathBuf};

use crate::error::{LuapError, Result};

/// Opens a script block.
pub const SCRIPT_OPEN: &str = "<?js";
/// Opens an echo expression block.
pub const ECHO_OPEN: &str = "<?=";
/// Closes a script or echo block.
pub const TAG_CLOSE: &str = "?>";

/// One piece of a template, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Literal text written to the output unchanged.
    Literal(String),
    /// Lua statements executed as-is.
    Script(String),
    /// Lua expression whose value is written to the output.
    Echo(String),
}

/// The executable form of one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    /// The template this unit was compiled from.
    pub source_path: PathBuf,
    /// Generated Lua source.
    pub code: String,
}

impl CompiledUnit {
    /// Wraps already generated code, e.g. read back from the page cache.
    pub fn new(source_path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            code: code.into(),
        }
    }

    /// Generates the Lua chunk for a fragment list.
    pub fn from_fragments(source_path: impl Into<PathBuf>, fragments: &[Fragment]) -> Self {
        let mut code = String::new();
        for fragment in fragments {
            match fragment {
                Fragment::Literal(text) => push_literal(&mut code, text),
                Fragment::Script(script) => {
                    code.push_str(script);
                    code.push(if ends_in_line_comment(script) { '\n' } else { ' ' });
                }
                Fragment::Echo(expr) => {
                    code.push_str("echo(tostring(");
                    code.push_str(expr);
                    if ends_in_line_comment(expr) {
                        code.push('\n');
                    }
                    code.push_str("));");
                }
            }
        }
        // Separators after a trailing script are not needed.
        if matches!(fragments.last(), Some(Fragment::Script(_))) {
            code.pop();
        }
        Self::new(source_path, code)
    }

    /// Returns true if the unit produces no statements.
    pub fn is_empty(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Splits a template into fragments.
///
/// Fails with [`LuapError::RenderError`] when a script or echo block has no
/// closing `?>`.
pub fn parse(source: &str, source_path: &Path) -> Result<Vec<Fragment>> {
    let mut fragments = Vec::new();
    let mut rest = source;

    while !rest.is_empty() {
        let script = rest.find(SCRIPT_OPEN);
        let echo = rest.find(ECHO_OPEN);
        let (start, tag, is_echo) = match (script, echo) {
            (Some(s), Some(e)) if e < s => (e, ECHO_OPEN, true),
            (Some(s), _) => (s, SCRIPT_OPEN, false),
            (None, Some(e)) => (e, ECHO_OPEN, true),
            (None, None) => {
                fragments.push(Fragment::Literal(rest.to_string()));
                break;
            }
        };

        if start > 0 {
            fragments.push(Fragment::Literal(rest[..start].to_string()));
        }
        rest = &rest[start + tag.len()..];

        let Some(end) = rest.find(TAG_CLOSE) else {
            return Err(LuapError::RenderError {
                path: source_path.to_path_buf(),
                message: format!("missing closing of script tag opened with '{}'", tag),
            });
        };
        let body = rest[..end].to_string();
        fragments.push(if is_echo {
            Fragment::Echo(body)
        } else {
            Fragment::Script(body)
        });
        rest = &rest[end + TAG_CLOSE.len()..];
    }

    Ok(fragments)
}

/// Compiles template source into an executable unit.
pub fn compile(source: &str, source_path: impl AsRef<Path>) -> Result<CompiledUnit> {
    let source_path = source_path.as_ref();
    let fragments = parse(source, source_path)?;
    tracing::debug!(
        "Compiled {} into {} fragment(s)",
        source_path.display(),
        fragments.len()
    );
    Ok(CompiledUnit::from_fragments(source_path, &fragments))
}

/// Escapes text for a single-quoted Lua string literal.
pub fn escape_lua_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\'' | '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\u{2028}' => escaped.push_str("\\u{2028}"),
            '\u{2029}' => escaped.push_str("\\u{2029}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn push_literal(code: &mut String, text: &str) {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    for (i, line) in lines.iter().enumerate() {
        if i == last {
            if !line.is_empty() {
                code.push_str("echo('");
                code.push_str(&escape_lua_string(line));
                code.push_str("');");
            }
        } else {
            code.push_str("echo('");
            code.push_str(&escape_lua_string(line));
            code.push_str("\\n');\n");
        }
    }
}

fn ends_in_line_comment(script: &str) -> bool {
    script.rsplit('\n').next().is_some_and(|line| line.contains("--"))
}
