// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Page precompilation command.
//!
//! Compiles pages into the page cache ahead of the first request, which
//! also surfaces template errors without serving anything.

use std::path::{Path, PathBuf};

use console::style;
use luap::Engine;
use serde::Serialize;

use crate::config::Config;

/// Outcome of compiling one page.
#[derive(Debug, Serialize)]
pub struct CompileReport {
    /// Page source.
    pub source: PathBuf,
    /// Compiled artifact, when compilation succeeded.
    pub artifact: Option<PathBuf>,
    /// Size of the generated Lua code in bytes.
    pub bytes: usize,
    /// Literal, script and echo fragments in the template.
    pub fragments: usize,
    /// Compilation error, if any.
    pub error: Option<String>,
}

/// Compiles `pages` (or every `*.html` file under the page directory).
pub fn run(pages: Vec<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let site_root = std::env::current_dir()?;
    let engine = config.build_engine(&site_root)?;

    let sources = if pages.is_empty() {
        discover_pages(&engine.pages_dir())?
    } else {
        pages.into_iter().map(|p| site_root.join(p)).collect()
    };

    let reports = compile_pages(&engine, &sources);
    let failed = reports.iter().filter(|r| r.error.is_some()).count();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            match &report.error {
                None => println!(
                    "{} {} {}",
                    style("compiled").green(),
                    report.source.display(),
                    style(format!("({} fragments, {} bytes)", report.fragments, report.bytes)).dim()
                ),
                Some(error) => println!("{} {}", style("failed").red().bold(), error),
            }
        }
        println!();
        println!(
            "{} page(s) compiled, {} failed",
            reports.len() - failed,
            failed
        );
    }

    if failed > 0 {
        anyhow::bail!("{} page(s) failed to compile", failed);
    }
    Ok(())
}

/// Finds every `*.html` page under `pages_dir`.
pub fn discover_pages(pages_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*.html", pages_dir.display());
    let mut pages = Vec::new();
    for entry in glob::glob(&pattern)? {
        pages.push(entry?);
    }
    pages.sort();
    Ok(pages)
}

/// Compiles each source through the engine's page cache.
pub fn compile_pages(engine: &Engine, sources: &[PathBuf]) -> Vec<CompileReport> {
    sources
        .iter()
        .map(|source| match engine.compile_page(source) {
            Ok(unit) => CompileReport {
                source: source.clone(),
                artifact: Some(engine.cache_path(source)),
                bytes: unit.code.len(),
                fragments: count_fragments(engine, source),
                error: None,
            },
            Err(e) => {
                tracing::warn!("Failed to compile {}: {}", source.display(), e);
                CompileReport {
                    source: source.clone(),
                    artifact: None,
                    bytes: 0,
                    fragments: 0,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect()
}

fn count_fragments(engine: &Engine, source: &Path) -> usize {
    engine
        .store()
        .read_file(source)
        .ok()
        .and_then(|text| luap::parse(&text, source).ok())
        .map_or(0, |fragments| fragments.len())
}
