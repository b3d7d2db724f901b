// src/config/inputs.rs

//! Resolve `[inputs]` into a concrete, ordered list of source files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::model::InputsSection;
use crate::fs::FileSystem;

/// Compiled include/exclude patterns, matched against paths relative to the
/// request root.
#[derive(Debug, Clone)]
pub struct InputPatterns {
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl InputPatterns {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building include globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Every input named by `section`, relative paths resolved against `root`.
///
/// Explicit `files` must exist and are kept even when an exclude pattern
/// matches them. Glob matches skip hidden directories. The result is sorted
/// and free of duplicates, so input order never depends on directory
/// listing order.
pub fn discover_inputs(
    fs: &dyn FileSystem,
    root: &Path,
    section: &InputsSection,
) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();

    for file in &section.files {
        let path = resolve(root, file);
        if !fs.is_file(&path) {
            anyhow::bail!("input file {:?} does not exist", path);
        }
        found.insert(path);
    }

    if !section.include.is_empty() {
        let patterns = InputPatterns::new(&section.include, &section.exclude)?;
        for path in collect_matching_files(fs, root, &patterns)? {
            found.insert(path);
        }
    }

    debug!(count = found.len(), root = ?root, "discovered inputs");
    Ok(found.into_iter().collect())
}

fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    patterns: &InputPatterns,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if is_hidden(&path) {
                continue;
            }
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if patterns.matches(&rel_str) {
                        files.push(path);
                    }
                }
            }
        }
    }

    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// `value` if absolute, otherwise joined onto `root`.
pub fn resolve(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
