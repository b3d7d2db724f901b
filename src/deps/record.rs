// src/deps/record.rs

//! Per-primary dependency records written by compile jobs.
//!
//! ```json
//! {
//!   "source": "/proj/src/a.src",
//!   "declarations": [
//!     { "key": "a::parse", "fingerprint": "9f..", "provides": ["b::Token"], "uses": [] }
//!   ]
//! }
//! ```
//!
//! `provides` lists the keys whose *interface* the declaration relies on.
//! `uses` lists keys it only needs to exist.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub source: PathBuf,
    #[serde(default)]
    pub declarations: Vec<DeclarationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    pub key: String,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub uses: Vec<String>,
}

impl DependencyRecord {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            declarations: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let record = serde_json::from_str(text).context("parsing dependency record")?;
        Ok(record)
    }

    pub fn to_json(&self) -> Result<String> {
        let text = serde_json::to_string_pretty(self).context("serializing dependency record")?;
        Ok(text)
    }
}

/// Read and parse the record at `path`.
pub fn read_record(fs: &dyn FileSystem, path: &Path) -> Result<DependencyRecord> {
    let text = fs.read_to_string(path)?;
    DependencyRecord::parse(&text).with_context(|| format!("in dependency record {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn missing_edge_lists_default_to_empty() {
        let record = DependencyRecord::parse(
            r#"{"source":"/a.src","declarations":[{"key":"a","fingerprint":"01"}]}"#,
        )
        .unwrap();
        assert_eq!(record.declarations.len(), 1);
        assert!(record.declarations[0].provides.is_empty());
        assert!(record.declarations[0].uses.is_empty());
    }

    #[test]
    fn garbage_records_are_rejected_with_path_context() {
        let fs = MockFileSystem::new();
        fs.add_file("/out/a.deps.json", "not json");
        let err = read_record(&fs, Path::new("/out/a.deps.json")).unwrap_err();
        assert!(format!("{err:#}").contains("a.deps.json"));
    }
}
