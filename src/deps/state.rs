// src/deps/state.rs

//! Persisted incremental state.
//!
//! The state file is versioned JSON with sorted maps, so a load followed by a
//! save reproduces the same bytes. Loading is fail-safe: a missing file is
//! [`StateLoad::Missing`], anything unreadable or inconsistent is
//! [`StateLoad::Corrupt`], and both make every input dirty.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deps::graph::DependencyGraph;
use crate::deps::record::DeclarationRecord;
use crate::fingerprint::Fingerprint;
use crate::fs::FileSystem;

/// Bumped whenever the persisted layout changes.
pub const STATE_VERSION: u32 = 1;

/// Default file name for the state, relative to the output directory.
pub const STATE_FILE: &str = "driverdag-state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Fingerprint the input had when it last compiled cleanly.
    /// `None` means it must be rebuilt.
    pub fingerprint: Option<Fingerprint>,
}

/// Everything the driver remembers between invocations.
#[derive(Debug, Clone, Default)]
pub struct PriorBuildState {
    pub graph: DependencyGraph,
    pub inputs: BTreeMap<PathBuf, InputRecord>,
    /// Keys of jobs that were scheduled but did not succeed.
    pub stale_jobs: BTreeSet<String>,
    /// Fingerprint of the build options the state was produced under.
    pub options: Option<Fingerprint>,
    /// Command fingerprint of every planned job, by job key.
    pub commands: BTreeMap<String, Fingerprint>,
}

impl PartialEq for PriorBuildState {
    fn eq(&self, other: &Self) -> bool {
        self.to_persisted() == other.to_persisted()
    }
}

impl PriorBuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint_of(&self, path: &Path) -> Option<&Fingerprint> {
        self.inputs.get(path).and_then(|r| r.fingerprint.as_ref())
    }

    pub fn to_persisted(&self) -> PersistedState {
        let mut files = BTreeMap::new();
        for file in self.graph.files() {
            let declarations = self.graph.declarations_of(&file);
            files.insert(file, declarations);
        }

        PersistedState {
            version: STATE_VERSION,
            options: self.options.clone(),
            inputs: self.inputs.clone(),
            stale_jobs: self.stale_jobs.clone(),
            commands: self.commands.clone(),
            declarations: files,
        }
    }

    /// Rebuild a state from its persisted form.
    ///
    /// Returns a description of the first inconsistency found, if any.
    pub fn from_persisted(persisted: PersistedState) -> std::result::Result<Self, String> {
        if persisted.version != STATE_VERSION {
            return Err(format!(
                "unsupported state version {} (expected {})",
                persisted.version, STATE_VERSION
            ));
        }

        let mut graph = DependencyGraph::new();
        for (file, declarations) in &persisted.declarations {
            let mut seen = BTreeSet::new();
            for decl in declarations {
                if decl.key.is_empty() {
                    return Err(format!("empty declaration key in {:?}", file));
                }
                if !seen.insert(decl.key.as_str()) {
                    return Err(format!(
                        "declaration '{}' listed twice for {:?}",
                        decl.key, file
                    ));
                }
            }
            graph.replace_declarations(file, declarations);
        }

        Ok(Self {
            graph,
            inputs: persisted.inputs,
            stale_jobs: persisted.stale_jobs,
            options: persisted.options,
            commands: persisted.commands,
        })
    }
}

/// On-disk form of [`PriorBuildState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub options: Option<Fingerprint>,
    #[serde(default)]
    pub inputs: BTreeMap<PathBuf, InputRecord>,
    #[serde(default)]
    pub stale_jobs: BTreeSet<String>,
    #[serde(default)]
    pub commands: BTreeMap<String, Fingerprint>,
    #[serde(default)]
    pub declarations: BTreeMap<PathBuf, Vec<DeclarationRecord>>,
}

/// Result of loading the persisted state.
#[derive(Debug, Clone)]
pub enum StateLoad {
    Loaded(PriorBuildState),
    Missing,
    Corrupt(String),
}

/// Reads and writes [`PriorBuildState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl StateStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StateLoad {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no prior build state");
            return StateLoad::Missing;
        }

        let text = match self.fs.read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => return StateLoad::Corrupt(format!("{err:#}")),
        };

        let persisted: PersistedState = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(err) => return StateLoad::Corrupt(err.to_string()),
        };

        match PriorBuildState::from_persisted(persisted) {
            Ok(state) => {
                debug!(
                    path = ?self.path,
                    inputs = state.inputs.len(),
                    declarations = state.graph.node_count(),
                    "loaded prior build state"
                );
                StateLoad::Loaded(state)
            }
            Err(reason) => StateLoad::Corrupt(reason),
        }
    }

    pub fn save(&self, state: &PriorBuildState) -> Result<()> {
        let text = serde_json::to_string_pretty(&state.to_persisted())
            .context("serializing build state")?;
        self.fs
            .write(&self.path, text.as_bytes())
            .with_context(|| format!("writing build state to {:?}", self.path))?;
        info!(path = ?self.path, inputs = state.inputs.len(), "saved build state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn sample_state() -> PriorBuildState {
        let mut state = PriorBuildState::new();
        state.graph.replace_declarations(
            Path::new("/b.src"),
            &[DeclarationRecord {
                key: "b::f".into(),
                fingerprint: Fingerprint::from_hex("02"),
                provides: vec!["a::x".into()],
                uses: vec![],
            }],
        );
        state.inputs.insert(
            PathBuf::from("/b.src"),
            InputRecord {
                fingerprint: Some(Fingerprint::from_hex("ff")),
            },
        );
        state.inputs.insert(PathBuf::from("/a.src"), InputRecord::default());
        state.stale_jobs.insert("link:/out/App".into());
        state
            .commands
            .insert("link:/out/App".into(), Fingerprint::from_hex("0c"));
        state
    }

    #[test]
    fn save_then_load_is_lossless() {
        let fs = Arc::new(MockFileSystem::new());
        let store = StateStore::new(fs.clone(), "/out/state.json");
        let state = sample_state();

        store.save(&state).unwrap();
        let first = fs.contents("/out/state.json").unwrap();

        let StateLoad::Loaded(loaded) = store.load() else {
            panic!("state should load");
        };
        assert_eq!(loaded, state);

        store.save(&loaded).unwrap();
        assert_eq!(fs.contents("/out/state.json").unwrap(), first);
    }

    #[test]
    fn missing_and_corrupt_files_are_distinguished() {
        let fs = Arc::new(MockFileSystem::new());
        let store = StateStore::new(fs.clone(), "/out/state.json");
        assert!(matches!(store.load(), StateLoad::Missing));

        fs.add_file("/out/state.json", "{ truncated");
        assert!(matches!(store.load(), StateLoad::Corrupt(_)));
    }

    #[test]
    fn inconsistent_state_is_corrupt() {
        let fs = Arc::new(MockFileSystem::new());
        let store = StateStore::new(fs.clone(), "/s.json");

        fs.add_file("/s.json", r#"{"version": 99}"#);
        assert!(matches!(store.load(), StateLoad::Corrupt(msg) if msg.contains("version")));

        fs.add_file(
            "/s.json",
            r#"{"version":1,"declarations":{"/a.src":[
                {"key":"k","fingerprint":"1"},{"key":"k","fingerprint":"2"}]}}"#,
        );
        assert!(matches!(store.load(), StateLoad::Corrupt(msg) if msg.contains("twice")));
    }
}
