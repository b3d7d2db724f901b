// src/deps/graph.rs

//! Declaration-level dependency graph.
//!
//! Nodes live in a slot arena indexed by [`NodeId`]; freed slots are reused.
//! Keys and owning files are interned to [`KeyId`] / [`FileId`]. Edges point
//! at keys rather than nodes and are resolved through the `providers` index,
//! so a file can be replaced without touching any other file's nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::deps::record::DeclarationRecord;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationNode {
    pub file: FileId,
    pub key: KeyId,
    pub fingerprint: Fingerprint,
    /// Keys whose interface this declaration relies on.
    pub provides: Vec<KeyId>,
    /// Keys this declaration only needs to exist.
    pub uses: Vec<KeyId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub key: String,
    pub kind: KeyChangeKind,
}

#[derive(Debug, Clone, Default)]
struct Interner<T: Clone + Eq + std::hash::Hash> {
    values: Vec<T>,
    ids: HashMap<T, u32>,
}

impl<T: Clone + Eq + std::hash::Hash> Interner<T> {
    fn intern(&mut self, value: &T) -> u32 {
        if let Some(id) = self.ids.get(value) {
            return *id;
        }
        let id = self.values.len() as u32;
        self.values.push(value.clone());
        self.ids.insert(value.clone(), id);
        id
    }

    fn lookup(&self, value: &T) -> Option<u32> {
        self.ids.get(value).copied()
    }

    fn resolve(&self, id: u32) -> &T {
        &self.values[id as usize]
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Option<DeclarationNode>>,
    free: Vec<NodeId>,
    keys: Interner<String>,
    files: Interner<PathBuf>,
    by_file: BTreeMap<FileId, Vec<NodeId>>,
    providers: HashMap<KeyId, BTreeSet<NodeId>>,
    interface_users: HashMap<KeyId, BTreeSet<NodeId>>,
    implementation_users: HashMap<KeyId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&DeclarationNode> {
        self.nodes.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn key_name(&self, key: KeyId) -> &str {
        self.keys.resolve(key.0)
    }

    pub fn file_path(&self, file: FileId) -> &Path {
        self.files.resolve(file.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.file_id(path)
            .is_some_and(|file| self.by_file.contains_key(&file))
    }

    /// Files that currently own at least one declaration, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .by_file
            .keys()
            .map(|file| self.file_path(*file).to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// Declarations of `path`, in the order they were recorded.
    pub fn declarations_of(&self, path: &Path) -> Vec<DeclarationRecord> {
        let Some(file) = self.file_id(path) else {
            return Vec::new();
        };
        self.by_file
            .get(&file)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.node(*id))
                    .map(|node| DeclarationRecord {
                        key: self.key_name(node.key).to_string(),
                        fingerprint: node.fingerprint.clone(),
                        provides: node
                            .provides
                            .iter()
                            .map(|k| self.key_name(*k).to_string())
                            .collect(),
                        uses: node
                            .uses
                            .iter()
                            .map(|k| self.key_name(*k).to_string())
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Files owning a node that provides `key`.
    pub fn providers_of(&self, key: &str) -> BTreeSet<PathBuf> {
        self.keys
            .lookup(&key.to_string())
            .and_then(|k| self.providers.get(&KeyId(k)))
            .map(|nodes| self.owners(nodes))
            .unwrap_or_default()
    }

    /// Replace every declaration owned by `path` with `declarations`.
    ///
    /// Returns the per-key difference between the old and new declarations.
    /// A key listed twice keeps its first position and last fingerprint.
    pub fn replace_declarations(
        &mut self,
        path: &Path,
        declarations: &[DeclarationRecord],
    ) -> Vec<KeyChange> {
        let old = self.fingerprints_of(path);

        let mut merged: Vec<DeclarationRecord> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        for decl in declarations {
            match position.get(decl.key.as_str()) {
                Some(idx) => merged[*idx] = decl.clone(),
                None => {
                    position.insert(decl.key.as_str(), merged.len());
                    merged.push(decl.clone());
                }
            }
        }

        let new: BTreeMap<String, Fingerprint> = merged
            .iter()
            .map(|decl| (decl.key.clone(), decl.fingerprint.clone()))
            .collect();

        let changes = diff_keys(&old, &new);

        self.drop_nodes_of(path);
        if !merged.is_empty() {
            let file = FileId(self.files.intern(&path.to_path_buf()));
            let mut ids = Vec::with_capacity(merged.len());
            for decl in &merged {
                ids.push(self.insert_node(file, decl));
            }
            self.by_file.insert(file, ids);
        }

        debug!(
            file = ?path,
            declarations = merged.len(),
            changes = changes.len(),
            "replaced declarations"
        );
        changes
    }

    /// Remove every declaration owned by `path`, returning them as removals.
    pub fn remove_file(&mut self, path: &Path) -> Vec<KeyChange> {
        self.replace_declarations(path, &[])
    }

    /// Files whose compiled output may be invalid after `changes`.
    ///
    /// Added or modified keys affect owners of interface edges to them.
    /// Removed keys affect interface users, and implementation users too
    /// once no provider of the key remains. `exclude` is never returned.
    pub fn files_affected_by(&self, changes: &[KeyChange], exclude: &Path) -> BTreeSet<PathBuf> {
        let mut nodes = BTreeSet::new();
        for change in changes {
            let Some(key) = self.keys.lookup(&change.key).map(KeyId) else {
                continue;
            };
            if let Some(users) = self.interface_users.get(&key) {
                nodes.extend(users.iter().copied());
            }
            if change.kind == KeyChangeKind::Removed && !self.has_provider(key) {
                if let Some(users) = self.implementation_users.get(&key) {
                    nodes.extend(users.iter().copied());
                }
            }
        }

        let mut files = self.owners(&nodes);
        files.remove(exclude);
        files
    }

    /// Look for a cycle among interface edges. Self-edges are ignored.
    ///
    /// Returns the key of a declaration on the cycle.
    pub fn find_interface_cycle(&self) -> Option<String> {
        let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
        for node in self.nodes.iter().flatten() {
            graph.add_node(node.key.0);
            for provided in &node.provides {
                if *provided != node.key {
                    graph.add_edge(provided.0, node.key.0, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(_) => None,
            Err(cycle) => Some(self.key_name(KeyId(cycle.node_id())).to_string()),
        }
    }

    fn file_id(&self, path: &Path) -> Option<FileId> {
        self.files.lookup(&path.to_path_buf()).map(FileId)
    }

    fn fingerprints_of(&self, path: &Path) -> BTreeMap<String, Fingerprint> {
        let Some(file) = self.file_id(path) else {
            return BTreeMap::new();
        };
        self.by_file
            .get(&file)
            .into_iter()
            .flatten()
            .filter_map(|id| self.node(*id))
            .map(|node| (self.key_name(node.key).to_string(), node.fingerprint.clone()))
            .collect()
    }

    fn has_provider(&self, key: KeyId) -> bool {
        self.providers.get(&key).is_some_and(|nodes| !nodes.is_empty())
    }

    fn owners(&self, nodes: &BTreeSet<NodeId>) -> BTreeSet<PathBuf> {
        nodes
            .iter()
            .filter_map(|id| self.node(*id))
            .map(|node| self.file_path(node.file).to_path_buf())
            .collect()
    }

    fn insert_node(&mut self, file: FileId, decl: &DeclarationRecord) -> NodeId {
        let key = KeyId(self.keys.intern(&decl.key));
        let provides: Vec<KeyId> = decl
            .provides
            .iter()
            .map(|k| KeyId(self.keys.intern(k)))
            .collect();
        let uses: Vec<KeyId> = decl
            .uses
            .iter()
            .map(|k| KeyId(self.keys.intern(k)))
            .collect();

        let node = DeclarationNode {
            file,
            key,
            fingerprint: decl.fingerprint.clone(),
            provides,
            uses,
        };

        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0 as usize] = Some(node.clone());
                id
            }
            None => {
                self.nodes.push(Some(node.clone()));
                NodeId((self.nodes.len() - 1) as u32)
            }
        };

        self.providers.entry(key).or_default().insert(id);
        for k in &node.provides {
            self.interface_users.entry(*k).or_default().insert(id);
        }
        for k in &node.uses {
            self.implementation_users.entry(*k).or_default().insert(id);
        }
        id
    }

    fn drop_nodes_of(&mut self, path: &Path) {
        let Some(file) = self.file_id(path) else {
            return;
        };
        let Some(ids) = self.by_file.remove(&file) else {
            return;
        };

        for id in ids {
            let Some(node) = self.nodes[id.0 as usize].take() else {
                continue;
            };
            remove_from_index(&mut self.providers, node.key, id);
            for k in &node.provides {
                remove_from_index(&mut self.interface_users, *k, id);
            }
            for k in &node.uses {
                remove_from_index(&mut self.implementation_users, *k, id);
            }
            self.free.push(id);
        }
    }
}

fn remove_from_index(index: &mut HashMap<KeyId, BTreeSet<NodeId>>, key: KeyId, id: NodeId) {
    if let Some(set) = index.get_mut(&key) {
        set.remove(&id);
        if set.is_empty() {
            index.remove(&key);
        }
    }
}

fn diff_keys(
    old: &BTreeMap<String, Fingerprint>,
    new: &BTreeMap<String, Fingerprint>,
) -> Vec<KeyChange> {
    let mut changes = Vec::new();
    for (key, fingerprint) in new {
        match old.get(key) {
            None => changes.push(KeyChange {
                key: key.clone(),
                kind: KeyChangeKind::Added,
            }),
            Some(previous) if previous != fingerprint => changes.push(KeyChange {
                key: key.clone(),
                kind: KeyChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            changes.push(KeyChange {
                key: key.clone(),
                kind: KeyChangeKind::Removed,
            });
        }
    }
    changes
}
