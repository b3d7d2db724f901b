// src/plan/modules.rs

//! External module dependency graph for explicit module builds.
//!
//! The graph comes from a dependency scanner that runs once before planning.
//! The scanner's JSON output has this shape:
//!
//! ```json
//! {
//!   "modules": {
//!     "Core": { "interface": "/sdk/Core.interface", "dependencies": [] },
//!     "Net":  { "interface": "/sdk/Net.interface",  "dependencies": ["Core"] }
//!   },
//!   "imports": { "/proj/a.src": ["Net"] }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::PlanningError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalModule {
    #[serde(rename = "interface")]
    pub interface_path: PathBuf,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependencyGraph {
    #[serde(default)]
    pub modules: BTreeMap<String, ExternalModule>,
    /// Modules each input imports directly.
    #[serde(default)]
    pub imports: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl ModuleDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module<I, S>(&mut self, name: &str, interface_path: impl Into<PathBuf>, deps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.insert(
            name.to_string(),
            ExternalModule {
                interface_path: interface_path.into(),
                dependencies: deps.into_iter().map(Into::into).collect(),
            },
        );
    }

    pub fn add_import(&mut self, input: impl Into<PathBuf>, module: &str) {
        self.imports
            .entry(input.into())
            .or_default()
            .insert(module.to_string());
    }

    /// Module names in dependency order.
    ///
    /// Nodes are added in name order, so the order is stable for a given
    /// graph.
    pub fn build_order(&self) -> Result<Vec<String>, PlanningError> {
        for (name, module) in &self.modules {
            for dep in &module.dependencies {
                if !self.modules.contains_key(dep) {
                    return Err(PlanningError::UnknownModule {
                        module: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        for (input, imported) in &self.imports {
            for dep in imported {
                if !self.modules.contains_key(dep) {
                    return Err(PlanningError::UnknownModule {
                        module: input.display().to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.modules.keys() {
            graph.add_node(name.as_str());
        }
        for (name, module) in &self.modules {
            for dep in &module.dependencies {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| PlanningError::ModuleCycle(cycle.node_id().to_string()))?;
        Ok(order.into_iter().map(str::to_string).collect())
    }

    /// Modules `input` needs: its imports and everything they depend on.
    pub fn modules_needed_by(&self, input: &Path) -> BTreeSet<String> {
        let mut needed = BTreeSet::new();
        let mut stack: Vec<&String> = self
            .imports
            .get(input)
            .map(|set| set.iter().collect())
            .unwrap_or_default();
        while let Some(name) = stack.pop() {
            if needed.insert(name.clone()) {
                if let Some(module) = self.modules.get(name) {
                    stack.extend(module.dependencies.iter());
                }
            }
        }
        needed
    }
}

/// Discovers the module dependency graph of a set of inputs.
pub trait DependencyScanner: Send + Sync {
    fn scan(&self, inputs: &[PathBuf]) -> Result<ModuleDependencyGraph, PlanningError>;
}

/// A pre-computed graph acts as its own scanner.
impl DependencyScanner for ModuleDependencyGraph {
    fn scan(&self, _inputs: &[PathBuf]) -> Result<ModuleDependencyGraph, PlanningError> {
        Ok(self.clone())
    }
}

/// Runs an external scanner tool with every input as an argument and parses
/// the graph from its standard output.
#[derive(Debug, Clone)]
pub struct ToolScanner {
    tool: String,
}

impl ToolScanner {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

impl DependencyScanner for ToolScanner {
    fn scan(&self, inputs: &[PathBuf]) -> Result<ModuleDependencyGraph, PlanningError> {
        info!(tool = %self.tool, inputs = inputs.len(), "scanning module dependencies");

        let output = Command::new(&self.tool)
            .args(inputs)
            .output()
            .map_err(|e| PlanningError::ScanFailed(format!("spawning '{}': {e}", self.tool)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlanningError::ScanFailed(format!(
                "'{}' exited with {}: {}",
                self.tool,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let graph: ModuleDependencyGraph = serde_json::from_slice(&output.stdout)
            .map_err(|e| PlanningError::ScanFailed(format!("parsing scanner output: {e}")))?;
        debug!(modules = graph.modules.len(), "scanner reported modules");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_order_is_topological_and_deterministic() {
        let mut graph = ModuleDependencyGraph::new();
        graph.add_module("Net", "/sdk/Net.interface", ["Core"]);
        graph.add_module("Core", "/sdk/Core.interface", Vec::<String>::new());
        graph.add_module("Ui", "/sdk/Ui.interface", ["Core", "Net"]);
        graph.add_module("Base", "/sdk/Base.interface", Vec::<String>::new());

        let order = graph.build_order().unwrap();
        assert_eq!(order.len(), 4);
        let position = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(position("Core") < position("Net"));
        assert!(position("Net") < position("Ui"));
        assert_eq!(graph.clone().build_order().unwrap(), order);
    }

    #[test]
    fn self_dependent_module_is_a_cycle() {
        let mut graph = ModuleDependencyGraph::new();
        graph.add_module("Loop", "/sdk/Loop.interface", ["Loop"]);
        assert_eq!(
            graph.build_order(),
            Err(PlanningError::ModuleCycle("Loop".into()))
        );
    }

    #[test]
    fn cycles_and_unknown_modules_are_rejected() {
        let mut graph = ModuleDependencyGraph::new();
        graph.add_module("A", "/a", ["B"]);
        graph.add_module("B", "/b", ["A"]);
        assert!(matches!(graph.build_order(), Err(PlanningError::ModuleCycle(_))));

        let mut graph = ModuleDependencyGraph::new();
        graph.add_import("/p/a.src", "Missing");
        assert_eq!(
            graph.build_order(),
            Err(PlanningError::UnknownModule {
                module: "/p/a.src".into(),
                dependency: "Missing".into()
            })
        );
    }

    #[test]
    fn needed_modules_are_transitive() {
        let mut graph = ModuleDependencyGraph::new();
        graph.add_module("Core", "/c", Vec::<String>::new());
        graph.add_module("Net", "/n", ["Core"]);
        graph.add_import("/p/a.src", "Net");

        assert_eq!(
            graph.modules_needed_by(Path::new("/p/a.src")),
            BTreeSet::from(["Core".to_string(), "Net".to_string()])
        );
        assert!(graph.modules_needed_by(Path::new("/p/b.src")).is_empty());
    }

    #[test]
    fn scanner_json_parses() {
        let graph: ModuleDependencyGraph = serde_json::from_str(
            r#"{"modules":{"Core":{"interface":"/sdk/Core.interface"}},
                "imports":{"/p/a.src":["Core"]}}"#,
        )
        .unwrap();
        assert_eq!(graph.modules["Core"].interface_path, PathBuf::from("/sdk/Core.interface"));
        assert!(graph.modules["Core"].dependencies.is_empty());
    }
}
