mod common;
use crate::common::{
    build, driver, executed, init_tracing, with_timeout, workspace, FakeCompiler, RequestBuilder,
};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use driverdag::config::BuildRequest;
use driverdag::dag::JobStatus;
use driverdag::engine::{ExecutionReport, RunOutcome};
use driverdag::errors::PlanningError;
use driverdag::fs::mock::MockFileSystem;
use driverdag::plan::{
    partition, plan, BuildPlan, DependencyScanner, JobGraph, JobKind, ModuleDependencyGraph,
};
use driverdag::types::{CompilationMode, OutputKind};

fn assert_topological(graph: &JobGraph) {
    let order = graph.topological_order();
    assert_eq!(order.len(), graph.len());
    let position: Vec<usize> = {
        let mut position = vec![0; graph.len()];
        for (i, id) in order.iter().enumerate() {
            position[id.index()] = i;
        }
        position
    };
    for job in graph.jobs() {
        for prerequisite in &job.prerequisites {
            assert!(
                position[prerequisite.index()] < position[job.id.index()],
                "{} must come after its prerequisite",
                job.key
            );
        }
    }
}

fn request_strategy() -> impl Strategy<Value = BuildRequest> {
    (
        1..8usize,
        proptest::sample::subsequence(
            vec![
                OutputKind::Object,
                OutputKind::Module,
                OutputKind::Interface,
                OutputKind::Executable,
            ],
            1..=3,
        ),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(count, outputs, whole_module, header)| {
            let fs = MockFileSystem::new();
            let mut builder = RequestBuilder::new(&fs, "App")
                .sources(count)
                .outputs(&outputs);
            if whole_module {
                builder = builder.mode(CompilationMode::WholeModule);
            }
            if header {
                builder = builder.bridging_header("/include/bridge.h", "typedef int t;");
            }
            builder.build()
        })
}

proptest! {
    #[test]
    fn planned_graphs_are_acyclic_and_deterministic(
        request in request_strategy(),
        batch_size in 0..5usize,
    ) {
        let graph = plan(&request, None).unwrap();
        assert_topological(&graph);

        let again = plan(&request, None).unwrap();
        let keys = |g: &JobGraph| g.jobs().map(|j| (j.key.clone(), j.prerequisites.clone())).collect::<Vec<_>>();
        prop_assert_eq!(keys(&graph), keys(&again));

        let batched = partition(BuildPlan::all_scheduled(graph), Some(batch_size)).unwrap();
        assert_topological(&batched.graph);

        // Batching never loses or duplicates a primary.
        let primaries: Vec<PathBuf> = batched
            .graph
            .jobs()
            .flat_map(|j| j.primaries().map(Path::to_path_buf).collect::<Vec<_>>())
            .collect();
        let unique: BTreeSet<&PathBuf> = primaries.iter().collect();
        prop_assert_eq!(unique.len(), primaries.len());
        if request.mode == CompilationMode::PerFile {
            prop_assert_eq!(primaries.len(), request.inputs.len());
        }
    }
}

#[test]
fn artificial_cycle_is_rejected() {
    let fs = MockFileSystem::new();
    let request = RequestBuilder::new(&fs, "App")
        .sources(2)
        .outputs(&[OutputKind::Executable])
        .build();
    let mut jobs = plan(&request, None).unwrap().into_jobs();
    let link = jobs.last().unwrap().id;
    jobs[0].prerequisites.insert(link);

    let err = JobGraph::from_jobs(jobs).unwrap_err();
    assert!(matches!(err, PlanningError::JobCycle(_)));
}

#[test]
fn malformed_requests_fail_before_anything_runs() {
    let fs = MockFileSystem::new();
    let empty = RequestBuilder::new(&fs, "App").build();
    assert!(matches!(
        plan(&empty, None),
        Err(PlanningError::MalformedRequest(_))
    ));

    let no_linker = RequestBuilder::new(&fs, "App")
        .sources(1)
        .outputs(&[OutputKind::Executable])
        .without_linker()
        .build();
    assert!(matches!(
        plan(&no_linker, None),
        Err(PlanningError::MissingOutputRule(_))
    ));
}

/// Scanner returning a fixed graph and counting its calls.
#[derive(Clone, Default)]
struct CountingScanner {
    graph: ModuleDependencyGraph,
    calls: Arc<AtomicUsize>,
}

impl DependencyScanner for CountingScanner {
    fn scan(&self, inputs: &[PathBuf]) -> Result<ModuleDependencyGraph, PlanningError> {
        assert!(!inputs.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.graph.clone())
    }
}

fn modules() -> ModuleDependencyGraph {
    let mut graph = ModuleDependencyGraph::new();
    graph.add_module("Core", "/sdk/Core.interface", Vec::<String>::new());
    graph.add_module("Net", "/sdk/Net.interface", ["Core"]);
    graph.add_import("/src/f00.src", "Net");
    graph
}

#[tokio::test]
async fn explicit_modules_build_first_and_always_run() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = RequestBuilder::new(&fs, "App").sources(2).explicit_modules();

    let scanner = CountingScanner {
        graph: modules(),
        ..Default::default()
    };
    let planned = driver(&fs, &compiler, &builder)
        .with_scanner(scanner.clone())
        .prepare()
        .unwrap();
    assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
    let graph = &planned.plan.graph;
    let core = graph.find("build-module:Core").unwrap();
    let net = graph.find("build-module:Net").unwrap();
    let f00 = graph.find("compile:/src/f00.src").unwrap();
    let f01 = graph.find("compile:/src/f01.src").unwrap();
    assert!(graph.job(net).prerequisites.contains(&core));
    assert!(graph.job(f00).prerequisites.contains(&net));
    assert!(graph.job(f00).prerequisites.contains(&core));
    assert!(graph.job(f01).prerequisites.is_empty());

    let first = run_scanned(&fs, &compiler, &builder).await;
    assert_eq!(first.outcome, RunOutcome::Succeeded);

    // Nothing changed: module builds run again, compiles stay clean.
    let second = run_scanned(&fs, &compiler, &builder).await;
    assert_eq!(
        executed(&second),
        vec!["build-module:Core".to_string(), "build-module:Net".to_string()]
    );
    assert_eq!(second.status_of("compile:/src/f00.src"), Some(JobStatus::Skipped));
}

async fn run_scanned(
    fs: &MockFileSystem,
    compiler: &FakeCompiler,
    builder: &RequestBuilder,
) -> ExecutionReport {
    with_timeout(driver(fs, compiler, builder).with_scanner(modules()).run())
        .await
        .unwrap()
}

#[tokio::test]
async fn explicit_modules_without_scanner_is_malformed() {
    let (fs, compiler) = workspace();
    let builder = RequestBuilder::new(&fs, "App").sources(1).explicit_modules();
    let err = driver(&fs, &compiler, &builder).prepare().unwrap_err();
    assert!(matches!(err, PlanningError::MalformedRequest(_)));
}

#[tokio::test]
async fn module_cycles_are_planning_errors() {
    let (fs, compiler) = workspace();
    let builder = RequestBuilder::new(&fs, "App").sources(1).explicit_modules();
    let mut graph = ModuleDependencyGraph::new();
    graph.add_module("A", "/sdk/A.interface", ["B"]);
    graph.add_module("B", "/sdk/B.interface", ["A"]);

    let err = driver(&fs, &compiler, &builder)
        .with_scanner(graph)
        .prepare()
        .unwrap_err();
    assert!(matches!(err, PlanningError::ModuleCycle(_)));
}

#[tokio::test]
async fn header_change_recompiles_every_input() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = RequestBuilder::new(&fs, "App")
        .sources(3)
        .bridging_header("/include/bridge.h", "typedef int t;");

    let first = build(&fs, &compiler, &builder).await;
    let pch = first
        .jobs
        .iter()
        .find(|j| j.key.as_str().starts_with("generate-pch:"))
        .unwrap();
    assert_eq!(pch.status, JobStatus::Succeeded);

    fs.add_file("/include/bridge.h", "typedef long t;");
    compiler.clear_invocations();
    let second = build(&fs, &compiler, &builder).await;
    assert_eq!(
        executed(&second),
        vec![
            "compile:/src/f00.src".to_string(),
            "compile:/src/f01.src".to_string(),
            "compile:/src/f02.src".to_string(),
            "generate-pch:/include/bridge.h".to_string(),
        ]
    );
    let planned = driver(&fs, &compiler, &builder).prepare().unwrap();
    assert!(planned
        .plan
        .graph
        .jobs()
        .all(|j| !j.is_compile() || !j.prerequisites.is_empty()));
    assert!(matches!(
        planned.plan.graph.jobs().next().map(|j| &j.kind),
        Some(JobKind::GeneratePch { .. })
    ));
}
