mod common;
use crate::common::{
    build, compile_key, executed, init_tracing, workspace, FakeCompiler, RequestBuilder,
};

use std::path::Path;

use driverdag::dag::JobStatus;
use driverdag::deps::{DirtyReason, StateLoad, StateStore};
use driverdag::engine::RunOutcome;
use driverdag::fs::FileSystem;
use driverdag::types::{CompilationMode, OutputKind};

const MERGE: &str = "merge-module:App";
const LINK: &str = "link:/out/App";

/// A provides `foo`, B relies on the interface of `foo`, C is independent.
fn abc(fs: &driverdag::fs::mock::MockFileSystem) -> RequestBuilder {
    RequestBuilder::new(fs, "App")
        .source("/src/a.src", "decl foo sig=v1\n")
        .source("/src/b.src", "decl bar needs=foo\n")
        .source("/src/c.src", "decl baz\n")
        .outputs(&[OutputKind::Module, OutputKind::Executable])
}

fn keys(items: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    keys.sort();
    keys
}

#[tokio::test]
async fn first_build_runs_everything_then_comment_edit_recompiles_only_that_file() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);

    let first = build(&fs, &compiler, &builder).await;
    assert_eq!(first.outcome, RunOutcome::Succeeded);
    assert_eq!(
        executed(&first),
        keys(&[
            compile_key("/src/a.src").as_str(),
            compile_key("/src/b.src").as_str(),
            compile_key("/src/c.src").as_str(),
            MERGE,
            LINK,
        ])
    );
    assert_eq!(first.dirty.len(), 3);
    assert!(first
        .dirty
        .iter()
        .all(|(_, reason)| reason == DirtyReason::NoPriorState));

    // Only a comment changes; the fingerprint of `foo` stays the same.
    fs.add_file("/src/a.src", "// tweak\ndecl foo sig=v1\n");
    compiler.clear_invocations();

    let second = build(&fs, &compiler, &builder).await;
    assert_eq!(second.outcome, RunOutcome::Succeeded);
    // Merge and link re-run because a prerequisite executed.
    assert_eq!(
        executed(&second),
        keys(&[compile_key("/src/a.src").as_str(), MERGE, LINK])
    );
    assert_eq!(second.dirty.reason(Path::new("/src/a.src")), Some(DirtyReason::Modified));
    assert_eq!(second.dirty.len(), 1);
    assert_eq!(
        second.status_of(&compile_key("/src/b.src")),
        Some(JobStatus::Skipped)
    );
    assert_eq!(
        second.status_of(&compile_key("/src/c.src")),
        Some(JobStatus::Skipped)
    );
    assert_eq!(compiler.count_tool("ld"), 1);
}

#[tokio::test]
async fn unchanged_inputs_run_nothing() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);

    build(&fs, &compiler, &builder).await;
    compiler.clear_invocations();

    let again = build(&fs, &compiler, &builder).await;
    assert_eq!(again.outcome, RunOutcome::Succeeded);
    assert!(executed(&again).is_empty());
    assert!(again.dirty.is_empty());
    assert_eq!(again.count(JobStatus::Skipped), again.jobs.len());
    assert!(compiler.invocations().is_empty());
}

#[tokio::test]
async fn interface_change_revives_dependents_but_not_existence_users() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs).source("/src/d.src", "decl qux uses=foo\n");

    build(&fs, &compiler, &builder).await;
    compiler.clear_invocations();

    fs.add_file("/src/a.src", "decl foo sig=v2\n");
    let report = build(&fs, &compiler, &builder).await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(
        executed(&report),
        keys(&[
            compile_key("/src/a.src").as_str(),
            compile_key("/src/b.src").as_str(),
            MERGE,
            LINK,
        ])
    );
    assert_eq!(
        report.dirty.reason(Path::new("/src/b.src")),
        Some(DirtyReason::InterfaceChanged)
    );
    assert!(!report.dirty.contains(Path::new("/src/d.src")));

    // B compiled after A, and the link waited for the revived compile.
    let primaries = compiler.compiled_primaries();
    assert_eq!(
        primaries,
        vec![Path::new("/src/a.src").to_path_buf(), Path::new("/src/b.src").to_path_buf()]
    );
    let invocations = compiler.invocations();
    let revived = invocations
        .iter()
        .position(|c| c.values_of("--primary") == ["/src/b.src"])
        .unwrap();
    let link = invocations.iter().position(|c| c.tool == "ld").unwrap();
    assert!(revived < link);

    // The revived file is recorded; nothing is left for the next run.
    compiler.clear_invocations();
    let settled = build(&fs, &compiler, &builder).await;
    assert!(executed(&settled).is_empty());
}

#[tokio::test]
async fn removing_a_provider_dirties_its_dependents_and_relinks() {
    init_tracing();
    let (fs, compiler) = workspace();
    let mut builder = abc(&fs);

    build(&fs, &compiler, &builder).await;
    compiler.clear_invocations();

    builder.remove_input("/src/a.src");
    let report = build(&fs, &compiler, &builder).await;

    assert_eq!(
        executed(&report),
        keys(&[compile_key("/src/b.src").as_str(), MERGE, LINK])
    );
    assert_eq!(
        report.dirty.reason(Path::new("/src/b.src")),
        Some(DirtyReason::DependencyRemoved)
    );
    let state = report.state.as_ref().unwrap();
    assert!(state.fingerprint_of(Path::new("/src/a.src")).is_none());
    assert!(!state.inputs.contains_key(Path::new("/src/a.src")));
}

#[tokio::test]
async fn removing_an_independent_input_still_relinks() {
    init_tracing();
    let (fs, compiler) = workspace();
    let mut builder = abc(&fs);

    build(&fs, &compiler, &builder).await;
    compiler.clear_invocations();

    builder.remove_input("/src/c.src");
    let report = build(&fs, &compiler, &builder).await;

    assert_eq!(executed(&report), keys(&[MERGE, LINK]));
    let link = compiler
        .invocations()
        .into_iter()
        .find(|c| c.tool == "ld")
        .unwrap();
    assert!(link.args.iter().any(|a| a.ends_with("a.o")));
    assert!(!link.args.iter().any(|a| a.ends_with("c.o")));
}

#[tokio::test]
async fn corrupt_state_rebuilds_everything_and_is_replaced() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);

    build(&fs, &compiler, &builder).await;
    fs.add_file(builder.state_path(), "{ definitely not state");
    compiler.clear_invocations();

    let report = build(&fs, &compiler, &builder).await;
    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(executed(&report).len(), 5);
    assert!(report
        .dirty
        .iter()
        .all(|(_, reason)| reason == DirtyReason::NoPriorState));

    let store = StateStore::new(std::sync::Arc::new(fs.clone()), builder.state_path());
    assert!(matches!(store.load(), StateLoad::Loaded(_)));
}

#[tokio::test]
async fn failed_compile_is_retried_on_the_next_run() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);
    compiler.fail_on("/src/b.src", 1);

    let failed = build(&fs, &compiler, &builder).await;
    assert_eq!(failed.outcome, RunOutcome::Failed);
    assert_eq!(failed.status_of(&compile_key("/src/b.src")), Some(JobStatus::Failed));
    assert_eq!(failed.status_of(MERGE), Some(JobStatus::Blocked));
    assert_eq!(failed.status_of(LINK), Some(JobStatus::Blocked));
    assert_eq!(failed.status_of(&compile_key("/src/a.src")), Some(JobStatus::Succeeded));
    let state = failed.state.as_ref().unwrap();
    assert!(state.fingerprint_of(Path::new("/src/b.src")).is_none());
    assert!(state.stale_jobs.contains(MERGE));

    compiler.heal("/src/b.src");
    compiler.clear_invocations();

    let retried = build(&fs, &compiler, &builder).await;
    assert_eq!(retried.outcome, RunOutcome::Succeeded);
    assert_eq!(
        executed(&retried),
        keys(&[compile_key("/src/b.src").as_str(), MERGE, LINK])
    );
    assert_eq!(
        retried.dirty.reason(Path::new("/src/b.src")),
        Some(DirtyReason::MissingRecord)
    );
    assert!(retried.state.as_ref().unwrap().stale_jobs.is_empty());
}

#[tokio::test]
async fn unreadable_record_counts_as_interface_change() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);

    build(&fs, &compiler, &builder).await;

    let garbling = FakeCompiler::new(fs.clone());
    garbling.garble_record("/src/a.src");
    fs.add_file("/src/a.src", "// tweak\ndecl foo sig=v1\n");
    let report = build(&fs, &garbling, &builder).await;

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert!(executed(&report).contains(&compile_key("/src/b.src")));
    let state = report.state.as_ref().unwrap();
    assert!(state.fingerprint_of(Path::new("/src/a.src")).is_none());

    // A well-behaved compiler picks the file up again.
    compiler.clear_invocations();
    let next = build(&fs, &compiler, &builder).await;
    assert_eq!(
        next.dirty.reason(Path::new("/src/a.src")),
        Some(DirtyReason::MissingRecord)
    );
    assert!(executed(&next).contains(&compile_key("/src/a.src")));
}

#[tokio::test]
async fn changed_compiler_args_rebuild_everything() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);
    build(&fs, &compiler, &builder).await;

    let builder = builder.compiler_arg("-O2");
    let report = build(&fs, &compiler, &builder).await;
    assert_eq!(executed(&report).len(), 5);
    assert_eq!(
        report.dirty.reason(Path::new("/src/c.src")),
        Some(DirtyReason::NoPriorState)
    );
}

#[tokio::test]
async fn deleted_output_is_rebuilt() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs);
    build(&fs, &compiler, &builder).await;

    fs.remove_file(Path::new("/out/c.o")).unwrap();
    compiler.clear_invocations();
    let report = build(&fs, &compiler, &builder).await;

    assert_eq!(
        executed(&report),
        keys(&[compile_key("/src/c.src").as_str(), MERGE, LINK])
    );
    assert!(report.dirty.is_empty());
}

#[tokio::test]
async fn whole_module_mode_rebuilds_the_single_compile() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = abc(&fs).mode(CompilationMode::WholeModule);

    let first = build(&fs, &compiler, &builder).await;
    assert_eq!(executed(&first), keys(&["compile:App", LINK]));

    compiler.clear_invocations();
    let idle = build(&fs, &compiler, &builder).await;
    assert!(executed(&idle).is_empty());

    fs.add_file("/src/c.src", "decl baz sig=2\n");
    let changed = build(&fs, &compiler, &builder).await;
    assert_eq!(executed(&changed), keys(&["compile:App", LINK]));
}

#[tokio::test]
async fn adding_an_input_leaves_existing_compiles_alone() {
    init_tracing();
    let (fs, compiler) = workspace();
    let mut builder = abc(&fs);
    build(&fs, &compiler, &builder).await;

    builder.add_input("/src/d.src", "decl qux\n");
    compiler.clear_invocations();
    let report = build(&fs, &compiler, &builder).await;

    assert_eq!(
        executed(&report),
        keys(&[compile_key("/src/d.src").as_str(), MERGE, LINK])
    );
    assert_eq!(report.dirty.reason(Path::new("/src/d.src")), Some(DirtyReason::New));
}

fn linked_app(fs: &driverdag::fs::mock::MockFileSystem) -> RequestBuilder {
    RequestBuilder::new(fs, "App")
        .sources(2)
        .outputs(&[OutputKind::Object, OutputKind::Executable])
        .library("/lib/libm.a")
}

#[tokio::test]
async fn library_changes_relink_without_recompiling() {
    init_tracing();
    let (fs, compiler) = workspace();
    let mut builder = linked_app(&fs);
    build(&fs, &compiler, &builder).await;

    builder = builder.library("/lib/libz.a");
    compiler.clear_invocations();
    let added = build(&fs, &compiler, &builder).await;
    assert_eq!(executed(&added), vec![LINK.to_string()]);
    let link = compiler.invocations().pop().unwrap();
    assert!(link.args.contains(&"/lib/libz.a".to_string()));

    builder.remove_library("/lib/libm.a");
    compiler.clear_invocations();
    let removed = build(&fs, &compiler, &builder).await;
    assert_eq!(executed(&removed), vec![LINK.to_string()]);
    let link = compiler.invocations().pop().unwrap();
    assert!(!link.args.contains(&"/lib/libm.a".to_string()));

    compiler.clear_invocations();
    let idle = build(&fs, &compiler, &builder).await;
    assert!(executed(&idle).is_empty());
}

#[tokio::test]
async fn changing_the_linker_relinks() {
    init_tracing();
    let (fs, compiler) = workspace();
    let builder = linked_app(&fs);
    build(&fs, &compiler, &builder).await;

    let builder = builder.linker("gold");
    compiler.clear_invocations();
    let report = build(&fs, &compiler, &builder).await;

    assert_eq!(executed(&report), vec![LINK.to_string()]);
    assert_eq!(compiler.count_tool("gold"), 1);
    assert_eq!(compiler.count_tool("ld"), 0);
}

#[tokio::test]
async fn dropping_and_restoring_the_bridging_header_recompiles() {
    init_tracing();
    let (fs, compiler) = workspace();
    let mut builder = RequestBuilder::new(&fs, "App")
        .sources(2)
        .bridging_header("/include/bridge.h", "typedef int t;");
    build(&fs, &compiler, &builder).await;

    builder.remove_bridging_header();
    compiler.clear_invocations();
    let without = build(&fs, &compiler, &builder).await;
    assert_eq!(
        executed(&without),
        keys(&[
            compile_key("/src/f00.src").as_str(),
            compile_key("/src/f01.src").as_str(),
        ])
    );
    assert!(compiler
        .invocations()
        .iter()
        .all(|cmd| !cmd.args.iter().any(|arg| arg.ends_with(".pch"))));

    let builder = builder.bridging_header("/include/bridge.h", "typedef int t;");
    compiler.clear_invocations();
    let restored = build(&fs, &compiler, &builder).await;
    assert_eq!(
        executed(&restored),
        keys(&[
            compile_key("/src/f00.src").as_str(),
            compile_key("/src/f01.src").as_str(),
            "generate-pch:/include/bridge.h",
        ])
    );
}
