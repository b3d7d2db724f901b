use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tempfile::TempDir;

use driverdag::cli::CliArgs;
use driverdag::config::{load_and_validate, resolve_request, RequestOverrides};
use driverdag::deps::{PriorBuildState, StateLoad, StateStore};
use driverdag::engine::RunOutcome;
use driverdag::errors::DriverError;
use driverdag::fingerprint::Fingerprint;
use driverdag::fs::{FileSystem, RealFileSystem};
use driverdag::types::{CompilationMode, FailurePolicy, OutputKind};

fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn project(request: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "src/main.src", "decl main\n");
    write(root, "src/util/strings.src", "decl strings\n");
    write(root, "src/util/strings_test.src", "decl strings_test\n");
    write(root, "src/.scratch.src", "decl scratch\n");
    write(root, "include/bridge.h", "typedef int t;\n");
    let request_path = write(root, "Driverdag.toml", request);
    (dir, request_path)
}

const REQUEST: &str = r#"
[build]
module_name = "App"
outputs = ["object", "module"]
mode = "whole-module"
bridging_header = "include/bridge.h"
compiler_args = ["-O2"]

[inputs]
include = ["src/**/*.src"]
exclude = ["**/*_test.src"]

[tools]
compiler = "swiftc"
"#;

#[test]
fn relative_globs_resolve_against_the_request_directory() {
    let (dir, request_path) = project(REQUEST);
    let fs = RealFileSystem;

    let cfg = load_and_validate(&fs, &request_path).unwrap();
    let request =
        resolve_request(&fs, &request_path, &cfg, &RequestOverrides::default()).unwrap();

    let root = dir.path();
    assert_eq!(
        request.source_paths(),
        vec![root.join("src/main.src"), root.join("src/util/strings.src")]
    );
    assert_eq!(request.mode, CompilationMode::WholeModule);
    assert_eq!(request.output_dir, root.join("build"));
    assert_eq!(request.state_path, root.join("build").join("driverdag-state.json"));
    assert_eq!(request.tools.compiler, "swiftc");
    assert_eq!(request.compiler_args, vec!["-O2".to_string()]);
    assert!(request.outputs.contains(&OutputKind::Module));
    assert!(request.concurrency >= 1);

    let header = request.bridging_header.as_ref().unwrap();
    assert_eq!(header.path, root.join("include/bridge.h"));
    assert_eq!(header.fingerprint, Fingerprint::of_bytes(b"typedef int t;\n"));
}

#[test]
fn explicit_files_must_exist() {
    let (dir, request_path) = project(
        r#"
        [build]
        module_name = "App"

        [inputs]
        files = ["src/main.src", "src/missing.src"]
        "#,
    );
    let fs = RealFileSystem;
    let cfg = load_and_validate(&fs, &request_path).unwrap();
    let err = resolve_request(&fs, &request_path, &cfg, &RequestOverrides::default())
        .unwrap_err();
    assert!(err.to_string().contains("missing.src"), "{err}");
    drop(dir);
}

#[test]
fn patterns_matching_nothing_are_a_config_error() {
    let (_dir, request_path) = project(
        r#"
        [build]
        module_name = "App"

        [inputs]
        include = ["lib/**/*.src"]
        "#,
    );
    let fs = RealFileSystem;
    let cfg = load_and_validate(&fs, &request_path).unwrap();
    let err = resolve_request(&fs, &request_path, &cfg, &RequestOverrides::default())
        .unwrap_err();
    assert!(matches!(err, DriverError::ConfigError(_)));
}

#[test]
fn unknown_build_keys_and_bad_values_are_rejected() {
    let (_dir, request_path) = project(
        r#"
        [build]
        module_name = "App"
        optimise = true

        [inputs]
        include = ["src/*.src"]
        "#,
    );
    let err = load_and_validate(&RealFileSystem, &request_path).unwrap_err();
    assert!(matches!(err, DriverError::TomlError(_)));

    let (_dir, request_path) = project(
        r#"
        [build]
        module_name = "my app"

        [inputs]
        include = ["src/*.src"]
        "#,
    );
    let err = load_and_validate(&RealFileSystem, &request_path).unwrap_err();
    assert!(matches!(err, DriverError::ConfigError(_)));
}

#[test]
fn missing_request_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(&RealFileSystem, dir.path().join("Driverdag.toml"));
    assert!(result.is_err());
}

#[test]
fn overrides_take_precedence() {
    let (dir, request_path) = project(REQUEST);
    let fs = RealFileSystem;
    let cfg = load_and_validate(&fs, &request_path).unwrap();

    let args = CliArgs::parse_from([
        "driverdag",
        "--request",
        request_path.to_str().unwrap(),
        "-j",
        "3",
        "--mode",
        "per-file",
        "--fail-fast",
        "--state",
        dir.path().join("custom.json").to_str().unwrap(),
    ]);
    let request = resolve_request(&fs, &request_path, &cfg, &args.overrides()).unwrap();

    assert_eq!(request.concurrency, 3);
    assert_eq!(request.mode, CompilationMode::PerFile);
    assert_eq!(request.failure_policy, FailurePolicy::FailFast);
    assert_eq!(request.state_path, dir.path().join("custom.json"));
}

#[test]
fn state_survives_a_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/state.json");
    let store = StateStore::new(Arc::new(RealFileSystem), &path);
    assert!(matches!(store.load(), StateLoad::Missing));

    let mut state = PriorBuildState::new();
    state.stale_jobs.insert("link:/out/App".to_string());
    store.save(&state).unwrap();
    assert!(RealFileSystem.is_file(&path));

    match store.load() {
        StateLoad::Loaded(loaded) => assert!(loaded.stale_jobs.contains("link:/out/App")),
        other => panic!("expected loaded state, got {other:?}"),
    }

    fs::write(&path, "not json").unwrap();
    assert!(matches!(store.load(), StateLoad::Corrupt(_)));
}

#[tokio::test]
async fn dry_run_plans_without_running_or_saving_state() {
    let (dir, request_path) = project(REQUEST);
    let args = CliArgs::parse_from([
        "driverdag",
        "--request",
        request_path.to_str().unwrap(),
        "--dry-run",
    ]);

    let outcome = driverdag::run(args).await.unwrap();

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert!(!dir.path().join("build").exists());
}
