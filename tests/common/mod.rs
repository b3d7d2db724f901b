#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use driverdag::driver::Driver;
use driverdag::engine::ExecutionReport;
use driverdag::fs::mock::MockFileSystem;

pub use driverdag_test_utils::{init_tracing, with_timeout, FakeCompiler, RequestBuilder};

/// A mock filesystem plus a fake compiler writing into it.
pub fn workspace() -> (MockFileSystem, FakeCompiler) {
    let fs = MockFileSystem::new();
    let compiler = FakeCompiler::new(fs.clone());
    (fs, compiler)
}

pub fn driver(
    fs: &MockFileSystem,
    compiler: &FakeCompiler,
    builder: &RequestBuilder,
) -> Driver<FakeCompiler> {
    Driver::new(builder.build(), Arc::new(fs.clone()), Arc::new(compiler.clone()))
}

/// Run one build with the current file contents.
pub async fn build(
    fs: &MockFileSystem,
    compiler: &FakeCompiler,
    builder: &RequestBuilder,
) -> ExecutionReport {
    with_timeout(driver(fs, compiler, builder).run())
        .await
        .expect("planning must succeed")
}

/// Keys of the jobs that ran, sorted.
pub fn executed(report: &ExecutionReport) -> Vec<String> {
    let mut keys: Vec<String> = report
        .executed_keys()
        .into_iter()
        .map(str::to_string)
        .collect();
    keys.sort();
    keys
}

pub fn compile_key(path: &str) -> String {
    format!("compile:{}", Path::new(path).display())
}
