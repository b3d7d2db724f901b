use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use driverdag::deps::{DeclarationRecord, DependencyRecord};
use driverdag::exec::{ProcessOutput, ProcessRunner, SpawnError};
use driverdag::fingerprint::Fingerprint;
use driverdag::fs::mock::MockFileSystem;
use driverdag::fs::FileSystem;
use driverdag::plan::job::{EMIT_DEPS_FLAG, OUTPUT_FLAG, PRIMARY_FLAG};
use driverdag::plan::CommandLine;

/// Parse the declarations of a fake source file.
///
/// Every line of the form
///
/// ```text
/// decl <key> [sig=<interface>] [needs=<k1>,<k2>] [uses=<k3>]
/// ```
///
/// becomes one declaration. Its fingerprint covers only `sig` (or the key
/// when absent), so edits to any other line leave every declaration
/// fingerprint unchanged. `needs` become interface edges, `uses`
/// existence-only edges.
pub fn parse_fake_source(source: &Path, text: &str) -> DependencyRecord {
    let mut record = DependencyRecord::new(source);
    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("decl") {
            continue;
        }
        let Some(key) = tokens.next() else {
            continue;
        };
        let mut sig = key.to_string();
        let mut provides = Vec::new();
        let mut uses = Vec::new();
        for token in tokens {
            if let Some(value) = token.strip_prefix("sig=") {
                sig = value.to_string();
            } else if let Some(value) = token.strip_prefix("needs=") {
                provides.extend(value.split(',').filter(|s| !s.is_empty()).map(String::from));
            } else if let Some(value) = token.strip_prefix("uses=") {
                uses.extend(value.split(',').filter(|s| !s.is_empty()).map(String::from));
            }
        }
        record.declarations.push(DeclarationRecord {
            key: key.to_string(),
            fingerprint: Fingerprint::of_bytes(sig.as_bytes()),
            provides,
            uses,
        });
    }
    record
}

#[derive(Default)]
struct Script {
    fail: BTreeMap<PathBuf, i32>,
    spawn_fail: BTreeSet<PathBuf>,
    garble_record: BTreeSet<PathBuf>,
    skip_record: BTreeSet<PathBuf>,
    delays: BTreeMap<PathBuf, Duration>,
    holds: BTreeMap<PathBuf, Arc<Notify>>,
    stdout: BTreeMap<PathBuf, String>,
    stderr: BTreeMap<PathBuf, String>,
}

/// A [`ProcessRunner`] that behaves like a well-mannered compiler against
/// a [`MockFileSystem`].
///
/// For each command it writes every `-o` output and, for the i-th
/// `--primary`, the record named by the i-th `--emit-deps`, derived from
/// the primary's current content with [`parse_fake_source`]. Behaviour can
/// be scripted per path: a command is affected when one of its primaries or
/// outputs equals the scripted path.
#[derive(Clone)]
pub struct FakeCompiler {
    fs: MockFileSystem,
    script: Arc<Mutex<Script>>,
    default_delay: Duration,
    invocations: Arc<Mutex<Vec<CommandLine>>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl FakeCompiler {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            script: Arc::new(Mutex::new(Script::default())),
            default_delay: Duration::ZERO,
            invocations: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long in every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Exit with `code` for commands touching `path`.
    pub fn fail_on(&self, path: impl Into<PathBuf>, code: i32) -> &Self {
        self.script.lock().unwrap().fail.insert(path.into(), code);
        self
    }

    /// Stop failing for `path`.
    pub fn heal(&self, path: impl AsRef<Path>) -> &Self {
        self.script.lock().unwrap().fail.remove(path.as_ref());
        self
    }

    pub fn spawn_fail(&self, path: impl Into<PathBuf>) -> &Self {
        self.script.lock().unwrap().spawn_fail.insert(path.into());
        self
    }

    /// Write an unparseable record for `path`.
    pub fn garble_record(&self, path: impl Into<PathBuf>) -> &Self {
        self.script.lock().unwrap().garble_record.insert(path.into());
        self
    }

    /// Succeed without writing the record for `path`.
    pub fn skip_record(&self, path: impl Into<PathBuf>) -> &Self {
        self.script.lock().unwrap().skip_record.insert(path.into());
        self
    }

    pub fn delay(&self, path: impl Into<PathBuf>, delay: Duration) -> &Self {
        self.script.lock().unwrap().delays.insert(path.into(), delay);
        self
    }

    /// Commands touching `path` wait until the returned handle is notified.
    pub fn hold(&self, path: impl Into<PathBuf>) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.script
            .lock()
            .unwrap()
            .holds
            .insert(path.into(), Arc::clone(&notify));
        notify
    }

    pub fn stdout(&self, path: impl Into<PathBuf>, text: impl Into<String>) -> &Self {
        self.script.lock().unwrap().stdout.insert(path.into(), text.into());
        self
    }

    pub fn stderr(&self, path: impl Into<PathBuf>, text: impl Into<String>) -> &Self {
        self.script.lock().unwrap().stderr.insert(path.into(), text.into());
        self
    }

    pub fn invocations(&self) -> Vec<CommandLine> {
        self.invocations.lock().unwrap().clone()
    }

    /// Every primary compiled so far, in invocation order.
    pub fn compiled_primaries(&self) -> Vec<PathBuf> {
        self.invocations()
            .iter()
            .flat_map(|cmd| {
                cmd.values_of(PRIMARY_FLAG)
                    .into_iter()
                    .map(PathBuf::from)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of invocations that ran the given tool.
    pub fn count_tool(&self, tool: &str) -> usize {
        self.invocations().iter().filter(|c| c.tool == tool).count()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn clear_invocations(&self) {
        self.invocations.lock().unwrap().clear();
        self.max_running.store(0, Ordering::SeqCst);
    }

    fn touched(command: &CommandLine) -> Vec<PathBuf> {
        command
            .values_of(PRIMARY_FLAG)
            .into_iter()
            .chain(command.values_of(OUTPUT_FLAG))
            .map(PathBuf::from)
            .collect()
    }

    fn write_outputs(&self, command: &CommandLine, garble: &BTreeSet<PathBuf>, skip: &BTreeSet<PathBuf>) {
        for output in command.values_of(OUTPUT_FLAG) {
            self.fs
                .write(Path::new(output), format!("built by {}\n", command.tool).as_bytes())
                .unwrap();
        }

        let primaries = command.values_of(PRIMARY_FLAG);
        let records = command.values_of(EMIT_DEPS_FLAG);
        for (primary, record_path) in primaries.iter().zip(records.iter()) {
            let primary = Path::new(primary);
            if skip.contains(primary) {
                continue;
            }
            let text = if garble.contains(primary) {
                "{ not json".to_string()
            } else {
                let source = self.fs.read_to_string(primary).unwrap_or_default();
                parse_fake_source(primary, &source).to_json().unwrap()
            };
            self.fs.write(Path::new(record_path), text.as_bytes()).unwrap();
        }
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProcessRunner for FakeCompiler {
    fn run<'a>(
        &'a self,
        command: &'a CommandLine,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutput, SpawnError>> + Send + 'a>> {
        Box::pin(async move {
            self.invocations.lock().unwrap().push(command.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            let _guard = RunningGuard(Arc::clone(&self.running));

            let touched = Self::touched(command);
            let (fail, spawn_fail, holds, delay, stdout, stderr, garble, skip) = {
                let script = self.script.lock().unwrap();
                let fail = touched.iter().find_map(|p| script.fail.get(p).copied());
                let spawn_fail = touched.iter().any(|p| script.spawn_fail.contains(p));
                let holds: Vec<Arc<Notify>> = touched
                    .iter()
                    .filter_map(|p| script.holds.get(p).cloned())
                    .collect();
                let delay = touched
                    .iter()
                    .find_map(|p| script.delays.get(p).copied())
                    .unwrap_or(self.default_delay);
                let pick = |map: &BTreeMap<PathBuf, String>| {
                    touched
                        .iter()
                        .filter_map(|p| map.get(p).cloned())
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                (
                    fail,
                    spawn_fail,
                    holds,
                    delay,
                    pick(&script.stdout),
                    pick(&script.stderr),
                    script.garble_record.clone(),
                    script.skip_record.clone(),
                )
            };

            if spawn_fail {
                return Err(SpawnError {
                    tool: command.tool.clone(),
                    message: "No such file or directory (os error 2)".to_string(),
                });
            }

            for hold in holds {
                hold.notified().await;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let exit_code = fail.unwrap_or(0);
            if exit_code == 0 {
                self.write_outputs(command, &garble, &skip);
            }
            Ok(ProcessOutput {
                exit_code,
                stdout,
                stderr,
            })
        })
    }
}
