// src/plan/builder.rs

//! Turns a [`BuildRequest`] into a full, unpruned [`JobGraph`].
//!
//! Job order is fixed: precompiled header, explicit module builds in module
//! dependency order, compile jobs in input order, then merge-module,
//! generate-interface and link. Identical requests yield identical graphs.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info};

use crate::artifact::{Artifact, FileType, OutputLayout};
use crate::config::BuildRequest;
use crate::errors::PlanningError;
use crate::plan::graph::{JobGraph, JobGraphBuilder};
use crate::plan::job::{
    CommandLine, CompileJob, CompileUnit, JobId, JobKey, JobKind, JobSpec, EMIT_DEPS_FLAG,
    OUTPUT_FLAG, PRIMARY_FLAG,
};
use crate::plan::modules::ModuleDependencyGraph;
use crate::types::{CompilationMode, LinkOutput};

/// Plan every job `request` could need.
///
/// `modules` must be present when the request asks for explicit modules.
pub fn plan(
    request: &BuildRequest,
    modules: Option<&ModuleDependencyGraph>,
) -> Result<JobGraph, PlanningError> {
    validate_request(request, modules)?;

    let layout = OutputLayout::new(
        &request.output_dir,
        &request.module_name,
        request.inputs.iter().map(|i| i.path.as_path()),
    );
    let mut planner = Planner {
        request,
        layout,
        builder: JobGraphBuilder::new(),
        pch: None,
        module_jobs: BTreeMap::new(),
    };

    planner.plan_pch()?;
    if let Some(modules) = modules.filter(|_| request.explicit_modules) {
        planner.plan_module_builds(modules)?;
    }
    let compiles = match request.mode {
        CompilationMode::PerFile => planner.plan_per_file(modules)?,
        CompilationMode::WholeModule => planner.plan_whole_module(modules)?,
    };
    planner.plan_downstream(&compiles)?;

    let graph = planner.builder.build();
    info!(
        module = %request.module_name,
        mode = %request.mode,
        jobs = graph.len(),
        "planned job graph"
    );
    Ok(graph)
}

fn validate_request(
    request: &BuildRequest,
    modules: Option<&ModuleDependencyGraph>,
) -> Result<(), PlanningError> {
    if request.module_name.trim().is_empty() {
        return Err(PlanningError::MalformedRequest(
            "module name must not be empty".to_string(),
        ));
    }
    if request.inputs.is_empty() {
        return Err(PlanningError::MalformedRequest(
            "request has no inputs".to_string(),
        ));
    }
    if request.outputs.is_empty() {
        return Err(PlanningError::MalformedRequest(
            "request asks for no outputs".to_string(),
        ));
    }
    if request.concurrency == 0 {
        return Err(PlanningError::MalformedRequest(
            "concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for input in &request.inputs {
        if !seen.insert(input.path.as_path()) {
            return Err(PlanningError::MalformedRequest(format!(
                "input {} is listed twice",
                input.path.display()
            )));
        }
    }

    let links: Vec<LinkOutput> = request.link_outputs().collect();
    if links.len() > 1 {
        return Err(PlanningError::MissingOutputRule(format!(
            "a request can produce one linked product, got {}",
            links
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    if let Some(link) = links.first() {
        if request.tools.linker.is_none() {
            return Err(PlanningError::MissingOutputRule(format!(
                "{link} requested but no linker is configured"
            )));
        }
    }

    if request.explicit_modules && modules.is_none() {
        return Err(PlanningError::MalformedRequest(
            "explicit modules requested but no module dependency graph is available".to_string(),
        ));
    }
    Ok(())
}

struct Planner<'a> {
    request: &'a BuildRequest,
    layout: OutputLayout,
    builder: JobGraphBuilder,
    pch: Option<(JobId, Artifact)>,
    module_jobs: BTreeMap<String, (JobId, Artifact)>,
}

/// Compile jobs feeding the downstream jobs.
struct CompileOutputs {
    jobs: Vec<JobId>,
    objects: Vec<Artifact>,
    summaries: Vec<Artifact>,
    /// Set when a whole-module compile already produced the module.
    module: Option<Artifact>,
}

impl Planner<'_> {
    fn compiler(&self) -> CommandLine {
        CommandLine::new(&self.request.tools.compiler)
    }

    fn plan_pch(&mut self) -> Result<(), PlanningError> {
        let Some(header) = &self.request.bridging_header else {
            return Ok(());
        };
        let pch = self.layout.precompiled_header(&header.path);
        let command = self
            .compiler()
            .arg("--emit-pch")
            .path_arg(&header.path)
            .flag_path(OUTPUT_FLAG, &pch.path);

        let id = self.builder.add(JobSpec {
            key: JobKey::generate_pch(&header.path),
            kind: JobKind::GeneratePch {
                header: header.path.clone(),
            },
            inputs: vec![Artifact::new(&header.path, FileType::Header)],
            outputs: vec![pch.clone()],
            command,
            prerequisites: BTreeSet::new(),
        })?;
        self.pch = Some((id, pch));
        Ok(())
    }

    fn plan_module_builds(&mut self, modules: &ModuleDependencyGraph) -> Result<(), PlanningError> {
        for name in modules.build_order()? {
            let Some(module) = modules.modules.get(&name) else {
                continue;
            };
            let output = self.layout.external_module(&name);

            let mut inputs = vec![Artifact::new(
                &module.interface_path,
                FileType::ModuleInterface,
            )];
            let mut prerequisites = BTreeSet::new();
            let mut command = self
                .compiler()
                .arg("--build-module")
                .arg(&name)
                .path_arg(&module.interface_path);
            for dep in &module.dependencies {
                if let Some((dep_job, dep_artifact)) = self.module_jobs.get(dep) {
                    prerequisites.insert(*dep_job);
                    command = command.path_arg(&dep_artifact.path);
                    inputs.push(dep_artifact.clone());
                }
            }
            command = command.flag_path(OUTPUT_FLAG, &output.path);

            let id = self.builder.add(JobSpec {
                key: JobKey::build_module(&name),
                kind: JobKind::BuildModule {
                    module_name: name.clone(),
                },
                inputs,
                outputs: vec![output.clone()],
                command,
                prerequisites,
            })?;
            debug!(module = %name, job = %id, "planned explicit module build");
            self.module_jobs.insert(name, (id, output));
        }
        Ok(())
    }

    /// Shared prerequisites and extra inputs for compiling `sources`.
    fn compile_context<'p, I>(
        &self,
        sources: I,
        modules: Option<&ModuleDependencyGraph>,
    ) -> (BTreeSet<JobId>, Vec<Artifact>)
    where
        I: IntoIterator<Item = &'p std::path::Path>,
    {
        let mut prerequisites = BTreeSet::new();
        let mut extra = Vec::new();

        if let Some((pch_job, pch)) = &self.pch {
            prerequisites.insert(*pch_job);
            extra.push(pch.clone());
        }

        if let Some(modules) = modules.filter(|_| self.request.explicit_modules) {
            let mut needed = BTreeSet::new();
            for source in sources {
                needed.extend(modules.modules_needed_by(source));
            }
            for name in needed {
                if let Some((job, artifact)) = self.module_jobs.get(&name) {
                    prerequisites.insert(*job);
                    extra.push(artifact.clone());
                }
            }
        }
        (prerequisites, extra)
    }

    fn base_compile_command(&self, whole_module: bool) -> CommandLine {
        let mut command = self.compiler().arg("-c");
        if whole_module {
            command = command.arg("--whole-module");
        }
        command = command.arg("--module-name").arg(&self.request.module_name);
        for arg in &self.request.compiler_args {
            command = command.arg(arg);
        }
        for input in &self.request.inputs {
            command = command.path_arg(&input.path);
        }
        command
    }

    fn plan_per_file(
        &mut self,
        modules: Option<&ModuleDependencyGraph>,
    ) -> Result<CompileOutputs, PlanningError> {
        let mut outputs = CompileOutputs {
            jobs: Vec::new(),
            objects: Vec::new(),
            summaries: Vec::new(),
            module: None,
        };

        let request = self.request;
        for input in &request.inputs {
            let names = self.layout.per_input(&input.path);
            let (prerequisites, extra) =
                self.compile_context(std::iter::once(input.path.as_path()), modules);

            let mut command = self.base_compile_command(false);
            for artifact in &extra {
                command = command.path_arg(&artifact.path);
            }
            command = command.flag_path(PRIMARY_FLAG, &input.path);

            let mut produced = Vec::new();
            if request.needs_objects() {
                produced.push(names.object.clone());
                outputs.objects.push(names.object.clone());
            }
            if request.needs_module() {
                produced.push(names.summary.clone());
                outputs.summaries.push(names.summary.clone());
            }
            for artifact in &produced {
                command = command.flag_path(OUTPUT_FLAG, &artifact.path);
            }
            command = command.flag_path(EMIT_DEPS_FLAG, &names.record.path);

            let key = JobKey::compile(&input.path);
            let mut job_outputs = produced.clone();
            job_outputs.push(names.record.clone());

            let mut inputs = vec![Artifact::source(&input.path)];
            inputs.extend(extra);

            let id = self.builder.add(JobSpec {
                key: key.clone(),
                kind: JobKind::Compile(CompileJob {
                    units: vec![CompileUnit {
                        primary: input.path.clone(),
                        outputs: produced,
                        record: Some(names.record),
                        origin: key,
                    }],
                    whole_module: false,
                }),
                inputs,
                outputs: job_outputs,
                command,
                prerequisites,
            })?;
            outputs.jobs.push(id);
        }
        Ok(outputs)
    }

    fn plan_whole_module(
        &mut self,
        modules: Option<&ModuleDependencyGraph>,
    ) -> Result<CompileOutputs, PlanningError> {
        let (prerequisites, extra) = self.compile_context(
            self.request.inputs.iter().map(|i| i.path.as_path()),
            modules,
        );

        let mut command = self.base_compile_command(true);
        for artifact in &extra {
            command = command.path_arg(&artifact.path);
        }

        let mut produced = Vec::new();
        let mut objects = Vec::new();
        let mut module = None;
        if self.request.needs_objects() {
            let object = self.layout.whole_module_object();
            objects.push(object.clone());
            produced.push(object);
        }
        if self.request.needs_module() {
            let merged = self.layout.merged_module();
            module = Some(merged.clone());
            produced.push(merged);
        }
        for artifact in &produced {
            command = command.flag_path(OUTPUT_FLAG, &artifact.path);
        }

        let mut inputs: Vec<Artifact> = self
            .request
            .inputs
            .iter()
            .map(|i| Artifact::source(&i.path))
            .collect();
        inputs.extend(extra);

        let id = self.builder.add(JobSpec {
            key: JobKey::whole_module(&self.request.module_name),
            kind: JobKind::Compile(CompileJob {
                units: Vec::new(),
                whole_module: true,
            }),
            inputs,
            outputs: produced,
            command,
            prerequisites,
        })?;

        Ok(CompileOutputs {
            jobs: vec![id],
            objects,
            summaries: Vec::new(),
            module,
        })
    }

    fn plan_downstream(&mut self, compiles: &CompileOutputs) -> Result<(), PlanningError> {
        let request = self.request;
        let all_compiles: BTreeSet<JobId> = compiles.jobs.iter().copied().collect();

        let module_source = if request.needs_module() {
            match &compiles.module {
                Some(module) => Some((all_compiles.clone(), module.clone())),
                None => {
                    let merged = self.layout.merged_module();
                    let mut command = self
                        .compiler()
                        .arg("--merge-modules")
                        .arg("--module-name")
                        .arg(&request.module_name);
                    for summary in &compiles.summaries {
                        command = command.path_arg(&summary.path);
                    }
                    command = command.flag_path(OUTPUT_FLAG, &merged.path);

                    let id = self.builder.add(JobSpec {
                        key: JobKey::merge_module(&request.module_name),
                        kind: JobKind::MergeModule {
                            module_name: request.module_name.clone(),
                        },
                        inputs: compiles.summaries.clone(),
                        outputs: vec![merged.clone()],
                        command,
                        prerequisites: all_compiles.clone(),
                    })?;
                    Some((BTreeSet::from([id]), merged))
                }
            }
        } else {
            None
        };

        if request.wants_interface() {
            if let Some((prerequisites, module)) = &module_source {
                let interface = self.layout.module_interface();
                let command = self
                    .compiler()
                    .arg("--emit-interface")
                    .path_arg(&module.path)
                    .flag_path(OUTPUT_FLAG, &interface.path);
                self.builder.add(JobSpec {
                    key: JobKey::generate_interface(&request.module_name),
                    kind: JobKind::GenerateInterface {
                        module_name: request.module_name.clone(),
                    },
                    inputs: vec![module.clone()],
                    outputs: vec![interface],
                    command,
                    prerequisites: prerequisites.clone(),
                })?;
            }
        }

        for link in request.link_outputs() {
            let Some(linker) = &request.tools.linker else {
                continue;
            };
            let product = self.layout.linked(link);
            let mut command = CommandLine::new(linker);
            command = match link {
                LinkOutput::Executable => command,
                LinkOutput::DynamicLibrary => command.arg("--shared"),
                LinkOutput::StaticLibrary => command.arg("--static"),
            };
            let mut inputs = compiles.objects.clone();
            for object in &compiles.objects {
                command = command.path_arg(&object.path);
            }
            for library in &request.libraries {
                command = command.path_arg(library);
                inputs.push(Artifact::new(library, FileType::Library));
            }
            command = command.flag_path(OUTPUT_FLAG, &product.path);

            self.builder.add(JobSpec {
                key: JobKey::link(&product.path),
                kind: JobKind::Link { output: link },
                inputs,
                outputs: vec![product],
                command,
                prerequisites: all_compiles.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputFile, Toolchain};
    use crate::fingerprint::Fingerprint;
    use crate::types::{FailurePolicy, OutputKind};
    use std::path::{Path, PathBuf};

    fn request(outputs: &[OutputKind], mode: CompilationMode) -> BuildRequest {
        BuildRequest {
            module_name: "App".into(),
            inputs: ["a", "b", "c"]
                .iter()
                .map(|n| InputFile {
                    path: PathBuf::from(format!("/p/{n}.src")),
                    fingerprint: Fingerprint::of_bytes(n.as_bytes()),
                })
                .collect(),
            outputs: outputs.iter().copied().collect(),
            mode,
            concurrency: 2,
            batch_size: None,
            failure_policy: FailurePolicy::ContinueOnFailure,
            libraries: vec![PathBuf::from("/lib/libm.a")],
            bridging_header: None,
            explicit_modules: false,
            compiler_args: vec!["-O2".into()],
            output_dir: PathBuf::from("/out"),
            state_path: PathBuf::from("/out/state.json"),
            tools: Toolchain {
                compiler: "cc".into(),
                linker: Some("ld".into()),
                scanner: None,
            },
        }
    }

    fn keys(graph: &JobGraph) -> Vec<String> {
        graph.jobs().map(|j| j.key.to_string()).collect()
    }

    #[test]
    fn per_file_executable_with_module() {
        let req = request(
            &[OutputKind::Executable, OutputKind::Module],
            CompilationMode::PerFile,
        );
        let graph = plan(&req, None).unwrap();

        assert_eq!(
            keys(&graph),
            vec![
                "compile:/p/a.src",
                "compile:/p/b.src",
                "compile:/p/c.src",
                "merge-module:App",
                "link:/out/App",
            ]
        );

        let compile_a = graph.job(JobId(0));
        assert_eq!(compile_a.inputs, vec![Artifact::source("/p/a.src")]);
        assert_eq!(compile_a.command.values_of(PRIMARY_FLAG), vec!["/p/a.src"]);
        assert_eq!(
            compile_a.command.values_of(OUTPUT_FLAG),
            vec!["/out/a.o", "/out/a.summary"]
        );
        assert_eq!(
            compile_a.command.values_of(EMIT_DEPS_FLAG),
            vec!["/out/a.deps.json"]
        );
        // Every source is passed; only one is primary.
        assert!(compile_a.command.args.contains(&"/p/c.src".to_string()));

        let link = graph.job(JobId(4));
        assert_eq!(
            link.prerequisites,
            BTreeSet::from([JobId(0), JobId(1), JobId(2)])
        );
        assert!(link.inputs.iter().any(|a| a.file_type == FileType::Library));
    }

    #[test]
    fn whole_module_has_single_compile_and_no_merge() {
        let req = request(
            &[OutputKind::Object, OutputKind::Interface],
            CompilationMode::WholeModule,
        );
        let graph = plan(&req, None).unwrap();

        assert_eq!(keys(&graph), vec!["compile:App", "generate-interface:App"]);
        let compile = graph.job(JobId(0));
        assert_eq!(
            compile.command.values_of(OUTPUT_FLAG),
            vec!["/out/App.o", "/out/App.module"]
        );
        assert!(compile.command.values_of(EMIT_DEPS_FLAG).is_empty());
        assert_eq!(graph.job(JobId(1)).prerequisites, BTreeSet::from([JobId(0)]));
    }

    #[test]
    fn bridging_header_precedes_every_compile() {
        let mut req = request(&[OutputKind::Object], CompilationMode::PerFile);
        req.bridging_header = Some(InputFile {
            path: PathBuf::from("/p/bridge.h"),
            fingerprint: Fingerprint::of_bytes(b"h"),
        });
        let graph = plan(&req, None).unwrap();

        assert_eq!(graph.job(JobId(0)).key.as_str(), "generate-pch:/p/bridge.h");
        for job in graph.jobs().skip(1) {
            assert!(job.prerequisites.contains(&JobId(0)));
            assert!(job.inputs.iter().any(|a| a.path == Path::new("/out/bridge.pch")));
        }
    }

    #[test]
    fn explicit_modules_are_built_in_order_before_importers() {
        let mut req = request(&[OutputKind::Object], CompilationMode::PerFile);
        req.explicit_modules = true;
        let mut modules = ModuleDependencyGraph::new();
        modules.add_module("Net", "/sdk/Net.interface", ["Core"]);
        modules.add_module("Core", "/sdk/Core.interface", Vec::<String>::new());
        modules.add_import("/p/b.src", "Net");

        let graph = plan(&req, Some(&modules)).unwrap();
        assert_eq!(
            keys(&graph)[..2],
            ["build-module:Core".to_string(), "build-module:Net".to_string()]
        );
        assert_eq!(graph.job(JobId(1)).prerequisites, BTreeSet::from([JobId(0)]));

        let compile_a = graph.job(graph.find("compile:/p/a.src").unwrap());
        assert!(compile_a.prerequisites.is_empty());
        let compile_b = graph.job(graph.find("compile:/p/b.src").unwrap());
        assert_eq!(compile_b.prerequisites, BTreeSet::from([JobId(0), JobId(1)]));
    }

    #[test]
    fn malformed_requests_are_rejected() {
        let mut req = request(&[OutputKind::Object], CompilationMode::PerFile);
        req.concurrency = 0;
        assert!(matches!(plan(&req, None), Err(PlanningError::MalformedRequest(_))));

        let mut req = request(&[OutputKind::Object], CompilationMode::PerFile);
        req.inputs.push(req.inputs[0].clone());
        assert!(matches!(plan(&req, None), Err(PlanningError::MalformedRequest(_))));

        let req = request(&[], CompilationMode::PerFile);
        assert!(matches!(plan(&req, None), Err(PlanningError::MalformedRequest(_))));

        let mut req = request(&[OutputKind::Object], CompilationMode::PerFile);
        req.explicit_modules = true;
        assert!(matches!(plan(&req, None), Err(PlanningError::MalformedRequest(_))));
    }

    #[test]
    fn unproducible_outputs_are_rejected() {
        let mut req = request(&[OutputKind::Executable], CompilationMode::PerFile);
        req.tools.linker = None;
        assert!(matches!(plan(&req, None), Err(PlanningError::MissingOutputRule(_))));

        let req = request(
            &[OutputKind::Executable, OutputKind::StaticLibrary],
            CompilationMode::PerFile,
        );
        assert!(matches!(plan(&req, None), Err(PlanningError::MissingOutputRule(_))));
    }

    #[test]
    fn identical_requests_plan_identically() {
        let req = request(
            &[OutputKind::DynamicLibrary, OutputKind::Interface],
            CompilationMode::PerFile,
        );
        let first = plan(&req, None).unwrap();
        let second = plan(&req, None).unwrap();
        let a: Vec<_> = first.jobs().cloned().collect();
        let b: Vec<_> = second.jobs().cloned().collect();
        assert_eq!(a, b);
    }
}
