// src/plan/batch.rs

//! Groups scheduled per-file compile jobs into batch jobs.
//!
//! Only compile jobs that would run anyway are batched, so batching never
//! changes which inputs are recompiled. Two jobs can share a batch only when
//! they have the same prerequisites and their commands differ in nothing but
//! the per-unit flags. Members are split into the fewest partitions of at
//! most `batch_size` jobs, sizes balanced and members kept in plan order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::errors::PlanningError;
use crate::plan::graph::JobGraph;
use crate::plan::job::{CommandLine, CompileJob, Job, JobId, JobKey, JobKind};
use crate::plan::prune::{BuildPlan, Disposition};

/// Jobs that may be batched together share this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchGroupKey {
    prerequisites: BTreeSet<JobId>,
    tool: String,
    shared_args: Vec<String>,
}

fn is_candidate(plan: &BuildPlan, job: &Job) -> bool {
    if !plan.disposition(job.id).is_scheduled() {
        return false;
    }
    matches!(&job.kind, JobKind::Compile(c) if !c.whole_module && c.units.len() == 1)
}

/// Split `count` members into balanced contiguous partition sizes.
///
/// The first `count % parts` partitions hold one extra member.
fn partition_sizes(count: usize, batch_size: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let parts = count.div_ceil(batch_size);
    let base = count / parts;
    let extra = count % parts;
    (0..parts)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Rewrite `plan` so compatible scheduled compile jobs run as batches.
///
/// `None`, 0 and 1 leave the plan untouched.
pub fn partition(plan: BuildPlan, batch_size: Option<usize>) -> Result<BuildPlan, PlanningError> {
    let size = match batch_size {
        Some(size) if size > 1 => size,
        _ => return Ok(plan),
    };

    let mut groups: Vec<(BatchGroupKey, Vec<JobId>)> = Vec::new();
    let mut group_index: HashMap<BatchGroupKey, usize> = HashMap::new();
    for job in plan.graph.jobs() {
        if !is_candidate(&plan, job) {
            continue;
        }
        let key = BatchGroupKey {
            prerequisites: job.prerequisites.clone(),
            tool: job.command.tool.clone(),
            shared_args: job.command.shared_args(),
        };
        match group_index.get(&key) {
            Some(&index) => groups[index].1.push(job.id),
            None => {
                group_index.insert(key.clone(), groups.len());
                groups.push((key, vec![job.id]));
            }
        }
    }

    // First member of every multi-job partition -> all members.
    let mut batches: BTreeMap<JobId, Vec<JobId>> = BTreeMap::new();
    for (_, members) in &groups {
        let mut rest = members.as_slice();
        for part in partition_sizes(members.len(), size) {
            let (chunk, tail) = rest.split_at(part);
            rest = tail;
            if chunk.len() > 1 {
                batches.insert(chunk[0], chunk.to_vec());
            }
        }
    }

    if batches.is_empty() {
        debug!("no compile jobs to batch");
        return Ok(plan);
    }

    let mut remap: Vec<JobId> = vec![JobId(0); plan.len()];
    let mut absorbed: BTreeSet<JobId> = BTreeSet::new();
    let mut next = 0u32;
    for job in plan.graph.jobs() {
        if absorbed.contains(&job.id) {
            continue;
        }
        let new_id = JobId(next);
        next += 1;
        match batches.get(&job.id) {
            Some(members) => {
                for member in members {
                    remap[member.index()] = new_id;
                    absorbed.insert(*member);
                }
            }
            None => remap[job.id.index()] = new_id,
        }
    }

    let mut jobs = Vec::with_capacity(next as usize);
    let mut dispositions = Vec::with_capacity(next as usize);
    let batch_count = batches.len();
    for job in plan.graph.jobs() {
        let new_id = remap[job.id.index()];
        if new_id.index() < jobs.len() {
            continue;
        }
        let mut rewritten = match batches.get(&job.id) {
            Some(members) => merge_members(&plan.graph, members, new_id),
            None => job.clone(),
        };
        rewritten.id = new_id;
        rewritten.prerequisites = job
            .prerequisites
            .iter()
            .map(|p| remap[p.index()])
            .collect();
        dispositions.push(plan.disposition(job.id));
        jobs.push(rewritten);
    }

    let graph = JobGraph::from_jobs(jobs)?;
    info!(
        batches = batch_count,
        jobs = graph.len(),
        "partitioned compile jobs into batches"
    );
    Ok(BuildPlan::new(graph, dispositions))
}

fn merge_members(graph: &JobGraph, members: &[JobId], id: JobId) -> Job {
    let jobs: Vec<&Job> = members.iter().map(|m| graph.job(*m)).collect();

    let mut units = Vec::new();
    let mut inputs: Vec<Artifact> = Vec::new();
    let mut outputs = Vec::new();
    for job in &jobs {
        units.extend(job.units().iter().cloned());
        for input in &job.inputs {
            if !inputs.contains(input) {
                inputs.push(input.clone());
            }
        }
        outputs.extend(job.outputs.iter().cloned());
    }

    let commands: Vec<&CommandLine> = jobs.iter().map(|j| &j.command).collect();
    let first = jobs[0];
    let command = CommandLine::merge_batch(&commands).unwrap_or_else(|| first.command.clone());

    let key = match (units.first(), units.last()) {
        (Some(head), Some(tail)) => JobKey::batch(&head.primary, &tail.primary),
        _ => first.key.clone(),
    };
    debug!(batch = %key, members = jobs.len(), "formed batch");

    Job {
        id,
        key,
        kind: JobKind::Compile(CompileJob {
            units,
            whole_module: false,
        }),
        inputs,
        outputs,
        command,
        prerequisites: first.prerequisites.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildRequest, InputFile, Toolchain};
    use crate::deps::DirtySet;
    use crate::fingerprint::Fingerprint;
    use crate::fs::mock::MockFileSystem;
    use crate::plan::builder::plan;
    use crate::plan::job::{OUTPUT_FLAG, PRIMARY_FLAG};
    use crate::plan::prune::ScheduleReason;
    use crate::types::{CompilationMode, FailurePolicy, OutputKind};
    use std::path::PathBuf;

    fn request(count: usize) -> BuildRequest {
        BuildRequest {
            module_name: "App".into(),
            inputs: (0..count)
                .map(|n| InputFile {
                    path: PathBuf::from(format!("/p/f{n:02}.src")),
                    fingerprint: Fingerprint::of_bytes(&[n as u8]),
                })
                .collect(),
            outputs: [OutputKind::Executable].into_iter().collect(),
            mode: CompilationMode::PerFile,
            concurrency: 4,
            batch_size: None,
            failure_policy: FailurePolicy::ContinueOnFailure,
            libraries: Vec::new(),
            bridging_header: None,
            explicit_modules: false,
            compiler_args: Vec::new(),
            output_dir: PathBuf::from("/out"),
            state_path: PathBuf::from("/out/state.json"),
            tools: Toolchain {
                compiler: "cc".into(),
                linker: Some("ld".into()),
                scanner: None,
            },
        }
    }

    fn full_plan(count: usize) -> BuildPlan {
        BuildPlan::all_scheduled(plan(&request(count), None).unwrap())
    }

    #[test]
    fn sizes_are_balanced() {
        assert_eq!(partition_sizes(10, 4), vec![4, 3, 3]);
        assert_eq!(partition_sizes(8, 4), vec![4, 4]);
        assert_eq!(partition_sizes(3, 25), vec![3]);
        assert_eq!(partition_sizes(5, 2), vec![2, 2, 1]);
    }

    #[test]
    fn small_or_missing_batch_size_is_a_no_op() {
        for size in [None, Some(0), Some(1)] {
            let plan = partition(full_plan(3), size).unwrap();
            assert_eq!(plan.len(), 4);
        }
    }

    #[test]
    fn ten_inputs_batch_into_three_jobs() {
        let plan = partition(full_plan(10), Some(4)).unwrap();
        let compiles: Vec<&Job> = plan.graph.jobs().filter(|j| j.is_compile()).collect();

        let sizes: Vec<usize> = compiles.iter().map(|j| j.units().len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(compiles[0].key.as_str(), "batch:/p/f00.src../p/f03.src");
        assert_eq!(
            compiles[1].command.values_of(PRIMARY_FLAG),
            vec!["/p/f04.src", "/p/f05.src", "/p/f06.src"]
        );
        assert_eq!(compiles[1].command.values_of(OUTPUT_FLAG).len(), 3);

        let link = plan.graph.jobs().last().unwrap();
        assert_eq!(link.prerequisites, BTreeSet::from([JobId(0), JobId(1), JobId(2)]));
        assert!(plan.dispositions().iter().all(|d| d.is_scheduled()));
    }

    #[test]
    fn clean_jobs_are_never_batched() {
        let graph = plan(&request(4), None).unwrap();
        let fs = MockFileSystem::new();
        for job in graph.jobs() {
            for out in &job.outputs {
                fs.add_file(&out.path, "built");
            }
        }
        let mut dirty = DirtySet::new();
        dirty.insert("/p/f01.src", crate::deps::DirtyReason::Modified);
        dirty.insert("/p/f02.src", crate::deps::DirtyReason::Modified);
        let pruned =
            crate::plan::prune::prune(graph, &dirty, &BTreeSet::new(), &BTreeSet::new(), &fs);

        let batched = partition(pruned, Some(10)).unwrap();
        let keys: Vec<&str> = batched.graph.jobs().map(|j| j.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "compile:/p/f00.src",
                "batch:/p/f01.src../p/f02.src",
                "compile:/p/f03.src",
                "link:/out/App",
            ]
        );
        assert_eq!(batched.disposition(JobId(0)), Disposition::Clean);
        assert_eq!(
            batched.disposition(JobId(1)),
            Disposition::Scheduled(ScheduleReason::DirtyInput)
        );
    }

    #[test]
    fn batching_is_deterministic() {
        let a = partition(full_plan(7), Some(3)).unwrap();
        let b = partition(full_plan(7), Some(3)).unwrap();
        let a: Vec<Job> = a.graph.jobs().cloned().collect();
        let b: Vec<Job> = b.graph.jobs().cloned().collect();
        assert_eq!(a, b);
    }
}
