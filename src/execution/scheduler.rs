//! Scheduler Handoff
//!
//! The resolved graph is executed by an external DAG scheduler. This module
//! serializes the ordered job list to a job file and invokes the scheduler
//! program on it. Ordering, parallel dispatch, freshness checks and retries
//! all belong to the scheduler.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};
use log::{debug, error, info};
use serde::Serialize;

use crate::config::defaults::DEFAULT_SCHEDULER;
use crate::config::ConfigStore;
use crate::error::{Result, WorkflowError};
use crate::workflow::graph::{Job, Passthrough, StageGraph};
use crate::workflow::WorkflowKind;

/// Directory under the work root that holds generated job files.
pub const STATE_DIR: &str = ".genoflow";

/// Everything the scheduler receives for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub kind: WorkflowKind,
    pub graph: &'a StageGraph,
    pub root: &'a Path,
    /// Core budget the scheduler may use.
    pub cores: usize,
    /// Arguments forwarded verbatim.
    pub extra_args: &'a [String],
}

/// Accepts a resolved graph for execution.
pub trait Scheduler {
    fn submit(&self, submission: &Submission<'_>) -> Result<()>;
}

/// On-disk form of a submission.
#[derive(Debug, Serialize)]
pub struct JobFile<'a> {
    pub workflow: &'a str,
    pub generated_at: DateTime<Local>,
    pub cores: usize,
    pub jobs: Vec<&'a Job>,
    pub passthroughs: Vec<&'a Passthrough>,
}

/// Path of the job file for `kind` under `root`.
pub fn job_file_path(root: &Path, kind: WorkflowKind) -> PathBuf {
    root.join(STATE_DIR).join(format!("{}-jobs.json", kind.name()))
}

/// Writes the ordered job list and returns the file's path.
pub fn write_job_file(submission: &Submission<'_>) -> Result<PathBuf> {
    let path = job_file_path(submission.root, submission.kind);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => WorkflowError::Unwritable(parent.to_path_buf()),
            _ => WorkflowError::Io(e),
        })?;
    }

    let file = JobFile {
        workflow: submission.kind.name(),
        generated_at: Local::now(),
        cores: submission.cores,
        jobs: submission.graph.jobs(),
        passthroughs: submission.graph.passthroughs().collect(),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| WorkflowError::Scheduler(format!("cannot serialize job list: {}", e)))?;
    fs::write(&path, json)?;

    info!("Wrote {} jobs to {}", file.jobs.len(), path.display());
    Ok(path)
}

/// Runs an external scheduler program on the job file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalScheduler {
    program: String,
    args: Vec<String>,
}

impl ExternalScheduler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Reads `scheduler.program` and `scheduler.args`.
    pub fn from_config(store: &ConfigStore) -> Result<Self> {
        let program = match store.get_value(&["scheduler", "program"], false) {
            None => DEFAULT_SCHEDULER.to_string(),
            Some(value) => value
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| WorkflowError::InvalidValue {
                    path: "scheduler.program".to_string(),
                    reason: format!("expected a program name, found {}", value.type_name()),
                })?,
        };
        let args = store.string_list(&["scheduler", "args"])?;
        Ok(Self { program, args })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for a job file: configured args, job file, cores,
    /// then pass-through args.
    pub fn arguments(&self, job_file: &Path, submission: &Submission<'_>) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--jobs".to_string());
        args.push(job_file.display().to_string());
        args.push("--cores".to_string());
        args.push(submission.cores.to_string());
        args.extend(submission.extra_args.iter().cloned());
        args
    }
}

impl Scheduler for ExternalScheduler {
    fn submit(&self, submission: &Submission<'_>) -> Result<()> {
        let job_file = write_job_file(submission)?;
        let args = self.arguments(&job_file, submission);
        debug!("Running {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(submission.root)
            .status()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => WorkflowError::Scheduler(format!(
                    "scheduler program '{}' was not found",
                    self.program
                )),
                _ => WorkflowError::Scheduler(format!("cannot start '{}': {}", self.program, e)),
            })?;

        if status.success() {
            info!("Scheduler '{}' finished", self.program);
            Ok(())
        } else {
            error!("Scheduler '{}' failed with exit code: {:?}", self.program, status.code());
            Err(WorkflowError::Scheduler(format!(
                "'{}' exited with {}",
                self.program,
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "a signal".to_string())
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, ParameterResolver};
    use crate::workflow::fixtures::chain_specs;
    use crate::workflow::gate::StageGate;
    use crate::workflow::graph::GraphBuilder;
    use crate::workflow::layout::{Category, DirectoryLayout};
    use crate::workflow::manifest::{Entities, Entity};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn graph(root: &Path) -> StageGraph {
        let store = ConfigStore::new(json!({"stage_b": {"run": false}}), json!({}));
        let resolver = ParameterResolver::new(&store);
        let specs = chain_specs();
        let gates = StageGate::new(resolver).resolve(&specs).unwrap();
        let layout = DirectoryLayout::new(root, &[Category::Contigs]);
        let entities = Entities::new(vec![Entity {
            name: "g1".to_string(),
            group: "g1".to_string(),
            files: BTreeMap::from([("path".to_string(), root.join("g1.fa"))]),
        }]);
        GraphBuilder::new(&specs, &gates, resolver, &layout, &entities, "demo")
            .build()
            .unwrap()
    }

    #[test]
    fn test_job_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph(dir.path());
        let submission = Submission {
            kind: WorkflowKind::Contigs,
            graph: &graph,
            root: dir.path(),
            cores: 6,
            extra_args: &[],
        };

        let path = write_job_file(&submission).unwrap();
        assert_eq!(path, dir.path().join(".genoflow/contigs-jobs.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["workflow"], "contigs");
        assert_eq!(value["cores"], 6);
        assert!(value["generated_at"].is_string());

        let ids: Vec<&str> = value["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|j| j["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["stage_a:g1", "stage_c:g1"]);
        assert_eq!(value["passthroughs"][0]["stage"], "stage_b");
        assert_eq!(value["passthroughs"][0]["forwarded_from"], "stage_a");
    }

    #[test]
    fn test_scheduler_from_config() {
        let store = ConfigStore::from_defaults(default_config(WorkflowKind::Contigs));
        let scheduler = ExternalScheduler::from_config(&store).unwrap();
        assert_eq!(scheduler, ExternalScheduler::new(DEFAULT_SCHEDULER, Vec::new()));

        let store = ConfigStore::new(
            json!({"scheduler": {"program": "snakemake-bridge", "args": ["--quiet"]}}),
            default_config(WorkflowKind::Contigs),
        );
        let scheduler = ExternalScheduler::from_config(&store).unwrap();
        assert_eq!(scheduler.program(), "snakemake-bridge");

        let store = ConfigStore::new(json!({"scheduler": {"program": 3}}), json!({}));
        assert!(ExternalScheduler::from_config(&store).unwrap_err().is_configuration());
    }

    #[test]
    fn test_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph(dir.path());
        let extra = vec!["--forcerun".to_string(), "stage_c".to_string()];
        let submission = Submission {
            kind: WorkflowKind::Contigs,
            graph: &graph,
            root: dir.path(),
            cores: 2,
            extra_args: &extra,
        };
        let scheduler = ExternalScheduler::new("sched", vec!["--quiet".to_string()]);
        let args = scheduler.arguments(Path::new("/w/jobs.json"), &submission);
        assert_eq!(
            args,
            vec!["--quiet", "--jobs", "/w/jobs.json", "--cores", "2", "--forcerun", "stage_c"]
        );
    }

    #[test]
    fn test_missing_scheduler_program() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph(dir.path());
        let submission = Submission {
            kind: WorkflowKind::Contigs,
            graph: &graph,
            root: dir.path(),
            cores: 1,
            extra_args: &[],
        };
        let scheduler = ExternalScheduler::new("genoflow-no-such-scheduler", Vec::new());
        let err = scheduler.submit(&submission).unwrap_err();
        assert!(matches!(err, WorkflowError::Scheduler(_)));
        assert_eq!(err.exit_code(), 4);
    }
}
