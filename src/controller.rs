//! Workflow Controller
//!
//! Facade over the resolution layer with a two-phase lifecycle:
//!
//! 1. [`WorkflowController::init`] loads and checks the configuration,
//!    discovers the entities of the input manifest, composes embedded
//!    workflows, resolves stage gates and verifies program dependencies.
//! 2. [`WorkflowController::go`] builds the stage graph and either hands it
//!    to the scheduler, returns it for a dry run, or writes a Graphviz
//!    rendering.
//!
//! Every error surfaces before the scheduler is started.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::config::{default_config, ConfigStore, ConfigValue, ParameterResolver, CONFIG_VERSION};
use crate::environment::{DependencyChecker, DependencyReport, PathLocator, ProgramLocator};
use crate::error::{Result, WorkflowError};
use crate::execution::{Scheduler, Submission};
use crate::workflow::{
    definition, load_manifest, validate_stages, Category, DirectoryLayout, Entities, GateDecisions,
    GraphBuilder, StageGate, StageGraph, StageSpec, Workflow, WorkflowComposer, WorkflowKind,
};

const WORKFLOW_NAME_KEY: &str = "workflow_name";
const CONFIG_VERSION_KEY: &str = "config_version";
const PROJECT_NAME_KEY: &str = "project_name";
const MAX_THREADS_KEY: &str = "max_threads";
const FORCE_RERUN_KEY: &str = "force_rerun";

/// What `go()` does with the built graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Execute,
    DryRun,
    /// Write a Graphviz DOT rendering to the given path.
    Visualize(PathBuf),
}

/// Invocation settings supplied by the front end.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub kind: WorkflowKind,
    pub config_path: Option<PathBuf>,
    /// Work directory; output directories and relative paths live under it.
    pub root: PathBuf,
    pub mode: RunMode,
    /// Arguments forwarded to the scheduler.
    pub scheduler_args: Vec<String>,
}

impl ControllerOptions {
    pub fn new(kind: WorkflowKind, root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            config_path: None,
            root: root.into(),
            mode: RunMode::Execute,
            scheduler_args: Vec::new(),
        }
    }
}

/// Result of `go()`.
#[derive(Debug)]
pub enum Outcome {
    Submitted { jobs: usize },
    Validated(StageGraph),
    Visualized(PathBuf),
}

/// State established by `init()`.
#[derive(Debug)]
struct Initialized {
    workflow: Workflow,
    specs: Vec<StageSpec>,
    gates: GateDecisions,
    report: Option<DependencyReport>,
}

/// Owns the resolved context of one invocation.
pub struct WorkflowController {
    options: ControllerOptions,
    locator: Rc<dyn ProgramLocator>,
    state: Option<Initialized>,
}

impl WorkflowController {
    /// Creates a controller that looks programs up on `PATH`.
    pub fn new(options: ControllerOptions) -> Self {
        Self::with_locator(options, Rc::new(PathLocator::from_env()))
    }

    pub fn with_locator(options: ControllerOptions, locator: Rc<dyn ProgramLocator>) -> Self {
        Self {
            options,
            locator,
            state: None,
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Runs the first phase. Calling it again is a no-op.
    pub fn init(&mut self) -> Result<()> {
        if self.state.is_some() {
            debug!("Controller already initialized");
            return Ok(());
        }

        let kind = self.options.kind;
        let def = definition(kind);
        info!("Initializing workflow '{}'", kind);

        let store = load_store(kind, self.options.config_path.as_deref())?;
        check_identity(&store, kind)?;
        for &key in def.required_keys {
            if store.node(&[key]).is_none() {
                return Err(WorkflowError::MissingKey(key.to_string()));
            }
        }
        store.warn_unknown_keys();

        let root = check_root(&self.options.root)?;
        let layout = DirectoryLayout::from_config(&root, &composed_categories(kind), &store)?;

        let manifest_path = match store.get_value(&[def.manifest.key], false) {
            Some(ConfigValue::Str(p)) => root.join(p),
            Some(other) => {
                return Err(WorkflowError::InvalidValue {
                    path: def.manifest.key.to_string(),
                    reason: format!("expected a file path, found {}", other.type_name()),
                })
            }
            None => root.join(def.manifest.default_path),
        };
        let entities = load_manifest(&manifest_path, &def.manifest, &root)?;
        info!("Found {} entries in {}", entities.len(), manifest_path.display());

        let workflow = WorkflowComposer::compose(kind, store, layout, entities);

        let mut specs = workflow.stage_specs();
        validate_stages(&mut specs).map_err(WorkflowError::InvalidDefinition)?;

        let gates = {
            let gate = StageGate::new(ParameterResolver::new(workflow.config()));
            let gates = gate.resolve(&specs)?;
            gate.check_exclusive_stages(&gates, &workflow.exclusive_stages())?;
            gate.check_exclusive_params(&gates, &workflow.exclusive_params())?;
            gates
        };

        if self.options.mode == RunMode::Execute {
            workflow.prepare_directories()?;
        }

        let checker = DependencyChecker::new(self.locator.as_ref());
        let report = workflow
            .check_dependencies(&checker, &specs, &gates)
            .map(DependencyReport::into_result)
            .transpose()?;

        self.state = Some(Initialized {
            workflow,
            specs,
            gates,
            report,
        });
        Ok(())
    }

    /// Runs the second phase, initializing first if needed.
    pub fn go(&mut self, scheduler: &dyn Scheduler) -> Result<Outcome> {
        let graph = self.build_graph()?;

        match &self.options.mode {
            RunMode::DryRun => {
                info!("Dry run: {} jobs validated", graph.job_count());
                Ok(Outcome::Validated(graph))
            }
            RunMode::Visualize(path) => {
                fs::write(path, graph.to_dot())?;
                info!("Workflow graph written to {}", path.display());
                Ok(Outcome::Visualized(path.clone()))
            }
            RunMode::Execute => {
                let state = self.state()?;
                let cores = max_threads(state.workflow.config())?;
                let root = state.workflow.layout().root().to_path_buf();
                scheduler.submit(&Submission {
                    kind: self.options.kind,
                    graph: &graph,
                    root: &root,
                    cores,
                    extra_args: &self.options.scheduler_args,
                })?;
                Ok(Outcome::Submitted {
                    jobs: graph.job_count(),
                })
            }
        }
    }

    /// Builds the stage graph with resolved parameters and artifact paths.
    pub fn build_graph(&mut self) -> Result<StageGraph> {
        self.init()?;
        let state = self.state()?;
        let workflow = &state.workflow;
        let store = workflow.config();

        let (mut forced, force_all) = forced_stages(&self.options.scheduler_args);
        forced.extend(store.string_list(&[FORCE_RERUN_KEY])?);
        for stage in &forced {
            if !state.specs.iter().any(|s| s.name() == stage) {
                warn!("Forced stage '{}' is not part of workflow '{}'", stage, workflow.kind());
            }
        }

        let project = match store.get_value(&[PROJECT_NAME_KEY], false) {
            Some(value) => value.to_string(),
            None => workflow.kind().name().to_string(),
        };

        GraphBuilder::new(
            &state.specs,
            &state.gates,
            ParameterResolver::new(store),
            workflow.layout(),
            workflow.entities(),
            &project,
        )
        .with_forced(forced, force_all)
        .build()
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.state.as_ref().map(|s| &s.workflow)
    }

    pub fn specs(&self) -> &[StageSpec] {
        self.state.as_ref().map(|s| s.specs.as_slice()).unwrap_or(&[])
    }

    pub fn gates(&self) -> Option<&GateDecisions> {
        self.state.as_ref().map(|s| &s.gates)
    }

    pub fn dependency_report(&self) -> Option<&DependencyReport> {
        self.state.as_ref().and_then(|s| s.report.as_ref())
    }

    fn state(&self) -> Result<&Initialized> {
        self.state
            .as_ref()
            .ok_or_else(|| {
                WorkflowError::InvalidDefinition("controller is not initialized".to_string())
            })
    }
}

/// Loads the user config of `kind` over its generated defaults.
pub fn load_store(kind: WorkflowKind, config_path: Option<&Path>) -> Result<ConfigStore> {
    let defaults = default_config(kind);
    match config_path {
        Some(path) => ConfigStore::load(path, defaults),
        None => {
            info!("No config given, using defaults");
            Ok(ConfigStore::from_defaults(defaults))
        }
    }
}

/// Programs needed by the enabled stages of `kind`, without touching the
/// file system beyond reading the config.
pub fn program_dependencies(
    kind: WorkflowKind,
    config_path: Option<&Path>,
) -> Result<BTreeMap<&'static str, Vec<&'static str>>> {
    let store = load_store(kind, config_path)?;
    let workflow = WorkflowComposer::compose(
        kind,
        store,
        DirectoryLayout::new(Path::new("."), &[]),
        Entities::default(),
    );
    let specs = workflow.stage_specs();
    let gates = StageGate::new(ParameterResolver::new(workflow.config())).resolve(&specs)?;
    Ok(DependencyChecker::required_programs(&specs, &gates))
}

/// Splits `--forcerun a b` and `--forceall` out of scheduler arguments.
pub fn forced_stages(args: &[String]) -> (Vec<String>, bool) {
    let mut stages = Vec::new();
    let mut all = false;
    let mut collecting = false;

    for arg in args {
        match arg.as_str() {
            "--forcerun" | "-R" => collecting = true,
            "--forceall" | "-F" => {
                all = true;
                collecting = false;
            }
            a if a.starts_with('-') => collecting = false,
            a if collecting => stages.push(a.to_string()),
            _ => {}
        }
    }
    (stages, all)
}

fn check_identity(store: &ConfigStore, kind: WorkflowKind) -> Result<()> {
    if let Some(found) = store.get_value(&[WORKFLOW_NAME_KEY], true) {
        if found.to_string() != kind.name() {
            return Err(WorkflowError::WorkflowMismatch {
                expected: kind.name().to_string(),
                found: found.to_string(),
            });
        }
    }
    if let Some(found) = store.get_value(&[CONFIG_VERSION_KEY], true) {
        if found.to_string() != CONFIG_VERSION {
            return Err(WorkflowError::UnsupportedConfigVersion {
                expected: CONFIG_VERSION.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

fn check_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(WorkflowError::MissingFile(root.to_path_buf()));
    }
    if fs::metadata(root)?.permissions().readonly() {
        return Err(WorkflowError::Unwritable(root.to_path_buf()));
    }
    Ok(root.to_path_buf())
}

fn composed_categories(kind: WorkflowKind) -> Vec<Category> {
    let def = definition(kind);
    let mut categories = def.categories.to_vec();
    if let Some(embedding) = def.embeds {
        categories.extend_from_slice(definition(embedding.kind).categories);
    }
    categories.sort();
    categories.dedup();
    categories
}

fn max_threads(store: &ConfigStore) -> Result<usize> {
    match store.get_value(&[MAX_THREADS_KEY], false) {
        None => Ok(num_cpus::get()),
        Some(ConfigValue::Int(n)) if n > 0 => Ok(n as usize),
        Some(other) => Err(WorkflowError::InvalidValue {
            path: MAX_THREADS_KEY.to_string(),
            reason: format!("expected a positive integer, found '{}'", other),
        }),
    }
}
