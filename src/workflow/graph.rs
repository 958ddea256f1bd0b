//! Stage Graph Construction
//!
//! Expands every enabled stage into one job per sample, group or project,
//! wires each job's inputs to the nearest enabled upstream producer and
//! links jobs through the artifacts they exchange.
//!
//! Disabled stages never become jobs. Their consumers are rewired by
//! walking the static producer chain: the first enabled candidate of a
//! slot supplies the artifact; when none is enabled the walk continues
//! through the input the first candidate forwards for that output, ending
//! at a manifest column once no producer is left.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

use log::{debug, info};
use petgraph::algo::is_cyclic_directed;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use super::command::{CommandBuilder, CommandContext, Invocation};
use super::gate::GateDecisions;
use super::layout::{Category, DirectoryLayout};
use super::manifest::Entities;
use super::model::{InputSlot, Scope, StageSpec};
use super::pattern::expand_template;
use crate::config::ParameterResolver;
use crate::error::{Result, WorkflowError};

/// Where a slot's artifacts come from once gates are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Output `output` of an enabled stage.
    Stage { stage: &'static str, output: usize },
    /// A file column of the input manifest.
    Raw(&'static str),
}

/// A disabled stage and what its consumers read instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passthrough {
    pub stage: String,
    /// Enabled stage whose output replaces this stage's output.
    pub forwarded_from: Option<String>,
    /// Manifest column used when no upstream stage is enabled.
    pub raw_column: Option<String>,
}

/// One concrete unit of work handed to the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// `stage:instance`, or the stage name for project-wide stages.
    pub id: String,
    pub stage: String,
    pub instance: String,
    pub category: Category,
    pub command: Invocation,
    pub threads: usize,
    /// Resolved paths per input slot.
    pub inputs: BTreeMap<String, Vec<PathBuf>>,
    pub outputs: Vec<PathBuf>,
    /// Outputs the scheduler creates itself once the command succeeds.
    pub markers: Vec<PathBuf>,
    pub log: PathBuf,
    /// Writes into a protected category.
    pub protected: bool,
    /// Protected outputs already exist and must not be regenerated.
    pub finalized: bool,
}

impl Job {
    pub fn input_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.inputs.values().flatten()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// The registered graph of one invocation.
#[derive(Debug)]
pub struct StageGraph {
    graph: DiGraph<Job, String>,
    index: HashMap<String, NodeIndex>,
    gates: GateDecisions,
    passthroughs: BTreeMap<String, Passthrough>,
}

impl StageGraph {
    /// Jobs in dependency order (producers are inserted before consumers).
    pub fn jobs(&self) -> Vec<&Job> {
        self.graph.node_indices().map(|i| &self.graph[i]).collect()
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.index.get(id).map(|i| &self.graph[*i])
    }

    pub fn jobs_for_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a Job> + 'a {
        self.graph.node_weights().filter(move |j| j.stage == stage)
    }

    /// Whether the stage registered at least one job.
    pub fn contains_stage(&self, stage: &str) -> bool {
        self.jobs_for_stage(stage).next().is_some()
    }

    /// Distinct stage names with jobs, in dependency order.
    pub fn stages(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.graph
            .node_weights()
            .map(|j| j.stage.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Jobs that `id` reads from.
    pub fn dependencies(&self, id: &str) -> Vec<&Job> {
        let Some(node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<&Job> = self
            .graph
            .neighbors_directed(*node, Direction::Incoming)
            .map(|i| &self.graph[i])
            .collect();
        deps.sort_by(|a, b| a.id.cmp(&b.id));
        deps
    }

    pub fn passthrough(&self, stage: &str) -> Option<&Passthrough> {
        self.passthroughs.get(stage)
    }

    pub fn passthroughs(&self) -> impl Iterator<Item = &Passthrough> {
        self.passthroughs.values()
    }

    pub fn gates(&self) -> &GateDecisions {
        &self.gates
    }

    pub fn is_enabled(&self, stage: &str) -> bool {
        self.gates.is_enabled(stage)
    }

    pub fn job_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Graphviz rendering of the job graph.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }
}

/// Instances of `producer` that a `consumer` instance reads from.
pub fn map_instances(
    entities: &Entities,
    project: &str,
    consumer: Scope,
    instance: &str,
    producer: Scope,
) -> Vec<String> {
    match (consumer, producer) {
        (_, Scope::Project) => vec![project.to_string()],
        (Scope::Sample, Scope::Sample) | (Scope::Group, Scope::Group) => vec![instance.to_string()],
        (Scope::Sample, Scope::Group) => entities
            .group_of(instance)
            .map(|g| vec![g.to_string()])
            .unwrap_or_default(),
        (Scope::Group, Scope::Sample) => entities
            .samples_in(instance)
            .map(|e| e.name.clone())
            .collect(),
        (Scope::Project, Scope::Sample) => entities.samples().map(|e| e.name.clone()).collect(),
        (Scope::Project, Scope::Group) => entities.groups(),
    }
}

/// Builds a [`StageGraph`] from validated stage specs and resolved gates.
pub struct GraphBuilder<'a> {
    specs: &'a [StageSpec],
    gates: &'a GateDecisions,
    resolver: ParameterResolver<'a>,
    layout: &'a DirectoryLayout,
    entities: &'a Entities,
    project: String,
    force: BTreeSet<String>,
    force_all: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        specs: &'a [StageSpec],
        gates: &'a GateDecisions,
        resolver: ParameterResolver<'a>,
        layout: &'a DirectoryLayout,
        entities: &'a Entities,
        project: &str,
    ) -> Self {
        Self {
            specs,
            gates,
            resolver,
            layout,
            entities,
            project: project.to_string(),
            force: BTreeSet::new(),
            force_all: false,
        }
    }

    /// Stages the scheduler is asked to rerun regardless of freshness.
    pub fn with_forced(mut self, stages: impl IntoIterator<Item = String>, all: bool) -> Self {
        self.force.extend(stages);
        self.force_all = all;
        self
    }

    fn spec(&self, name: &str) -> Option<&'a StageSpec> {
        self.specs.iter().find(|s| s.name() == name)
    }

    /// Resolves where a slot reads from under the current gates.
    pub fn resolve_slot(&self, slot: &InputSlot) -> Source {
        let mut current = *slot;
        for _ in 0..=self.specs.len() {
            if let Some(stage) = current.from.iter().copied().find(|p| self.gates.is_enabled(p)) {
                return Source::Stage {
                    stage,
                    output: current.output,
                };
            }
            let Some(next) = current
                .from
                .first()
                .and_then(|p| self.spec(p))
                .and_then(|s| s.forwarded_input(current.output))
            else {
                return Source::Raw(current.raw);
            };
            current = *next;
        }
        Source::Raw(current.raw)
    }

    fn instances(&self, scope: Scope) -> Vec<String> {
        match scope {
            Scope::Sample => self.entities.samples().map(|e| e.name.clone()).collect(),
            Scope::Group => self.entities.groups(),
            Scope::Project => vec![self.project.clone()],
        }
    }

    fn outputs(&self, spec: &StageSpec, instance: &str) -> Vec<PathBuf> {
        let bindings = [(spec.def.scope.placeholder(), instance)];
        spec.def
            .outputs
            .iter()
            .map(|t| self.layout.artifact(spec.def.category, &expand_template(t, &bindings)))
            .collect()
    }

    fn source_paths(
        &self,
        spec: &StageSpec,
        instance: &str,
        source: Source,
    ) -> Result<Vec<PathBuf>> {
        match source {
            Source::Stage { stage, output } => {
                let producer = self.spec(stage).ok_or_else(|| {
                    WorkflowError::InvalidDefinition(format!("unknown stage '{}'", stage))
                })?;
                let instances = map_instances(
                    self.entities,
                    &self.project,
                    spec.def.scope,
                    instance,
                    producer.def.scope,
                );
                Ok(instances
                    .iter()
                    .filter_map(|inst| self.outputs(producer, inst).into_iter().nth(output))
                    .collect())
            }
            Source::Raw(column) => {
                if !self.entities.has_column(column) {
                    return Err(WorkflowError::InvalidDefinition(format!(
                        "stage '{}' needs manifest column '{}', \
                         which the manifest does not provide",
                        spec.name(),
                        column
                    )));
                }
                let samples = map_instances(
                    self.entities,
                    &self.project,
                    spec.def.scope,
                    instance,
                    Scope::Sample,
                );
                Ok(samples
                    .iter()
                    .filter_map(|name| self.entities.file(name, column))
                    .map(|p| p.to_path_buf())
                    .collect())
            }
        }
    }

    fn record_passthrough(&self, spec: &StageSpec) -> Passthrough {
        let forwarded = spec.forwarded_input(0).map(|s| self.resolve_slot(s));
        let (forwarded_from, raw_column) = match forwarded {
            Some(Source::Stage { stage, .. }) => (Some(stage.to_string()), None),
            Some(Source::Raw(column)) => (None, Some(column.to_string())),
            None => (None, None),
        };
        info!(
            "Stage '{}' is off; consumers read {}",
            spec.name(),
            match (&forwarded_from, &raw_column) {
                (Some(stage), _) => format!("the output of '{}'", stage),
                (None, Some(column)) => format!("manifest column '{}'", column),
                (None, None) => "nothing".to_string(),
            }
        );
        Passthrough {
            stage: spec.name().to_string(),
            forwarded_from,
            raw_column,
        }
    }

    /// Builds the graph. Fails on unresolvable required parameters, invalid
    /// thread hints and attempts to regenerate protected artifacts.
    pub fn build(&self) -> Result<StageGraph> {
        let commands = CommandBuilder::new(self.resolver, self.layout);
        let mut graph: DiGraph<Job, String> = DiGraph::new();
        let mut index = HashMap::new();
        let mut producers: HashMap<PathBuf, NodeIndex> = HashMap::new();
        let mut passthroughs = BTreeMap::new();

        for spec in self.specs {
            if !self.gates.is_enabled(spec.name()) {
                passthroughs.insert(spec.name().to_string(), self.record_passthrough(spec));
                continue;
            }

            let sources: Vec<(&InputSlot, Source)> = spec
                .inputs
                .iter()
                .map(|slot| (slot, self.resolve_slot(slot)))
                .collect();
            for (slot, source) in &sources {
                if let Source::Stage { stage, .. } = source {
                    if slot.from.first() != Some(stage) {
                        debug!("{}.{}: rewired to '{}'", spec.name(), slot.name, stage);
                    }
                }
            }

            let threads = self.resolver.threads(spec.name(), spec.def.default_threads)?;

            for instance in self.instances(spec.def.scope) {
                let mut inputs = BTreeMap::new();
                for (slot, source) in &sources {
                    let paths = self.source_paths(spec, &instance, *source)?;
                    inputs.insert(slot.name.to_string(), paths);
                }
                let outputs = self.outputs(spec, &instance);

                let command = commands.build(&CommandContext {
                    stage: spec.def,
                    instance: &instance,
                    inputs: &inputs,
                    outputs: &outputs,
                    threads,
                })?;

                let id = match spec.def.scope {
                    Scope::Project => spec.name().to_string(),
                    _ => format!("{}:{}", spec.name(), instance),
                };

                let protected: Vec<PathBuf> = outputs
                    .iter()
                    .filter(|p| self.layout.is_protected(p))
                    .cloned()
                    .collect();
                let existing: Vec<&PathBuf> = protected.iter().filter(|p| p.exists()).collect();
                let is_protected = !protected.is_empty();
                let finalized = is_protected && existing.len() == protected.len();
                let forced = self.force_all || self.force.contains(spec.name());

                // A forced job or one with missing siblings would rewrite what exists.
                if let Some(path) = existing.first() {
                    if forced || !finalized {
                        return Err(WorkflowError::ProtectedArtifact {
                            stage: spec.name().to_string(),
                            path: (*path).clone(),
                        });
                    }
                }
                if finalized {
                    info!("{} is finalized; its protected outputs are kept", id);
                }

                let job = Job {
                    log: self.layout.log_path(&id),
                    markers: outputs
                        .iter()
                        .filter(|p| p.extension().is_some_and(|e| e == "done"))
                        .cloned()
                        .collect(),
                    id: id.clone(),
                    stage: spec.name().to_string(),
                    instance: instance.clone(),
                    category: spec.def.category,
                    command,
                    threads,
                    inputs,
                    outputs,
                    protected: is_protected,
                    finalized,
                };

                let node = graph.add_node(job);
                for path in graph[node].input_paths().cloned().collect::<Vec<_>>() {
                    if let Some(producer) = producers.get(&path) {
                        let label = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        graph.update_edge(*producer, node, label);
                    }
                }
                for path in &graph[node].outputs {
                    producers.insert(path.clone(), node);
                }
                index.insert(id, node);
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(WorkflowError::InvalidDefinition(
                "artifact dependencies form a cycle".to_string(),
            ));
        }

        info!(
            "Stage graph built: {} jobs, {} edges, {} stages passed through",
            graph.node_count(),
            graph.edge_count(),
            passthroughs.len()
        );

        Ok(StageGraph {
            graph,
            index,
            gates: self.gates.clone(),
            passthroughs,
        })
    }
}
