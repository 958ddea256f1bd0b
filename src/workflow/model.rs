//! Workflow Data Model
//!
//! Static definitions of workflows and their stages. A stage definition
//! says which external program it runs, which artifacts it reads and
//! writes, and how its argument list is assembled; nothing here depends on
//! the user's configuration.
//!
//! # Example
//!
//! ```
//! use genoflow::workflow::{definition, WorkflowKind};
//!
//! let contigs = definition(WorkflowKind::Contigs);
//! let hmms = contigs.stage("anvi_run_hmms").unwrap();
//! assert!(hmms.default_enabled);
//! assert_eq!(hmms.program, "anvi-run-hmms");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::layout::Category;
use crate::error::WorkflowError;

/// The closed set of workflows this crate knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Contigs,
    Metagenomics,
    Pangenomics,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [Self::Contigs, Self::Metagenomics, Self::Pangenomics];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Contigs => "contigs",
            Self::Metagenomics => "metagenomics",
            Self::Pangenomics => "pangenomics",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkflowKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| WorkflowError::UnknownWorkflow(s.to_string()))
    }
}

/// The entity a stage is instantiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One job per manifest row.
    Sample,
    /// One job per group of rows.
    Group,
    /// A single job for the whole project.
    Project,
}

impl Scope {
    /// Template placeholder naming the instance.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Group => "group",
            Self::Project => "project",
        }
    }
}

/// Built-in default of a stage parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    /// No default; resolves as absent unless the user sets it.
    Unset,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

/// A parameter a stage accepts, keyed by the flag it produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDef {
    pub key: &'static str,
    pub default: ParamDefault,
}

impl ParamDef {
    pub const fn switch(key: &'static str, default: bool) -> Self {
        Self { key, default: ParamDefault::Bool(default) }
    }

    pub const fn int(key: &'static str, default: i64) -> Self {
        Self { key, default: ParamDefault::Int(default) }
    }

    pub const fn float(key: &'static str, default: f64) -> Self {
        Self { key, default: ParamDefault::Float(default) }
    }

    pub const fn text(key: &'static str, default: &'static str) -> Self {
        Self { key, default: ParamDefault::Str(default) }
    }

    pub const fn unset(key: &'static str) -> Self {
        Self { key, default: ParamDefault::Unset }
    }
}

/// Whether an input appears on the command line or only orders jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    Argument,
    Ordering,
}

/// A declared input of a stage.
///
/// `from` lists candidate producers; the first enabled one supplies the
/// artifact at index `output` of its outputs. When none is enabled the
/// graph builder walks further upstream, ending at the manifest column
/// `raw` when the chain is exhausted.
///
/// `forwards` names the output a disabled stage hands over in place of
/// this input. Ordering inputs forward nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSlot {
    pub name: &'static str,
    pub from: &'static [&'static str],
    pub output: usize,
    pub raw: &'static str,
    pub role: SlotRole,
    pub forwards: Option<usize>,
}

impl InputSlot {
    /// An input read straight from the manifest.
    pub const fn raw(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            from: &[],
            output: 0,
            raw: column,
            role: SlotRole::Argument,
            forwards: Some(0),
        }
    }

    /// An input produced by an upstream stage.
    pub const fn from(
        name: &'static str,
        producers: &'static [&'static str],
        raw: &'static str,
    ) -> Self {
        Self {
            name,
            from: producers,
            output: 0,
            raw,
            role: SlotRole::Argument,
            forwards: Some(0),
        }
    }

    /// Selects which of the producer's outputs is consumed.
    pub const fn nth(self, output: usize) -> Self {
        Self { output, ..self }
    }

    /// Marks the input as a pure ordering dependency.
    pub const fn ordering(self) -> Self {
        Self {
            role: SlotRole::Ordering,
            forwards: None,
            ..self
        }
    }

    /// Stands in for output `output` of the stage when it is disabled.
    pub const fn forwarding(self, output: usize) -> Self {
        Self {
            forwards: Some(output),
            ..self
        }
    }
}

/// One element of a stage's argument template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgPart {
    /// A literal argument.
    Lit(&'static str),
    /// Every path of an input slot, one argument each.
    Input(&'static str),
    /// Every path of an input slot joined into one argument.
    Joined { slot: &'static str, sep: &'static str },
    /// Input paths with a suffix removed (index prefixes).
    InputStripped { slot: &'static str, suffix: &'static str },
    /// One of the stage's outputs.
    Output(usize),
    /// Parent directory of one of the stage's outputs.
    OutputDir(usize),
    /// An output with a suffix removed.
    OutputStripped { index: usize, suffix: &'static str },
    /// Directory of a layout category.
    CategoryDir(Category),
    /// Name of the sample, group or project the job runs for.
    Name,
    /// Optional parameter resolved into an argument token.
    Param(&'static str),
    /// Parameter that must resolve to a value.
    Required { key: &'static str, flag: &'static str },
    /// The stage's thread hint.
    Threads(&'static str),
}

/// Static definition of a pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct StageDef {
    pub name: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub scope: Scope,
    /// Executable the job runs.
    pub program: &'static str,
    /// Further programs the executable shells out to.
    pub requires: &'static [&'static str],
    pub default_enabled: bool,
    pub default_threads: usize,
    pub params: &'static [ParamDef],
    pub inputs: &'static [InputSlot],
    /// Output templates relative to the category directory.
    pub outputs: &'static [&'static str],
    pub args: &'static [ArgPart],
}

impl StageDef {
    /// Every program that must be resolvable to run this stage.
    pub fn programs(&self) -> impl Iterator<Item = &'static str> {
        let requires: &'static [&'static str] = self.requires;
        std::iter::once(self.program).chain(requires.iter().copied())
    }

    pub fn input(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|slot| slot.name == name)
    }
}

/// Columns of a workflow's input manifest.
#[derive(Debug, Clone, Copy)]
pub struct ManifestSpec {
    /// Config key holding the manifest path.
    pub key: &'static str,
    pub default_path: &'static str,
    pub name_column: &'static str,
    pub group_column: Option<&'static str>,
    pub file_columns: &'static [&'static str],
}

/// Stages of which between `min` and `max` may be enabled at once.
#[derive(Debug, Clone, Copy)]
pub struct ExclusiveStages {
    pub stages: &'static [&'static str],
    pub min: usize,
    pub max: usize,
}

/// Switches of one stage that must not be set together.
#[derive(Debug, Clone, Copy)]
pub struct ExclusiveParams {
    pub stage: &'static str,
    pub flags: &'static [&'static str],
}

/// A workflow embedded into another one.
#[derive(Debug, Clone, Copy)]
pub struct Embedding {
    pub kind: WorkflowKind,
    /// Master stages feeding the embedded workflow's raw inputs.
    pub entry: &'static [&'static str],
}

/// Complete static definition of a workflow.
#[derive(Debug)]
pub struct WorkflowDefinition {
    pub kind: WorkflowKind,
    pub description: &'static str,
    pub stages: &'static [StageDef],
    pub categories: &'static [Category],
    pub manifest: ManifestSpec,
    /// Top-level keys that have no default and must be set.
    pub required_keys: &'static [&'static str],
    pub exclusive_stages: &'static [ExclusiveStages],
    pub exclusive_params: &'static [ExclusiveParams],
    pub embeds: Option<Embedding>,
}

impl WorkflowDefinition {
    pub fn stage(&self, name: &str) -> Option<&'static StageDef> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// A stage as it takes part in one composed workflow.
///
/// Inputs are copied out of the definition so composition can rewire the
/// raw inputs of an embedded workflow to master stages.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub def: &'static StageDef,
    pub origin: WorkflowKind,
    pub inputs: Vec<InputSlot>,
}

impl StageSpec {
    pub fn new(def: &'static StageDef, origin: WorkflowKind) -> Self {
        Self {
            def,
            origin,
            inputs: def.inputs.to_vec(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// The input a disabled stage hands over in place of output `output`.
    pub fn forwarded_input(&self, output: usize) -> Option<&InputSlot> {
        self.inputs.iter().find(|slot| slot.forwards == Some(output))
    }

    pub fn input(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|slot| slot.name == name)
    }

    /// Names of every stage this one may read from.
    pub fn upstream(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs.iter().flat_map(|slot| slot.from.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_kind_round_trip_names() {
        for kind in WorkflowKind::ALL {
            assert_eq!(kind.name().parse::<WorkflowKind>().unwrap(), kind);
        }
        assert_eq!(" Metagenomics ".parse::<WorkflowKind>().unwrap(), WorkflowKind::Metagenomics);
    }

    #[test]
    fn test_unknown_workflow_kind() {
        let err = "phylogenomics".parse::<WorkflowKind>().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownWorkflow(_)));
    }

    #[test]
    fn test_input_slot_builders() {
        const SLOT: InputSlot = InputSlot::from("hits", &["centrifuge"], "path").nth(1).ordering();
        assert_eq!(SLOT.output, 1);
        assert_eq!(SLOT.role, SlotRole::Ordering);
        assert_eq!(SLOT.from, &["centrifuge"]);
        assert_eq!(SLOT.forwards, None);

        let raw = InputSlot::raw("fasta", "path");
        assert!(raw.from.is_empty());
        assert_eq!(raw.role, SlotRole::Argument);
        assert_eq!(raw.forwards, Some(0));
        assert_eq!(raw.forwarding(2).forwards, Some(2));
    }

    #[test]
    fn test_stage_programs_include_requirements() {
        static DEF: StageDef = StageDef {
            name: "anvi_pan_genome",
            description: "",
            category: Category::Pan,
            scope: Scope::Project,
            program: "anvi-pan-genome",
            requires: &["diamond", "mcl"],
            default_enabled: true,
            default_threads: 1,
            params: &[],
            inputs: &[],
            outputs: &[],
            args: &[],
        };
        let programs: Vec<_> = DEF.programs().collect();
        assert_eq!(programs, vec!["anvi-pan-genome", "diamond", "mcl"]);
    }

    #[test]
    fn test_scope_placeholders() {
        assert_eq!(Scope::Sample.placeholder(), "sample");
        assert_eq!(Scope::Group.placeholder(), "group");
        assert_eq!(Scope::Project.placeholder(), "project");
    }
}
