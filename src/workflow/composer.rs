//! Workflow Composition
//!
//! A workflow may embed another one as a sub-pipeline. The embedded
//! ("slave") workflow holds references to the master's configuration
//! store, directory layout and entities; it never builds its own, never
//! creates directories and never runs its own dependency check. The
//! master checks the union of both stage lists once.

use std::rc::Rc;

use log::{debug, info};

use super::catalog::definition;
use super::layout::{Category, DirectoryLayout};
use super::manifest::Entities;
use super::model::{ExclusiveParams, ExclusiveStages, StageSpec, WorkflowDefinition, WorkflowKind};
use super::gate::GateDecisions;
use crate::config::ConfigStore;
use crate::environment::{DependencyChecker, DependencyReport};
use crate::error::Result;

/// How a workflow takes part in an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionMode {
    TopLevel,
    Embedded { master: WorkflowKind },
}

/// A workflow bound to the shared context of one invocation.
#[derive(Debug)]
pub struct Workflow {
    kind: WorkflowKind,
    mode: CompositionMode,
    definition: &'static WorkflowDefinition,
    config: Rc<ConfigStore>,
    layout: Rc<DirectoryLayout>,
    entities: Rc<Entities>,
    slave: Option<Box<Workflow>>,
}

impl Workflow {
    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    pub fn mode(&self) -> CompositionMode {
        self.mode
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.mode, CompositionMode::Embedded { .. })
    }

    pub fn definition(&self) -> &'static WorkflowDefinition {
        self.definition
    }

    pub fn config(&self) -> &Rc<ConfigStore> {
        &self.config
    }

    pub fn layout(&self) -> &Rc<DirectoryLayout> {
        &self.layout
    }

    pub fn entities(&self) -> &Rc<Entities> {
        &self.entities
    }

    pub fn slave(&self) -> Option<&Workflow> {
        self.slave.as_deref()
    }

    /// This workflow's definition followed by the embedded one's.
    pub fn definitions(&self) -> Vec<&'static WorkflowDefinition> {
        let mut defs = vec![self.definition];
        if let Some(slave) = &self.slave {
            defs.extend(slave.definitions());
        }
        defs
    }

    /// Every category used by this workflow or the embedded one.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self
            .definitions()
            .iter()
            .flat_map(|d| d.categories.iter().copied())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn exclusive_stages(&self) -> Vec<ExclusiveStages> {
        self.definitions()
            .iter()
            .flat_map(|d| d.exclusive_stages.iter().copied())
            .collect()
    }

    pub fn exclusive_params(&self) -> Vec<ExclusiveParams> {
        self.definitions()
            .iter()
            .flat_map(|d| d.exclusive_params.iter().copied())
            .collect()
    }

    /// Stage specs of the composed workflow, embedded stages first.
    ///
    /// Root inputs of the embedded workflow read from the master's entry
    /// stages when the master declares any.
    pub fn stage_specs(&self) -> Vec<StageSpec> {
        let mut specs = Vec::new();

        if let Some(slave) = &self.slave {
            let entry = self.definition.embeds.map(|e| e.entry).unwrap_or(&[]);
            for mut spec in slave.stage_specs() {
                if !entry.is_empty() {
                    for slot in spec.inputs.iter_mut().filter(|s| s.from.is_empty()) {
                        debug!("{}.{} reads from {:?}", spec.def.name, slot.name, entry);
                        slot.from = entry;
                        slot.output = 0;
                    }
                }
                specs.push(spec);
            }
        }

        specs.extend(
            self.definition
                .stages
                .iter()
                .map(|def| StageSpec::new(def, self.kind)),
        );
        specs
    }

    /// Creates the output directories. Embedded workflows leave this to the
    /// master and return `false`.
    pub fn prepare_directories(&self) -> Result<bool> {
        if self.is_embedded() {
            debug!("{}: directories are managed by the master workflow", self.kind);
            return Ok(false);
        }
        self.layout.create()?;
        Ok(true)
    }

    /// Runs the dependency check for the composed stage list.
    ///
    /// Returns `None` without consulting the checker when embedded.
    pub fn check_dependencies(
        &self,
        checker: &DependencyChecker<'_>,
        specs: &[StageSpec],
        gates: &GateDecisions,
    ) -> Option<DependencyReport> {
        if self.is_embedded() {
            debug!("{}: dependency check left to the master workflow", self.kind);
            return None;
        }
        Some(checker.check(specs, gates))
    }
}

/// Builds top-level workflows and attaches embedded ones.
pub struct WorkflowComposer;

impl WorkflowComposer {
    /// Creates the top-level workflow and, if its definition embeds another
    /// workflow, the embedded one sharing its context.
    pub fn compose(
        kind: WorkflowKind,
        config: ConfigStore,
        layout: DirectoryLayout,
        entities: Entities,
    ) -> Workflow {
        let mut master = Workflow {
            kind,
            mode: CompositionMode::TopLevel,
            definition: definition(kind),
            config: Rc::new(config),
            layout: Rc::new(layout),
            entities: Rc::new(entities),
            slave: None,
        };

        if let Some(embedding) = master.definition.embeds {
            master.slave = Some(Box::new(Self::embed(&master, embedding.kind)));
        }
        master
    }

    /// Instantiates `kind` inside `master`, reusing the master's context.
    pub fn embed(master: &Workflow, kind: WorkflowKind) -> Workflow {
        info!("Embedding workflow '{}' into '{}'", kind, master.kind);
        Workflow {
            kind,
            mode: CompositionMode::Embedded { master: master.kind },
            definition: definition(kind),
            config: Rc::clone(&master.config),
            layout: Rc::clone(&master.layout),
            entities: Rc::clone(&master.entities),
            slave: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, ParameterResolver};
    use crate::environment::FixedLocator;
    use crate::workflow::gate::StageGate;
    use crate::workflow::validator::validate_stages;
    use std::path::Path;

    fn compose(kind: WorkflowKind) -> Workflow {
        let config = ConfigStore::from_defaults(default_config(kind));
        let layout = DirectoryLayout::new(Path::new("/w"), definition(kind).categories);
        WorkflowComposer::compose(kind, config, layout, Entities::default())
    }

    #[test]
    fn test_embedded_workflow_shares_context() {
        let master = compose(WorkflowKind::Metagenomics);
        let slave = master.slave().unwrap();

        assert_eq!(slave.kind(), WorkflowKind::Contigs);
        assert_eq!(slave.mode(), CompositionMode::Embedded { master: WorkflowKind::Metagenomics });
        assert!(Rc::ptr_eq(master.config(), slave.config()));
        assert!(Rc::ptr_eq(master.layout(), slave.layout()));
        assert!(Rc::ptr_eq(master.entities(), slave.entities()));
        assert_eq!(Rc::strong_count(master.config()), 2);
        assert_eq!(Rc::strong_count(master.layout()), 2);
    }

    #[test]
    fn test_contigs_is_top_level_only() {
        let contigs = compose(WorkflowKind::Contigs);
        assert!(contigs.slave().is_none());
        assert!(!contigs.is_embedded());
    }

    #[test]
    fn test_slave_roots_read_from_assemblers() {
        let master = compose(WorkflowKind::Metagenomics);
        let mut specs = master.stage_specs();
        let reformat = specs
            .iter()
            .find(|s| s.name() == "anvi_script_reformat_fasta")
            .unwrap();
        assert_eq!(reformat.inputs[0].from, &["megahit", "metaspades", "idba_ud"]);
        assert_eq!(reformat.origin, WorkflowKind::Contigs);

        validate_stages(&mut specs).unwrap();
        let pos = |name: &str| specs.iter().position(|s| s.name() == name).unwrap();
        assert!(pos("megahit") < pos("anvi_script_reformat_fasta"));
        assert!(pos("anvi_gen_contigs_database") < pos("anvi_profile"));
    }

    #[test]
    fn test_pangenomics_keeps_raw_fasta_input() {
        let master = compose(WorkflowKind::Pangenomics);
        let specs = master.stage_specs();
        assert!(specs[0].inputs[0].from.is_empty());
        assert_eq!(specs[0].inputs[0].raw, "path");
        assert!(master.categories().contains(&Category::Contigs));
        assert!(master.categories().contains(&Category::Pan));
    }

    #[test]
    fn test_slave_never_checks_dependencies() {
        let master = compose(WorkflowKind::Metagenomics);
        let specs = master.stage_specs();
        let resolver = ParameterResolver::new(master.config());
        let gates = StageGate::new(resolver).resolve(&specs).unwrap();

        let locator = FixedLocator::default();
        let checker = DependencyChecker::new(&locator);

        assert!(master.slave().unwrap().check_dependencies(&checker, &specs, &gates).is_none());
        assert_eq!(locator.lookups(), 0);

        let report = master.check_dependencies(&checker, &specs, &gates).unwrap();
        assert!(locator.lookups() > 0);
        assert!(report.missing.iter().any(|m| m.program == "anvi-run-hmms"));
        assert!(report.missing.iter().any(|m| m.program == "megahit"));
    }

    #[test]
    fn test_slave_does_not_create_directories() {
        let dir = tempfile::tempdir().unwrap();
        let kind = WorkflowKind::Pangenomics;
        let layout = DirectoryLayout::new(dir.path(), definition(kind).categories);
        let master = WorkflowComposer::compose(
            kind,
            ConfigStore::from_defaults(default_config(kind)),
            layout,
            Entities::default(),
        );

        assert!(!master.slave().unwrap().prepare_directories().unwrap());
        assert!(!dir.path().join("08_PAN").exists());
        assert!(master.prepare_directories().unwrap());
        assert!(dir.path().join("08_PAN").is_dir());
    }
}
