//! Dependency Checking
//!
//! Collects the external programs every enabled stage needs from the
//! static stage definitions and verifies each one can be run. All misses
//! are gathered into one report.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::Serialize;

use super::programs::ProgramLocator;
use crate::error::{Result, WorkflowError};
use crate::workflow::gate::GateDecisions;
use crate::workflow::model::StageSpec;

/// A program that could not be found, with the stages that need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingProgram {
    pub program: String,
    pub stages: Vec<String>,
}

/// Outcome of one dependency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub missing: Vec<MissingProgram>,
    /// Programs that were found, with their location.
    pub found: BTreeMap<String, PathBuf>,
}

impl DependencyReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }

    /// Number of missing programs.
    pub fn len(&self) -> usize {
        self.missing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// Turns a report with missing programs into a configuration error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_satisfied() {
            Ok(self)
        } else {
            Err(WorkflowError::MissingDependencies(self))
        }
    }
}

impl fmt::Display for DependencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing.is_empty() {
            return write!(f, "All {} required programs found", self.found.len());
        }
        write!(f, "{} required program(s) not found:", self.missing.len())?;
        for miss in &self.missing {
            write!(f, "\n  - {} (needed by {})", miss.program, miss.stages.join(", "))?;
        }
        Ok(())
    }
}

/// Verifies program availability for the enabled stages.
pub struct DependencyChecker<'a> {
    locator: &'a dyn ProgramLocator,
}

impl<'a> DependencyChecker<'a> {
    pub fn new(locator: &'a dyn ProgramLocator) -> Self {
        Self { locator }
    }

    /// Programs required by enabled stages, each with the stages needing it.
    pub fn required_programs(
        specs: &[StageSpec],
        gates: &GateDecisions,
    ) -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut required: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for spec in specs.iter().filter(|s| gates.is_enabled(s.name())) {
            for program in spec.def.programs() {
                let stages = required.entry(program).or_default();
                if !stages.contains(&spec.name()) {
                    stages.push(spec.name());
                }
            }
        }
        required
    }

    /// Checks every required program; never stops at the first miss.
    pub fn check(&self, specs: &[StageSpec], gates: &GateDecisions) -> DependencyReport {
        let required = Self::required_programs(specs, gates);
        info!("Checking {} required programs", required.len());

        let mut report = DependencyReport::default();
        for (program, stages) in required {
            match self.locator.locate(program) {
                Some(path) => {
                    debug!("  {} -> {}", program, path.display());
                    report.found.insert(program.to_string(), path);
                }
                None => {
                    warn!("  {} not found (needed by {})", program, stages.join(", "));
                    report.missing.push(MissingProgram {
                        program: program.to_string(),
                        stages: stages.iter().map(|s| s.to_string()).collect(),
                    });
                }
            }
        }
        report
    }
}
