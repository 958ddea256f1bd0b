//! Stage Catalog Validation
//!
//! Checks a composed list of stage specs before any graph is built:
//! - every stage has a program, outputs and a unique name
//! - every producer and argument slot a stage references exists
//! - output templates only use the stage's own placeholder
//! - stage dependencies are acyclic (Kahn ordering)
//!
//! On success the specs are reordered so producers come before consumers.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info};

use super::model::{ArgPart, StageSpec};
use super::pattern::extract_placeholder_names;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyCatalog,
    DuplicateStage(String),
    EmptyProgram(String),
    NoOutputs(String),
    UnknownProducer { stage: String, producer: String },
    UnknownSlot { stage: String, slot: String },
    BadOutputIndex { stage: String, index: usize },
    ForeignPlaceholder { stage: String, template: String },
    CyclicDependency,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCatalog => write!(f, "Workflow has no stages"),
            Self::DuplicateStage(name) => write!(f, "Duplicate stage name: '{}'", name),
            Self::EmptyProgram(stage) => write!(f, "Stage '{}' has no program", stage),
            Self::NoOutputs(stage) => write!(f, "Stage '{}' declares no outputs", stage),
            Self::UnknownProducer { stage, producer } => {
                write!(f, "Stage '{}' reads from unknown stage '{}'", stage, producer)
            }
            Self::UnknownSlot { stage, slot } => {
                write!(f, "Stage '{}' uses undeclared input '{}'", stage, slot)
            }
            Self::BadOutputIndex { stage, index } => {
                write!(f, "Stage '{}' refers to output #{} which does not exist", stage, index)
            }
            Self::ForeignPlaceholder { stage, template } => {
                write!(
                    f,
                    "Stage '{}': output '{}' uses a placeholder of another scope",
                    stage, template
                )
            }
            Self::CyclicDependency => {
                write!(
                    f,
                    "Workflow contains cyclic dependencies (stages depend on each other in a loop)"
                )
            }
        }
    }
}

/// Validates a single stage against the set of known stage names.
fn validate_stage(spec: &StageSpec, outputs: &HashMap<&str, usize>) -> Vec<ValidationError> {
    let def = spec.def;
    let name = def.name.to_string();
    let mut errors = Vec::new();

    if def.program.trim().is_empty() {
        errors.push(ValidationError::EmptyProgram(name.clone()));
    }

    if def.outputs.is_empty() {
        errors.push(ValidationError::NoOutputs(name.clone()));
    }

    for template in def.outputs {
        let own = def.scope.placeholder();
        if extract_placeholder_names(template).iter().any(|p| p != own) {
            errors.push(ValidationError::ForeignPlaceholder {
                stage: name.clone(),
                template: template.to_string(),
            });
        }
    }

    for slot in &spec.inputs {
        if let Some(index) = slot.forwards {
            if index >= def.outputs.len() && !def.outputs.is_empty() {
                errors.push(ValidationError::BadOutputIndex {
                    stage: name.clone(),
                    index,
                });
            }
        }
        for producer in slot.from {
            match outputs.get(producer) {
                None => errors.push(ValidationError::UnknownProducer {
                    stage: name.clone(),
                    producer: producer.to_string(),
                }),
                Some(count) if slot.output >= *count => {
                    errors.push(ValidationError::BadOutputIndex {
                        stage: producer.to_string(),
                        index: slot.output,
                    })
                }
                Some(_) => {}
            }
        }
    }

    for part in def.args {
        let slot = match part {
            ArgPart::Input(slot)
            | ArgPart::Joined { slot, .. }
            | ArgPart::InputStripped { slot, .. } => Some(*slot),
            _ => None,
        };
        if let Some(slot) = slot {
            if spec.input(slot).is_none() {
                errors.push(ValidationError::UnknownSlot {
                    stage: name.clone(),
                    slot: slot.to_string(),
                });
            }
        }

        let index = match part {
            ArgPart::Output(i) | ArgPart::OutputDir(i) => Some(*i),
            ArgPart::OutputStripped { index, .. } => Some(*index),
            _ => None,
        };
        if let Some(index) = index {
            if index >= def.outputs.len() {
                errors.push(ValidationError::BadOutputIndex {
                    stage: name.clone(),
                    index,
                });
            }
        }
    }

    if spec.inputs.is_empty() {
        debug!("Stage '{}' has no declared inputs", def.name);
    }

    errors
}

/// Validates the composed stage list.
///
/// Performs the following checks:
/// 1. The list is not empty
/// 2. No duplicate stage names
/// 3. All stages have valid fields and references
/// 4. No cyclic dependencies
///
/// On success, the stages are reordered in topological order.
pub fn validate_stages(stages: &mut Vec<StageSpec>) -> Result<(), String> {
    info!("Validating {} stage definitions", stages.len());

    if stages.is_empty() {
        return Err(ValidationError::EmptyCatalog.to_string());
    }

    let mut outputs: HashMap<&str, usize> = HashMap::new();
    for spec in stages.iter() {
        if outputs.insert(spec.name(), spec.def.outputs.len()).is_some() {
            return Err(ValidationError::DuplicateStage(spec.name().to_string()).to_string());
        }
    }

    let all_errors: Vec<ValidationError> = stages
        .iter()
        .flat_map(|spec| validate_stage(spec, &outputs))
        .collect();

    if !all_errors.is_empty() {
        let error_messages: Vec<String> = all_errors.iter().map(|e| e.to_string()).collect();
        return Err(error_messages.join("\n"));
    }

    topological_sort(stages)?;

    info!("Stage definitions validated: {} stages", stages.len());
    Ok(())
}

/// Orders stages so producers come before consumers (Kahn's algorithm).
///
/// Ties keep their original relative order, so the result is deterministic.
fn topological_sort(stages: &mut Vec<StageSpec>) -> Result<(), String> {
    let index: HashMap<&str, usize> = stages
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name(), i))
        .collect();

    let mut in_degree = vec![0usize; stages.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];

    for (i, spec) in stages.iter().enumerate() {
        let producers: HashSet<usize> = spec
            .upstream()
            .filter_map(|name| index.get(name).copied())
            .collect();
        in_degree[i] = producers.len();
        for p in producers {
            successors[p].push(i);
        }
    }
    for list in successors.iter_mut() {
        list.sort_unstable();
    }

    let mut queue: VecDeque<usize> = (0..stages.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut sorted_order = Vec::with_capacity(stages.len());

    while let Some(current) = queue.pop_front() {
        sorted_order.push(current);
        for &next in &successors[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if sorted_order.len() != stages.len() {
        return Err(ValidationError::CyclicDependency.to_string());
    }

    let mut slots: Vec<Option<StageSpec>> = stages.drain(..).map(Some).collect();
    stages.extend(sorted_order.into_iter().filter_map(|i| slots[i].take()));

    debug!(
        "Stage order: {:?}",
        stages.iter().map(|s| s.name()).collect::<Vec<_>>()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::catalog::definition;
    use crate::workflow::fixtures::{chain_specs, group_stage, CHAIN};
    use crate::workflow::model::{InputSlot, StageDef, WorkflowKind};

    static CYCLE: [StageDef; 2] = [
        StageDef {
            inputs: &[InputSlot::from("in", &["y"], "path")],
            outputs: &["{group}/x"],
            ..group_stage("x", "tool-x")
        },
        StageDef {
            inputs: &[InputSlot::from("in", &["x"], "path")],
            outputs: &["{group}/y"],
            ..group_stage("y", "tool-y")
        },
    ];

    static BROKEN: [StageDef; 2] = [
        StageDef {
            outputs: &[],
            ..group_stage("no_outputs", "")
        },
        StageDef {
            inputs: &[InputSlot::from("in", &["ghost"], "path")],
            outputs: &["{sample}/z"],
            args: &[ArgPart::Input("missing_slot"), ArgPart::Output(3)],
            ..group_stage("dangling", "tool-z")
        },
    ];

    fn specs(defs: &'static [StageDef]) -> Vec<StageSpec> {
        defs.iter()
            .map(|d| StageSpec::new(d, WorkflowKind::Contigs))
            .collect()
    }

    #[test]
    fn test_valid_chain() {
        let mut stages = chain_specs();
        assert!(validate_stages(&mut stages).is_ok());
    }

    #[test]
    fn test_reorders_producers_first() {
        let mut stages = vec![
            StageSpec::new(&CHAIN[2], WorkflowKind::Contigs),
            StageSpec::new(&CHAIN[0], WorkflowKind::Contigs),
            StageSpec::new(&CHAIN[1], WorkflowKind::Contigs),
        ];
        validate_stages(&mut stages).unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["stage_a", "stage_b", "stage_c"]);
    }

    #[test]
    fn test_empty_catalog() {
        let mut stages = Vec::new();
        assert_eq!(
            validate_stages(&mut stages).unwrap_err(),
            ValidationError::EmptyCatalog.to_string()
        );
    }

    #[test]
    fn test_duplicate_names() {
        let mut stages = chain_specs();
        stages.push(StageSpec::new(&CHAIN[0], WorkflowKind::Contigs));
        assert!(validate_stages(&mut stages).unwrap_err().contains("Duplicate"));
    }

    #[test]
    fn test_cyclic_dependency() {
        let mut stages = specs(&CYCLE);
        assert!(validate_stages(&mut stages).unwrap_err().contains("cyclic"));
    }

    #[test]
    fn test_collects_every_problem() {
        let mut stages = specs(&BROKEN);
        let err = validate_stages(&mut stages).unwrap_err();
        assert!(err.contains("has no program"));
        assert!(err.contains("declares no outputs"));
        assert!(err.contains("unknown stage 'ghost'"));
        assert!(err.contains("undeclared input 'missing_slot'"));
        assert!(err.contains("output #3"));
        assert!(err.contains("placeholder of another scope"));
    }

    #[test]
    fn test_builtin_catalogs_are_valid_standalone() {
        let mut stages: Vec<_> = definition(WorkflowKind::Contigs)
            .stages
            .iter()
            .map(|d| StageSpec::new(d, WorkflowKind::Contigs))
            .collect();
        assert!(validate_stages(&mut stages).is_ok());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::DuplicateStage("megahit".to_string());
        assert!(err.to_string().contains("megahit"));

        let err = ValidationError::CyclicDependency;
        assert!(err.to_string().contains("cyclic"));
    }
}
