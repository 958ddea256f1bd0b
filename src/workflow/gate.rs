//! Stage Gates
//!
//! Resolves every stage's `run` flag exactly once per invocation and checks
//! the mutual-exclusion rules of the workflow definitions against the
//! result.

use std::collections::BTreeMap;

use log::{debug, info};

use super::model::{ExclusiveParams, ExclusiveStages, StageSpec};
use crate::config::{ConfigValue, ParameterResolver};
use crate::error::{Result, WorkflowError};

/// Gate decision of every stage in a composed workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateDecisions {
    gates: BTreeMap<String, bool>,
}

impl GateDecisions {
    /// Unknown stages count as disabled.
    pub fn is_enabled(&self, stage: &str) -> bool {
        self.gates.get(stage).copied().unwrap_or(false)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.gates.iter().filter(|(_, on)| **on).map(|(s, _)| s.as_str())
    }

    pub fn disabled(&self) -> impl Iterator<Item = &str> {
        self.gates.iter().filter(|(_, on)| !**on).map(|(s, _)| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Decides which stages take part in the graph.
#[derive(Debug, Clone, Copy)]
pub struct StageGate<'a> {
    resolver: ParameterResolver<'a>,
}

impl<'a> StageGate<'a> {
    pub fn new(resolver: ParameterResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Resolves the gate of every stage, falling back to its static default.
    pub fn resolve(&self, specs: &[StageSpec]) -> Result<GateDecisions> {
        let mut gates = BTreeMap::new();
        for spec in specs {
            let on = self.resolver.is_enabled(spec.name(), spec.def.default_enabled)?;
            debug!("Gate {}: {}", spec.name(), if on { "on" } else { "off" });
            gates.insert(spec.name().to_string(), on);
        }

        let decisions = GateDecisions { gates };
        info!(
            "{} of {} stages enabled",
            decisions.enabled().count(),
            decisions.len()
        );
        Ok(decisions)
    }

    /// Checks that each exclusive group has between `min` and `max` members on.
    pub fn check_exclusive_stages(
        &self,
        decisions: &GateDecisions,
        groups: &[ExclusiveStages],
    ) -> Result<()> {
        for group in groups {
            let on: Vec<&str> = group
                .stages
                .iter()
                .copied()
                .filter(|s| decisions.is_enabled(s))
                .collect();

            if on.len() < group.min || on.len() > group.max {
                let expected = if group.min == group.max {
                    format!("exactly {}", group.min)
                } else {
                    format!("between {} and {}", group.min, group.max)
                };
                return Err(WorkflowError::MutuallyExclusive(format!(
                    "{} of [{}] must be enabled, found {} ({})",
                    expected,
                    group.stages.join(", "),
                    on.len(),
                    on.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Checks that no enabled stage sets two exclusive switches at once.
    pub fn check_exclusive_params(
        &self,
        decisions: &GateDecisions,
        rules: &[ExclusiveParams],
    ) -> Result<()> {
        let store = self.resolver.store();
        for rule in rules.iter().filter(|r| decisions.is_enabled(r.stage)) {
            let set: Vec<&str> = rule
                .flags
                .iter()
                .copied()
                .filter(|flag| {
                    !matches!(
                        store.get_value(&[rule.stage, *flag], false),
                        None | Some(ConfigValue::Bool(false))
                    )
                })
                .collect();

            if set.len() > 1 {
                return Err(WorkflowError::MutuallyExclusive(format!(
                    "stage '{}' sets {}",
                    rule.stage,
                    set.join(" and ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::workflow::catalog::definition;
    use crate::workflow::fixtures::chain_specs;
    use crate::workflow::model::WorkflowKind;
    use serde_json::json;

    #[test]
    fn test_gates_fall_back_to_static_default() {
        let store = ConfigStore::new(json!({"stage_b": {"run": false}}), json!({}));
        let gate = StageGate::new(ParameterResolver::new(&store));
        let decisions = gate.resolve(&chain_specs()).unwrap();

        assert!(decisions.is_enabled("stage_a"));
        assert!(!decisions.is_enabled("stage_b"));
        assert!(decisions.is_enabled("stage_c"));
        assert!(!decisions.is_enabled("not_a_stage"));
        assert_eq!(decisions.disabled().collect::<Vec<_>>(), vec!["stage_b"]);
    }

    #[test]
    fn test_non_boolean_gate_is_config_error() {
        let store = ConfigStore::new(json!({"stage_a": {"run": "yes"}}), json!({}));
        let gate = StageGate::new(ParameterResolver::new(&store));
        assert!(gate.resolve(&chain_specs()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_two_assemblers_are_rejected() {
        let meta = definition(WorkflowKind::Metagenomics);
        let store = ConfigStore::new(
            json!({"metaspades": {"run": true}}),
            json!({
                "megahit": {"run": true},
                "metaspades": {"run": false},
                "idba_ud": {"run": false}
            }),
        );
        let specs: Vec<_> = meta
            .stages
            .iter()
            .map(|d| StageSpec::new(d, WorkflowKind::Metagenomics))
            .collect();
        let gate = StageGate::new(ParameterResolver::new(&store));
        let decisions = gate.resolve(&specs).unwrap();

        let err = gate
            .check_exclusive_stages(&decisions, meta.exclusive_stages)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MutuallyExclusive(_)));
        assert!(err.to_string().contains("megahit, metaspades"));
    }

    #[test]
    fn test_no_assembler_is_rejected() {
        let meta = definition(WorkflowKind::Metagenomics);
        let store = ConfigStore::new(json!({"megahit": {"run": false}}), json!({}));
        let specs: Vec<_> = meta
            .stages
            .iter()
            .map(|d| StageSpec::new(d, WorkflowKind::Metagenomics))
            .collect();
        let gate = StageGate::new(ParameterResolver::new(&store));
        let decisions = gate.resolve(&specs).unwrap();
        assert!(gate
            .check_exclusive_stages(&decisions, meta.exclusive_stages)
            .is_err());
    }

    #[test]
    fn test_exclusive_params_only_checked_when_enabled() {
        let meta = definition(WorkflowKind::Metagenomics);
        let user = json!({"anvi_merge": {
            "--skip-hierarchical-clustering": true,
            "--enforce-hierarchical-clustering": true
        }});
        let specs: Vec<_> = meta
            .stages
            .iter()
            .map(|d| StageSpec::new(d, WorkflowKind::Metagenomics))
            .collect();

        let store = ConfigStore::new(user.clone(), json!({}));
        let gate = StageGate::new(ParameterResolver::new(&store));
        let decisions = gate.resolve(&specs).unwrap();
        assert!(gate
            .check_exclusive_params(&decisions, meta.exclusive_params)
            .is_err());

        let mut user = user;
        user["anvi_merge"]["run"] = json!(false);
        let store = ConfigStore::new(user, json!({}));
        let gate = StageGate::new(ParameterResolver::new(&store));
        let decisions = gate.resolve(&specs).unwrap();
        assert!(gate
            .check_exclusive_params(&decisions, meta.exclusive_params)
            .is_ok());
    }
}
