//! Parameter Resolution
//!
//! Turns `(stage, flag)` pairs into CLI-style argument tokens and resolves
//! the per-stage gate and thread hint. Everything here runs once per stage
//! while the graph is being declared.

use std::fmt;

use log::debug;

use super::store::{ConfigStore, ResolveMode};
use super::value::ConfigValue;
use crate::error::{Result, WorkflowError};

/// Config key holding a stage's gate.
pub const RUN_KEY: &str = "run";

/// Config key holding a stage's thread hint.
pub const THREADS_KEY: &str = "threads";

/// Argument token produced for one `(stage, flag)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgToken {
    /// `false` or absent: the flag is left out entirely.
    Omitted,
    /// `true`: the bare flag.
    Flag(String),
    /// Any other value: the flag followed by its value.
    Pair(String, String),
}

impl ArgToken {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Omitted)
    }

    /// Splits the token into separate argv entries.
    pub fn into_args(self) -> Vec<String> {
        match self {
            Self::Omitted => Vec::new(),
            Self::Flag(flag) => vec![flag],
            Self::Pair(flag, value) => vec![flag, value],
        }
    }
}

impl fmt::Display for ArgToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Omitted => Ok(()),
            Self::Flag(flag) => write!(f, "{}", flag),
            Self::Pair(flag, value) => write!(f, "{} {}", flag, value),
        }
    }
}

/// Builds the token for `flag` from an already-resolved value.
pub fn token_for(flag: &str, value: Option<&ConfigValue>) -> ArgToken {
    match value {
        None | Some(ConfigValue::Bool(false)) => ArgToken::Omitted,
        Some(ConfigValue::Bool(true)) => ArgToken::Flag(flag.to_string()),
        Some(other) => ArgToken::Pair(flag.to_string(), other.to_string()),
    }
}

/// Resolves stage parameters against a [`ConfigStore`].
#[derive(Debug, Clone, Copy)]
pub struct ParameterResolver<'a> {
    store: &'a ConfigStore,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a ConfigStore {
        self.store
    }

    /// Resolves `(stage, flag)` with defaults and emits its token.
    pub fn get_rule_param(&self, stage: &str, flag: &str) -> ArgToken {
        self.get_rule_param_with(stage, flag, ResolveMode::WithDefault)
    }

    /// Same as [`get_rule_param`](Self::get_rule_param) under an explicit mode.
    pub fn get_rule_param_with(&self, stage: &str, flag: &str, mode: ResolveMode) -> ArgToken {
        let value = self.store.resolve(&[stage, flag], mode);
        let token = token_for(flag, value.as_ref());
        debug!("{} {} -> '{}'", stage, flag, token);
        token
    }

    /// Resolves a parameter that must have a value.
    pub fn require(&self, stage: &str, key: &str) -> Result<ConfigValue> {
        match self.store.get_value(&[stage, key], false) {
            Some(value) => Ok(value),
            None => Err(WorkflowError::MissingParameter {
                stage: stage.to_string(),
                param: key.to_string(),
            }),
        }
    }

    /// Resolves a stage's `run` gate, falling back to `default`.
    pub fn is_enabled(&self, stage: &str, default: bool) -> Result<bool> {
        match self.store.get_value(&[stage, RUN_KEY], false) {
            None => Ok(default),
            Some(ConfigValue::Bool(b)) => Ok(b),
            Some(other) => Err(WorkflowError::InvalidValue {
                path: format!("{}.{}", stage, RUN_KEY),
                reason: format!("expected a boolean, found {} '{}'", other.type_name(), other),
            }),
        }
    }

    /// Resolves a stage's thread hint, falling back to `default`.
    pub fn threads(&self, stage: &str, default: usize) -> Result<usize> {
        match self.store.get_value(&[stage, THREADS_KEY], false) {
            None => Ok(default),
            Some(ConfigValue::Int(n)) if n > 0 => Ok(n as usize),
            Some(other) => Err(WorkflowError::InvalidValue {
                path: format!("{}.{}", stage, THREADS_KEY),
                reason: format!("expected a positive integer, found '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ConfigStore {
        ConfigStore::new(
            json!({
                "anvi_script_reformat_fasta": {"--min-len": 1000, "--simplify-names": true},
                "anvi_run_hmms": {"threads": 0},
                "megahit": {"run": "yes", "--presets": "meta-sensitive"}
            }),
            json!({
                "anvi_script_reformat_fasta": {
                    "--min-len": 0,
                    "--simplify-names": true,
                    "--prefix": false
                },
                "anvi_run_hmms": {"run": true, "threads": 2},
                "megahit": {"run": true, "--presets": "meta-sensitive"},
                "centrifuge": {"run": false}
            }),
        )
    }

    #[test]
    fn test_true_is_bare_flag() {
        let store = store();
        let r = ParameterResolver::new(&store);
        assert_eq!(
            r.get_rule_param("anvi_script_reformat_fasta", "--simplify-names"),
            ArgToken::Flag("--simplify-names".to_string())
        );
        assert_eq!(
            r.get_rule_param("anvi_script_reformat_fasta", "--simplify-names").to_string(),
            "--simplify-names"
        );
    }

    #[test]
    fn test_false_or_absent_is_empty() {
        let store = store();
        let r = ParameterResolver::new(&store);
        assert!(r.get_rule_param("anvi_script_reformat_fasta", "--prefix").is_empty());
        assert!(r.get_rule_param("anvi_script_reformat_fasta", "--no-such-flag").is_empty());
        assert_eq!(r.get_rule_param("anvi_script_reformat_fasta", "--prefix").to_string(), "");
    }

    #[test]
    fn test_other_values_are_flag_value() {
        let store = store();
        let r = ParameterResolver::new(&store);
        let token = r.get_rule_param("anvi_script_reformat_fasta", "--min-len");
        assert_eq!(token.to_string(), "--min-len 1000");
        assert_eq!(token.into_args(), vec!["--min-len", "1000"]);
    }

    #[test]
    fn test_omit_if_default_mode() {
        let store = store();
        let r = ParameterResolver::new(&store);
        assert!(r
            .get_rule_param_with("megahit", "--presets", ResolveMode::OmitIfDefault)
            .is_empty());
        let min_len = r.get_rule_param_with(
            "anvi_script_reformat_fasta",
            "--min-len",
            ResolveMode::OmitIfDefault,
        );
        assert!(!min_len.is_empty());
    }

    #[test]
    fn test_require_names_stage_and_param() {
        let store = store();
        let r = ParameterResolver::new(&store);
        match r.require("centrifuge", "db") {
            Err(WorkflowError::MissingParameter { stage, param }) => {
                assert_eq!(stage, "centrifuge");
                assert_eq!(param, "db");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gate_type_errors() {
        let store = store();
        let r = ParameterResolver::new(&store);
        assert!(r.is_enabled("megahit", false).is_err());
        assert!(r.is_enabled("anvi_run_hmms", false).unwrap());
        assert!(!r.is_enabled("not_configured", false).unwrap());
    }

    #[test]
    fn test_threads_must_be_positive() {
        let store = store();
        let r = ParameterResolver::new(&store);
        assert!(r.threads("anvi_run_hmms", 1).is_err());
        assert_eq!(r.threads("centrifuge", 3).unwrap(), 3);
    }
}
