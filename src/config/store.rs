//! Configuration Store
//!
//! Holds the user-supplied configuration next to the built-in default
//! configuration of a workflow, and resolves ordered key paths against
//! both.
//!
//! # Example
//!
//! ```
//! use genoflow::config::{ConfigStore, ConfigValue, ResolveMode};
//! use serde_json::json;
//!
//! let store = ConfigStore::new(
//!     json!({"anvi_run_hmms": {"threads": 8}}),
//!     json!({"anvi_run_hmms": {"run": true, "threads": 2}}),
//! );
//!
//! let threads = store.get_value(&["anvi_run_hmms", "threads"], false);
//! assert_eq!(threads, Some(ConfigValue::Int(8)));
//! let run = store.get_value(&["anvi_run_hmms", "run"], false);
//! assert_eq!(run, Some(ConfigValue::Bool(true)));
//! assert_eq!(store.get_value(&["anvi_run_hmms", "run"], true), None);
//! assert_eq!(
//!     store.resolve(&["anvi_run_hmms", "run"], ResolveMode::WithDefault),
//!     Some(ConfigValue::Bool(true))
//! );
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::value::ConfigValue;
use crate::error::{Result, WorkflowError};

/// How a path lookup treats the default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// User value, falling back to the default.
    WithDefault,
    /// User value only; a default never fills in an absent key.
    RepressDefault,
    /// Effective value, reported as absent when it equals the default.
    OmitIfDefault,
}

/// Merged view over a user configuration and the default configuration.
///
/// The default tree is immutable once the store is built.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    user: Value,
    defaults: Value,
    source: Option<PathBuf>,
}

impl ConfigStore {
    /// Creates a store from two in-memory trees.
    pub fn new(user: Value, defaults: Value) -> Self {
        Self {
            user,
            defaults,
            source: None,
        }
    }

    /// Creates a store with an empty user configuration.
    pub fn from_defaults(defaults: Value) -> Self {
        Self::new(Value::Object(Map::new()), defaults)
    }

    /// Loads the user configuration from a JSON or YAML file.
    pub fn load(path: &Path, defaults: Value) -> Result<Self> {
        info!("Loading config from: {}", path.display());

        if !path.exists() {
            return Err(WorkflowError::MissingFile(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        debug!("Config content loaded ({} bytes)", content.len());

        let user = parse_document(path, &content)?;
        Ok(Self {
            user,
            defaults,
            source: Some(path.to_path_buf()),
        })
    }

    /// Path the user configuration was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn user(&self) -> &Value {
        &self.user
    }

    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    /// Looks up `path` in the user config, falling back to the defaults
    /// unless `repress_default` is set.
    ///
    /// Only scalars count as present. A user entry that is `null`, a list
    /// or a mapping is treated as missing: with `repress_default` it yields
    /// `None`, otherwise the default applies. The raw tree from
    /// [`ConfigStore::user`] tells such entries apart from absent ones.
    pub fn get_value(&self, path: &[&str], repress_default: bool) -> Option<ConfigValue> {
        let mode = if repress_default {
            ResolveMode::RepressDefault
        } else {
            ResolveMode::WithDefault
        };
        self.resolve(path, mode)
    }

    /// Resolves `path` to a scalar under the given mode.
    pub fn resolve(&self, path: &[&str], mode: ResolveMode) -> Option<ConfigValue> {
        let user = lookup(&self.user, path).and_then(ConfigValue::from_json);

        match mode {
            ResolveMode::RepressDefault => user,
            ResolveMode::WithDefault => {
                user.or_else(|| lookup(&self.defaults, path).and_then(ConfigValue::from_json))
            }
            ResolveMode::OmitIfDefault => {
                let default = lookup(&self.defaults, path).and_then(ConfigValue::from_json);
                match (user, default) {
                    (Some(u), Some(d)) if u == d => None,
                    (Some(u), _) => Some(u),
                    (None, _) => None,
                }
            }
        }
    }

    /// Returns the raw node at `path`, user config first.
    ///
    /// Used for non-scalar entries such as `output_dirs` or `force_rerun`.
    pub fn node(&self, path: &[&str]) -> Option<&Value> {
        lookup(&self.user, path)
            .filter(|v| !v.is_null())
            .or_else(|| lookup(&self.defaults, path).filter(|v| !v.is_null()))
    }

    /// Returns the list of strings at `path`, or an empty list.
    pub fn string_list(&self, path: &[&str]) -> Result<Vec<String>> {
        match self.node(path) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| WorkflowError::InvalidValue {
                        path: path.join("."),
                        reason: "expected a list of strings".to_string(),
                    })
                })
                .collect(),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(_) => Err(WorkflowError::InvalidValue {
                path: path.join("."),
                reason: "expected a list of strings".to_string(),
            }),
        }
    }

    /// Lists user keys that have no counterpart in the default tree.
    ///
    /// Unknown keys never fail a run; they are reported so typos surface.
    pub fn unknown_keys(&self) -> Vec<String> {
        let mut unknown = Vec::new();
        collect_unknown(&self.user, &self.defaults, "", &mut unknown);
        unknown
    }

    /// Logs a warning for every unknown key and returns them.
    pub fn warn_unknown_keys(&self) -> Vec<String> {
        let unknown = self.unknown_keys();
        for key in &unknown {
            warn!("Config key '{}' is not recognized and will be ignored", key);
        }
        unknown
    }
}

/// Walks an ordered key path through nested mappings.
fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.as_object()?.get(*key))
}

fn collect_unknown(user: &Value, defaults: &Value, prefix: &str, out: &mut Vec<String>) {
    let (Some(user_map), Some(default_map)) = (user.as_object(), defaults.as_object()) else {
        return;
    };

    for (key, user_child) in user_map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match default_map.get(key) {
            None => out.push(full),
            Some(default_child) => collect_unknown(user_child, default_child, &full, out),
        }
    }
}

/// Parses a JSON or YAML document into a JSON tree with a mapping at the root.
pub fn parse_document(path: &Path, content: &str) -> Result<Value> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let parsed: Value = if is_json {
        serde_json::from_str(content).map_err(|e| WorkflowError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(content).map_err(|e| WorkflowError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    match parsed {
        Value::Object(_) => Ok(parsed),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(WorkflowError::ConfigParse {
            path: path.to_path_buf(),
            reason: "top level must be a mapping".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store() -> ConfigStore {
        ConfigStore::new(
            json!({
                "anvi_gen_contigs_database": {"threads": 4, "--skip-gene-calling": false},
                "anvi_run_ncbi_cogs": {"run": true}
            }),
            json!({
                "anvi_gen_contigs_database": {
                    "run": true,
                    "threads": 1,
                    "--skip-gene-calling": false
                },
                "anvi_run_ncbi_cogs": {"run": false, "--sensitive": false},
                "anvi_run_hmms": {"run": true}
            }),
        )
    }

    #[test]
    fn test_user_value_wins() {
        let store = store();
        assert_eq!(
            store.get_value(&["anvi_gen_contigs_database", "threads"], false),
            Some(ConfigValue::Int(4))
        );
    }

    #[test]
    fn test_falls_back_to_default() {
        let store = store();
        assert_eq!(
            store.get_value(&["anvi_run_hmms", "run"], false),
            Some(ConfigValue::Bool(true))
        );
    }

    #[test]
    fn test_repress_default_absent_iff_user_absent() {
        let store = store();
        let paths: [&[&str]; 5] = [
            &["anvi_gen_contigs_database", "threads"],
            &["anvi_gen_contigs_database", "run"],
            &["anvi_run_ncbi_cogs", "run"],
            &["anvi_run_hmms", "run"],
            &["nothing", "here"],
        ];

        for path in paths {
            let in_user = lookup(store.user(), path).is_some();
            assert_eq!(
                store.get_value(path, true).is_some(),
                in_user,
                "path {:?}",
                path
            );
        }
    }

    #[test]
    fn test_non_scalar_user_entries_count_as_missing() {
        let store = ConfigStore::new(
            json!({"centrifuge": {"db": null, "run": {"nested": true}}}),
            json!({"centrifuge": {"db": "/db/p+h+v", "run": false}}),
        );

        assert_eq!(store.get_value(&["centrifuge", "db"], true), None);
        assert_eq!(store.get_value(&["centrifuge", "run"], true), None);
        assert_eq!(
            store.get_value(&["centrifuge", "db"], false),
            Some(ConfigValue::Str("/db/p+h+v".to_string()))
        );
        assert_eq!(
            store.get_value(&["centrifuge", "run"], false),
            Some(ConfigValue::Bool(false))
        );
        assert!(lookup(store.user(), &["centrifuge", "db"]).is_some());
    }

    #[test]
    fn test_omit_if_default() {
        let store = store();
        // user sets the same value as the default
        assert_eq!(
            store.resolve(
                &["anvi_gen_contigs_database", "--skip-gene-calling"],
                ResolveMode::OmitIfDefault
            ),
            None
        );
        // user differs from the default
        assert_eq!(
            store.resolve(&["anvi_gen_contigs_database", "threads"], ResolveMode::OmitIfDefault),
            Some(ConfigValue::Int(4))
        );
        // only a default exists
        assert_eq!(
            store.resolve(&["anvi_run_hmms", "run"], ResolveMode::OmitIfDefault),
            None
        );
    }

    #[test]
    fn test_unknown_keys_are_reported() {
        let store = ConfigStore::new(
            json!({"anvi_run_hmms": {"run": true, "--hmm-source": "x"}, "typo_stage": {}}),
            json!({"anvi_run_hmms": {"run": true}}),
        );
        let mut unknown = store.unknown_keys();
        unknown.sort();
        assert_eq!(unknown, vec!["anvi_run_hmms.--hmm-source", "typo_stage"]);
    }

    #[test]
    fn test_string_list() {
        let store = ConfigStore::new(
            json!({"force_rerun": ["megahit"]}),
            json!({"force_rerun": []}),
        );
        assert_eq!(store.string_list(&["force_rerun"]).unwrap(), vec!["megahit"]);

        let store = ConfigStore::new(json!({"force_rerun": 3}), json!({}));
        assert!(store.string_list(&["force_rerun"]).is_err());
    }

    #[test]
    fn test_load_json_and_yaml() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("config.json");
        let yaml_path = dir.path().join("config.yaml");
        std::fs::write(&json_path, r#"{"anvi_run_hmms": {"threads": 6}}"#).unwrap();
        std::fs::write(&yaml_path, "anvi_run_hmms:\n  threads: 6\n").unwrap();

        for path in [json_path, yaml_path] {
            let store = ConfigStore::load(&path, json!({})).unwrap();
            let threads = store.get_value(&["anvi_run_hmms", "threads"], true);
            assert_eq!(threads, Some(ConfigValue::Int(6)));
            assert_eq!(store.source(), Some(path.as_path()));
        }
    }

    #[test]
    fn test_load_missing_file_is_file_system_error() {
        let err = ConfigStore::load(Path::new("/nonexistent/config.json"), json!({})).unwrap_err();
        assert!(err.is_file_system());
    }

    #[test]
    fn test_load_non_mapping_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = ConfigStore::load(&path, json!({})).unwrap_err();
        assert!(err.is_configuration());
    }
}
