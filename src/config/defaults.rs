//! Default Configurations
//!
//! The default configuration of a workflow is generated from its stage
//! catalog, so every stage, parameter and directory the graph builder can
//! look up has exactly one default. Embedded workflows contribute their
//! stages to the master's defaults.

use serde_json::{json, Map, Value};

use crate::workflow::catalog::definition;
use crate::workflow::model::{ParamDefault, StageDef, WorkflowKind};

/// The only configuration layout this version understands.
pub const CONFIG_VERSION: &str = "1";

/// Scheduler program invoked when the config does not name one.
pub const DEFAULT_SCHEDULER: &str = "genoflow-scheduler";

/// Builds the complete default configuration of a workflow.
pub fn default_config(kind: WorkflowKind) -> Value {
    let def = definition(kind);
    let mut root = Map::new();

    root.insert("workflow_name".to_string(), json!(kind.name()));
    root.insert("config_version".to_string(), json!(CONFIG_VERSION));
    root.insert(def.manifest.key.to_string(), json!(def.manifest.default_path));
    for key in def.required_keys {
        root.insert(key.to_string(), Value::Null);
    }
    root.insert("max_threads".to_string(), Value::Null);
    root.insert("force_rerun".to_string(), json!([]));
    root.insert(
        "scheduler".to_string(),
        json!({"program": DEFAULT_SCHEDULER, "args": []}),
    );

    let mut output_dirs = Map::new();
    let mut kinds = vec![def];
    if let Some(embedding) = def.embeds {
        kinds.push(definition(embedding.kind));
    }
    for d in &kinds {
        for category in d.categories {
            output_dirs.insert(category.key().to_string(), json!(category.default_dir()));
        }
        for stage in d.stages {
            root.insert(stage.name.to_string(), stage_defaults(stage));
        }
    }
    root.insert("output_dirs".to_string(), Value::Object(output_dirs));

    Value::Object(root)
}

fn stage_defaults(stage: &StageDef) -> Value {
    let mut node = Map::new();
    node.insert("run".to_string(), json!(stage.default_enabled));
    node.insert("threads".to_string(), json!(stage.default_threads));
    for param in stage.params {
        let value = match param.default {
            ParamDefault::Unset => Value::Null,
            ParamDefault::Bool(b) => json!(b),
            ParamDefault::Int(i) => json!(i),
            ParamDefault::Float(f) => Value::from(f),
            ParamDefault::Str(s) => json!(s),
        };
        node.insert(param.key.to_string(), value);
    }
    Value::Object(node)
}
