//! Input Manifests
//!
//! Tab-separated files with a header line listing the entities a workflow
//! runs on: one row per sample or genome, with a name, an optional group
//! and one or more input file columns.
//!
//! ```text
//! sample  group  r1                  r2
//! S01     G01    reads/S01_R1.fq.gz  reads/S01_R2.fq.gz
//! S02     G01    reads/S02_R1.fq.gz  reads/S02_R2.fq.gz
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::model::ManifestSpec;
use crate::error::{Result, WorkflowError};

/// One manifest row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    /// Rows without a group column form a group of their own.
    pub group: String,
    pub files: BTreeMap<String, PathBuf>,
}

/// The entities of one run, in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    entities: Vec<Entity>,
}

impl Entities {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn sample(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Distinct group names, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.entities
            .iter()
            .map(|e| e.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn group_of(&self, sample: &str) -> Option<&str> {
        self.sample(sample).map(|e| e.group.as_str())
    }

    pub fn samples_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.iter().filter(move |e| e.group == group)
    }

    pub fn file(&self, sample: &str, column: &str) -> Option<&Path> {
        self.sample(sample)
            .and_then(|e| e.files.get(column))
            .map(PathBuf::as_path)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.entities.iter().any(|e| e.files.contains_key(column))
    }
}

/// Whether `name` is usable as a sample or group name.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Reads and validates a manifest.
///
/// Relative file paths are resolved against `root`. Every listed file must
/// exist.
pub fn load_manifest(path: &Path, spec: &ManifestSpec, root: &Path) -> Result<Entities> {
    info!("Loading manifest from: {}", path.display());

    if !path.is_file() {
        return Err(WorkflowError::MissingFile(path.to_path_buf()));
    }

    let invalid = |reason: String| WorkflowError::InvalidManifest {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| invalid(e.to_string()))?;

    let headers = reader.headers().map_err(|e| invalid(e.to_string()))?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let name_idx = column(spec.name_column)
        .ok_or_else(|| invalid(format!("missing column '{}'", spec.name_column)))?;
    let group_idx = spec.group_column.and_then(column);
    let file_idx = spec
        .file_columns
        .iter()
        .map(|&c| {
            column(c)
                .map(|i| (c, i))
                .ok_or_else(|| invalid(format!("missing column '{}'", c)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| invalid(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").to_string();

        let name = field(name_idx);
        if !is_valid_name(&name) {
            return Err(invalid(format!("row {}: '{}' is not a valid name", line + 1, name)));
        }
        if !seen.insert(name.clone()) {
            return Err(invalid(format!("name '{}' appears more than once", name)));
        }

        let group = match group_idx.map(field) {
            Some(group) if !group.is_empty() => {
                if !is_valid_name(&group) {
                    return Err(invalid(format!(
                        "row {}: '{}' is not a valid group name",
                        line + 1,
                        group
                    )));
                }
                group
            }
            _ => name.clone(),
        };

        let mut files = BTreeMap::new();
        for (col, idx) in &file_idx {
            let value = field(*idx);
            if value.is_empty() {
                return Err(invalid(format!("row {}: column '{}' is empty", line + 1, col)));
            }
            let file = root.join(&value);
            if !file.exists() {
                return Err(WorkflowError::MissingFile(file));
            }
            files.insert(col.to_string(), file);
        }

        debug!("  {} (group {}): {} file(s)", name, group, files.len());
        entities.push(Entity { name, group, files });
    }

    if entities.is_empty() {
        return Err(invalid("no entries".to_string()));
    }

    let entities = Entities::new(entities);
    info!(
        "Manifest lists {} entities in {} group(s)",
        entities.len(),
        entities.groups().len()
    );
    Ok(entities)
}
