//! Directory Layout
//!
//! Maps every stage category to one subdirectory of the work root. Paths
//! depend only on the workflow's categories, the root and the
//! `output_dirs` overrides, so re-running with the same inputs always
//! lands on the same files.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::config::ConfigStore;
use crate::error::{Result, WorkflowError};

/// Config key holding per-category directory overrides.
pub const OUTPUT_DIRS_KEY: &str = "output_dirs";

/// Canonical stage categories, one output directory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    Logs,
    Qc,
    Fasta,
    Contigs,
    Mapping,
    Profile,
    Merge,
    Taxonomy,
    Pan,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Self::Logs,
        Self::Qc,
        Self::Fasta,
        Self::Contigs,
        Self::Mapping,
        Self::Profile,
        Self::Merge,
        Self::Taxonomy,
        Self::Pan,
    ];

    /// Key used under `output_dirs` in the configuration.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Logs => "LOGS_DIR",
            Self::Qc => "QC_DIR",
            Self::Fasta => "FASTA_DIR",
            Self::Contigs => "CONTIGS_DIR",
            Self::Mapping => "MAPPING_DIR",
            Self::Profile => "PROFILE_DIR",
            Self::Merge => "MERGE_DIR",
            Self::Taxonomy => "TAXONOMY_DIR",
            Self::Pan => "PAN_DIR",
        }
    }

    pub fn default_dir(&self) -> &'static str {
        match self {
            Self::Logs => "00_LOGS",
            Self::Qc => "01_QC",
            Self::Fasta => "02_FASTA",
            Self::Contigs => "03_CONTIGS",
            Self::Mapping => "04_MAPPING",
            Self::Profile => "05_ANVIO_PROFILE",
            Self::Merge => "06_MERGED",
            Self::Taxonomy => "07_TAXONOMY",
            Self::Pan => "08_PAN",
        }
    }

    /// Artifacts in a protected category are never rewritten once present.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Fasta)
    }
}

/// Category-to-directory mapping under one root.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryLayout {
    root: PathBuf,
    dirs: BTreeMap<Category, PathBuf>,
}

impl DirectoryLayout {
    /// Builds the layout with default directory names.
    pub fn new(root: &Path, categories: &[Category]) -> Self {
        let mut dirs = BTreeMap::new();
        for category in categories.iter().copied().chain(std::iter::once(Category::Logs)) {
            dirs.insert(category, root.join(category.default_dir()));
        }
        Self {
            root: root.to_path_buf(),
            dirs,
        }
    }

    /// Builds the layout, applying `output_dirs` overrides from the config.
    ///
    /// Relative overrides are taken relative to `root`.
    pub fn from_config(root: &Path, categories: &[Category], store: &ConfigStore) -> Result<Self> {
        let mut layout = Self::new(root, categories);

        for (category, dir) in layout.dirs.iter_mut() {
            let Some(value) = store.node(&[OUTPUT_DIRS_KEY, category.key()]) else {
                continue;
            };
            let name = value.as_str().ok_or_else(|| WorkflowError::InvalidValue {
                path: format!("{}.{}", OUTPUT_DIRS_KEY, category.key()),
                reason: "expected a directory name".to_string(),
            })?;
            if name.trim().is_empty() {
                return Err(WorkflowError::InvalidValue {
                    path: format!("{}.{}", OUTPUT_DIRS_KEY, category.key()),
                    reason: "directory name is empty".to_string(),
                });
            }
            *dir = root.join(name);
            debug!("{:?} directory overridden: {}", category, dir.display());
        }

        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates every directory. Safe to call any number of times.
    pub fn create(&self) -> Result<()> {
        for (category, dir) in &self.dirs {
            fs::create_dir_all(dir).map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => WorkflowError::Unwritable(dir.clone()),
                _ => WorkflowError::Io(e),
            })?;
            debug!("{:?} -> {}", category, dir.display());
        }
        info!("Output directories ready under {}", self.root.display());
        Ok(())
    }

    /// Directory of `category`, or the default name under the root when the
    /// workflow does not declare the category.
    pub fn dir(&self, category: Category) -> PathBuf {
        self.dirs
            .get(&category)
            .cloned()
            .unwrap_or_else(|| self.root.join(category.default_dir()))
    }

    /// Path of an artifact relative to its category directory.
    pub fn artifact(&self, category: Category, relative: &str) -> PathBuf {
        self.dir(category).join(relative)
    }

    /// Whether `path` lies inside a protected category directory.
    pub fn is_protected(&self, path: &Path) -> bool {
        self.protected_dirs().any(|dir| path.starts_with(dir))
    }

    pub fn protected_dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs
            .iter()
            .filter(|(category, _)| category.is_protected())
            .map(|(_, dir)| dir.as_path())
    }

    /// Log file of one job.
    pub fn log_path(&self, job_id: &str) -> PathBuf {
        let file = job_id.replace(':', "-");
        self.dir(Category::Logs).join(format!("{}.log", file))
    }

    pub fn categories(&self) -> impl Iterator<Item = (Category, &Path)> {
        self.dirs.iter().map(|(c, d)| (*c, d.as_path()))
    }
}
