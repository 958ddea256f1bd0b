//! Error Types
//!
//! Every failure of the resolution layer surfaces while `init()` or the
//! graph-building half of `go()` runs, before any external stage starts.
//! Errors fall into two families with distinct exit codes:
//!
//! - configuration errors (exit code 2)
//! - file-system errors (exit code 3)
//!
//! Failures reported back by the external scheduler use exit code 4.

use std::path::PathBuf;

use thiserror::Error;

use crate::environment::DependencyReport;

/// Exit code for configuration errors.
pub const EXIT_CONFIGURATION: u8 = 2;

/// Exit code for file-system errors.
pub const EXIT_FILE_SYSTEM: u8 = 3;

/// Exit code when the external scheduler reports a failure.
pub const EXIT_SCHEDULER: u8 = 4;

/// Errors raised while resolving configuration and building the stage graph.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Stage '{stage}' requires parameter '{param}', which is neither set nor has a default")]
    MissingParameter { stage: String, param: String },

    #[error("Required configuration key '{0}' is missing")]
    MissingKey(String),

    #[error("Invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("Mutually exclusive options: {0}")]
    MutuallyExclusive(String),

    #[error("{0}")]
    MissingDependencies(DependencyReport),

    #[error("Stage '{stage}' would overwrite protected artifact {}", .path.display())]
    ProtectedArtifact { stage: String, path: PathBuf },

    #[error("Unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("Config is for workflow '{found}' but '{expected}' was requested")]
    WorkflowMismatch { expected: String, found: String },

    #[error("Config version '{found}' is not supported (expected '{expected}')")]
    UnsupportedConfigVersion { expected: String, found: String },

    #[error("Invalid manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Invalid workflow definition:\n{0}")]
    InvalidDefinition(String),

    #[error("Failed to parse config {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Path is not writable: {}", .0.display())]
    Unwritable(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl WorkflowError {
    /// Returns true for configuration errors.
    pub fn is_configuration(&self) -> bool {
        !self.is_file_system() && !matches!(self, Self::Scheduler(_))
    }

    /// Returns true for file-system errors.
    pub fn is_file_system(&self) -> bool {
        matches!(self, Self::MissingFile(_) | Self::Unwritable(_) | Self::Io(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_file_system() {
            EXIT_FILE_SYSTEM
        } else if matches!(self, Self::Scheduler(_)) {
            EXIT_SCHEDULER
        } else {
            EXIT_CONFIGURATION
        }
    }

    /// A short remediation hint shown under the error message.
    pub fn hint(&self) -> String {
        match self {
            Self::MissingParameter { stage, param } => format!(
                "Set \"{}\" under \"{}\" in your config, or turn the stage off with \"run\": false",
                param, stage
            ),
            Self::MissingKey(key) => format!(
                "Add \"{}\" to your config (see --get-default-config)",
                key
            ),
            Self::InvalidValue { .. } => {
                "Compare the value against the one printed by --get-default-config".to_string()
            }
            Self::MutuallyExclusive(_) => {
                "Keep exactly one of the conflicting options enabled".to_string()
            }
            Self::MissingDependencies(_) => {
                "Install the missing programs or disable the stages that need them".to_string()
            }
            Self::ProtectedArtifact { path, .. } => format!(
                "Remove {} by hand if you really want it regenerated",
                path.display()
            ),
            Self::UnknownWorkflow(_) => {
                "Run with --list-workflows to see the available workflows".to_string()
            }
            Self::WorkflowMismatch { .. } => {
                "Fix \"workflow_name\" in your config or pick the matching --workflow".to_string()
            }
            Self::UnsupportedConfigVersion { .. } => {
                "Regenerate your config with --get-default-config and copy your values over"
                    .to_string()
            }
            Self::InvalidManifest { .. } => {
                "Manifests are tab-separated with a header line; names must start with a \
                 letter and use only letters, digits and '_'"
                    .to_string()
            }
            Self::InvalidDefinition(_) => "This is a bug in the workflow catalog".to_string(),
            Self::ConfigParse { .. } => "Config files must be valid JSON or YAML".to_string(),
            Self::MissingFile(_) => {
                "Check the path, or that it is relative to the working directory".to_string()
            }
            Self::Unwritable(_) => {
                "Check directory permissions or choose another --directory".to_string()
            }
            Self::Io(_) => "Check file-system permissions and free space".to_string(),
            Self::Scheduler(_) => "See the scheduler output above".to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_families() {
        let config = WorkflowError::MissingKey("project_name".to_string());
        let fs = WorkflowError::MissingFile(PathBuf::from("samples.txt"));
        let sched = WorkflowError::Scheduler("boom".to_string());

        assert_eq!(config.exit_code(), EXIT_CONFIGURATION);
        assert_eq!(fs.exit_code(), EXIT_FILE_SYSTEM);
        assert_eq!(sched.exit_code(), EXIT_SCHEDULER);
        assert!(config.is_configuration());
        assert!(!fs.is_configuration());
    }

    #[test]
    fn test_missing_parameter_message_names_stage_and_param() {
        let err = WorkflowError::MissingParameter {
            stage: "centrifuge".to_string(),
            param: "db".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("centrifuge"));
        assert!(msg.contains("db"));
        assert!(err.hint().contains("\"run\": false"));
    }

    #[test]
    fn test_io_error_is_file_system() {
        let err: WorkflowError = std::io::Error::new(std::io::ErrorKind::Other, "x").into();
        assert!(err.is_file_system());
        assert_eq!(err.exit_code(), EXIT_FILE_SYSTEM);
    }
}
