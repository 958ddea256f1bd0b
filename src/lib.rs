//! genoflow - Configuration Resolution for Genomic Workflows
//!
//! Turns a possibly incomplete user configuration and a sample manifest
//! into a fully resolved, validated job graph for contig annotation,
//! metagenomic profiling and pangenomic comparison, then hands that graph
//! to an external DAG scheduler.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`config`]: Configuration store, defaults and parameter resolution
//! - [`workflow`]: Stage catalogs, composition, gating and graph building
//! - [`environment`]: External program dependency checks
//! - [`execution`]: Handoff to the external scheduler
//! - [`controller`]: The `init`/`go` facade used by the CLI
//!
//! # Example
//!
//! ```rust,no_run
//! use genoflow::controller::{ControllerOptions, RunMode, WorkflowController};
//! use genoflow::execution::ExternalScheduler;
//! use genoflow::WorkflowKind;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut options = ControllerOptions::new(WorkflowKind::Contigs, "/data/analysis");
//!     options.config_path = Some("config.json".into());
//!     options.mode = RunMode::DryRun;
//!
//!     let mut controller = WorkflowController::new(options);
//!     controller.init()?;
//!
//!     let scheduler = ExternalScheduler::new("genoflow-scheduler", Vec::new());
//!     controller.go(&scheduler)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod execution;
pub mod workflow;

// Re-export commonly used types
pub use controller::{ControllerOptions, Outcome, RunMode, WorkflowController};
pub use error::{Result, WorkflowError};
pub use workflow::model::WorkflowKind;
pub use workflow::StageGraph;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "genoflow";
