//! Workflow Execution Module
//!
//! Hands a resolved stage graph to the external scheduler. Jobs are never
//! run in-process.
//!
//! - [`scheduler`]: job file generation and scheduler invocation

pub mod scheduler;

pub use scheduler::{ExternalScheduler, Scheduler, Submission};
