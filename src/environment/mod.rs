//! Environment Module
//!
//! Checks that the external programs of the enabled stages can be run.

pub mod checker;
pub mod programs;

pub use checker::{DependencyChecker, DependencyReport, MissingProgram};
pub use programs::{FixedLocator, PathLocator, ProgramLocator};
