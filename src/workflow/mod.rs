//! Workflow Definition Module
//!
//! Static workflow definitions and the machinery that turns them, together
//! with a configuration and a sample manifest, into a job graph.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (StageDef, WorkflowDefinition, StageSpec)
//! - [`catalog`]: The built-in workflow definitions
//! - [`layout`]: Output directory categories
//! - [`manifest`]: Sample and genome tables
//! - [`composer`]: Embedding one workflow into another
//! - [`gate`]: Stage enable flags and exclusion rules
//! - [`validator`]: Structural checks and topological ordering
//! - [`graph`]: Job graph construction and pass-through resolution
//! - [`command`]: Argument template evaluation

pub mod catalog;
pub mod command;
pub mod composer;
pub mod gate;
pub mod graph;
pub mod layout;
pub mod manifest;
pub mod model;
pub mod pattern;
pub mod validator;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::definition;
pub use command::{CommandBuilder, Invocation};
pub use composer::{CompositionMode, Workflow, WorkflowComposer};
pub use gate::{GateDecisions, StageGate};
pub use graph::{GraphBuilder, Job, Passthrough, StageGraph};
pub use layout::{Category, DirectoryLayout};
pub use manifest::{load_manifest, Entities, Entity};
pub use model::{Scope, StageDef, StageSpec, WorkflowDefinition, WorkflowKind};
pub use validator::validate_stages;
