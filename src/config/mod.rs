//! Configuration Module
//!
//! Path-addressable configuration for workflows.
//!
//! - [`store`]: user + default trees and path lookup
//! - [`resolver`]: stage parameters as argument tokens
//! - [`defaults`]: default configurations generated from the catalogs
//! - [`value`]: typed scalar values

pub mod defaults;
pub mod resolver;
pub mod store;
pub mod value;

pub use defaults::{default_config, CONFIG_VERSION};
pub use resolver::{ArgToken, ParameterResolver};
pub use store::{ConfigStore, ResolveMode};
pub use value::ConfigValue;
