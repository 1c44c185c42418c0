//! Configuration loading for conflux.
//!
//! This module handles:
//! - Fragment parsing (rc files, manifest fields, preset bundles)
//! - Directory cascade discovery
//! - Preset expansion and config merging

pub mod cascade;
pub mod reader;
pub mod types;

pub use cascade::{CascadeContext, resolve};
pub use reader::{ReadContext, read_dir};
pub use types::{
	DeclSpec, EffectiveConfig, Fragment, LoadedFragment, Overrides, PluginDeclaration, PluginRef,
};
