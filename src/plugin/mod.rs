//! Plugin contract, validation, and attachment.
//!
//! This module handles:
//! - The `Plugin` trait (invocable with options against a processor)
//! - Classifying loaded values as plugins or presets
//! - Resolving declarations into attached plugins, isolating failures

pub mod resolver;
pub mod validate;

use crate::processor::Processor;
use serde_json::Value;

/// Failure raised by plugin code during load or invocation. Opaque to the
/// engine; only its display text reaches the report.
pub type PluginFault = Box<dyn std::error::Error + Send + Sync>;

/// An invocable configuration unit.
///
/// `apply` is the single invocation point: the plugin receives the processor
/// it should configure and its declared options. Returning an error degrades
/// only the file currently being processed, never the run.
pub trait Plugin: Send + Sync {
	fn apply(&self, processor: &mut dyn Processor, options: Option<&Value>)
	-> Result<(), PluginFault>;
}

/// Plain functions and closures with the right shape are plugins, so callers
/// can inject behavior without a named type.
impl<F> Plugin for F
where
	F: Fn(&mut dyn Processor, Option<&Value>) -> Result<(), PluginFault> + Send + Sync,
{
	fn apply(
		&self,
		processor: &mut dyn Processor,
		options: Option<&Value>,
	) -> Result<(), PluginFault> {
		self(processor, options)
	}
}

pub use resolver::{ResolvedPlugin, attach_all};
pub use validate::{InvalidExport, Loaded, classify};
