//! Collaborator traits and diagnostics.
//!
//! The engine resolves configuration and attaches plugins; the processor is
//! the external pipeline those plugins configure. One fresh processor is
//! created per file, so nothing leaks between files.

use serde_json::{Map, Value};
use std::any::Any;
use std::path::Path;

/// Failure raised by a processor while running its pipeline.
pub type ProcessorFault = Box<dyn std::error::Error + Send + Sync>;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	Warning,
	Error,
}

impl Severity {
	/// Get the string representation used in report output.
	pub fn as_str(&self) -> &'static str {
		match self {
			Severity::Warning => "warning",
			Severity::Error => "error",
		}
	}
}

/// One diagnostic attached to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub line: usize,
	pub column: usize,
	pub severity: Severity,
	pub text: String,
}

impl Message {
	/// An `Error`-severity message at 1:1, where configuration and plugin
	/// failures are reported.
	pub fn error(text: impl Into<String>) -> Self {
		Message::at(1, 1, Severity::Error, text)
	}

	/// A `Warning`-severity message at 1:1.
	pub fn warning(text: impl Into<String>) -> Self {
		Message::at(1, 1, Severity::Warning, text)
	}

	/// A message at an explicit position.
	pub fn at(line: usize, column: usize, severity: Severity, text: impl Into<String>) -> Self {
		Message {
			line,
			column,
			severity,
			text: text.into(),
		}
	}
}

/// The processing pipeline plugins attach to.
///
/// `as_any_mut` is the configuration seam: plugins downcast to the concrete
/// processor they know how to configure and reject anything else as an
/// invocation fault.
pub trait Processor: Any {
	/// Run the pipeline over one file with the effective shared settings.
	fn process(
		&mut self,
		path: &Path,
		settings: &Map<String, Value>,
	) -> Result<Vec<Message>, ProcessorFault>;

	fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Produces the fresh processor instance used for each file.
pub trait ProcessorFactory: Send + Sync {
	fn create(&self) -> Box<dyn Processor>;
}

impl<F> ProcessorFactory for F
where
	F: Fn() -> Box<dyn Processor> + Send + Sync,
{
	fn create(&self) -> Box<dyn Processor> {
		self()
	}
}

/// Processor that accepts any plugin and reports nothing.
///
/// Stands in for the real pipeline when only configuration resolution and
/// plugin attachment are under test.
#[derive(Debug, Default)]
pub struct NoopProcessor;

impl Processor for NoopProcessor {
	fn process(
		&mut self,
		_path: &Path,
		_settings: &Map<String, Value>,
	) -> Result<Vec<Message>, ProcessorFault> {
		Ok(Vec::new())
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}
