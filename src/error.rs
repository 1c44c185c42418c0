use std::path::PathBuf;

/// Whole-run-fatal errors.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains.
///
/// This enum is deliberately small: a broken manifest, a missing module, an
/// invalid export, or a throwing plugin degrade a single file and surface as
/// `Error`-severity messages on that file, never here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("No input files or directories given")]
	NoInput,

	#[error("Invalid working directory: {path}")]
	InvalidCwd {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to write to the diagnostic stream")]
	Report {
		#[source]
		source: std::io::Error,
	},
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;
