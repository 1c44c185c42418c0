//! Run orchestration.
//!
//! This module handles:
//! - Expanding input paths into processable files
//! - Per-file configuration resolution, plugin attachment, and processing
//! - Failure isolation: one bad file or plugin never aborts its siblings
//! - Report streaming and the exit-code contract

pub mod report;

use crate::config::cascade::{self, CascadeContext};
use crate::config::reader::ReadContext;
use crate::config::types::{Overrides, PluginDeclaration};
use crate::error::{EngineError, Result};
use crate::module::loader::{ModuleCache, ModuleLoader, RegistryLoader};
use crate::module::registry::Registry;
use crate::plugin::resolver::attach_all;
use crate::processor::{Message, ProcessorFactory, Severity};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Everything one run needs.
pub struct RunOptions {
	/// Creates the fresh processor used for each file.
	pub processor: Arc<dyn ProcessorFactory>,

	/// Working directory: the cascade stops here and report paths are
	/// displayed relative to it.
	pub cwd: PathBuf,

	/// Files or directories to process, absolute or relative to `cwd`.
	pub files: Vec<PathBuf>,

	/// rc file name looked up in each ancestor directory. `None` disables
	/// rc lookup.
	pub rc_name: Option<String>,

	/// Manifest member holding configuration. `None` disables manifest
	/// lookup.
	pub package_field: Option<String>,

	/// Manifest file name.
	pub manifest_name: String,

	/// Extensions eligible when expanding directories, e.g. `txt`.
	pub extensions: Vec<String>,

	/// Injected plugin declarations, attached after all file-based ones.
	pub plugins: Vec<PluginDeclaration>,

	/// Injected settings; always win over file-based settings.
	pub settings: Map<String, Value>,

	/// Module resolution strategy.
	pub loader: Arc<dyn ModuleLoader>,
}

impl RunOptions {
	/// Options with nothing configured: no rc or manifest lookup, an empty
	/// registry behind the default loader.
	pub fn new(processor: Arc<dyn ProcessorFactory>, cwd: impl Into<PathBuf>) -> Self {
		RunOptions {
			processor,
			cwd: cwd.into(),
			files: Vec::new(),
			rc_name: None,
			package_field: None,
			manifest_name: String::from("package.json"),
			extensions: Vec::new(),
			plugins: Vec::new(),
			settings: Map::new(),
			loader: Arc::new(RegistryLoader::new(Arc::new(Registry::new()))),
		}
	}
}

/// What happened to one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
	pub path: PathBuf,

	/// Diagnostics in deterministic order: configuration failures first,
	/// then plugin resolution failures in attachment order, then whatever
	/// the processor reported.
	pub messages: Vec<Message>,

	/// Set when the processor itself failed on this file.
	pub fatal: Option<String>,
}

impl FileOutcome {
	fn has_errors(&self) -> bool {
		self.messages
			.iter()
			.any(|message| message.severity == Severity::Error)
	}
}

/// Aggregated result of a run.
#[derive(Debug)]
pub struct RunSummary {
	/// `1` when any file produced an `Error`-severity message, `0` otherwise.
	pub exit_code: i32,

	/// Per-file outcomes in processing order.
	pub outcomes: Vec<FileOutcome>,
}

/// Process every input file, streaming one report block per file to `stderr`.
///
/// `Err` is reserved for engine-level misconfiguration; every failure tied to
/// a file's configuration or plugins lands in that file's outcome instead.
pub fn run(options: RunOptions, stderr: &mut dyn Write) -> Result<RunSummary> {
	if options.files.is_empty() {
		return Err(EngineError::NoInput);
	}
	let cwd = options
		.cwd
		.canonicalize()
		.map_err(|source| EngineError::InvalidCwd {
			path: options.cwd.clone(),
			source,
		})?;

	let cache = ModuleCache::new();
	let overrides = build_overrides(&options, &cwd);

	let mut outcomes = Vec::new();
	for input in expand_inputs(&options, &cwd) {
		let outcome = match input {
			Input::File(path) => process_file(&path, &options, &cwd, &cache, &overrides),
			Input::Missing(path) => FileOutcome {
				path,
				messages: vec![Message::error("Error: No such file or directory")],
				fatal: Some(String::from("No such file or directory")),
			},
		};

		stderr
			.write_all(report::report(&outcome, &cwd).as_bytes())
			.map_err(|source| EngineError::Report { source })?;
		outcomes.push(outcome);
	}

	let exit_code = i32::from(outcomes.iter().any(FileOutcome::has_errors));
	Ok(RunSummary {
		exit_code,
		outcomes,
	})
}

/// Injected declarations resolve path references against the run cwd.
fn build_overrides(options: &RunOptions, cwd: &Path) -> Overrides {
	let mut overrides = Overrides {
		settings: options.settings.clone(),
		plugins: options.plugins.clone(),
	};
	for declaration in &mut overrides.plugins {
		if declaration.base.as_os_str().is_empty() {
			declaration.base = cwd.to_path_buf();
		}
	}
	overrides
}

enum Input {
	File(PathBuf),
	Missing(PathBuf),
}

/// Resolve the given paths: files pass through, directories expand to their
/// extension-matched files in lexicographic order, missing paths are kept so
/// they can be reported.
fn expand_inputs(options: &RunOptions, cwd: &Path) -> Vec<Input> {
	let mut inputs = Vec::new();

	for given in &options.files {
		let joined = if given.is_absolute() {
			given.clone()
		} else {
			cwd.join(given)
		};
		let path = joined.canonicalize().unwrap_or(joined);

		if path.is_dir() {
			let mut found: Vec<PathBuf> = WalkDir::new(&path)
				.into_iter()
				.filter_map(|entry| entry.ok())
				.filter(|entry| entry.file_type().is_file())
				.map(walkdir::DirEntry::into_path)
				.filter(|file| has_wanted_extension(file, &options.extensions))
				.collect();
			found.sort();
			tracing::debug!("expanded {} to {} file(s)", path.display(), found.len());
			inputs.extend(found.into_iter().map(Input::File));
		} else if path.is_file() {
			inputs.push(Input::File(path));
		} else {
			inputs.push(Input::Missing(path));
		}
	}

	inputs
}

fn has_wanted_extension(path: &Path, extensions: &[String]) -> bool {
	path.extension().is_some_and(|ext| {
		extensions
			.iter()
			.any(|wanted| ext == wanted.trim_start_matches('.'))
	})
}

fn process_file(
	file: &Path,
	options: &RunOptions,
	cwd: &Path,
	cache: &ModuleCache,
	overrides: &Overrides,
) -> FileOutcome {
	tracing::debug!("processing {}", file.display());

	let ctx = CascadeContext {
		root: cwd,
		read: ReadContext {
			rc_name: options.rc_name.as_deref(),
			package_field: options.package_field.as_deref(),
			manifest_name: &options.manifest_name,
			cwd,
		},
		loader: options.loader.as_ref(),
		cache,
	};
	let config = cascade::resolve(file, &ctx, overrides);

	let mut messages = config.messages;
	let mut processor = options.processor.create();
	attach_all(
		&config.plugins,
		processor.as_mut(),
		options.loader.as_ref(),
		cache,
		&mut messages,
	);

	let mut fatal = None;
	match processor.process(file, &config.settings) {
		Ok(mut produced) => messages.append(&mut produced),
		Err(fault) => {
			messages.push(Message::error(format!("Error: {fault}")));
			fatal = Some(fault.to_string());
		}
	}

	FileOutcome {
		path: file.to_path_buf(),
		messages,
		fatal,
	}
}
