use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use conflux::module::{Registry, RegistryLoader};
use conflux::plugin::{Plugin, PluginFault};
use conflux::processor::{Message, Processor, ProcessorFactory, ProcessorFault, Severity};
use conflux::run::{RunOptions, run};

#[derive(Parser)]
#[command(name = "conflux")]
#[command(
	author,
	version,
	about = "Check text files with cascading configuration and plugins"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	/// Files or directories to check
	#[arg(required = true)]
	paths: Vec<PathBuf>,

	/// Working directory the configuration cascade stops at
	#[arg(long)]
	cwd: Option<PathBuf>,

	/// Name of the rc file looked up in each ancestor directory
	#[arg(long, default_value = ".confluxrc.toml")]
	rc_name: String,

	/// package.json member holding configuration
	#[arg(long, default_value = "conflux")]
	package_field: String,

	/// File extensions eligible when expanding directories
	#[arg(long = "ext", value_name = "EXT", default_values_t = [String::from("txt")])]
	extensions: Vec<String>,
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();

	match run_cli() {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn run_cli() -> Result<ExitCode> {
	let cli = Cli::parse();

	let cwd = match cli.cwd {
		Some(dir) => dir,
		None => std::env::current_dir().context("Failed to get current directory")?,
	};

	let factory: Arc<dyn ProcessorFactory> =
		Arc::new(|| Box::new(TextProcessor::default()) as Box<dyn Processor>);

	let mut options = RunOptions::new(factory, cwd);
	options.files = cli.paths;
	options.rc_name = Some(cli.rc_name);
	options.package_field = Some(cli.package_field);
	options.extensions = cli.extensions;
	options.loader = Arc::new(RegistryLoader::new(Arc::new(builtin_registry())));

	let summary =
		run(options, &mut std::io::stderr()).context("Failed to run the engine")?;

	Ok(if summary.exit_code == 0 {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	})
}

/// Plugins bundled with the binary, resolvable by name from any config file.
fn builtin_registry() -> Registry {
	let mut registry = Registry::new();
	registry.register_plugin("line-length", LineLength);
	registry.register_plugin("no-trailing-space", NoTrailingSpace);
	registry.register_plugin("final-newline", FinalNewline);
	registry
}

type Check = Box<dyn Fn(&str) -> Vec<Message> + Send>;

/// Line-oriented processor: plugins contribute checks that run over the
/// file's text.
#[derive(Default)]
struct TextProcessor {
	checks: Vec<Check>,
}

impl TextProcessor {
	fn add_check(&mut self, check: impl Fn(&str) -> Vec<Message> + Send + 'static) {
		self.checks.push(Box::new(check));
	}
}

impl Processor for TextProcessor {
	fn process(
		&mut self,
		path: &Path,
		_settings: &Map<String, Value>,
	) -> Result<Vec<Message>, ProcessorFault> {
		let text = std::fs::read_to_string(path)?;

		let mut messages = Vec::new();
		for check in &self.checks {
			messages.extend(check(&text));
		}
		messages.sort_by_key(|message| (message.line, message.column));
		Ok(messages)
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

fn text_processor<'a>(processor: &'a mut dyn Processor, plugin: &str) -> Result<&'a mut TextProcessor, PluginFault> {
	processor
		.as_any_mut()
		.downcast_mut::<TextProcessor>()
		.ok_or_else(|| PluginFault::from(format!("{plugin} requires the text processor")))
}

/// Flag lines longer than `limit` characters (default 80).
struct LineLength;

impl Plugin for LineLength {
	fn apply(
		&self,
		processor: &mut dyn Processor,
		options: Option<&Value>,
	) -> Result<(), PluginFault> {
		let limit = match options.and_then(|options| options.get("limit")) {
			None => 80,
			Some(value) => value
				.as_u64()
				.ok_or_else(|| PluginFault::from("expected numeric `limit`"))?
				as usize,
		};

		text_processor(processor, "line-length")?.add_check(move |text| {
			text.lines()
				.enumerate()
				.filter(|(_, line)| line.chars().count() > limit)
				.map(|(index, _)| {
					Message::at(
						index + 1,
						limit + 1,
						Severity::Error,
						format!("Line exceeds {limit} characters"),
					)
				})
				.collect()
		});
		Ok(())
	}
}

/// Flag trailing whitespace.
struct NoTrailingSpace;

impl Plugin for NoTrailingSpace {
	fn apply(
		&self,
		processor: &mut dyn Processor,
		_options: Option<&Value>,
	) -> Result<(), PluginFault> {
		text_processor(processor, "no-trailing-space")?.add_check(|text| {
			text.lines()
				.enumerate()
				.filter(|(_, line)| line.len() > line.trim_end().len())
				.map(|(index, line)| {
					Message::at(
						index + 1,
						line.trim_end().chars().count() + 1,
						Severity::Error,
						"Trailing whitespace",
					)
				})
				.collect()
		});
		Ok(())
	}
}

/// Flag a missing newline at the end of the file.
struct FinalNewline;

impl Plugin for FinalNewline {
	fn apply(
		&self,
		processor: &mut dyn Processor,
		_options: Option<&Value>,
	) -> Result<(), PluginFault> {
		text_processor(processor, "final-newline")?.add_check(|text| {
			if text.is_empty() || text.ends_with('\n') {
				return Vec::new();
			}
			let line = text.lines().count();
			let column = text.lines().last().map_or(1, |last| last.chars().count() + 1);
			vec![Message::at(
				line,
				column,
				Severity::Error,
				"Missing final newline",
			)]
		});
		Ok(())
	}
}
