use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use conflux::config::PluginDeclaration;
use conflux::module::{ModuleValue, Registry, RegistryLoader};
use conflux::plugin::{Plugin, PluginFault};
use conflux::processor::{Message, NoopProcessor, Processor, ProcessorFactory, ProcessorFault};
use conflux::run::{RunOptions, run};

type Log = Arc<Mutex<Vec<(String, Option<Value>)>>>;

/// Plugin that records each invocation and its options.
struct RecordPlugin {
	name: &'static str,
	log: Log,
}

impl Plugin for RecordPlugin {
	fn apply(
		&self,
		_processor: &mut dyn Processor,
		options: Option<&Value>,
	) -> Result<(), PluginFault> {
		self.log
			.lock()
			.unwrap()
			.push((self.name.to_string(), options.cloned()));
		Ok(())
	}
}

fn noop_factory() -> Arc<dyn ProcessorFactory> {
	Arc::new(|| Box::new(NoopProcessor) as Box<dyn Processor>)
}

fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
	let path = root.join(relative);
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	fs::write(&path, content).unwrap();
	path
}

/// Options wired the way the tests need: rc + manifest lookup enabled, txt
/// extension, the given registry behind the default loader.
fn engine_options(registry: Registry, cwd: &Path) -> RunOptions {
	let mut options = RunOptions::new(noop_factory(), cwd);
	options.rc_name = Some(String::from(".foorc.toml"));
	options.package_field = Some(String::from("fooConfig"));
	options.extensions = vec![String::from("txt")];
	options.loader = Arc::new(RegistryLoader::new(Arc::new(registry)));
	options.files = vec![PathBuf::from(".")];
	options
}

fn run_collecting(options: RunOptions) -> (i32, String) {
	let mut sink = Vec::new();
	let summary = run(options, &mut sink).expect("run should not fail fatally");
	(summary.exit_code, String::from_utf8(sink).unwrap())
}

// ============================================================================
// Cascading
// ============================================================================

#[test]
fn test_cascades_plugins_from_all_ancestors() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		"package.json",
		&json!({ "fooConfig": { "plugins": ["root-plugin"] } }).to_string(),
	);
	write(dir.path(), "nested/.foorc.toml", "plugins = [\"nested-plugin\"]\n");
	write(dir.path(), "nested/one.txt", "");

	let log: Log = Arc::new(Mutex::new(Vec::new()));
	let mut registry = Registry::new();
	registry.register_plugin(
		"root-plugin",
		RecordPlugin {
			name: "root-plugin",
			log: log.clone(),
		},
	);
	registry.register_plugin(
		"nested-plugin",
		RecordPlugin {
			name: "nested-plugin",
			log: log.clone(),
		},
	);

	let (code, stderr) = run_collecting(engine_options(registry, dir.path()));

	assert_eq!(code, 0);
	assert_eq!(stderr, "nested/one.txt: no issues found\n");

	// Union of ancestor declarations, nearest first, each invoked once.
	let invoked: Vec<String> = log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
	assert_eq!(invoked, vec!["nested-plugin", "root-plugin"]);
}

#[test]
fn test_nearer_options_replace_farther_for_same_reference() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		".foorc.toml",
		"plugins = [[\"shared\", { limit = 1 }]]\n",
	);
	write(
		dir.path(),
		"nested/.foorc.toml",
		"plugins = [[\"shared\", { limit = 9 }]]\n",
	);
	write(dir.path(), "nested/one.txt", "");

	let log: Log = Arc::new(Mutex::new(Vec::new()));
	let mut registry = Registry::new();
	registry.register_plugin(
		"shared",
		RecordPlugin {
			name: "shared",
			log: log.clone(),
		},
	);

	let (code, _) = run_collecting(engine_options(registry, dir.path()));

	assert_eq!(code, 0);
	assert_eq!(
		log.lock().unwrap().as_slice(),
		&[("shared".to_string(), Some(json!({ "limit": 9 })))]
	);
}

// ============================================================================
// Failing, missing, and invalid plugins
// ============================================================================

#[test]
fn test_missing_plugin_is_reported_per_file() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		"package.json",
		&json!({ "fooConfig": { "plugins": ["missing"] } }).to_string(),
	);
	write(dir.path(), "one.txt", "");

	let (code, stderr) = run_collecting(engine_options(Registry::new(), dir.path()));

	assert_eq!(code, 1);
	assert_eq!(
		stderr,
		"one.txt\n  1:1  error  Error: Could not find module `missing`\n"
	);
}

#[test]
fn test_invalid_export_is_reported() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), ".foorc.toml", "plugins = [\"./test.json\"]\n");
	write(dir.path(), "test.json", "false");
	write(dir.path(), "one.txt", "");

	let (code, stderr) = run_collecting(engine_options(Registry::new(), dir.path()));

	assert_eq!(code, 1);
	assert_eq!(
		stderr,
		"one.txt\n  1:1  error  Error: Expected preset or plugin, not false, at `./test.json`\n"
	);
}

#[test]
fn test_throwing_plugin_is_reported() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), ".foorc.toml", "plugins = [\"throwing\"]\n");
	write(dir.path(), "one.txt", "");

	let mut registry = Registry::new();
	registry.register_plugin(
		"throwing",
		|_: &mut dyn Processor, _: Option<&Value>| -> Result<(), PluginFault> {
			Err(PluginFault::from("Missing `required`"))
		},
	);

	let (code, stderr) = run_collecting(engine_options(registry, dir.path()));

	assert_eq!(code, 1);
	assert_eq!(stderr, "one.txt\n  1:1  error  Error: Missing `required`\n");
}

#[test]
fn test_plugin_failing_during_load_is_reported() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), ".foorc.toml", "plugins = [\"boom\"]\n");
	write(dir.path(), "one.txt", "");

	let mut registry = Registry::new();
	registry.register_factory("boom", || Err(PluginFault::from("Boom!")));

	let (code, stderr) = run_collecting(engine_options(registry, dir.path()));

	assert_eq!(code, 1);
	assert_eq!(stderr, "one.txt\n  1:1  error  Error: Boom!\n");
}

#[test]
fn test_one_bad_file_does_not_degrade_siblings() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), "bad/.foorc.toml", "plugins = [\"missing\"]\n");
	write(dir.path(), "bad/one.txt", "");
	write(dir.path(), "good/two.txt", "");

	let (code, stderr) = run_collecting(engine_options(Registry::new(), dir.path()));

	assert_eq!(code, 1);
	assert_eq!(
		stderr,
		"bad/one.txt\n  1:1  error  Error: Could not find module `missing`\n\
		 good/two.txt: no issues found\n"
	);
}

// ============================================================================
// Malformed manifest
// ============================================================================

#[test]
fn test_malformed_manifest_reported_before_plugin_errors() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), "package.json", "{ corrupt");
	write(dir.path(), ".foorc.toml", "plugins = [\"missing\"]\n");
	write(dir.path(), "one.txt", "");

	let (code, stderr) = run_collecting(engine_options(Registry::new(), dir.path()));

	assert_eq!(code, 1);
	assert_eq!(
		stderr,
		"one.txt\n\
		 \x20 1:1  error  Error: Cannot parse file `package.json`\n\
		 \x20 1:1  error  Error: Could not find module `missing`\n"
	);
}

// ============================================================================
// Injected plugins
// ============================================================================

#[test]
fn test_injected_plugins_receive_literal_options() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), "one.txt", "");

	let log: Log = Arc::new(Mutex::new(Vec::new()));
	let mut options = engine_options(Registry::new(), dir.path());
	options.plugins.push(PluginDeclaration::inline(RecordPlugin {
		name: "bare",
		log: log.clone(),
	}));
	options.plugins.push(PluginDeclaration::inline_with(
		RecordPlugin {
			name: "tuple",
			log: log.clone(),
		},
		json!({ "foo": "bar" }),
	));

	let (code, stderr) = run_collecting(options);

	assert_eq!(code, 0);
	assert_eq!(stderr, "one.txt: no issues found\n");
	assert_eq!(
		log.lock().unwrap().as_slice(),
		&[
			("bare".to_string(), None),
			("tuple".to_string(), Some(json!({ "foo": "bar" }))),
		]
	);
}

#[test]
fn test_injected_options_override_cascaded_options() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		".foorc.toml",
		"plugins = [[\"shared\", { limit = 1 }]]\n",
	);
	write(dir.path(), "one.txt", "");

	let log: Log = Arc::new(Mutex::new(Vec::new()));
	let mut registry = Registry::new();
	registry.register_plugin(
		"shared",
		RecordPlugin {
			name: "shared",
			log: log.clone(),
		},
	);

	let mut options = engine_options(registry, dir.path());
	options
		.plugins
		.push(PluginDeclaration::named_with("shared", json!({ "limit": 5 })));

	let (code, _) = run_collecting(options);

	assert_eq!(code, 0);
	assert_eq!(
		log.lock().unwrap().as_slice(),
		&[("shared".to_string(), Some(json!({ "limit": 5 })))]
	);
}

// ============================================================================
// Settings
// ============================================================================

/// Processor that records the settings each file was processed with.
struct SettingsProbe {
	seen: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl Processor for SettingsProbe {
	fn process(
		&mut self,
		_path: &Path,
		settings: &Map<String, Value>,
	) -> Result<Vec<Message>, ProcessorFault> {
		self.seen.lock().unwrap().push(settings.clone());
		Ok(Vec::new())
	}

	fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
		self
	}
}

#[test]
fn test_settings_merge_nearest_wins_and_overrides_last() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		".foorc.toml",
		"settings = { bullet = \"-\", spacing = 1, kept = true }\n",
	);
	write(
		dir.path(),
		"nested/.foorc.toml",
		"settings = { bullet = \"*\" }\n",
	);
	write(dir.path(), "nested/one.txt", "");

	let seen = Arc::new(Mutex::new(Vec::new()));
	let probe = seen.clone();
	let mut options = engine_options(Registry::new(), dir.path());
	options.processor = Arc::new(move || {
		Box::new(SettingsProbe { seen: probe.clone() }) as Box<dyn Processor>
	});
	options.settings.insert(String::from("spacing"), json!(4));

	let (code, _) = run_collecting(options);
	assert_eq!(code, 0);

	let seen = seen.lock().unwrap();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].get("bullet"), Some(&json!("*"))); // nearest fragment
	assert_eq!(seen[0].get("spacing"), Some(&json!(4))); // caller override
	assert_eq!(seen[0].get("kept"), Some(&json!(true))); // farther fragment
}

// ============================================================================
// Presets
// ============================================================================

#[test]
fn test_preset_file_contributes_plugins_and_settings() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		"shared.toml",
		"settings = { bullet = \"-\" }\nplugins = [\"from-preset\"]\n",
	);
	write(dir.path(), ".foorc.toml", "presets = [\"./shared.toml\"]\n");
	write(dir.path(), "one.txt", "");

	let log: Log = Arc::new(Mutex::new(Vec::new()));
	let mut registry = Registry::new();
	registry.register_plugin(
		"from-preset",
		RecordPlugin {
			name: "from-preset",
			log: log.clone(),
		},
	);

	let (code, stderr) = run_collecting(engine_options(registry, dir.path()));

	assert_eq!(code, 0);
	assert_eq!(stderr, "one.txt: no issues found\n");
	assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_preset_cycle_is_localized() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), "a.toml", "presets = [\"./b.toml\"]\n");
	write(dir.path(), "b.toml", "presets = [\"./a.toml\"]\n");
	write(dir.path(), ".foorc.toml", "presets = [\"./a.toml\"]\n");
	write(dir.path(), "one.txt", "");

	let (code, stderr) = run_collecting(engine_options(Registry::new(), dir.path()));

	assert_eq!(code, 1);
	assert_eq!(
		stderr,
		"one.txt\n  1:1  error  Error: Preset cycle detected at `./a.toml`\n"
	);
}

// ============================================================================
// Module cache
// ============================================================================

#[test]
fn test_shared_reference_loads_once_across_files() {
	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), ".foorc.toml", "plugins = [\"counted\"]\n");
	write(dir.path(), "a/one.txt", "");
	write(dir.path(), "b/two.txt", "");

	let loads = Arc::new(AtomicUsize::new(0));
	let counter = loads.clone();
	let mut registry = Registry::new();
	registry.register_factory("counted", move || {
		counter.fetch_add(1, Ordering::SeqCst);
		let plugin: Arc<dyn Plugin> = Arc::new(
			|_: &mut dyn Processor, _: Option<&Value>| -> Result<(), PluginFault> { Ok(()) },
		);
		Ok(ModuleValue::Callable(plugin))
	});

	let (code, _) = run_collecting(engine_options(registry, dir.path()));

	assert_eq!(code, 0);
	assert_eq!(loads.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_identical_runs_report_identically() {
	let dir = tempfile::tempdir().unwrap();
	write(
		dir.path(),
		".foorc.toml",
		"plugins = [\"missing\", \"./preset.toml\"]\n",
	);
	write(dir.path(), "preset.toml", "plugins = [\"also-missing\"]\n");
	write(dir.path(), "a/one.txt", "");
	write(dir.path(), "b/two.txt", "");

	let (first_code, first) = run_collecting(engine_options(Registry::new(), dir.path()));
	let (second_code, second) = run_collecting(engine_options(Registry::new(), dir.path()));

	assert_eq!(first_code, 1);
	assert_eq!(first_code, second_code);
	assert_eq!(first, second);
}
