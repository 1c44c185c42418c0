use crate::config::types::Fragment;
use crate::module::registry::Registry;
use crate::plugin::Plugin;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// A value obtained from the registry or the filesystem, before validation.
#[derive(Clone)]
pub enum ModuleValue {
	/// An invocable plugin.
	Callable(Arc<dyn Plugin>),

	/// A preset bundle registered directly.
	Bundle(Fragment),

	/// Raw data, e.g. the contents of a referenced file. Classified later.
	Data(serde_json::Value),
}

impl std::fmt::Debug for ModuleValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ModuleValue::Callable(_) => f.debug_tuple("Callable").finish_non_exhaustive(),
			ModuleValue::Bundle(fragment) => f.debug_tuple("Bundle").field(fragment).finish(),
			ModuleValue::Data(value) => f.debug_tuple("Data").field(value).finish(),
		}
	}
}

/// Why a reference could not be turned into a value.
///
/// The display texts are exactly what reaches the report, prefixed with
/// `Error: ` by the resolver.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
	#[error("Could not find module `{reference}`")]
	NotFound { reference: String },

	#[error("Cannot parse file `{path}`")]
	Parse { path: String },

	#[error("{message}")]
	Init { message: String },
}

/// Resolves references into values.
///
/// The contract is fixed even though the resolution strategy is not: resolve
/// against `base` first (for local paths), fall back to a global namespace
/// (for names), and catch every loading failure — a `load` call never
/// panics on behalf of the module it loads.
pub trait ModuleLoader: Send + Sync {
	fn load(&self, reference: &str, base: &Path) -> Result<ModuleValue, LoadError>;
}

/// True when the reference addresses a file rather than a registered name.
pub fn is_path_reference(reference: &str) -> bool {
	reference.starts_with("./")
		|| reference.starts_with("../")
		|| reference.starts_with('/')
		|| reference.ends_with(".toml")
		|| reference.ends_with(".json")
}

/// Cache key for a reference: the resolved location for paths, the bare name
/// otherwise. Locations are normalized lexically so one file referenced
/// through different `.`/`..` spellings keys identically.
pub fn cache_key(reference: &str, base: &Path) -> String {
	if is_path_reference(reference) {
		normalize(&base.join(reference))
			.to_string_lossy()
			.into_owned()
	} else {
		reference.to_string()
	}
}

/// Directory that nested references inside a loaded preset resolve against.
pub fn preset_base(reference: &str, base: &Path) -> PathBuf {
	if is_path_reference(reference) {
		normalize(&base.join(reference))
			.parent()
			.map_or_else(|| base.to_path_buf(), Path::to_path_buf)
	} else {
		base.to_path_buf()
	}
}

/// Drop `.` components and resolve `..` lexically, without touching the
/// filesystem (the path may not exist yet).
fn normalize(path: &Path) -> PathBuf {
	use std::path::Component;

	let mut out = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				if !out.pop() {
					out.push(component.as_os_str());
				}
			}
			other => out.push(other.as_os_str()),
		}
	}
	out
}

/// Default loader: files for path references, the registry for names.
pub struct RegistryLoader {
	registry: Arc<Registry>,
}

impl RegistryLoader {
	pub fn new(registry: Arc<Registry>) -> Self {
		RegistryLoader { registry }
	}
}

impl ModuleLoader for RegistryLoader {
	fn load(&self, reference: &str, base: &Path) -> Result<ModuleValue, LoadError> {
		if is_path_reference(reference) {
			load_file(reference, &base.join(reference))
		} else {
			match self.registry.resolve(reference) {
				None => Err(LoadError::NotFound {
					reference: reference.to_string(),
				}),
				Some(Ok(value)) => Ok(value),
				Some(Err(fault)) => Err(LoadError::Init {
					message: fault.to_string(),
				}),
			}
		}
	}
}

/// Parse a referenced file by extension: JSON for `.json`, TOML otherwise.
fn load_file(reference: &str, path: &Path) -> Result<ModuleValue, LoadError> {
	let parse_error = || LoadError::Parse {
		path: reference.to_string(),
	};

	if !path.is_file() {
		return Err(LoadError::NotFound {
			reference: reference.to_string(),
		});
	}

	let text = std::fs::read_to_string(path).map_err(|_| parse_error())?;
	let value = if path.extension().is_some_and(|ext| ext == "json") {
		serde_json::from_str(&text).map_err(|_| parse_error())?
	} else {
		let parsed: toml::Value = toml::from_str(&text).map_err(|_| parse_error())?;
		serde_json::to_value(parsed).map_err(|_| parse_error())?
	};

	tracing::debug!("loaded module file {}", path.display());
	Ok(ModuleValue::Data(value))
}

type Slot = Result<ModuleValue, Arc<LoadError>>;

/// Shared reference -> loaded value cache.
///
/// Injected into resolution rather than held as ambient state, so runs and
/// tests control its lifetime. The map lock is held across a load: concurrent
/// requests for one reference wait instead of loading twice.
#[derive(Default)]
pub struct ModuleCache {
	entries: Mutex<HashMap<String, Slot>>,
}

impl ModuleCache {
	pub fn new() -> Self {
		ModuleCache::default()
	}

	/// Load through the cache. Failures are cached too, so a broken module
	/// is reported consistently without re-running its constructor.
	pub fn load(&self, loader: &dyn ModuleLoader, reference: &str, base: &Path) -> Slot {
		let key = cache_key(reference, base);
		let mut entries = self
			.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		if let Some(slot) = entries.get(&key) {
			tracing::debug!("module cache hit for `{reference}`");
			return slot.clone();
		}

		let slot = loader.load(reference, base).map_err(Arc::new);
		entries.insert(key, slot.clone());
		slot
	}
}
