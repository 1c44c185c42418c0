use crate::plugin::Plugin;
use crate::processor::Message;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One configuration source, as parsed from an rc file, a manifest field, or
/// a preset bundle. Immutable once parsed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fragment {
	/// Shared settings handed to the processor. Nearer fragments override
	/// farther ones per key.
	#[serde(default)]
	pub settings: Map<String, Value>,

	/// Plugin declarations, in declaration order.
	#[serde(default)]
	pub plugins: Vec<DeclSpec>,

	/// Preset references, expanded inline at resolution time.
	#[serde(default)]
	pub presets: Vec<String>,
}

/// Plugin declaration forms accepted in configuration files.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeclSpec {
	/// `"name"` or `"./bundle.toml"`.
	Bare(String),

	/// `["name", options]`.
	Pair(String, Value),

	/// `{ reference = "name", options = ... }`.
	Detailed {
		reference: String,
		#[serde(default)]
		options: Option<Value>,
	},
}

impl DeclSpec {
	pub fn reference(&self) -> &str {
		match self {
			DeclSpec::Bare(reference) => reference,
			DeclSpec::Pair(reference, _) => reference,
			DeclSpec::Detailed { reference, .. } => reference,
		}
	}

	/// Declared options; a `null` in the pair form counts as absent.
	pub fn options(&self) -> Option<&Value> {
		match self {
			DeclSpec::Bare(_) => None,
			DeclSpec::Pair(_, options) => (!options.is_null()).then_some(options),
			DeclSpec::Detailed { options, .. } => options.as_ref(),
		}
	}
}

/// A fragment together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedFragment {
	/// The parsed fragment.
	pub fragment: Fragment,

	/// Directory the fragment governs; path references resolve against it.
	pub dir: PathBuf,

	/// The file this fragment was parsed from.
	pub source: PathBuf,
}

/// Reference to a plugin: a name or path to resolve through the module
/// loader, or a callable injected directly by the caller.
#[derive(Clone)]
pub enum PluginRef {
	Name(String),
	Inline(Arc<dyn Plugin>),
}

impl fmt::Debug for PluginRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PluginRef::Name(reference) => write!(f, "Name({reference:?})"),
			PluginRef::Inline(_) => write!(f, "Inline(..)"),
		}
	}
}

/// Equality by reference identity: names compare by string, injected
/// callables by pointer. Deduplication in the cascade is built on this.
impl PartialEq for PluginRef {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(PluginRef::Name(a), PluginRef::Name(b)) => a == b,
			(PluginRef::Inline(a), PluginRef::Inline(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

/// A plugin declaration ready for resolution.
#[derive(Debug, Clone)]
pub struct PluginDeclaration {
	pub reference: PluginRef,
	pub options: Option<Value>,

	/// Directory of the declaring configuration source; path references
	/// resolve against it. Empty for injected declarations until the run
	/// fills in the working directory.
	pub base: PathBuf,
}

impl PluginDeclaration {
	/// Declaration by name or path, without options.
	pub fn named(reference: impl Into<String>) -> Self {
		PluginDeclaration {
			reference: PluginRef::Name(reference.into()),
			options: None,
			base: PathBuf::new(),
		}
	}

	/// Declaration by name or path, with options.
	pub fn named_with(reference: impl Into<String>, options: Value) -> Self {
		PluginDeclaration {
			options: Some(options),
			..PluginDeclaration::named(reference)
		}
	}

	/// Injected callable, without options.
	pub fn inline(plugin: impl Plugin + 'static) -> Self {
		PluginDeclaration {
			reference: PluginRef::Inline(Arc::new(plugin)),
			options: None,
			base: PathBuf::new(),
		}
	}

	/// Injected callable with the literal options it should receive.
	pub fn inline_with(plugin: impl Plugin + 'static, options: Value) -> Self {
		PluginDeclaration {
			options: Some(options),
			..PluginDeclaration::inline(plugin)
		}
	}

	pub(crate) fn from_spec(spec: &DeclSpec, base: &Path) -> Self {
		PluginDeclaration {
			reference: PluginRef::Name(spec.reference().to_string()),
			options: spec.options().cloned(),
			base: base.to_path_buf(),
		}
	}
}

/// Caller-supplied configuration merged after the file cascade.
///
/// Override settings always win; override plugins are appended after all
/// file-based declarations.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub settings: Map<String, Value>,
	pub plugins: Vec<PluginDeclaration>,
}

/// The merged configuration for one target file.
#[derive(Debug, Clone, Default)]
pub struct EffectiveConfig {
	/// Merged settings, nearest fragment winning per key.
	pub settings: Map<String, Value>,

	/// Deduplicated plugin declarations in order of first appearance,
	/// nearest-to-farthest, overrides last.
	pub plugins: Vec<PluginDeclaration>,

	/// Configuration-time failures, reported ahead of any plugin resolution
	/// errors for the file.
	pub messages: Vec<Message>,
}
