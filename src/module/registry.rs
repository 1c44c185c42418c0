use crate::config::types::Fragment;
use crate::module::loader::ModuleValue;
use crate::plugin::{Plugin, PluginFault};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type Factory = Box<dyn Fn() -> Result<ModuleValue, PluginFault> + Send + Sync>;

enum Entry {
	Value(ModuleValue),
	Factory(Factory),
}

/// Named in-process modules available to the loader.
///
/// Stands in for the host environment's package namespace: a name maps to a
/// ready value or to a factory that builds one. A factory returning `Err` is
/// the module-that-throws-while-loading case; the loader turns it into a
/// structured load error instead of letting it escape.
#[derive(Default)]
pub struct Registry {
	entries: HashMap<String, Entry>,
}

impl Registry {
	pub fn new() -> Self {
		Registry::default()
	}

	/// Register an invocable plugin under a name.
	pub fn register_plugin(&mut self, name: impl Into<String>, plugin: impl Plugin + 'static) {
		self.entries.insert(
			name.into(),
			Entry::Value(ModuleValue::Callable(Arc::new(plugin))),
		);
	}

	/// Register a preset bundle under a name.
	pub fn register_bundle(&mut self, name: impl Into<String>, fragment: Fragment) {
		self.entries
			.insert(name.into(), Entry::Value(ModuleValue::Bundle(fragment)));
	}

	/// Register a raw data value under a name. The validator decides later
	/// whether it qualifies as anything.
	pub fn register_value(&mut self, name: impl Into<String>, value: Value) {
		self.entries
			.insert(name.into(), Entry::Value(ModuleValue::Data(value)));
	}

	/// Register a fallible constructor under a name, evaluated on first load.
	pub fn register_factory(
		&mut self,
		name: impl Into<String>,
		factory: impl Fn() -> Result<ModuleValue, PluginFault> + Send + Sync + 'static,
	) {
		self.entries
			.insert(name.into(), Entry::Factory(Box::new(factory)));
	}

	pub(crate) fn resolve(&self, name: &str) -> Option<Result<ModuleValue, PluginFault>> {
		match self.entries.get(name)? {
			Entry::Value(value) => Some(Ok(value.clone())),
			Entry::Factory(factory) => Some(factory()),
		}
	}
}
