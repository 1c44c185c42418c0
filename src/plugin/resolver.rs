use crate::config::types::{Fragment, PluginDeclaration, PluginRef};
use crate::module::loader::{ModuleCache, ModuleLoader, cache_key, preset_base};
use crate::plugin::Plugin;
use crate::plugin::validate::{Loaded, classify};
use crate::processor::{Message, Processor};
use serde_json::Value;
use std::sync::Arc;

/// A declaration carried through load and validation, ready to invoke.
pub struct ResolvedPlugin {
	pub reference: PluginRef,
	pub plugin: Arc<dyn Plugin>,
	pub options: Option<Value>,
}

/// Attach every declaration to the processor, in order.
///
/// Each failure — a missing module, a load-time failure, an invalid export,
/// an invocation fault — costs exactly one `Error` message on the file and
/// never aborts the remaining declarations.
pub fn attach_all(
	declarations: &[PluginDeclaration],
	processor: &mut dyn Processor,
	loader: &dyn ModuleLoader,
	cache: &ModuleCache,
	messages: &mut Vec<Message>,
) {
	let mut session = AttachSession {
		processor,
		loader,
		cache,
		messages,
	};
	for declaration in declarations {
		session.attach(declaration, &mut Vec::new());
	}
}

/// One file's attachment pass.
struct AttachSession<'a> {
	processor: &'a mut dyn Processor,
	loader: &'a dyn ModuleLoader,
	cache: &'a ModuleCache,
	messages: &'a mut Vec<Message>,
}

impl AttachSession<'_> {
	/// `visiting` is the in-progress reference chain of the current preset
	/// expansion, used to detect cycles.
	fn attach(&mut self, declaration: &PluginDeclaration, visiting: &mut Vec<String>) {
		let reference = match &declaration.reference {
			PluginRef::Inline(plugin) => {
				self.invoke(&ResolvedPlugin {
					reference: declaration.reference.clone(),
					plugin: plugin.clone(),
					options: declaration.options.clone(),
				});
				return;
			}
			PluginRef::Name(reference) => reference,
		};

		let value = match self.cache.load(self.loader, reference, &declaration.base) {
			Ok(value) => value,
			Err(error) => {
				self.messages
					.push(Message::error(format!("Error: {error}")));
				return;
			}
		};

		match classify(value, reference) {
			Err(invalid) => self
				.messages
				.push(Message::error(format!("Error: {invalid}"))),
			Ok(Loaded::Plugin(plugin)) => self.invoke(&ResolvedPlugin {
				reference: declaration.reference.clone(),
				plugin,
				options: declaration.options.clone(),
			}),
			Ok(Loaded::Preset(fragment)) => {
				self.expand(reference.clone(), &fragment, declaration, visiting);
			}
		}
	}

	/// Invoke one resolved plugin, catching its fault.
	fn invoke(&mut self, resolved: &ResolvedPlugin) {
		if let Err(fault) = resolved.plugin.apply(self.processor, resolved.options.as_ref()) {
			self.messages
				.push(Message::error(format!("Error: {fault}")));
		}
	}

	/// A declaration that resolved to a preset: attach its constituents
	/// instead. The preset itself is never invoked.
	fn expand(
		&mut self,
		reference: String,
		fragment: &Fragment,
		declaration: &PluginDeclaration,
		visiting: &mut Vec<String>,
	) {
		let key = cache_key(&reference, &declaration.base);
		if visiting.contains(&key) {
			self.messages.push(Message::error(format!(
				"Error: Preset cycle detected at `{reference}`"
			)));
			return;
		}
		visiting.push(key);

		let base = preset_base(&reference, &declaration.base);
		for spec in &fragment.plugins {
			let nested = PluginDeclaration::from_spec(spec, &base);
			self.attach(&nested, visiting);
		}
		for nested_reference in &fragment.presets {
			let nested = PluginDeclaration {
				reference: PluginRef::Name(nested_reference.clone()),
				options: None,
				base: base.clone(),
			};
			self.attach(&nested, visiting);
		}

		visiting.pop();
	}
}
