use crate::config::reader::{self, ReadContext};
use crate::config::types::{
	EffectiveConfig, Fragment, LoadedFragment, Overrides, PluginDeclaration, PluginRef,
};
use crate::module::loader::{ModuleCache, ModuleLoader, cache_key, preset_base};
use crate::plugin::validate::{Loaded, classify};
use crate::processor::Message;
use serde_json::{Map, Value};
use std::path::Path;

/// Everything the cascade needs besides the target file.
pub struct CascadeContext<'a> {
	/// The run's working directory; the walk stops here (inclusive).
	pub root: &'a Path,

	/// Per-directory source lookup.
	pub read: ReadContext<'a>,

	/// Loader and cache used to expand preset references.
	pub loader: &'a dyn ModuleLoader,
	pub cache: &'a ModuleCache,
}

/// Resolve the effective configuration for one file.
///
/// Fragments are collected nearest-first from the file's directory up to the
/// root (inclusive), presets are expanded inline, and everything is merged:
/// nearer settings override farther ones per key, plugin declarations are
/// deduplicated by reference with the nearest declaration's options winning
/// and first-appearance order preserved. Caller overrides merge last.
///
/// Failures along the way (unparseable sources, broken presets, cycles)
/// become `Error` messages on the returned configuration; they never abort
/// resolution, and settings already merged from sibling fragments survive.
pub fn resolve(file: &Path, ctx: &CascadeContext, overrides: &Overrides) -> EffectiveConfig {
	let mut messages = Vec::new();
	let mut fragments = Vec::new();

	let mut dir = file.parent().map(Path::to_path_buf);
	while let Some(current) = dir {
		let (loaded, mut found) = reader::read_dir(&current, &ctx.read);
		messages.append(&mut found);
		if let Some(fragment) = loaded {
			fragments.push(fragment);
		}

		if current == ctx.root {
			break;
		}
		dir = current.parent().map(Path::to_path_buf);
	}

	merge(&fragments, overrides, ctx, messages)
}

/// A fragment with its presets folded in.
struct Expanded {
	settings: Map<String, Value>,
	plugins: Vec<PluginDeclaration>,
}

fn merge(
	fragments: &[LoadedFragment],
	overrides: &Overrides,
	ctx: &CascadeContext,
	mut messages: Vec<Message>,
) -> EffectiveConfig {
	let mut settings = Map::new();
	let mut plugins: Vec<PluginDeclaration> = Vec::new();

	for loaded in fragments {
		let mut visiting = Vec::new();
		let expanded = expand_fragment(
			&loaded.fragment,
			&loaded.dir,
			ctx,
			&mut visiting,
			&mut messages,
		);

		// Scanning nearest-first: the first writer of a key is the nearest.
		for (key, value) in expanded.settings {
			settings.entry(key).or_insert(value);
		}
		for declaration in expanded.plugins {
			let seen = plugins
				.iter()
				.any(|existing| existing.reference == declaration.reference);
			if !seen {
				plugins.push(declaration);
			}
		}
	}

	// Caller-supplied settings always win.
	for (key, value) in &overrides.settings {
		settings.insert(key.clone(), value.clone());
	}

	// Caller-supplied plugins are always attached; on a reference conflict
	// the caller's options replace the cascaded ones in place.
	for declaration in &overrides.plugins {
		match plugins
			.iter_mut()
			.find(|existing| existing.reference == declaration.reference)
		{
			Some(existing) => existing.options = declaration.options.clone(),
			None => plugins.push(declaration.clone()),
		}
	}

	EffectiveConfig {
		settings,
		plugins,
		messages,
	}
}

/// Fold a fragment's preset references into it, recursively.
///
/// The fragment's own declarations and settings take precedence over what its
/// presets contribute; among presets, declaration order decides. `visiting`
/// is the in-progress reference chain used to detect cycles.
fn expand_fragment(
	fragment: &Fragment,
	base: &Path,
	ctx: &CascadeContext,
	visiting: &mut Vec<String>,
	messages: &mut Vec<Message>,
) -> Expanded {
	let mut expanded = Expanded {
		settings: fragment.settings.clone(),
		plugins: fragment
			.plugins
			.iter()
			.map(|spec| PluginDeclaration::from_spec(spec, base))
			.collect(),
	};

	for reference in &fragment.presets {
		let key = cache_key(reference, base);
		if visiting.contains(&key) {
			messages.push(Message::error(format!(
				"Error: Preset cycle detected at `{reference}`"
			)));
			continue;
		}

		let value = match ctx.cache.load(ctx.loader, reference, base) {
			Ok(value) => value,
			Err(error) => {
				messages.push(Message::error(format!("Error: {error}")));
				continue;
			}
		};

		match classify(value, reference) {
			Err(invalid) => messages.push(Message::error(format!("Error: {invalid}"))),
			Ok(Loaded::Plugin(_)) => {
				// The classifier admits either; a preset slot holding a
				// plugin is attached like any other declaration.
				expanded.plugins.push(PluginDeclaration {
					reference: PluginRef::Name(reference.clone()),
					options: None,
					base: base.to_path_buf(),
				});
			}
			Ok(Loaded::Preset(sub)) => {
				visiting.push(key);
				let sub_base = preset_base(reference, base);
				let nested = expand_fragment(&sub, &sub_base, ctx, visiting, messages);
				visiting.pop();

				for (key, value) in nested.settings {
					expanded.settings.entry(key).or_insert(value);
				}
				for declaration in nested.plugins {
					let seen = expanded
						.plugins
						.iter()
						.any(|existing| existing.reference == declaration.reference);
					if !seen {
						expanded.plugins.push(declaration);
					}
				}
			}
		}
	}

	expanded
}
