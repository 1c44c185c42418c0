use crate::config::types::Fragment;
use crate::module::loader::ModuleValue;
use crate::plugin::Plugin;
use serde_json::Value;
use std::sync::Arc;

/// A loaded value, classified once. Everything downstream matches on this
/// instead of re-inspecting the raw value.
pub enum Loaded {
	Plugin(Arc<dyn Plugin>),
	Preset(Fragment),
}

impl std::fmt::Debug for Loaded {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Loaded::Plugin(_) => f.debug_tuple("Plugin").finish_non_exhaustive(),
			Loaded::Preset(fragment) => f.debug_tuple("Preset").field(fragment).finish(),
		}
	}
}

/// A loaded value that is neither invocable nor a preset bundle.
#[derive(Debug, thiserror::Error)]
#[error("Expected preset or plugin, not {value}, at `{context}`")]
pub struct InvalidExport {
	/// Compact rendering of the offending value.
	pub value: String,

	/// The reference that produced it.
	pub context: String,
}

/// Classify a loaded value as a plugin or a preset.
///
/// Runs immediately after a successful load, before any invocation. A data
/// value qualifies as a preset when it is an object carrying any of the
/// fragment keys; anything else (`false`, `null`, plain scalars) is invalid.
pub fn classify(value: ModuleValue, context: &str) -> Result<Loaded, InvalidExport> {
	match value {
		ModuleValue::Callable(plugin) => Ok(Loaded::Plugin(plugin)),
		ModuleValue::Bundle(fragment) => Ok(Loaded::Preset(fragment)),
		ModuleValue::Data(value) => {
			let looks_like_bundle = value.as_object().is_some_and(|object| {
				object.contains_key("plugins")
					|| object.contains_key("presets")
					|| object.contains_key("settings")
			});

			if looks_like_bundle
				&& let Ok(fragment) = serde_json::from_value::<Fragment>(value.clone())
			{
				return Ok(Loaded::Preset(fragment));
			}

			Err(InvalidExport {
				value: render(&value),
				context: context.to_string(),
			})
		}
	}
}

fn render(value: &Value) -> String {
	serde_json::to_string(value).unwrap_or_else(|_| String::from("<unprintable>"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_classify_callable() {
		let plugin: Arc<dyn Plugin> = Arc::new(
			|_: &mut dyn crate::processor::Processor,
			 _: Option<&Value>|
			 -> Result<(), crate::plugin::PluginFault> { Ok(()) },
		);
		let loaded = classify(ModuleValue::Callable(plugin), "alpha").unwrap();
		assert!(matches!(loaded, Loaded::Plugin(_)));
	}

	#[test]
	fn test_classify_data_bundle() {
		let value = json!({ "plugins": ["alpha"], "settings": { "bullet": "*" } });
		let loaded = classify(ModuleValue::Data(value), "./preset.json").unwrap();
		match loaded {
			Loaded::Preset(fragment) => {
				assert_eq!(fragment.plugins.len(), 1);
				assert_eq!(fragment.settings.get("bullet"), Some(&json!("*")));
			}
			Loaded::Plugin(_) => panic!("expected a preset"),
		}
	}

	#[test]
	fn test_classify_false_is_invalid() {
		let err = classify(ModuleValue::Data(json!(false)), "test.js").unwrap_err();
		assert_eq!(
			err.to_string(),
			"Expected preset or plugin, not false, at `test.js`"
		);
	}

	#[test]
	fn test_classify_null_is_invalid() {
		let err = classify(ModuleValue::Data(Value::Null), "empty").unwrap_err();
		assert_eq!(
			err.to_string(),
			"Expected preset or plugin, not null, at `empty`"
		);
	}

	#[test]
	fn test_classify_object_without_fragment_keys_is_invalid() {
		let err = classify(ModuleValue::Data(json!({ "name": "x" })), "thing").unwrap_err();
		assert_eq!(
			err.to_string(),
			"Expected preset or plugin, not {\"name\":\"x\"}, at `thing`"
		);
	}

	#[test]
	fn test_classify_malformed_bundle_is_invalid() {
		// Carries a fragment key but the shape is wrong.
		let err = classify(ModuleValue::Data(json!({ "plugins": 42 })), "broken").unwrap_err();
		assert!(err.to_string().starts_with("Expected preset or plugin"));
	}
}
