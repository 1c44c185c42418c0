use crate::config::types::{Fragment, LoadedFragment};
use crate::processor::Message;
use crate::run::report::relative_display;
use std::path::Path;

/// Which configuration sources to look for at each directory level.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
	/// rc file name, e.g. `.confluxrc.toml`. `None` disables rc lookup.
	pub rc_name: Option<&'a str>,

	/// Manifest member holding a fragment. `None` disables manifest lookup.
	pub package_field: Option<&'a str>,

	/// Manifest file name, `package.json` by default.
	pub manifest_name: &'a str,

	/// Directory error paths are displayed relative to.
	pub cwd: &'a Path,
}

/// Read the configuration fragment for one directory level.
///
/// The rc file and the manifest field count as one fragment, with the rc file
/// taking precedence. A source that exists but cannot be parsed is reported
/// loudly and does not suppress the other source at the same level: a broken
/// manifest must never look like missing configuration.
pub fn read_dir(dir: &Path, ctx: &ReadContext) -> (Option<LoadedFragment>, Vec<Message>) {
	let mut messages = Vec::new();
	let mut rc = None;
	let mut manifest = None;

	if let Some(name) = ctx.rc_name {
		let path = dir.join(name);
		if path.is_file() {
			match parse_fragment_file(&path) {
				Ok(fragment) => rc = Some((fragment, path)),
				Err(detail) => {
					tracing::debug!("unparseable rc file {}: {detail}", path.display());
					messages.push(Message::error(format!(
						"Error: Cannot parse file `{}`",
						relative_display(&path, ctx.cwd)
					)));
				}
			}
		}
	}

	if let Some(field) = ctx.package_field {
		let path = dir.join(ctx.manifest_name);
		if path.is_file() {
			match read_manifest_field(&path, field) {
				Ok(Some(fragment)) => manifest = Some((fragment, path)),
				Ok(None) => {}
				Err(detail) => {
					tracing::debug!("unparseable manifest {}: {detail}", path.display());
					messages.push(Message::error(format!(
						"Error: Cannot parse file `{}`",
						relative_display(&path, ctx.cwd)
					)));
				}
			}
		}
	}

	let loaded = match (rc, manifest) {
		(Some((rc_fragment, source)), Some((manifest_fragment, _))) => Some(LoadedFragment {
			fragment: merge_level(rc_fragment, manifest_fragment),
			dir: dir.to_path_buf(),
			source,
		}),
		(Some((fragment, source)), None) | (None, Some((fragment, source))) => {
			Some(LoadedFragment {
				fragment,
				dir: dir.to_path_buf(),
				source,
			})
		}
		(None, None) => None,
	};

	if let Some(ref fragment) = loaded {
		tracing::debug!("found configuration {}", fragment.source.display());
	}

	(loaded, messages)
}

/// Parse a fragment file by extension: JSON for `.json`, TOML otherwise.
pub(crate) fn parse_fragment_file(path: &Path) -> Result<Fragment, String> {
	let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
	let value = if path.extension().is_some_and(|ext| ext == "json") {
		serde_json::from_str(&text).map_err(|e| e.to_string())?
	} else {
		let parsed: toml::Value = toml::from_str(&text).map_err(|e| e.to_string())?;
		serde_json::to_value(parsed).map_err(|e| e.to_string())?
	};
	serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Extract the designated field of a JSON manifest. `Ok(None)` when the
/// manifest has no such member; `Err` when the manifest or the member cannot
/// be parsed.
fn read_manifest_field(path: &Path, field: &str) -> Result<Option<Fragment>, String> {
	let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
	let manifest: serde_json::Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;

	match manifest.get(field) {
		None => Ok(None),
		Some(value) => serde_json::from_value(value.clone())
			.map(Some)
			.map_err(|e| e.to_string()),
	}
}

/// Merge the two sources at one directory level, rc winning.
fn merge_level(rc: Fragment, manifest: Fragment) -> Fragment {
	let mut merged = rc;

	for (key, value) in manifest.settings {
		merged.settings.entry(key).or_insert(value);
	}
	for spec in manifest.plugins {
		let seen = merged
			.plugins
			.iter()
			.any(|existing| existing.reference() == spec.reference());
		if !seen {
			merged.plugins.push(spec);
		}
	}
	for preset in manifest.presets {
		if !merged.presets.contains(&preset) {
			merged.presets.push(preset);
		}
	}

	merged
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::fs;

	fn ctx<'a>(cwd: &'a Path) -> ReadContext<'a> {
		ReadContext {
			rc_name: Some(".foorc.toml"),
			package_field: Some("fooConfig"),
			manifest_name: "package.json",
			cwd,
		}
	}

	#[test]
	fn test_read_empty_dir() {
		let dir = tempfile::tempdir().unwrap();
		let (loaded, messages) = read_dir(dir.path(), &ctx(dir.path()));
		assert!(loaded.is_none());
		assert!(messages.is_empty());
	}

	#[test]
	fn test_read_rc_file() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join(".foorc.toml"), "plugins = [\"alpha\"]\n").unwrap();

		let (loaded, messages) = read_dir(dir.path(), &ctx(dir.path()));
		let loaded = loaded.unwrap();
		assert!(messages.is_empty());
		assert_eq!(loaded.fragment.plugins[0].reference(), "alpha");
		assert_eq!(loaded.dir, dir.path());
	}

	#[test]
	fn test_read_manifest_field() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			dir.path().join("package.json"),
			json!({ "name": "x", "fooConfig": { "plugins": ["beta"] } }).to_string(),
		)
		.unwrap();

		let (loaded, messages) = read_dir(dir.path(), &ctx(dir.path()));
		assert!(messages.is_empty());
		assert_eq!(loaded.unwrap().fragment.plugins[0].reference(), "beta");
	}

	#[test]
	fn test_manifest_without_field_is_absent() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			dir.path().join("package.json"),
			json!({ "name": "x" }).to_string(),
		)
		.unwrap();

		let (loaded, messages) = read_dir(dir.path(), &ctx(dir.path()));
		assert!(loaded.is_none());
		assert!(messages.is_empty());
	}

	#[test]
	fn test_malformed_manifest_is_loud() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("package.json"), "{ not json").unwrap();

		let (loaded, messages) = read_dir(dir.path(), &ctx(dir.path()));
		assert!(loaded.is_none());
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].text, "Error: Cannot parse file `package.json`");
	}

	#[test]
	fn test_malformed_manifest_does_not_suppress_rc() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("package.json"), "{ not json").unwrap();
		fs::write(dir.path().join(".foorc.toml"), "plugins = [\"alpha\"]\n").unwrap();

		let (loaded, messages) = read_dir(dir.path(), &ctx(dir.path()));
		assert_eq!(messages.len(), 1);
		assert_eq!(loaded.unwrap().fragment.plugins[0].reference(), "alpha");
	}

	#[test]
	fn test_rc_wins_same_level() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			dir.path().join(".foorc.toml"),
			"settings = { bullet = \"*\" }\nplugins = [[\"alpha\", { limit = 1 }]]\n",
		)
		.unwrap();
		fs::write(
			dir.path().join("package.json"),
			json!({
				"fooConfig": {
					"settings": { "bullet": "-", "spacing": 2 },
					"plugins": [["alpha", { "limit" : 9 }], "beta"]
				}
			})
			.to_string(),
		)
		.unwrap();

		let (loaded, _) = read_dir(dir.path(), &ctx(dir.path()));
		let fragment = loaded.unwrap().fragment;

		// rc value wins, manifest-only keys survive
		assert_eq!(fragment.settings.get("bullet"), Some(&json!("*")));
		assert_eq!(fragment.settings.get("spacing"), Some(&json!(2)));

		// rc declaration first and authoritative; new manifest plugin appended
		assert_eq!(fragment.plugins.len(), 2);
		assert_eq!(fragment.plugins[0].reference(), "alpha");
		assert_eq!(fragment.plugins[0].options(), Some(&json!({ "limit": 1 })));
		assert_eq!(fragment.plugins[1].reference(), "beta");
	}
}
