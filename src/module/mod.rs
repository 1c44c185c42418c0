//! Module loading: named registry entries and path-referenced files.

pub mod loader;
pub mod registry;

pub use loader::{
	LoadError, ModuleCache, ModuleLoader, ModuleValue, RegistryLoader, cache_key,
	is_path_reference, preset_base,
};
pub use registry::Registry;
