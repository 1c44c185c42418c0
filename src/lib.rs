//! Conflux - cascading configuration and plugin resolution for file
//! processors.
//!
//! For every input file the engine determines the effective set of plugins,
//! their options, and shared settings by walking the file's ancestor
//! directories, merging rc files and a manifest field, and resolving
//! plugin/preset references (by name, by path, or injected directly) into
//! loaded, validated, invoked units. A single bad plugin degrades only the
//! file(s) that depend on it; the run always completes with an exit code.
//!
//! # Example
//!
//! ```no_run
//! use conflux::processor::{NoopProcessor, Processor, ProcessorFactory};
//! use conflux::run::{RunOptions, run};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let factory: Arc<dyn ProcessorFactory> =
//!     Arc::new(|| Box::new(NoopProcessor) as Box<dyn Processor>);
//!
//! let mut options = RunOptions::new(factory, std::env::current_dir().unwrap());
//! options.files.push(PathBuf::from("."));
//! options.extensions.push(String::from("txt"));
//! options.rc_name = Some(String::from(".confluxrc.toml"));
//! options.package_field = Some(String::from("conflux"));
//!
//! let summary = run(options, &mut std::io::stderr()).unwrap();
//! std::process::exit(summary.exit_code);
//! ```

pub mod config;
pub mod error;
pub mod module;
pub mod plugin;
pub mod processor;
pub mod run;

pub use error::{EngineError, Result};
