// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for Sounder.
//!
//! This crate provides:
//! - XDG Base Directory compliant path resolution
//! - Layered configuration from multiple sources
//! - TOML configuration file parsing
//! - Environment variable overrides
//! - Configuration validation
//! - Registry override list loading

pub mod defaults;
pub mod error;
pub mod layer;
pub mod paths;
pub mod registry;
pub mod repo_list;
pub mod runtime;
pub mod sources;
pub mod validation;

pub use defaults::{ensure_default_config, DEFAULT_CONFIG_TEMPLATE};
pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use paths::PathsConfig;
pub use registry::ConfigRegistry;
pub use repo_list::{load_repo_list, RepoList};
pub use runtime::{
	LogFormat, LogLevel, OutputLayout, SelectionConfig, SounderConfig, CONFORMANCE_FOCUS,
	DEFAULT_BUSYBOX_IMAGE, DEFAULT_NAMESPACE,
};
pub use sources::{CliOverrides, ConfigSource, Precedence};

/// Load configuration with CLI overrides.
///
/// If no user config file exists, a default one is created at
/// `~/.config/sounder/config.toml`. An explicit `--config` file replaces
/// the user file and is never auto-created.
pub fn load_config_with_cli(cli: CliOverrides) -> Result<SounderConfig, ConfigError> {
	let paths = paths::resolve_xdg_paths()?;

	let mut registry = ConfigRegistry::new();

	registry.register(Box::new(sources::DefaultsSource));
	registry.register(Box::new(sources::FileSource::system(&paths)));
	match cli.config_file.clone() {
		Some(path) => registry.register(Box::new(sources::FileSource::explicit(path))),
		None => {
			defaults::ensure_default_config(&paths.user_config_file)?;
			registry.register(Box::new(sources::FileSource::user(&paths)));
		}
	}
	registry.register(Box::new(sources::EnvSource));
	registry.register(Box::new(sources::CliSource::new(cli)));

	registry.load(paths)
}
