// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration registry - manages sources and merges layers.

use tracing::{debug, info, warn};

use crate::layer::ConfigLayer;
use crate::paths::PathsConfig;
use crate::runtime::SounderConfig;
use crate::sources::ConfigSource;
use crate::validation::validate_config;
use crate::ConfigError;

/// Registry that manages configuration sources and merges them.
pub struct ConfigRegistry {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigRegistry {
	/// Create a new empty registry.
	pub fn new() -> Self {
		Self {
			sources: Vec::new(),
		}
	}

	/// Register a configuration source.
	pub fn register(&mut self, source: Box<dyn ConfigSource>) {
		debug!(source = source.name(), precedence = ?source.precedence(), "registering config source");
		self.sources.push(source);
	}

	/// Load configuration from all sources, merge, and validate.
	///
	/// Sources are sorted by precedence (lowest first) and merged
	/// so higher precedence sources override lower ones.
	pub fn load(&self, paths: PathsConfig) -> Result<SounderConfig, ConfigError> {
		let mut sorted_sources: Vec<_> = self.sources.iter().collect();
		sorted_sources.sort_by_key(|s| s.precedence());

		info!(
			source_count = sorted_sources.len(),
			"loading configuration from sources"
		);

		let mut merged = ConfigLayer::default();
		for source in &sorted_sources {
			match source.load() {
				Ok(layer) => {
					debug!(source = source.name(), "merging config layer");
					merged.merge(layer);
				}
				Err(e) if source.required() => return Err(e),
				Err(e) => {
					warn!(source = source.name(), error = %e, "failed to load source, skipping");
				}
			}
		}

		let config = SounderConfig::from_layer(merged, paths)?;

		validate_config(&config)?;

		info!(
			namespace = %config.run.namespace,
			parallel = config.run.parallel,
			dry_run = config.run.dry_run,
			log_level = ?config.logging.level,
			"configuration loaded successfully"
		);

		Ok(config)
	}

	/// Get the number of registered sources.
	pub fn source_count(&self) -> usize {
		self.sources.len()
	}
}

impl Default for ConfigRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::{RunLayer, SelectionLayer};
	use crate::sources::{DefaultsSource, FileSource, Precedence};

	struct MockSource {
		name: &'static str,
		precedence: Precedence,
		layer: ConfigLayer,
	}

	impl ConfigSource for MockSource {
		fn name(&self) -> &'static str {
			self.name
		}
		fn precedence(&self) -> Precedence {
			self.precedence
		}
		fn load(&self) -> Result<ConfigLayer, ConfigError> {
			Ok(self.layer.clone())
		}
	}

	fn namespace_layer(ns: &str) -> ConfigLayer {
		ConfigLayer {
			run: Some(RunLayer {
				namespace: Some(ns.to_string()),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_registry_registers_sources() {
		let mut registry = ConfigRegistry::new();
		assert_eq!(registry.source_count(), 0);

		registry.register(Box::new(DefaultsSource));
		assert_eq!(registry.source_count(), 1);
	}

	#[test]
	fn test_registry_loads_with_defaults() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));

		let config = registry.load(PathsConfig::default()).unwrap();
		assert_eq!(config.run.namespace, "conformance");
	}

	/// Test that sources are merged in precedence order.
	#[test]
	fn test_precedence_merge_order() {
		let mut registry = ConfigRegistry::new();

		// Add in wrong order - registry should sort
		registry.register(Box::new(MockSource {
			name: "cli",
			precedence: Precedence::Cli,
			layer: namespace_layer("from-cli"),
		}));
		registry.register(Box::new(MockSource {
			name: "env",
			precedence: Precedence::Environment,
			layer: namespace_layer("from-env"),
		}));
		registry.register(Box::new(MockSource {
			name: "user",
			precedence: Precedence::UserFile,
			layer: namespace_layer("from-user"),
		}));

		let config = registry.load(PathsConfig::default()).unwrap();
		assert_eq!(config.run.namespace, "from-cli");
	}

	#[test]
	fn test_conflicting_selection_across_layers_fails() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(MockSource {
			name: "user",
			precedence: Precedence::UserFile,
			layer: ConfigLayer {
				selection: Some(SelectionLayer {
					focus: Some("sig-cli".to_string()),
					..Default::default()
				}),
				..Default::default()
			},
		}));
		registry.register(Box::new(MockSource {
			name: "cli",
			precedence: Precedence::Cli,
			layer: ConfigLayer {
				selection: Some(SelectionLayer {
					conformance: Some(true),
					..Default::default()
				}),
				..Default::default()
			},
		}));

		let err = registry.load(PathsConfig::default()).unwrap_err();
		assert!(matches!(err, ConfigError::ConflictingSelection { .. }));
	}

	#[test]
	fn test_broken_optional_file_is_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "not = [valid").unwrap();

		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(FileSource::custom(
			path,
			Precedence::SystemFile,
			"system",
		)));
		assert!(registry.load(PathsConfig::default()).is_ok());
	}

	#[test]
	fn test_broken_explicit_file_fails() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "not = [valid").unwrap();

		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(FileSource::explicit(path)));
		let err = registry.load(PathsConfig::default()).unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}
}
