// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: files, environment, CLI, defaults.

use std::path::PathBuf;

use tracing::{debug, trace, warn};

use crate::layer::*;
use crate::paths::PathsConfig;
use crate::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	SystemFile = 20,
	UserFile = 30,
	Environment = 50,
	Cli = 60,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	/// Name for logging
	fn name(&self) -> &'static str;

	/// Precedence level
	fn precedence(&self) -> Precedence;

	/// Load configuration layer from this source
	fn load(&self) -> Result<ConfigLayer, ConfigError>;

	/// Whether a load failure aborts the whole registry load.
	fn required(&self) -> bool {
		false
	}
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading defaults");
		// Return empty layer - defaults applied during finalization
		Ok(ConfigLayer::default())
	}
}

/// File-based configuration source (TOML).
pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
	required: bool,
}

impl FileSource {
	/// System config: /etc/sounder/config.toml
	pub fn system(paths: &PathsConfig) -> Self {
		Self {
			path: paths.system_config_file.clone(),
			precedence: Precedence::SystemFile,
			name: "system-config",
			required: false,
		}
	}

	/// User config: ~/.config/sounder/config.toml
	pub fn user(paths: &PathsConfig) -> Self {
		Self {
			path: paths.user_config_file.clone(),
			precedence: Precedence::UserFile,
			name: "user-config",
			required: false,
		}
	}

	/// Explicit `--config` file. It takes the user file's slot and must exist.
	pub fn explicit(path: PathBuf) -> Self {
		Self {
			path,
			precedence: Precedence::UserFile,
			name: "explicit-config",
			required: true,
		}
	}

	/// Custom file path with specified precedence
	pub fn custom(path: PathBuf, precedence: Precedence, name: &'static str) -> Self {
		Self {
			path,
			precedence,
			name,
			required: false,
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}
	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn required(&self) -> bool {
		self.required
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			if self.required {
				return Err(ConfigError::invalid_value(
					"config",
					format!("config file {} does not exist", self.path.display()),
				));
			}
			debug!(path = %self.path.display(), source = self.name, "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading config file");

		let content = std::fs::read_to_string(&self.path)?;
		let layer: ConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!(source = self.name, "parsed config layer");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: SOUNDER_<FIELD>, e.g. `SOUNDER_NAMESPACE`, `SOUNDER_FOCUS`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(layer_from_vars(std::env::vars()))
	}
}

/// Build a layer from `SOUNDER_*` key/value pairs.
pub fn layer_from_vars<I>(vars: I) -> ConfigLayer
where
	I: IntoIterator<Item = (String, String)>,
{
	let mut layer = ConfigLayer::default();

	for (key, value) in vars {
		if !key.starts_with("SOUNDER_") {
			continue;
		}

		let value = value.trim().to_string();
		if value.is_empty() {
			continue;
		}

		trace!(key = %key, "processing env var");

		match key.as_str() {
			"SOUNDER_KUBECONFIG" => cluster(&mut layer).kubeconfig = Some(PathBuf::from(value)),
			"SOUNDER_CONTEXT" => cluster(&mut layer).context = Some(value),

			"SOUNDER_NAMESPACE" => run(&mut layer).namespace = Some(value),
			"SOUNDER_PARALLEL" => run(&mut layer).parallel = parse_env(&key, &value),
			"SOUNDER_VERBOSITY" => run(&mut layer).verbosity = parse_env(&key, &value),
			"SOUNDER_OUTPUT_DIR" => run(&mut layer).output_dir = Some(PathBuf::from(value)),
			"SOUNDER_OUTPUT_LAYOUT" => run(&mut layer).output_layout = Some(value),
			"SOUNDER_DRY_RUN" => run(&mut layer).dry_run = parse_bool(&key, &value),
			"SOUNDER_KEEP_RESOURCES" => run(&mut layer).keep_resources = parse_bool(&key, &value),
			"SOUNDER_TEST_REPO_LIST" => run(&mut layer).test_repo_list = Some(PathBuf::from(value)),
			"SOUNDER_TEST_REPO" => run(&mut layer).test_repo = Some(value),

			"SOUNDER_CONFORMANCE_IMAGE" => images(&mut layer).conformance = Some(value),
			"SOUNDER_BUSYBOX_IMAGE" => images(&mut layer).busybox = Some(value),

			"SOUNDER_FOCUS" => selection(&mut layer).focus = Some(value),
			"SOUNDER_SKIP" => selection(&mut layer).skip = Some(value),

			"SOUNDER_RUN_TIMEOUT_SECS" => {
				layer
					.timeouts
					.get_or_insert_with(TimeoutsLayer::default)
					.run_secs = parse_env(&key, &value);
			}

			"SOUNDER_LOG_LEVEL" => {
				layer
					.logging
					.get_or_insert_with(LoggingLayer::default)
					.level = Some(value);
			}
			"SOUNDER_LOG_FORMAT" => {
				layer
					.logging
					.get_or_insert_with(LoggingLayer::default)
					.format = Some(value);
			}

			"SOUNDER_RETRY_MAX_ATTEMPTS" => {
				layer
					.retry
					.get_or_insert_with(RetryLayer::default)
					.max_attempts = parse_env(&key, &value);
			}

			_ => {
				// Unknown SOUNDER_ variable, ignore
			}
		}
	}

	layer
}

fn cluster(layer: &mut ConfigLayer) -> &mut ClusterLayer {
	layer.cluster.get_or_insert_with(ClusterLayer::default)
}

fn run(layer: &mut ConfigLayer) -> &mut RunLayer {
	layer.run.get_or_insert_with(RunLayer::default)
}

fn images(layer: &mut ConfigLayer) -> &mut ImagesLayer {
	layer.images.get_or_insert_with(ImagesLayer::default)
}

fn selection(layer: &mut ConfigLayer) -> &mut SelectionLayer {
	layer.selection.get_or_insert_with(SelectionLayer::default)
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
	match value.parse() {
		Ok(v) => Some(v),
		Err(_) => {
			warn!(key = %key, value = %value, "ignoring unparseable env var");
			None
		}
	}
}

fn parse_bool(key: &str, value: &str) -> Option<bool> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => {
			warn!(key = %key, value = %value, "ignoring unparseable env var");
			None
		}
	}
}

/// CLI override source.
pub struct CliSource {
	overrides: CliOverrides,
}

/// CLI argument overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub config_file: Option<PathBuf>,
	pub kubeconfig: Option<PathBuf>,
	pub context: Option<String>,
	pub namespace: Option<String>,
	pub parallel: Option<u32>,
	pub verbosity: Option<u32>,
	pub output_dir: Option<PathBuf>,
	pub output_layout: Option<String>,
	pub dry_run: Option<bool>,
	pub keep_resources: Option<bool>,
	pub conformance: Option<bool>,
	pub focus: Option<String>,
	pub skip: Option<String>,
	pub conformance_image: Option<String>,
	pub busybox_image: Option<String>,
	pub test_repo_list: Option<PathBuf>,
	pub test_repo: Option<String>,
	pub run_timeout_secs: Option<u64>,
	pub log_level: Option<String>,
	pub log_format: Option<String>,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading CLI overrides");
		let o = self.overrides.clone();
		let mut layer = ConfigLayer::default();

		if o.kubeconfig.is_some() || o.context.is_some() {
			layer.cluster = Some(ClusterLayer {
				kubeconfig: o.kubeconfig,
				context: o.context,
			});
		}

		let run_layer = RunLayer {
			namespace: o.namespace,
			parallel: o.parallel,
			verbosity: o.verbosity,
			output_dir: o.output_dir,
			output_layout: o.output_layout,
			dry_run: o.dry_run,
			keep_resources: o.keep_resources,
			test_repo_list: o.test_repo_list,
			test_repo: o.test_repo,
			..Default::default()
		};
		layer.run = Some(run_layer);

		if o.conformance_image.is_some() || o.busybox_image.is_some() {
			layer.images = Some(ImagesLayer {
				conformance: o.conformance_image,
				busybox: o.busybox_image,
			});
		}

		if o.conformance.is_some() || o.focus.is_some() || o.skip.is_some() {
			layer.selection = Some(SelectionLayer {
				conformance: o.conformance,
				focus: o.focus,
				skip: o.skip,
			});
		}

		if let Some(secs) = o.run_timeout_secs {
			layer.timeouts = Some(TimeoutsLayer {
				run_secs: Some(secs),
				..Default::default()
			});
		}

		if o.log_level.is_some() || o.log_format.is_some() {
			layer.logging = Some(LoggingLayer {
				level: o.log_level,
				format: o.log_format,
				file: None,
			});
		}

		Ok(layer)
	}
}
