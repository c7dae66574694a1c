// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration types with resolved defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::layer::*;
use crate::paths::PathsConfig;
use crate::ConfigError;

pub const DEFAULT_NAMESPACE: &str = "conformance";
pub const DEFAULT_BUSYBOX_IMAGE: &str = "registry.k8s.io/e2e-test-images/busybox:1.36.1-1";
pub const CONFORMANCE_FOCUS: &str = r"\[Conformance\]";

/// The final, validated configuration for Sounder.
#[derive(Debug, Clone)]
pub struct SounderConfig {
	pub cluster: ClusterConfig,
	pub run: RunSettings,
	pub images: ImagesConfig,
	pub selection: SelectionConfig,
	pub timeouts: TimeoutsConfig,
	pub logging: LoggingConfig,
	pub retry: RetryConfig,

	/// Resolved XDG paths
	pub paths: PathsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
	/// `None` falls back to `KUBECONFIG` / in-cluster discovery.
	pub kubeconfig: Option<PathBuf>,
	pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
	pub namespace: String,
	pub parallel: u32,
	pub verbosity: u32,
	pub output_dir: PathBuf,
	pub output_layout: OutputLayout,
	pub dry_run: bool,
	pub keep_resources: bool,
	pub fail_on_missing_artifacts: bool,
	pub test_repo_list: Option<PathBuf>,
	pub test_repo: Option<String>,
	pub extra_artifacts: Vec<String>,
	/// Sentinel file in the results volume holding the suite's own verdict.
	pub status_file: Option<String>,
}

/// Where fetched artifacts land relative to `output_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
	/// `<output_dir>/<run id>/`
	#[default]
	PerRun,
	/// Directly in `<output_dir>`, replacing earlier files.
	Flat,
}

impl OutputLayout {
	pub fn as_str(&self) -> &'static str {
		match self {
			OutputLayout::PerRun => "per-run",
			OutputLayout::Flat => "flat",
		}
	}
}

impl std::str::FromStr for OutputLayout {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"per-run" | "per_run" | "perrun" => Ok(OutputLayout::PerRun),
			"flat" => Ok(OutputLayout::Flat),
			other => Err(ConfigError::invalid_value(
				"run.output_layout",
				format!("unknown layout {other:?}, expected \"per-run\" or \"flat\""),
			)),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ImagesConfig {
	/// `None` means derive from the API server version.
	pub conformance: Option<String>,
	pub busybox: String,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionConfig {
	pub conformance: bool,
	pub focus: Option<String>,
	pub skip: Option<String>,
}

impl SelectionConfig {
	/// Focus regex handed to the suite. Conformance mode, or no selection
	/// at all, means the `[Conformance]` tag.
	pub fn effective_focus(&self) -> String {
		match (&self.focus, self.conformance) {
			(Some(focus), false) => focus.clone(),
			_ => CONFORMANCE_FOCUS.to_string(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct TimeoutsConfig {
	pub run: Duration,
	pub startup: Duration,
	pub poll_interval: Duration,
	pub log_drain: Duration,
	pub cleanup_wait: Duration,
	/// Upper bound on a single API request.
	pub api_call: Duration,
}

impl Default for TimeoutsConfig {
	fn default() -> Self {
		Self {
			run: Duration::from_secs(6 * 60 * 60),
			startup: Duration::from_secs(600),
			poll_interval: Duration::from_secs(10),
			log_drain: Duration::from_secs(30),
			cleanup_wait: Duration::from_secs(120),
			api_call: Duration::from_secs(30),
		}
	}
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
	pub level: LogLevel,
	pub file: Option<PathBuf>,
	pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
	Error,
	Warn,
	#[default]
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Error => "error",
			LogLevel::Warn => "warn",
			LogLevel::Info => "info",
			LogLevel::Debug => "debug",
			LogLevel::Trace => "trace",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
	Compact,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(30),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: LogLevel::Info,
			file: None,
			format: LogFormat::Pretty,
		}
	}
}

impl SounderConfig {
	/// Build runtime config from a merged layer and paths.
	pub fn from_layer(layer: ConfigLayer, paths: PathsConfig) -> Result<Self, ConfigError> {
		let cluster = build_cluster_config(layer.cluster);
		let run = build_run_settings(layer.run)?;
		let images = build_images_config(layer.images);
		let selection = build_selection_config(layer.selection);
		let timeouts = build_timeouts_config(layer.timeouts);
		let logging = build_logging_config(layer.logging);
		let retry = build_retry_config(layer.retry);

		Ok(Self {
			cluster,
			run,
			images,
			selection,
			timeouts,
			logging,
			retry,
			paths,
		})
	}
}

fn build_cluster_config(layer: Option<ClusterLayer>) -> ClusterConfig {
	let layer = layer.unwrap_or_default();
	ClusterConfig {
		kubeconfig: layer.kubeconfig,
		context: layer.context,
	}
}

fn build_run_settings(layer: Option<RunLayer>) -> Result<RunSettings, ConfigError> {
	let layer = layer.unwrap_or_default();

	let output_dir = match layer.output_dir {
		Some(dir) => dir,
		None => std::env::current_dir()?,
	};

	let output_layout = match layer.output_layout.as_deref() {
		Some(s) => s.parse()?,
		None => OutputLayout::default(),
	};

	Ok(RunSettings {
		namespace: layer
			.namespace
			.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
		parallel: layer.parallel.unwrap_or(1),
		verbosity: layer.verbosity.unwrap_or(4),
		output_dir,
		output_layout,
		dry_run: layer.dry_run.unwrap_or(false),
		keep_resources: layer.keep_resources.unwrap_or(false),
		fail_on_missing_artifacts: layer.fail_on_missing_artifacts.unwrap_or(false),
		test_repo_list: layer.test_repo_list,
		test_repo: layer.test_repo,
		extra_artifacts: layer.extra_artifacts.unwrap_or_default(),
		status_file: layer.status_file,
	})
}

fn build_images_config(layer: Option<ImagesLayer>) -> ImagesConfig {
	let layer = layer.unwrap_or_default();
	ImagesConfig {
		conformance: layer.conformance,
		busybox: layer
			.busybox
			.unwrap_or_else(|| DEFAULT_BUSYBOX_IMAGE.to_string()),
	}
}

fn build_selection_config(layer: Option<SelectionLayer>) -> SelectionConfig {
	let layer = layer.unwrap_or_default();
	SelectionConfig {
		conformance: layer.conformance.unwrap_or(false),
		focus: layer.focus,
		skip: layer.skip,
	}
}

fn build_timeouts_config(layer: Option<TimeoutsLayer>) -> TimeoutsConfig {
	let layer = layer.unwrap_or_default();
	let defaults = TimeoutsConfig::default();
	let secs = |v: Option<u64>, d: Duration| v.map(Duration::from_secs).unwrap_or(d);
	TimeoutsConfig {
		run: secs(layer.run_secs, defaults.run),
		startup: secs(layer.startup_secs, defaults.startup),
		poll_interval: secs(layer.poll_interval_secs, defaults.poll_interval),
		log_drain: secs(layer.log_drain_secs, defaults.log_drain),
		cleanup_wait: secs(layer.cleanup_wait_secs, defaults.cleanup_wait),
		api_call: secs(layer.api_call_secs, defaults.api_call),
	}
}

fn build_logging_config(layer: Option<LoggingLayer>) -> LoggingConfig {
	let layer = layer.unwrap_or_default();
	LoggingConfig {
		level: parse_log_level(layer.level.as_deref()),
		file: layer.file,
		format: parse_log_format(layer.format.as_deref()),
	}
}

fn parse_log_level(s: Option<&str>) -> LogLevel {
	match s {
		Some("error") => LogLevel::Error,
		Some("warn") => LogLevel::Warn,
		Some("info") => LogLevel::Info,
		Some("debug") => LogLevel::Debug,
		Some("trace") => LogLevel::Trace,
		_ => LogLevel::Info,
	}
}

fn parse_log_format(s: Option<&str>) -> LogFormat {
	match s {
		Some("json") => LogFormat::Json,
		Some("compact") => LogFormat::Compact,
		Some("pretty") => LogFormat::Pretty,
		_ => LogFormat::Pretty,
	}
}

fn build_retry_config(layer: Option<RetryLayer>) -> RetryConfig {
	let layer = layer.unwrap_or_default();
	let defaults = RetryConfig::default();
	RetryConfig {
		max_attempts: layer.max_attempts.unwrap_or(defaults.max_attempts),
		base_delay: layer
			.base_delay_ms
			.map(Duration::from_millis)
			.unwrap_or(defaults.base_delay),
		max_delay: layer
			.max_delay_ms
			.map(Duration::from_millis)
			.unwrap_or(defaults.max_delay),
		backoff_factor: layer.backoff_factor.unwrap_or(defaults.backoff_factor),
		jitter: layer.jitter.unwrap_or(defaults.jitter),
	}
}
