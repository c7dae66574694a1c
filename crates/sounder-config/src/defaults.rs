// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Default configuration file generation.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::ConfigError;

/// Default configuration file template.
///
/// This template is written to ~/.config/sounder/config.toml when no user config exists.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"#
# Sounder Configuration File
# Location: ~/.config/sounder/config.toml
#
# This file was auto-generated with sensible defaults.
# Every key can also be set with a SOUNDER_* environment variable or a CLI flag.
#

# =============================================================================
# Cluster Connection
# =============================================================================

[cluster]
# Path to a kubeconfig file. Defaults to $KUBECONFIG or ~/.kube/config.
# kubeconfig = "/home/me/.kube/config"

# Kubeconfig context to use. Defaults to the current context.
# context = "kind-kind"

# =============================================================================
# Run Settings
# =============================================================================

[run]
# Namespace created for the conformance workload
namespace = "conformance"

# Number of parallel ginkgo nodes inside the workload
parallel = 1

# Verbosity of the e2e framework
verbosity = 4

# Where artifacts are written. Defaults to the current directory.
# output_dir = "/tmp/sounder"

# Artifact layout: "per-run" (<output_dir>/<run id>/) or "flat"
output_layout = "per-run"

# Leave cluster resources in place after the run for inspection
keep_resources = false

# Exit with code 2 when the run passed but an artifact could not be fetched
fail_on_missing_artifacts = false

# YAML file with e2e registry overrides (KUBE_TEST_REPO_LIST)
# test_repo_list = "/etc/sounder/repo-list.yaml"

# Single registry override for all e2e images (KUBE_TEST_REPO)
# test_repo = "registry.example.com"

# Additional files to collect from the results directory
# extra_artifacts = ["serial-1.log"]

# =============================================================================
# Images
# =============================================================================

[images]
# Conformance image. Defaults to registry.k8s.io/conformance:<server version>.
# conformance = "registry.k8s.io/conformance:v1.32.0"

busybox = "registry.k8s.io/e2e-test-images/busybox:1.36.1-1"

# =============================================================================
# Test Selection
# =============================================================================

[selection]
# Run the [Conformance] tagged tests. Cannot be combined with focus.
# conformance = true

# focus = "sig-network"
# skip = "\\[Serial\\]"

# =============================================================================
# Timeouts (seconds)
# =============================================================================

[timeouts]
# Maximum time to wait for the suite to finish
run_secs = 21600

# Maximum time for the conformance container to start
startup_secs = 600

# Interval between pod status checks
poll_interval_secs = 10

# Time the log stream may keep flushing after the suite finished
log_drain_secs = 30

# Time cleanup waits for the namespace to disappear
cleanup_wait_secs = 120

# Time a single API request may take before it counts as failed
api_call_secs = 30

# =============================================================================
# Logging Configuration
# =============================================================================

[logging]
# Log level: error, warn, info, debug, trace
level = "info"

# Log format: pretty, json, compact
format = "pretty"

# =============================================================================
# Retry Configuration
# =============================================================================

[retry]
# Maximum log stream reconnects
max_attempts = 5

# Initial delay before first retry (in milliseconds)
base_delay_ms = 500

# Maximum delay cap (in milliseconds)
max_delay_ms = 30000

# Exponential backoff multiplier
backoff_factor = 2.0

# Add randomization to delays
jitter = true
"#;

/// Ensure the config directory exists and create a default config file if none exists.
///
/// Returns `true` if a new config file was created, `false` if one already existed.
pub fn ensure_default_config(config_file_path: &Path) -> Result<bool, ConfigError> {
	if config_file_path.exists() {
		debug!(path = %config_file_path.display(), "config file already exists");
		return Ok(false);
	}

	if let Some(parent) = config_file_path.parent() {
		if !parent.exists() {
			debug!(path = %parent.display(), "creating config directory");
			fs::create_dir_all(parent)?;
		}
	}

	info!(path = %config_file_path.display(), "creating default config file");
	fs::write(config_file_path, DEFAULT_CONFIG_TEMPLATE)?;

	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::ConfigLayer;
	use crate::paths::PathsConfig;
	use crate::runtime::SounderConfig;
	use crate::validation::validate_config;
	use tempfile::tempdir;

	#[test]
	fn test_default_config_template_is_valid_toml() {
		let result: Result<ConfigLayer, _> = toml::from_str(DEFAULT_CONFIG_TEMPLATE);
		assert!(
			result.is_ok(),
			"Default config template should be valid TOML: {:?}",
			result.err()
		);
	}

	#[test]
	fn test_default_template_matches_builtin_defaults() {
		let layer: ConfigLayer = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
		let from_template = SounderConfig::from_layer(layer, PathsConfig::default()).unwrap();
		let builtin = SounderConfig::from_layer(ConfigLayer::default(), PathsConfig::default()).unwrap();

		validate_config(&from_template).unwrap();
		assert_eq!(from_template.run.namespace, builtin.run.namespace);
		assert_eq!(from_template.run.parallel, builtin.run.parallel);
		assert_eq!(from_template.images.busybox, builtin.images.busybox);
		assert_eq!(from_template.timeouts.run, builtin.timeouts.run);
		assert_eq!(from_template.timeouts.api_call, builtin.timeouts.api_call);
		assert_eq!(from_template.retry.max_attempts, builtin.retry.max_attempts);
	}

	#[test]
	fn test_ensure_default_config_creates_file() {
		let dir = tempdir().unwrap();
		let config_path = dir.path().join("sounder/config.toml");

		assert!(!config_path.exists());

		let created = ensure_default_config(&config_path).unwrap();
		assert!(created);
		assert!(config_path.exists());

		let contents = fs::read_to_string(&config_path).unwrap();
		assert!(contents.contains("[run]"));
		assert!(contents.contains("namespace"));
	}

	#[test]
	fn test_ensure_default_config_does_not_overwrite() {
		let dir = tempdir().unwrap();
		let config_path = dir.path().join("config.toml");

		fs::write(&config_path, "# existing config\n").unwrap();

		let created = ensure_default_config(&config_path).unwrap();
		assert!(!created);

		let contents = fs::read_to_string(&config_path).unwrap();
		assert_eq!(contents, "# existing config\n");
	}
}
