// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration validation rules.

use tracing::warn;

use crate::runtime::SounderConfig;
use crate::ConfigError;

/// Validate the configuration.
///
/// Returns Ok(()) if valid, or the first failing rule.
pub fn validate_config(config: &SounderConfig) -> Result<(), ConfigError> {
	validate_selection(config)?;
	validate_run(config)?;
	validate_timeouts(config)?;
	validate_retry(config)?;

	Ok(())
}

/// `--conformance` pins the focus, so an explicit focus alongside it is ambiguous.
pub fn validate_selection(config: &SounderConfig) -> Result<(), ConfigError> {
	if let (true, Some(focus)) = (config.selection.conformance, &config.selection.focus) {
		return Err(ConfigError::ConflictingSelection {
			focus: focus.clone(),
		});
	}
	Ok(())
}

fn validate_run(config: &SounderConfig) -> Result<(), ConfigError> {
	let run = &config.run;

	if !is_dns1123_label(&run.namespace) {
		return Err(ConfigError::invalid_value(
			"run.namespace",
			format!("{:?} is not a valid DNS-1123 label", run.namespace),
		));
	}

	if run.parallel == 0 {
		return Err(ConfigError::invalid_value("run.parallel", "must be at least 1"));
	}

	if run.verbosity > 10 {
		warn!(verbosity = run.verbosity, "verbosity above 10 is unusual");
	}

	if let Some(ref list) = run.test_repo_list {
		if !list.exists() {
			return Err(ConfigError::invalid_value(
				"run.test_repo_list",
				format!("{} does not exist", list.display()),
			));
		}
	}

	for name in run.extra_artifacts.iter().chain(run.status_file.iter()) {
		if !is_plain_file_name(name) {
			return Err(ConfigError::invalid_value(
				"run.extra_artifacts",
				format!("{name:?} must be a plain file name inside the results directory"),
			));
		}
	}

	Ok(())
}

fn validate_timeouts(config: &SounderConfig) -> Result<(), ConfigError> {
	let t = &config.timeouts;

	for (field, value) in [
		("timeouts.run_secs", t.run),
		("timeouts.startup_secs", t.startup),
		("timeouts.poll_interval_secs", t.poll_interval),
		("timeouts.api_call_secs", t.api_call),
	] {
		if value.is_zero() {
			return Err(ConfigError::invalid_value(field, "must be greater than 0"));
		}
	}

	if t.poll_interval > t.run {
		return Err(ConfigError::invalid_value(
			"timeouts.poll_interval_secs",
			"cannot be greater than run_secs",
		));
	}

	Ok(())
}

fn validate_retry(config: &SounderConfig) -> Result<(), ConfigError> {
	let retry = &config.retry;

	if retry.max_attempts == 0 {
		return Err(ConfigError::invalid_value(
			"retry.max_attempts",
			"must be at least 1",
		));
	}

	if retry.max_attempts > 20 {
		return Err(ConfigError::invalid_value(
			"retry.max_attempts",
			"must be at most 20 (unreasonably high)",
		));
	}

	if retry.backoff_factor < 1.0 {
		return Err(ConfigError::invalid_value(
			"retry.backoff_factor",
			"must be at least 1.0",
		));
	}

	if retry.backoff_factor > 10.0 {
		return Err(ConfigError::invalid_value(
			"retry.backoff_factor",
			"must be at most 10.0",
		));
	}

	if retry.base_delay > retry.max_delay {
		return Err(ConfigError::invalid_value(
			"retry.base_delay",
			"cannot be greater than max_delay",
		));
	}

	Ok(())
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends, at most 63 chars.
pub fn is_dns1123_label(s: &str) -> bool {
	if s.is_empty() || s.len() > 63 {
		return false;
	}
	let bytes = s.as_bytes();
	let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
	alnum(bytes[0])
		&& alnum(bytes[bytes.len() - 1])
		&& bytes.iter().all(|&b| alnum(b) || b == b'-')
}

fn is_plain_file_name(name: &str) -> bool {
	!name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}
