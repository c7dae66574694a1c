// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turning loaded configuration into the runner's immutable input.

use sounder_config::{OutputLayout, SounderConfig};
use sounder_runner::{
	ArtifactLayout, ExitCodePolicy, RetryPolicy, RunConfig, RunTimeouts, CONFORMANCE_REPOSITORY,
};

/// Conformance image matching an API server version.
///
/// Build metadata (`+k3s1` and similar) is not a valid tag character and
/// is dropped.
pub fn conformance_image_for(server_version: &str) -> String {
	let version = server_version
		.split('+')
		.next()
		.unwrap_or(server_version)
		.trim();
	format!("{CONFORMANCE_REPOSITORY}:{version}")
}

pub fn to_run_config(
	config: &SounderConfig,
	conformance_image: String,
	test_repo_list: Option<String>,
) -> RunConfig {
	let run = &config.run;
	RunConfig {
		namespace: run.namespace.clone(),
		conformance_image,
		busybox_image: config.images.busybox.clone(),
		focus: config.selection.effective_focus(),
		skip: config.selection.skip.clone(),
		parallel: run.parallel,
		verbosity: run.verbosity,
		test_repo_list,
		test_repo: run.test_repo.clone(),
		output_dir: run.output_dir.clone(),
		layout: match run.output_layout {
			OutputLayout::PerRun => ArtifactLayout::PerRun,
			OutputLayout::Flat => ArtifactLayout::Flat,
		},
		dry_run: run.dry_run,
		keep_resources: run.keep_resources,
		extra_artifacts: run.extra_artifacts.clone(),
		status_file: run.status_file.clone(),
		exit_policy: ExitCodePolicy {
			fail_on_missing_artifacts: run.fail_on_missing_artifacts,
		},
		timeouts: RunTimeouts {
			run: config.timeouts.run,
			startup: config.timeouts.startup,
			poll_interval: config.timeouts.poll_interval,
			log_drain: config.timeouts.log_drain,
			cleanup_wait: config.timeouts.cleanup_wait,
			api_call: config.timeouts.api_call,
		},
		retry: RetryPolicy {
			max_attempts: config.retry.max_attempts,
			base_delay: config.retry.base_delay,
			max_delay: config.retry.max_delay,
			backoff_factor: config.retry.backoff_factor,
			jitter: config.retry.jitter,
		},
	}
}
