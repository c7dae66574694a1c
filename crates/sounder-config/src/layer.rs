// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer for merging from multiple sources.

use serde::Deserialize;
use std::path::PathBuf;

/// Partial configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayer {
	#[serde(default)]
	pub cluster: Option<ClusterLayer>,
	#[serde(default)]
	pub run: Option<RunLayer>,
	#[serde(default)]
	pub images: Option<ImagesLayer>,
	#[serde(default)]
	pub selection: Option<SelectionLayer>,
	#[serde(default)]
	pub timeouts: Option<TimeoutsLayer>,
	#[serde(default)]
	pub logging: Option<LoggingLayer>,
	#[serde(default)]
	pub retry: Option<RetryLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterLayer {
	#[serde(default)]
	pub kubeconfig: Option<PathBuf>,
	#[serde(default)]
	pub context: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunLayer {
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default)]
	pub parallel: Option<u32>,
	#[serde(default)]
	pub verbosity: Option<u32>,
	#[serde(default)]
	pub output_dir: Option<PathBuf>,
	#[serde(default)]
	pub output_layout: Option<String>,
	#[serde(default)]
	pub dry_run: Option<bool>,
	#[serde(default)]
	pub keep_resources: Option<bool>,
	#[serde(default)]
	pub fail_on_missing_artifacts: Option<bool>,
	#[serde(default)]
	pub test_repo_list: Option<PathBuf>,
	#[serde(default)]
	pub test_repo: Option<String>,
	#[serde(default)]
	pub extra_artifacts: Option<Vec<String>>,
	#[serde(default)]
	pub status_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesLayer {
	#[serde(default)]
	pub conformance: Option<String>,
	#[serde(default)]
	pub busybox: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionLayer {
	#[serde(default)]
	pub conformance: Option<bool>,
	#[serde(default)]
	pub focus: Option<String>,
	#[serde(default)]
	pub skip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsLayer {
	#[serde(default)]
	pub run_secs: Option<u64>,
	#[serde(default)]
	pub startup_secs: Option<u64>,
	#[serde(default)]
	pub poll_interval_secs: Option<u64>,
	#[serde(default)]
	pub log_drain_secs: Option<u64>,
	#[serde(default)]
	pub cleanup_wait_secs: Option<u64>,
	#[serde(default)]
	pub api_call_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingLayer {
	#[serde(default)]
	pub level: Option<String>,
	#[serde(default)]
	pub file: Option<PathBuf>,
	#[serde(default)]
	pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryLayer {
	#[serde(default)]
	pub max_attempts: Option<u32>,
	#[serde(default)]
	pub base_delay_ms: Option<u64>,
	#[serde(default)]
	pub max_delay_ms: Option<u64>,
	#[serde(default)]
	pub backoff_factor: Option<f64>,
	#[serde(default)]
	pub jitter: Option<bool>,
}

impl ConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ConfigLayer) {
		merge_option(&mut self.cluster, other.cluster, ClusterLayer::merge);
		merge_option(&mut self.run, other.run, RunLayer::merge);
		merge_option(&mut self.images, other.images, ImagesLayer::merge);
		merge_option(&mut self.selection, other.selection, SelectionLayer::merge);
		merge_option(&mut self.timeouts, other.timeouts, TimeoutsLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingLayer::merge);
		merge_option(&mut self.retry, other.retry, RetryLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

fn take<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

impl ClusterLayer {
	fn merge(&mut self, other: ClusterLayer) {
		take(&mut self.kubeconfig, other.kubeconfig);
		take(&mut self.context, other.context);
	}
}

impl RunLayer {
	fn merge(&mut self, other: RunLayer) {
		take(&mut self.namespace, other.namespace);
		take(&mut self.parallel, other.parallel);
		take(&mut self.verbosity, other.verbosity);
		take(&mut self.output_dir, other.output_dir);
		take(&mut self.output_layout, other.output_layout);
		take(&mut self.dry_run, other.dry_run);
		take(&mut self.keep_resources, other.keep_resources);
		take(
			&mut self.fail_on_missing_artifacts,
			other.fail_on_missing_artifacts,
		);
		take(&mut self.test_repo_list, other.test_repo_list);
		take(&mut self.test_repo, other.test_repo);
		take(&mut self.extra_artifacts, other.extra_artifacts);
		take(&mut self.status_file, other.status_file);
	}
}

impl ImagesLayer {
	fn merge(&mut self, other: ImagesLayer) {
		take(&mut self.conformance, other.conformance);
		take(&mut self.busybox, other.busybox);
	}
}

impl SelectionLayer {
	fn merge(&mut self, other: SelectionLayer) {
		take(&mut self.conformance, other.conformance);
		take(&mut self.focus, other.focus);
		take(&mut self.skip, other.skip);
	}
}

impl TimeoutsLayer {
	fn merge(&mut self, other: TimeoutsLayer) {
		take(&mut self.run_secs, other.run_secs);
		take(&mut self.startup_secs, other.startup_secs);
		take(&mut self.poll_interval_secs, other.poll_interval_secs);
		take(&mut self.log_drain_secs, other.log_drain_secs);
		take(&mut self.cleanup_wait_secs, other.cleanup_wait_secs);
		take(&mut self.api_call_secs, other.api_call_secs);
	}
}

impl LoggingLayer {
	fn merge(&mut self, other: LoggingLayer) {
		take(&mut self.level, other.level);
		take(&mut self.file, other.file);
		take(&mut self.format, other.format);
	}
}

impl RetryLayer {
	fn merge(&mut self, other: RetryLayer) {
		take(&mut self.max_attempts, other.max_attempts);
		take(&mut self.base_delay_ms, other.base_delay_ms);
		take(&mut self.max_delay_ms, other.max_delay_ms);
		take(&mut self.backoff_factor, other.backoff_factor);
		take(&mut self.jitter, other.jitter);
	}
}
