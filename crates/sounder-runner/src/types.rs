// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run configuration, handles and results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RunWarning;

/// Repository of the upstream conformance image; tags follow the server version.
pub const CONFORMANCE_REPOSITORY: &str = "registry.k8s.io/conformance";
pub const DEFAULT_CONFORMANCE_IMAGE: &str = "registry.k8s.io/conformance:v1.32.0";

/// Unique identifier for a run, using UUID7 (time-ordered).
///
/// Also the value of the `sounder.dev/run-id` label on every object the
/// run creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(uuid7::Uuid);

impl RunId {
	/// Create a new run ID with UUID7.
	pub fn new() -> Self {
		Self(uuid7::uuid7())
	}
}

impl Default for RunId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for RunId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for RunId {
	type Err = uuid7::ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let uuid = s.parse::<uuid7::Uuid>()?;
		Ok(Self(uuid))
	}
}

/// Where fetched artifacts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactLayout {
	#[default]
	PerRun,
	Flat,
}

/// Whether an incomplete artifact set spoils a passing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitCodePolicy {
	pub fail_on_missing_artifacts: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunTimeouts {
	/// Maximum wall time for the workload to reach a terminal phase.
	pub run: Duration,
	/// Maximum time for the conformance container to start.
	pub startup: Duration,
	pub poll_interval: Duration,
	/// How long the log stream may keep flushing after the phase is terminal.
	pub log_drain: Duration,
	/// How long cleanup and resource replacement wait for deletions.
	pub cleanup_wait: Duration,
	/// Upper bound on a single API request.
	pub api_call: Duration,
}

impl Default for RunTimeouts {
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

/// Backoff for container start checks and log reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
	/// Maximum consecutive log stream reconnects.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryPolicy {
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

/// Immutable input for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
	pub namespace: String,
	pub conformance_image: String,
	pub busybox_image: String,
	/// Focus regex, already resolved from conformance mode.
	pub focus: String,
	pub skip: Option<String>,
	pub parallel: u32,
	pub verbosity: u32,
	/// Raw YAML registry override list, stored in a config map.
	pub test_repo_list: Option<String>,
	pub test_repo: Option<String>,
	pub output_dir: PathBuf,
	pub layout: ArtifactLayout,
	pub dry_run: bool,
	pub keep_resources: bool,
	pub extra_artifacts: Vec<String>,
	pub status_file: Option<String>,
	pub exit_policy: ExitCodePolicy,
	pub timeouts: RunTimeouts,
	pub retry: RetryPolicy,
}

impl Default for RunConfig {
	fn default() -> Self {
		Self {
			namespace: "conformance".to_string(),
			conformance_image: DEFAULT_CONFORMANCE_IMAGE.to_string(),
			busybox_image: "registry.k8s.io/e2e-test-images/busybox:1.36.1-1".to_string(),
			focus: r"\[Conformance\]".to_string(),
			skip: None,
			parallel: 1,
			verbosity: 4,
			test_repo_list: None,
			test_repo: None,
			output_dir: PathBuf::from("."),
			layout: ArtifactLayout::default(),
			dry_run: false,
			keep_resources: false,
			extra_artifacts: Vec::new(),
			status_file: None,
			exit_policy: ExitCodePolicy::default(),
			timeouts: RunTimeouts::default(),
			retry: RetryPolicy::default(),
		}
	}
}

impl RunConfig {
	/// Local directory that receives this run's artifacts.
	pub fn artifact_dir(&self, run_id: &RunId) -> PathBuf {
		match self.layout {
			ArtifactLayout::PerRun => self.output_dir.join(run_id.to_string()),
			ArtifactLayout::Flat => self.output_dir.clone(),
		}
	}
}

/// The created (or simulated) workload pod.
#[derive(Debug, Clone)]
pub struct WorkloadHandle {
	pub run_id: RunId,
	pub namespace: String,
	pub pod_name: String,
	pub created_at: DateTime<Utc>,
	pub config: Arc<RunConfig>,
	pub simulated: bool,
}

/// Observed workload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Pending,
	Running,
	Succeeded,
	Failed,
	/// API unreachable or ambiguous reading.
	Unknown,
}

impl Phase {
	pub fn is_terminal(self) -> bool {
		matches!(self, Phase::Succeeded | Phase::Failed)
	}

	/// Position in the lifecycle. `Unknown` has none.
	pub(crate) fn rank(self) -> Option<u8> {
		match self {
			Phase::Pending => Some(0),
			Phase::Running => Some(1),
			Phase::Succeeded | Phase::Failed => Some(2),
			Phase::Unknown => None,
		}
	}
}

impl std::fmt::Display for Phase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Phase::Pending => "Pending",
			Phase::Running => "Running",
			Phase::Succeeded => "Succeeded",
			Phase::Failed => "Failed",
			Phase::Unknown => "Unknown",
		};
		f.write_str(s)
	}
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalPhase {
	Succeeded,
	Failed,
	Timeout,
	Unknown,
	Cancelled,
}

impl std::fmt::Display for TerminalPhase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			TerminalPhase::Succeeded => "Succeeded",
			TerminalPhase::Failed => "Failed",
			TerminalPhase::Timeout => "Timeout",
			TerminalPhase::Unknown => "Unknown",
			TerminalPhase::Cancelled => "Cancelled",
		};
		f.write_str(s)
	}
}

/// Accumulated output of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
	pub run_id: RunId,
	pub phase: TerminalPhase,
	pub exit_code: i32,
	pub container_exit_code: Option<i32>,
	pub artifact_dir: PathBuf,
	pub artifacts: Vec<PathBuf>,
	pub warnings: Vec<RunWarning>,
	pub simulated: bool,
	/// Rendered YAML of every object, populated for dry runs.
	pub manifests: Vec<String>,
}
