// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Driving one run from bootstrap to cleanup.

use std::path::PathBuf;
use std::sync::Arc;

use sounder_k8s::K8sClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactFetcher, FetchReport};
use crate::bootstrap::Bootstrapper;
use crate::cleanup::{CleanupManager, CleanupTarget};
use crate::error::{RunAborted, RunError, RunWarning};
use crate::exit_code;
use crate::logs::{LogSink, LogStreamer};
use crate::phase::{PhaseOutcome, PhaseWaiter};
use crate::types::{RunConfig, RunId, RunResult, TerminalPhase, WorkloadHandle};

pub struct Orchestrator {
	client: Arc<dyn K8sClient>,
	config: Arc<RunConfig>,
	run_id: RunId,
}

impl Orchestrator {
	pub fn new(client: Arc<dyn K8sClient>, config: RunConfig) -> Self {
		Self {
			client,
			config: Arc::new(config),
			run_id: RunId::new(),
		}
	}

	pub fn with_run_id(mut self, run_id: RunId) -> Self {
		self.run_id = run_id;
		self
	}

	pub fn run_id(&self) -> RunId {
		self.run_id
	}

	pub fn config(&self) -> &RunConfig {
		&self.config
	}

	pub fn artifact_dir(&self) -> PathBuf {
		self.config.artifact_dir(&self.run_id)
	}

	/// Bootstrap, observe, fetch and resolve, then clean up whatever happened.
	///
	/// Cleanup is skipped only for dry runs and when resources are kept.
	pub async fn start_run(
		&self,
		sink: &mut dyn LogSink,
		cancel: CancellationToken,
	) -> Result<RunResult, RunAborted> {
		info!(run_id = %self.run_id, namespace = %self.config.namespace, "starting run");

		let mut warnings = Vec::new();
		let outcome = self.run_stages(sink, &cancel, &mut warnings).await;

		// A dry run never touches the cluster, not even to clean up.
		if self.config.dry_run {
			debug!(run_id = %self.run_id, "dry run, skipping cleanup");
		} else if self.config.keep_resources {
			info!(run_id = %self.run_id, "keeping cluster resources for inspection");
		} else {
			warnings.extend(self.cleanup_only(&CleanupTarget::Run(self.run_id)).await);
		}

		for warning in &warnings {
			warn!(run_id = %self.run_id, warning = %warning, "run warning");
		}

		match outcome {
			Ok(mut result) => {
				result.warnings = warnings;
				info!(
					run_id = %self.run_id,
					phase = %result.phase,
					exit_code = result.exit_code,
					"run finished"
				);
				Ok(result)
			}
			Err(error) => {
				let exit_code = exit_code::for_error(&error);
				warn!(run_id = %self.run_id, error = %error, exit_code, "run aborted");
				Err(RunAborted {
					error,
					warnings,
					exit_code,
				})
			}
		}
	}

	/// Remove the objects for `target` without running anything.
	pub async fn cleanup_only(&self, target: &CleanupTarget) -> Vec<RunWarning> {
		CleanupManager::new(
			Arc::clone(&self.client),
			self.config.timeouts.cleanup_wait,
			self.config.timeouts.poll_interval,
		)
		.with_call_timeout(self.config.timeouts.api_call)
		.cleanup(target)
		.await
	}

	async fn run_stages(
		&self,
		sink: &mut dyn LogSink,
		cancel: &CancellationToken,
		warnings: &mut Vec<RunWarning>,
	) -> Result<RunResult, RunError> {
		let bootstrapped = Bootstrapper::new(
			Arc::clone(&self.client),
			self.run_id,
			Arc::clone(&self.config),
		)
		.bootstrap(cancel)
		.await?;
		let handle = bootstrapped.handle;

		if handle.simulated {
			return Ok(RunResult {
				run_id: self.run_id,
				phase: TerminalPhase::Succeeded,
				exit_code: exit_code::EXIT_SUCCEEDED,
				container_exit_code: None,
				artifact_dir: self.artifact_dir(),
				artifacts: Vec::new(),
				warnings: Vec::new(),
				simulated: true,
				manifests: bootstrapped.manifests,
			});
		}

		let observed = self.observe(&handle, sink, cancel, warnings).await?;
		if observed.phase == TerminalPhase::Timeout {
			warnings.push(RunWarning::PhaseTimeout {
				timeout_secs: self.config.timeouts.run.as_secs(),
			});
		}

		let report = if observed.phase == TerminalPhase::Cancelled {
			info!(run_id = %self.run_id, "run cancelled, skipping artifact fetch");
			FetchReport {
				artifact_dir: self.artifact_dir(),
				..Default::default()
			}
		} else {
			ArtifactFetcher::new(Arc::clone(&self.client))
				.fetch(&handle)
				.await
		};
		warnings.extend(report.warnings);

		let (phase, exit_code) = exit_code::resolve(
			observed.phase,
			observed.container_exit_code,
			report.sentinel,
			!report.missing.is_empty(),
			&self.config.exit_policy,
		);

		Ok(RunResult {
			run_id: self.run_id,
			phase,
			exit_code,
			container_exit_code: observed.container_exit_code,
			artifact_dir: report.artifact_dir,
			artifacts: report.artifacts,
			warnings: Vec::new(),
			simulated: false,
			manifests: Vec::new(),
		})
	}

	/// Run the log streamer and phase waiter side by side.
	///
	/// Once the phase is terminal the streamer gets the drain window to
	/// flush, then it is cancelled.
	async fn observe(
		&self,
		handle: &WorkloadHandle,
		sink: &mut dyn LogSink,
		cancel: &CancellationToken,
		warnings: &mut Vec<RunWarning>,
	) -> Result<PhaseOutcome, RunError> {
		let streamer = LogStreamer::new(Arc::clone(&self.client), handle.clone());
		let waiter = PhaseWaiter::new(Arc::clone(&self.client), handle.clone());

		let stream_cancel = cancel.child_token();
		let wait_cancel = cancel.child_token();
		let streamer_done = CancellationToken::new();
		let drain = self.config.timeouts.log_drain;

		let stream_task = async {
			let result = streamer.stream(sink, &stream_cancel).await;
			if matches!(result, Err(RunError::WorkloadNeverStarted { .. })) {
				wait_cancel.cancel();
			}
			streamer_done.cancel();
			result
		};

		let wait_task = async {
			let outcome = waiter.wait(&wait_cancel).await;
			tokio::select! {
				_ = streamer_done.cancelled() => {}
				_ = tokio::time::sleep(drain) => {
					info!(run_id = %self.run_id, drain_secs = drain.as_secs(), "log drain window elapsed");
					stream_cancel.cancel();
				}
			}
			outcome
		};

		let (stream_result, outcome) = tokio::join!(stream_task, wait_task);

		match stream_result {
			Ok(Some(warning)) => warnings.push(warning),
			Ok(None) => {}
			Err(e) => return Err(e),
		}

		Ok(outcome)
	}
}
