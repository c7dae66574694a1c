// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Polling the workload until it reaches a terminal phase.

use std::sync::Arc;

use sounder_k8s::{K8sClient, Pod};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::call::{bounded, call_deadline};
use crate::manifests::CONFORMANCE_CONTAINER;
use crate::types::{Phase, TerminalPhase, WorkloadHandle};

/// A single reading of the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseReading {
	pub phase: Phase,
	pub container_exit_code: Option<i32>,
}

/// Derive the workload phase from a pod.
///
/// The conformance container being terminated is decisive even while the
/// output container keeps the pod `Running`.
pub fn classify_pod(pod: &Pod) -> PhaseReading {
	let terminated = pod
		.status
		.as_ref()
		.and_then(|s| s.container_statuses.as_ref())
		.and_then(|cs| cs.iter().find(|c| c.name == CONFORMANCE_CONTAINER))
		.and_then(|c| c.state.as_ref())
		.and_then(|s| s.terminated.as_ref());

	if let Some(t) = terminated {
		let phase = if t.exit_code == 0 {
			Phase::Succeeded
		} else {
			Phase::Failed
		};
		return PhaseReading {
			phase,
			container_exit_code: Some(t.exit_code),
		};
	}

	let phase = match pod
		.status
		.as_ref()
		.and_then(|s| s.phase.as_deref())
		.unwrap_or("Unknown")
	{
		"Pending" => Phase::Pending,
		"Running" => Phase::Running,
		"Succeeded" => Phase::Succeeded,
		"Failed" => Phase::Failed,
		_ => Phase::Unknown,
	};

	PhaseReading {
		phase,
		container_exit_code: None,
	}
}

/// Outcome of waiting for the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseOutcome {
	pub phase: TerminalPhase,
	/// Last non-`Unknown` phase observed.
	pub last_observed: Phase,
	pub container_exit_code: Option<i32>,
}

/// Sole authority for whether the run is done.
pub struct PhaseWaiter {
	client: Arc<dyn K8sClient>,
	handle: WorkloadHandle,
}

impl PhaseWaiter {
	pub fn new(client: Arc<dyn K8sClient>, handle: WorkloadHandle) -> Self {
		Self { client, handle }
	}

	/// Poll until terminal, the run timeout elapses, or `cancel` fires.
	pub async fn wait(&self, cancel: &CancellationToken) -> PhaseOutcome {
		let timeouts = &self.handle.config.timeouts;
		let deadline = Instant::now() + timeouts.run;
		let mut current = Phase::Pending;
		let mut seen = false;
		let mut exit_code = None;

		loop {
			let result = bounded(
				cancel,
				call_deadline(timeouts.api_call, deadline),
				self.client.get_pod(&self.handle.pod_name, &self.handle.namespace),
			)
			.await;
			let Some(result) = result else {
				info!(pod = %self.handle.pod_name, "phase wait cancelled");
				return PhaseOutcome {
					phase: TerminalPhase::Cancelled,
					last_observed: current,
					container_exit_code: exit_code,
				};
			};

			match result {
				Ok(pod) => {
					let reading = classify_pod(&pod);
					if reading.phase != Phase::Unknown {
						seen = true;
					}
					if reading.phase != Phase::Unknown && reading.phase.rank() >= current.rank() {
						if reading.phase != current {
							info!(
								pod = %self.handle.pod_name,
								from = %current,
								phase = %reading.phase,
								"workload phase changed"
							);
						}
						current = reading.phase;
						exit_code = reading.container_exit_code.or(exit_code);
					} else if reading.phase != Phase::Unknown {
						debug!(phase = %reading.phase, current = %current, "ignoring backwards phase reading");
					}

					if current.is_terminal() {
						let phase = if current == Phase::Succeeded {
							TerminalPhase::Succeeded
						} else {
							TerminalPhase::Failed
						};
						return PhaseOutcome {
							phase,
							last_observed: current,
							container_exit_code: exit_code,
						};
					}
				}
				Err(e) if e.is_not_found() => {
					warn!(pod = %self.handle.pod_name, "workload pod disappeared");
					return PhaseOutcome {
						phase: TerminalPhase::Unknown,
						last_observed: current,
						container_exit_code: exit_code,
					};
				}
				Err(e) => {
					debug!(pod = %self.handle.pod_name, error = %e, "transient phase reading failure");
				}
			}

			let now = Instant::now();
			if now >= deadline {
				let phase = if seen {
					TerminalPhase::Timeout
				} else {
					TerminalPhase::Unknown
				};
				warn!(pod = %self.handle.pod_name, last = %current, outcome = %phase, "run timeout elapsed");
				return PhaseOutcome {
					phase,
					last_observed: current,
					container_exit_code: exit_code,
				};
			}

			let wake = (now + timeouts.poll_interval).min(deadline);
			tokio::select! {
				_ = cancel.cancelled() => {
					info!(pod = %self.handle.pod_name, "phase wait cancelled");
					return PhaseOutcome {
						phase: TerminalPhase::Cancelled,
						last_observed: current,
						container_exit_code: exit_code,
					};
				}
				_ = tokio::time::sleep_until(wake) => {}
			}
		}
	}
}
