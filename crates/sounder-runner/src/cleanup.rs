// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deleting everything a run created.

use std::sync::Arc;
use std::time::Duration;

use sounder_k8s::{K8sClient, ObjectRef, ResourceKind};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::call::limited;
use crate::error::RunWarning;
use crate::labels::{managed_selector, run_selector};
use crate::types::RunId;

/// Reverse creation order.
pub const DELETION_ORDER: [ResourceKind; 6] = [
	ResourceKind::Pod,
	ResourceKind::ConfigMap,
	ResourceKind::ClusterRoleBinding,
	ResourceKind::ClusterRole,
	ResourceKind::ServiceAccount,
	ResourceKind::Namespace,
];

/// Which objects a cleanup removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTarget {
	Run(RunId),
	/// Every object carrying the managed label, whatever run created it.
	AllManaged,
}

impl CleanupTarget {
	fn selector(&self) -> String {
		match self {
			CleanupTarget::Run(id) => run_selector(id),
			CleanupTarget::AllManaged => managed_selector(),
		}
	}
}

impl std::fmt::Display for CleanupTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CleanupTarget::Run(id) => write!(f, "run {id}"),
			CleanupTarget::AllManaged => f.write_str("all managed objects"),
		}
	}
}

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CleanupManager {
	client: Arc<dyn K8sClient>,
	/// Upper bound on waiting for namespaces to disappear. Zero skips the wait.
	wait: Duration,
	poll: Duration,
	call_timeout: Duration,
}

impl CleanupManager {
	pub fn new(client: Arc<dyn K8sClient>, wait: Duration, poll: Duration) -> Self {
		Self {
			client,
			wait,
			poll,
			call_timeout: DEFAULT_CALL_TIMEOUT,
		}
	}

	/// Upper bound on each list or delete request.
	pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = timeout;
		self
	}

	/// Delete every labelled object for `target`.
	///
	/// Absent and already terminating objects are skipped. Every other
	/// failure becomes a warning and the remaining deletions still run.
	pub async fn cleanup(&self, target: &CleanupTarget) -> Vec<RunWarning> {
		let selector = target.selector();
		let mut warnings = Vec::new();
		let mut deleted = 0usize;
		let mut namespaces_pending = 0usize;
		let mut unreachable = false;

		info!(target = %target, selector = %selector, "starting cleanup");

		for kind in DELETION_ORDER {
			let listed = limited(
				self.call_timeout,
				self.client.list_metadata(kind, None, &selector),
			)
			.await;
			let objects = match listed {
				Ok(objects) => objects,
				Err(e) => {
					unreachable |= e.is_unreachable();
					warn!(kind = %kind, error = %e, "failed to list objects for cleanup");
					warnings.push(RunWarning::Cleanup {
						target: kind.to_string(),
						reason: format!("list failed: {e}"),
					});
					continue;
				}
			};

			for meta in objects {
				let object = ObjectRef::from_meta(kind, &meta);
				if meta.deletion_timestamp.is_some() {
					debug!(object = %object, "already terminating, skipping");
					if kind == ResourceKind::Namespace {
						namespaces_pending += 1;
					}
					continue;
				}

				let result = limited(
					self.call_timeout,
					self
						.client
						.delete(kind, &object.name, object.namespace.as_deref(), 0),
				)
				.await;
				match result {
					Ok(()) => {
						debug!(object = %object, "deleted");
						deleted += 1;
						if kind == ResourceKind::Namespace {
							namespaces_pending += 1;
						}
					}
					Err(e) if e.is_not_found() => {
						debug!(object = %object, "already absent");
					}
					Err(e) => {
						unreachable |= e.is_unreachable();
						warn!(object = %object, error = %e, "failed to delete object");
						warnings.push(RunWarning::Cleanup {
							target: object.to_string(),
							reason: e.to_string(),
						});
					}
				}
			}
		}

		if unreachable {
			debug!("cluster unreachable, not waiting for namespaces");
		} else if namespaces_pending > 0 && !self.wait.is_zero() {
			self.wait_for_namespaces(&selector).await;
		}

		info!(
			target = %target,
			deleted,
			warnings = warnings.len(),
			"cleanup complete"
		);
		warnings
	}

	/// Bounded wait for labelled namespaces to go away. Only logs on timeout.
	async fn wait_for_namespaces(&self, selector: &str) {
		let deadline = Instant::now() + self.wait;
		loop {
			let listed = limited(
				self.call_timeout,
				self.client.list_metadata(ResourceKind::Namespace, None, selector),
			)
			.await;
			match listed {
				Ok(remaining) if remaining.is_empty() => return,
				Ok(remaining) => {
					debug!(remaining = remaining.len(), "waiting for namespaces to terminate");
				}
				Err(e) if e.is_unreachable() => {
					warn!(error = %e, "cluster unreachable, not waiting for namespaces");
					return;
				}
				Err(e) => {
					debug!(error = %e, "namespace listing failed while waiting");
				}
			}

			let now = Instant::now();
			if now >= deadline {
				warn!(
					wait_secs = self.wait.as_secs(),
					"namespaces still terminating, not waiting any longer"
				);
				return;
			}
			tokio::time::sleep_until((now + self.poll).min(deadline)).await;
		}
	}
}
