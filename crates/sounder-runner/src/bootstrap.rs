// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Creating (or adopting) the cluster objects a run needs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sounder_k8s::{ClusterObject, K8sClient, K8sError, K8sResult, ObjectMeta, ResourceKind};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::call::bounded;
use crate::error::RunError;
use crate::labels::{is_managed, owning_run, run_labels};
use crate::manifests::build_manifests;
use crate::types::{RunConfig, RunId, WorkloadHandle};

const REPLACE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Output of a successful bootstrap.
#[derive(Debug, Clone)]
pub struct Bootstrapped {
	pub handle: WorkloadHandle,
	/// Rendered YAML of every object. Only filled in for dry runs.
	pub manifests: Vec<String>,
}

pub struct Bootstrapper {
	client: Arc<dyn K8sClient>,
	run_id: RunId,
	config: Arc<RunConfig>,
}

impl Bootstrapper {
	pub fn new(client: Arc<dyn K8sClient>, run_id: RunId, config: Arc<RunConfig>) -> Self {
		Self {
			client,
			run_id,
			config,
		}
	}

	/// Create every object in order and return the workload handle.
	///
	/// A dry run validates and renders the objects without any cluster call.
	pub async fn bootstrap(&self, cancel: &CancellationToken) -> Result<Bootstrapped, RunError> {
		let created_at = Utc::now();
		let manifests = build_manifests(&self.run_id, &self.config, created_at)?;
		let pod_name = manifests.pod.metadata.name.clone().unwrap_or_default();

		let handle = WorkloadHandle {
			run_id: self.run_id,
			namespace: self.config.namespace.clone(),
			pod_name,
			created_at,
			config: Arc::clone(&self.config),
			simulated: self.config.dry_run,
		};

		if self.config.dry_run {
			let rendered = manifests.render_yaml()?;
			info!(
				run_id = %self.run_id,
				namespace = %handle.namespace,
				objects = rendered.len(),
				"dry run, no objects created"
			);
			return Ok(Bootstrapped {
				handle,
				manifests: rendered,
			});
		}

		for object in manifests.objects() {
			if cancel.is_cancelled() {
				info!(run_id = %self.run_id, "bootstrap cancelled");
				return Err(RunError::Cancelled);
			}
			self.ensure(object, cancel).await?;
		}

		info!(
			run_id = %self.run_id,
			namespace = %handle.namespace,
			pod = %handle.pod_name,
			"bootstrap complete"
		);
		Ok(Bootstrapped {
			handle,
			manifests: Vec::new(),
		})
	}

	async fn ensure(&self, object: ClusterObject, cancel: &CancellationToken) -> Result<(), RunError> {
		let kind = object.kind();
		match self.call(cancel, self.client.create(object.clone())).await? {
			Ok(_) => {
				info!(
					run_id = %self.run_id,
					kind = %kind,
					name = %object.name(),
					namespace = ?object.namespace(),
					"created"
				);
				Ok(())
			}
			Err(K8sError::AlreadyExists { .. }) => self.adopt(object, cancel).await,
			Err(e) => Err(e.into()),
		}
	}

	/// Take over a same-named object left behind by an earlier run.
	async fn adopt(&self, object: ClusterObject, cancel: &CancellationToken) -> Result<(), RunError> {
		let kind = object.kind();
		let name = object.name().to_string();
		let namespace = object.namespace().map(str::to_string);

		let existing = match self
			.call(cancel, self.client.get_metadata(kind, &name, namespace.as_deref()))
			.await?
		{
			Ok(meta) => meta,
			Err(e) if e.is_not_found() => {
				debug!(kind = %kind, name = %name, "conflicting object vanished, creating again");
				self.call(cancel, self.client.create(object)).await??;
				return Ok(());
			}
			Err(e) => return Err(e.into()),
		};

		if !is_managed(&existing) {
			warn!(kind = %kind, name = %name, namespace = ?namespace, "refusing to adopt foreign object");
			return Err(self.conflict(&object, "not managed by sounder"));
		}

		let previous_run = owning_run(&existing).unwrap_or("unknown").to_string();
		let terminating = existing.deletion_timestamp.is_some();

		match kind {
			ResourceKind::Namespace
			| ResourceKind::ServiceAccount
			| ResourceKind::ClusterRole
			| ResourceKind::ClusterRoleBinding => {
				if terminating {
					return Err(self.conflict(&object, "left over from a previous run and still terminating"));
				}
				self
					.call(
						cancel,
						self
							.client
							.relabel(kind, &name, namespace.as_deref(), run_labels(&self.run_id)),
					)
					.await??;
				info!(
					run_id = %self.run_id,
					kind = %kind,
					name = %name,
					previous_run = %previous_run,
					"adopted managed object"
				);
				Ok(())
			}
			ResourceKind::ConfigMap | ResourceKind::Pod => {
				if !terminating {
					match self
						.call(cancel, self.client.delete(kind, &name, namespace.as_deref(), 0))
						.await?
					{
						Ok(()) => {}
						Err(e) if e.is_not_found() => {}
						Err(e) => return Err(e.into()),
					}
				}
				self.wait_gone(&object, &existing, cancel).await?;
				self.call(cancel, self.client.create(object)).await??;
				info!(
					run_id = %self.run_id,
					kind = %kind,
					name = %name,
					previous_run = %previous_run,
					"replaced managed object"
				);
				Ok(())
			}
		}
	}

	async fn wait_gone(
		&self,
		object: &ClusterObject,
		existing: &ObjectMeta,
		cancel: &CancellationToken,
	) -> Result<(), RunError> {
		let kind = object.kind();
		let wait = self.config.timeouts.cleanup_wait;
		let deadline = Instant::now() + wait;

		loop {
			match self
				.call(cancel, self.client.get_metadata(kind, object.name(), object.namespace()))
				.await?
			{
				Err(e) if e.is_not_found() => return Ok(()),
				Err(e) => return Err(e.into()),
				Ok(meta) if meta.uid.is_some() && meta.uid != existing.uid => {
					// Someone recreated it under us.
					return Err(self.conflict(object, "recreated by another client during replacement"));
				}
				Ok(_) => {}
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(self.conflict(
					object,
					&format!("previous object still present after {}s", wait.as_secs()),
				));
			}

			tokio::select! {
				_ = cancel.cancelled() => return Err(RunError::Cancelled),
				_ = tokio::time::sleep_until((now + REPLACE_POLL_INTERVAL).min(deadline)) => {}
			}
		}
	}

	/// One API request bounded by the per-call timeout. Cancellation aborts.
	async fn call<T>(
		&self,
		cancel: &CancellationToken,
		request: impl Future<Output = K8sResult<T>>,
	) -> Result<K8sResult<T>, RunError> {
		bounded(cancel, Instant::now() + self.config.timeouts.api_call, request)
			.await
			.ok_or(RunError::Cancelled)
	}

	fn conflict(&self, object: &ClusterObject, reason: &str) -> RunError {
		RunError::ResourceConflict {
			kind: object.kind(),
			name: object.name().to_string(),
			namespace: object.namespace().map(str::to_string),
			reason: reason.to_string(),
		}
	}
}
