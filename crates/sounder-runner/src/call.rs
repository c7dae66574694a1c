// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounding single API requests.

use std::future::Future;
use std::time::Duration;

use sounder_k8s::{K8sError, K8sResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Await `request` until `deadline`. `None` once `cancel` fires.
///
/// A request still pending at the deadline resolves to [`K8sError::Timeout`].
pub(crate) async fn bounded<T>(
	cancel: &CancellationToken,
	deadline: Instant,
	request: impl Future<Output = K8sResult<T>>,
) -> Option<K8sResult<T>> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => None,
		res = tokio::time::timeout_at(deadline, request) => {
			Some(res.unwrap_or_else(|_| Err(K8sError::Timeout)))
		}
	}
}

/// Like [`bounded`] without a cancel token, for work that must finish.
pub(crate) async fn limited<T>(
	timeout: Duration,
	request: impl Future<Output = K8sResult<T>>,
) -> K8sResult<T> {
	tokio::time::timeout(timeout, request)
		.await
		.unwrap_or_else(|_| Err(K8sError::Timeout))
}

/// Deadline for one request: `now + per_call`, never past `overall`.
pub(crate) fn call_deadline(per_call: Duration, overall: Instant) -> Instant {
	(Instant::now() + per_call).min(overall)
}
