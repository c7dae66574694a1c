// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{ClusterObject, LogOptions, LogStream, ObjectMeta, Pod, ResourceKind};

/// Trait for K8s client operations.
///
/// This abstraction allows for easy mocking in tests while providing
/// a clean interface for the operations a conformance run needs.
/// `namespace` is ignored for cluster-scoped kinds.
#[async_trait]
pub trait K8sClient: Send + Sync {
	/// Git version reported by the API server (e.g. `v1.32.1`).
	async fn server_version(&self) -> Result<String, K8sError>;

	/// Create an object. Returns `AlreadyExists` on a name collision.
	async fn create(&self, object: ClusterObject) -> Result<ObjectMeta, K8sError>;

	/// Fetch the metadata of a single object.
	async fn get_metadata(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
	) -> Result<ObjectMeta, K8sError>;

	/// Merge the given labels into an existing object's labels.
	async fn relabel(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		labels: BTreeMap<String, String>,
	) -> Result<(), K8sError>;

	/// Delete an object. Returns `NotFound` if it does not exist.
	async fn delete(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		grace_period_seconds: u32,
	) -> Result<(), K8sError>;

	/// List metadata of objects matching a label selector.
	///
	/// For namespaced kinds `None` lists across all namespaces.
	async fn list_metadata(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
		label_selector: &str,
	) -> Result<Vec<ObjectMeta>, K8sError>;

	/// Get a specific pod by name from the specified namespace.
	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError>;

	/// Stream logs from a container in a pod.
	async fn stream_logs(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		opts: LogOptions,
	) -> Result<LogStream, K8sError>;

	/// Read a whole file out of a running container.
	///
	/// Returns `FileNotFound` when the file does not exist.
	async fn read_file(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		path: &str,
	) -> Result<Vec<u8>, K8sError>;
}
