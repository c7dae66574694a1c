// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

pub use k8s_openapi::api::core::v1::{
	ConfigMap, ConfigMapVolumeSource, Container, ContainerState, ContainerStateTerminated,
	ContainerStatus, EmptyDirVolumeSource, EnvVar, Namespace, Pod, PodSpec, PodStatus,
	ServiceAccount, Volume, VolumeMount,
};
pub use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Kinds of cluster objects a conformance run creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
	Namespace,
	ServiceAccount,
	ClusterRole,
	ClusterRoleBinding,
	ConfigMap,
	Pod,
}

impl ResourceKind {
	/// Whether objects of this kind live inside a namespace.
	pub fn is_namespaced(self) -> bool {
		matches!(
			self,
			ResourceKind::ServiceAccount | ResourceKind::ConfigMap | ResourceKind::Pod
		)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ResourceKind::Namespace => "Namespace",
			ResourceKind::ServiceAccount => "ServiceAccount",
			ResourceKind::ClusterRole => "ClusterRole",
			ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
			ResourceKind::ConfigMap => "ConfigMap",
			ResourceKind::Pod => "Pod",
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A typed cluster object, one variant per [`ResourceKind`].
///
/// Keeps [`crate::K8sClient`] object-safe while still carrying the full
/// k8s-openapi structs through create calls.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClusterObject {
	Namespace(Namespace),
	ServiceAccount(ServiceAccount),
	ClusterRole(ClusterRole),
	ClusterRoleBinding(ClusterRoleBinding),
	ConfigMap(ConfigMap),
	Pod(Pod),
}

impl ClusterObject {
	pub fn kind(&self) -> ResourceKind {
		match self {
			ClusterObject::Namespace(_) => ResourceKind::Namespace,
			ClusterObject::ServiceAccount(_) => ResourceKind::ServiceAccount,
			ClusterObject::ClusterRole(_) => ResourceKind::ClusterRole,
			ClusterObject::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
			ClusterObject::ConfigMap(_) => ResourceKind::ConfigMap,
			ClusterObject::Pod(_) => ResourceKind::Pod,
		}
	}

	pub fn metadata(&self) -> &ObjectMeta {
		match self {
			ClusterObject::Namespace(o) => &o.metadata,
			ClusterObject::ServiceAccount(o) => &o.metadata,
			ClusterObject::ClusterRole(o) => &o.metadata,
			ClusterObject::ClusterRoleBinding(o) => &o.metadata,
			ClusterObject::ConfigMap(o) => &o.metadata,
			ClusterObject::Pod(o) => &o.metadata,
		}
	}

	pub fn name(&self) -> &str {
		self.metadata().name.as_deref().unwrap_or_default()
	}

	pub fn namespace(&self) -> Option<&str> {
		self.metadata().namespace.as_deref()
	}
}

/// Reference to a single object, used in logs and warnings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
	pub kind: ResourceKind,
	pub name: String,
	pub namespace: Option<String>,
}

impl ObjectRef {
	pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: Option<&str>) -> Self {
		Self {
			kind,
			name: name.into(),
			namespace: namespace.map(str::to_string),
		}
	}

	pub fn from_meta(kind: ResourceKind, meta: &ObjectMeta) -> Self {
		Self::new(
			kind,
			meta.name.clone().unwrap_or_default(),
			meta.namespace.as_deref(),
		)
	}
}

impl fmt::Display for ObjectRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
			None => write!(f, "{}/{}", self.kind, self.name),
		}
	}
}

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
	pub follow: bool,
	pub timestamps: bool,
	/// Only return lines at or after this instant (second precision on the server).
	pub since_time: Option<DateTime<Utc>>,
	pub tail: Option<i64>,
}

/// A pinned stream of raw log bytes from a container.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;
