// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s client abstraction for Sounder conformance runs.
//!
//! This crate provides:
//! - A trait-based K8s client abstraction for testability
//! - Production implementation using the kube crate
//! - Common types for object management, log streaming and file reads

mod client;
mod error;
mod kube_client;
mod types;

pub use client::K8sClient;
pub use error::{K8sError, K8sResult};
pub use kube_client::KubeClient;
pub use types::{
	ClusterObject, ClusterRole, ClusterRoleBinding, ConfigMap, ConfigMapVolumeSource, Container,
	ContainerState, ContainerStateTerminated, ContainerStatus, EmptyDirVolumeSource, EnvVar,
	LogOptions, LogStream, Namespace, ObjectMeta, ObjectRef, PolicyRule, Pod, PodSpec, PodStatus,
	ResourceKind, RoleRef, ServiceAccount, Subject, Volume, VolumeMount,
};
