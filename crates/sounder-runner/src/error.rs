// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run error and warning types.

use std::path::PathBuf;

use sounder_k8s::{K8sError, ResourceKind};
use thiserror::Error;

/// Fatal errors that abort the remaining stages of a run.
#[derive(Debug, Error)]
pub enum RunError {
	#[error("cluster unreachable: {0}")]
	ClusterUnreachable(String),

	#[error("{kind} {} already exists: {reason}", display_name(.name, .namespace))]
	ResourceConflict {
		kind: ResourceKind,
		name: String,
		namespace: Option<String>,
		reason: String,
	},

	#[error("workload never started within {timeout_secs}s: {reason}")]
	WorkloadNeverStarted { timeout_secs: u64, reason: String },

	#[error("invalid manifest: {0}")]
	InvalidManifest(String),

	#[error("run cancelled before the workload started")]
	Cancelled,

	#[error("K8s error: {0}")]
	K8s(K8sError),
}

fn display_name(name: &str, namespace: &Option<String>) -> String {
	match namespace {
		Some(ns) => format!("{ns}/{name}"),
		None => name.to_string(),
	}
}

impl From<K8sError> for RunError {
	fn from(err: K8sError) -> Self {
		if err.is_unreachable() {
			RunError::ClusterUnreachable(err.to_string())
		} else {
			RunError::K8s(err)
		}
	}
}

/// Non-fatal problems collected on the run result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunWarning {
	#[error("log stream interrupted after {attempts} reconnect attempts: {reason}")]
	StreamInterrupted { attempts: u32, reason: String },

	#[error("workload did not finish within {timeout_secs}s")]
	PhaseTimeout { timeout_secs: u64 },

	#[error("could not fetch artifact {file}: {reason}")]
	ArtifactFetch { file: String, reason: String },

	#[error("overwrote existing artifact {}", .path.display())]
	ArtifactOverwritten { path: PathBuf },

	#[error("cleanup of {target} failed: {reason}")]
	Cleanup { target: String, reason: String },
}

/// A run that ended with a fatal error. Cleanup has already run.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunAborted {
	#[source]
	pub error: RunError,
	pub warnings: Vec<RunWarning>,
	pub exit_code: i32,
}
