// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::types::ResourceKind;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug, Clone)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: ResourceKind, name: String },

	#[error("{kind} already exists: {name}")]
	AlreadyExists { kind: ResourceKind, name: String },

	#[error("cluster unreachable: {message}")]
	Unreachable { message: String },

	#[error("not authorized: {message}")]
	Unauthorized { message: String },

	#[error("Operation timed out")]
	Timeout,

	#[error("Log stream error: {message}")]
	StreamError { message: String },

	#[error("Exec error: {message}")]
	ExecError { message: String },

	#[error("File not found in container: {path}")]
	FileNotFound { path: String },
}

impl K8sError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}

	/// Connection and credential failures, and requests that never answered.
	/// Retrying these burns the run budget.
	pub fn is_unreachable(&self) -> bool {
		matches!(
			self,
			K8sError::Unreachable { .. } | K8sError::Unauthorized { .. } | K8sError::Timeout
		)
	}

	/// Classify a kube error raised while operating on a named object.
	pub fn from_kube(kind: ResourceKind, name: &str, err: kube::Error) -> Self {
		match err {
			kube::Error::Api(ref resp) if resp.code == 404 => K8sError::NotFound {
				kind,
				name: name.into(),
			},
			kube::Error::Api(ref resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
				K8sError::AlreadyExists {
					kind,
					name: name.into(),
				}
			}
			other => other.into(),
		}
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(ref resp) if resp.code == 401 || resp.code == 403 => {
				K8sError::Unauthorized {
					message: resp.message.clone(),
				}
			}
			kube::Error::Auth(_)
			| kube::Error::InferConfig(_)
			| kube::Error::HyperError(_)
			| kube::Error::Service(_) => K8sError::Unreachable {
				message: err.to_string(),
			},
			_ => K8sError::ApiError {
				message: err.to_string(),
			},
		}
	}
}
