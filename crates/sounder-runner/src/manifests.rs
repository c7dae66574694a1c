// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Object specifications for a conformance run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sounder_k8s::{
	ClusterObject, ClusterRole, ClusterRoleBinding, ConfigMap, ConfigMapVolumeSource, Container,
	EmptyDirVolumeSource, EnvVar, Namespace, ObjectMeta, Pod, PodSpec, PolicyRule, RoleRef,
	ServiceAccount, Subject, Volume, VolumeMount,
};

use crate::error::RunError;
use crate::labels::{run_annotations, run_labels};
use crate::types::{RunConfig, RunId};

pub const POD_NAME: &str = "e2e-conformance-test";
pub const CONFORMANCE_CONTAINER: &str = "conformance-container";
pub const OUTPUT_CONTAINER: &str = "output-container";
pub const REPO_LIST_CONFIG_MAP: &str = "repo-list-config";
pub const REPO_LIST_KEY: &str = "repo-list.yaml";
pub const RESULTS_DIR: &str = "/tmp/results";
const REPO_LIST_DIR: &str = "/tmp/repo-list";
const RESULTS_VOLUME: &str = "output-volume";
const REPO_LIST_VOLUME: &str = "repo-list-volume";

pub fn service_account_name(namespace: &str) -> String {
	format!("{namespace}-serviceaccount")
}

pub fn cluster_role_name(namespace: &str) -> String {
	format!("{namespace}-serviceaccount-role")
}

/// Every object a run creates, in creation order.
#[derive(Debug, Clone)]
pub struct Manifests {
	pub namespace: Namespace,
	pub service_account: ServiceAccount,
	pub cluster_role: ClusterRole,
	pub cluster_role_binding: ClusterRoleBinding,
	pub config_map: Option<ConfigMap>,
	pub pod: Pod,
}

impl Manifests {
	pub fn objects(&self) -> Vec<ClusterObject> {
		let mut objects = vec![
			ClusterObject::Namespace(self.namespace.clone()),
			ClusterObject::ServiceAccount(self.service_account.clone()),
			ClusterObject::ClusterRole(self.cluster_role.clone()),
			ClusterObject::ClusterRoleBinding(self.cluster_role_binding.clone()),
		];
		if let Some(cm) = &self.config_map {
			objects.push(ClusterObject::ConfigMap(cm.clone()));
		}
		objects.push(ClusterObject::Pod(self.pod.clone()));
		objects
	}

	/// One YAML document per object.
	pub fn render_yaml(&self) -> Result<Vec<String>, RunError> {
		self
			.objects()
			.iter()
			.map(|o| {
				serde_yaml::to_string(o).map_err(|e| {
					RunError::InvalidManifest(format!("{} {}: {e}", o.kind(), o.name()))
				})
			})
			.collect()
	}
}

/// Build and validate every object for a run.
pub fn build_manifests(
	run_id: &RunId,
	config: &RunConfig,
	created_at: DateTime<Utc>,
) -> Result<Manifests, RunError> {
	validate(config)?;

	let ns = config.namespace.as_str();
	let meta = |name: String, namespace: Option<&str>| ObjectMeta {
		name: Some(name),
		namespace: namespace.map(str::to_string),
		labels: Some(run_labels(run_id)),
		annotations: Some(run_annotations(created_at)),
		..Default::default()
	};

	let namespace = Namespace {
		metadata: meta(ns.to_string(), None),
		..Default::default()
	};

	let service_account = ServiceAccount {
		metadata: meta(service_account_name(ns), Some(ns)),
		..Default::default()
	};

	let cluster_role = ClusterRole {
		metadata: meta(cluster_role_name(ns), None),
		rules: Some(vec![
			PolicyRule {
				api_groups: Some(vec!["*".to_string()]),
				resources: Some(vec!["*".to_string()]),
				verbs: vec!["*".to_string()],
				..Default::default()
			},
			PolicyRule {
				non_resource_urls: Some(vec![
					"/metrics".to_string(),
					"/logs".to_string(),
					"/logs/*".to_string(),
				]),
				verbs: vec!["get".to_string()],
				..Default::default()
			},
		]),
		..Default::default()
	};

	let cluster_role_binding = ClusterRoleBinding {
		metadata: meta(cluster_role_name(ns), None),
		role_ref: RoleRef {
			api_group: "rbac.authorization.k8s.io".to_string(),
			kind: "ClusterRole".to_string(),
			name: cluster_role_name(ns),
		},
		subjects: Some(vec![Subject {
			kind: "ServiceAccount".to_string(),
			name: service_account_name(ns),
			namespace: Some(ns.to_string()),
			..Default::default()
		}]),
		..Default::default()
	};

	let config_map = config.test_repo_list.as_ref().map(|raw| {
		let mut data = BTreeMap::new();
		data.insert(REPO_LIST_KEY.to_string(), raw.clone());
		ConfigMap {
			metadata: meta(REPO_LIST_CONFIG_MAP.to_string(), Some(ns)),
			data: Some(data),
			..Default::default()
		}
	});

	let pod = Pod {
		metadata: meta(POD_NAME.to_string(), Some(ns)),
		spec: Some(build_pod_spec(config)),
		..Default::default()
	};

	Ok(Manifests {
		namespace,
		service_account,
		cluster_role,
		cluster_role_binding,
		config_map,
		pod,
	})
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
	EnvVar {
		name: name.to_string(),
		value: Some(value.into()),
		value_from: None,
	}
}

fn build_pod_spec(config: &RunConfig) -> PodSpec {
	let mut env_vars = vec![
		env("E2E_FOCUS", config.focus.clone()),
		env("E2E_SKIP", config.skip.clone().unwrap_or_default()),
		env("E2E_PARALLEL", config.parallel.to_string()),
		env("E2E_VERBOSITY", config.verbosity.to_string()),
		env("E2E_USE_GO_RUNNER", "true"),
		env("RESULTS_DIR", RESULTS_DIR),
	];

	let mut conformance_mounts = vec![VolumeMount {
		name: RESULTS_VOLUME.to_string(),
		mount_path: RESULTS_DIR.to_string(),
		..Default::default()
	}];

	let mut volumes = vec![Volume {
		name: RESULTS_VOLUME.to_string(),
		empty_dir: Some(EmptyDirVolumeSource::default()),
		..Default::default()
	}];

	if config.test_repo_list.is_some() {
		env_vars.push(env(
			"KUBE_TEST_REPO_LIST",
			format!("{REPO_LIST_DIR}/{REPO_LIST_KEY}"),
		));
		conformance_mounts.push(VolumeMount {
			name: REPO_LIST_VOLUME.to_string(),
			mount_path: REPO_LIST_DIR.to_string(),
			read_only: Some(true),
			..Default::default()
		});
		volumes.push(Volume {
			name: REPO_LIST_VOLUME.to_string(),
			config_map: Some(ConfigMapVolumeSource {
				name: REPO_LIST_CONFIG_MAP.to_string(),
				..Default::default()
			}),
			..Default::default()
		});
	}

	if let Some(ref repo) = config.test_repo {
		env_vars.push(env("KUBE_TEST_REPO", repo.clone()));
	}

	let conformance = Container {
		name: CONFORMANCE_CONTAINER.to_string(),
		image: Some(config.conformance_image.clone()),
		image_pull_policy: Some("IfNotPresent".to_string()),
		env: Some(env_vars),
		volume_mounts: Some(conformance_mounts),
		..Default::default()
	};

	// Keeps the results volume readable after the suite exits.
	let output = Container {
		name: OUTPUT_CONTAINER.to_string(),
		image: Some(config.busybox_image.clone()),
		image_pull_policy: Some("IfNotPresent".to_string()),
		command: Some(vec![
			"/bin/sh".to_string(),
			"-c".to_string(),
			"sleep infinity".to_string(),
		]),
		volume_mounts: Some(vec![VolumeMount {
			name: RESULTS_VOLUME.to_string(),
			mount_path: RESULTS_DIR.to_string(),
			read_only: Some(true),
			..Default::default()
		}]),
		..Default::default()
	};

	PodSpec {
		containers: vec![conformance, output],
		restart_policy: Some("Never".to_string()),
		service_account_name: Some(service_account_name(&config.namespace)),
		volumes: Some(volumes),
		..Default::default()
	}
}

fn validate(config: &RunConfig) -> Result<(), RunError> {
	let ns = &config.namespace;
	let valid_ns = !ns.is_empty()
		&& ns.len() <= 63
		&& ns
			.chars()
			.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
		&& !ns.starts_with('-')
		&& !ns.ends_with('-');
	if !valid_ns {
		return Err(RunError::InvalidManifest(format!(
			"namespace {ns:?} is not a valid DNS-1123 label"
		)));
	}
	if config.conformance_image.trim().is_empty() {
		return Err(RunError::InvalidManifest(
			"conformance image is empty".to_string(),
		));
	}
	if config.busybox_image.trim().is_empty() {
		return Err(RunError::InvalidManifest("busybox image is empty".to_string()));
	}
	if config.parallel == 0 {
		return Err(RunError::InvalidManifest(
			"parallel must be at least 1".to_string(),
		));
	}
	Ok(())
}
