// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod support;

use std::time::Duration;

use sounder_k8s::ResourceKind;
use sounder_runner::labels::RUN_ID_LABEL;
use sounder_runner::{CleanupManager, CleanupTarget, RunId, RunWarning};
use support::{client, MockK8sClient, MANAGED};

const NS: &str = "conformance";

fn seed_run(mock: MockK8sClient, run_id: &str, ns: &str) -> MockK8sClient {
	let labels = [MANAGED, (RUN_ID_LABEL, run_id)];
	mock
		.seed(ResourceKind::Namespace, None, ns, &labels, false)
		.seed(
			ResourceKind::ServiceAccount,
			Some(ns),
			&format!("{ns}-serviceaccount"),
			&labels,
			false,
		)
		.seed(
			ResourceKind::ClusterRole,
			None,
			&format!("{ns}-serviceaccount-role"),
			&labels,
			false,
		)
		.seed(
			ResourceKind::ClusterRoleBinding,
			None,
			&format!("{ns}-serviceaccount-role"),
			&labels,
			false,
		)
		.seed(
			ResourceKind::Pod,
			Some(ns),
			"e2e-conformance-test",
			&labels,
			false,
		)
}

fn manager(k8s: std::sync::Arc<dyn sounder_k8s::K8sClient>) -> CleanupManager {
	CleanupManager::new(k8s, Duration::from_secs(5), Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn second_cleanup_is_a_quiet_no_op() {
	let run_id = RunId::new();
	let (mock, k8s) = client(seed_run(MockK8sClient::new(), &run_id.to_string(), NS));
	let cleanup = manager(k8s);

	let first = cleanup.cleanup(&CleanupTarget::Run(run_id)).await;
	assert!(first.is_empty(), "unexpected warnings: {first:?}");
	assert_eq!(mock.object_count(), 0);

	let second = cleanup.cleanup(&CleanupTarget::Run(run_id)).await;
	assert!(second.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deletes_in_reverse_creation_order() {
	let run_id = RunId::new();
	let (mock, k8s) = client(seed_run(MockK8sClient::new(), &run_id.to_string(), NS));

	manager(k8s).cleanup(&CleanupTarget::Run(run_id)).await;

	let kinds: Vec<ResourceKind> = mock.deleted().into_iter().map(|(k, _)| k).collect();
	assert_eq!(
		kinds,
		vec![
			ResourceKind::Pod,
			ResourceKind::ClusterRoleBinding,
			ResourceKind::ClusterRole,
			ResourceKind::ServiceAccount,
			ResourceKind::Namespace,
		]
	);
}

#[tokio::test(start_paused = true)]
async fn partial_bootstrap_is_cleaned_without_warnings() {
	let run_id = RunId::new();
	let id = run_id.to_string();
	let labels = [MANAGED, (RUN_ID_LABEL, id.as_str())];
	let (mock, k8s) = client(
		MockK8sClient::new().seed(ResourceKind::Namespace, None, NS, &labels, false),
	);

	let warnings = manager(k8s).cleanup(&CleanupTarget::Run(run_id)).await;

	assert!(warnings.is_empty());
	assert_eq!(mock.object_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_delete_is_a_warning_and_the_rest_still_go() {
	let run_id = RunId::new();
	let (mock, k8s) = client(
		seed_run(MockK8sClient::new(), &run_id.to_string(), NS)
			.fail_deletes_of(ResourceKind::ClusterRole),
	);

	let warnings = manager(k8s).cleanup(&CleanupTarget::Run(run_id)).await;

	assert_eq!(warnings.len(), 1);
	match &warnings[0] {
		RunWarning::Cleanup { target, .. } => {
			assert_eq!(target, "ClusterRole/conformance-serviceaccount-role")
		}
		other => panic!("unexpected warning: {other}"),
	}
	assert!(mock.has(ResourceKind::ClusterRole, "conformance-serviceaccount-role"));
	assert!(!mock.has(ResourceKind::Namespace, NS));
	assert!(!mock.has(ResourceKind::ClusterRoleBinding, "conformance-serviceaccount-role"));
}

#[tokio::test(start_paused = true)]
async fn run_cleanup_leaves_other_runs_alone() {
	let mine = RunId::new();
	let theirs = RunId::new();
	let (mock, k8s) = client(seed_run(
		seed_run(MockK8sClient::new(), &mine.to_string(), "conformance-a"),
		&theirs.to_string(),
		"conformance-b",
	));

	manager(k8s).cleanup(&CleanupTarget::Run(mine)).await;

	assert!(!mock.has(ResourceKind::Namespace, "conformance-a"));
	assert!(mock.has(ResourceKind::Namespace, "conformance-b"));
	assert!(mock.has(ResourceKind::ClusterRole, "conformance-b-serviceaccount-role"));
}

#[tokio::test(start_paused = true)]
async fn sweep_removes_every_managed_object_but_no_foreign_one() {
	let (mock, k8s) = client(
		seed_run(
			seed_run(MockK8sClient::new(), &RunId::new().to_string(), "conformance-a"),
			&RunId::new().to_string(),
			"conformance-b",
		)
		.seed(ResourceKind::Namespace, None, "kube-system", &[], false),
	);

	let warnings = manager(k8s).cleanup(&CleanupTarget::AllManaged).await;

	assert!(warnings.is_empty());
	assert_eq!(mock.object_count(), 1);
	assert!(mock.has(ResourceKind::Namespace, "kube-system"));
}

#[tokio::test(start_paused = true)]
async fn terminating_objects_are_skipped() {
	let (mock, k8s) = client(MockK8sClient::new().seed(
		ResourceKind::Namespace,
		None,
		NS,
		&[MANAGED],
		true,
	));

	let warnings = CleanupManager::new(k8s, Duration::ZERO, Duration::from_secs(1))
		.cleanup(&CleanupTarget::AllManaged)
		.await;

	assert!(warnings.is_empty());
	assert!(mock.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreachable_cluster_yields_one_warning_per_kind() {
	let (mock, k8s) = client(MockK8sClient::new());
	mock.set_unreachable(true);

	let warnings = manager(k8s).cleanup(&CleanupTarget::AllManaged).await;

	assert_eq!(warnings.len(), 6);
	assert!(warnings
		.iter()
		.all(|w| matches!(w, RunWarning::Cleanup { .. })));
}

#[tokio::test(start_paused = true)]
async fn unreachable_cluster_returns_without_waiting_for_namespaces() {
	let (mock, k8s) = client(MockK8sClient::new());
	mock.set_unreachable(true);
	let start = tokio::time::Instant::now();

	let warnings = CleanupManager::new(k8s, Duration::from_secs(120), Duration::from_secs(1))
		.cleanup(&CleanupTarget::AllManaged)
		.await;

	assert_eq!(warnings.len(), 6);
	assert!(start.elapsed() < Duration::from_secs(1), "took {:?}", start.elapsed());
}

#[tokio::test(start_paused = true)]
async fn no_namespace_wait_when_no_namespace_was_deleted() {
	let (mock, k8s) = client(MockK8sClient::new().seed(
		ResourceKind::Pod,
		Some(NS),
		"sonobuoy",
		&[MANAGED],
		false,
	));
	let start = tokio::time::Instant::now();

	let warnings = CleanupManager::new(k8s, Duration::from_secs(120), Duration::from_secs(1))
		.cleanup(&CleanupTarget::AllManaged)
		.await;

	assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
	assert_eq!(mock.deleted(), vec![(ResourceKind::Pod, "sonobuoy".to_string())]);
	assert!(start.elapsed() < Duration::from_secs(1), "took {:?}", start.elapsed());
}
