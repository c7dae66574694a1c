// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory cluster used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ContainerStateWaiting;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use sounder_k8s::{
	ClusterObject, ContainerState, ContainerStateTerminated, ContainerStatus, K8sClient, K8sError,
	LogOptions, LogStream, ObjectMeta, Pod, PodStatus, ResourceKind,
};
use sounder_runner::{ArtifactLayout, LogSink, RetryPolicy, RunConfig, RunTimeouts};
use tokio::time::Instant;

/// What the conformance container is doing at some point in the timeline.
#[derive(Debug, Clone, Copy)]
pub enum Container {
	Waiting(&'static str),
	Running,
	Terminated(i32),
}

/// Pod status from `offset` after pod creation onwards.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
	pub offset: Duration,
	pub pod_phase: &'static str,
	pub container: Container,
}

pub fn at(secs: u64, pod_phase: &'static str, container: Container) -> Snapshot {
	Snapshot {
		offset: Duration::from_secs(secs),
		pod_phase,
		container,
	}
}

/// How a scripted log connection ends after its chunks.
#[derive(Debug, Clone, Copy)]
pub enum StreamEnd {
	Eof,
	Error,
	/// Stay open until `offset` after pod creation, then close.
	CloseAt(Duration),
	/// Never close on its own.
	Pending,
}

#[derive(Debug, Clone)]
pub struct LogConnection {
	pub chunks: Vec<String>,
	pub end: StreamEnd,
}

impl LogConnection {
	pub fn new(chunks: &[&str], end: StreamEnd) -> Self {
		Self {
			chunks: chunks.iter().map(|c| c.to_string()).collect(),
			end,
		}
	}
}

/// A kubelet `--timestamps` line at second `sec` of the test day.
pub fn log_line(sec: u32, text: &str) -> String {
	format!("2025-01-01T00:00:{sec:02}.000000000Z {text}\n")
}

type Key = (ResourceKind, Option<String>, String);

#[derive(Default)]
struct State {
	objects: BTreeMap<Key, ObjectMeta>,
	timeline: Vec<Snapshot>,
	pod_created_at: Option<Instant>,
	log_connections: VecDeque<LogConnection>,
	log_requests: Vec<LogOptions>,
	files: HashMap<String, Vec<u8>>,
	created: Vec<(ResourceKind, String)>,
	deleted: Vec<(ResourceKind, String)>,
	relabelled: Vec<(ResourceKind, String)>,
	calls: usize,
	unreachable: bool,
	failing_deletes: HashSet<ResourceKind>,
	failing_creates: HashSet<ResourceKind>,
	hanging_creates: HashSet<ResourceKind>,
	/// Pod reads fail as unreachable in `[from, to)` after pod creation.
	pod_read_outage: Option<(Duration, Duration)>,
	/// Pod reads never answer from this offset on.
	pod_reads_hang_after: Option<Duration>,
	next_uid: u64,
}

pub struct MockK8sClient {
	state: Mutex<State>,
}

impl MockK8sClient {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State::default()),
		}
	}

	pub fn with_timeline(self, timeline: Vec<Snapshot>) -> Self {
		self.state.lock().unwrap().timeline = timeline;
		self
	}

	pub fn with_logs(self, connections: Vec<LogConnection>) -> Self {
		self.state.lock().unwrap().log_connections = connections.into();
		self
	}

	/// A file in the results volume.
	pub fn with_result_file(self, name: &str, contents: &[u8]) -> Self {
		self
			.state
			.lock()
			.unwrap()
			.files
			.insert(format!("/tmp/results/{name}"), contents.to_vec());
		self
	}

	pub fn with_conformance_artifacts(self) -> Self {
		self
			.with_result_file("e2e.log", b"Ran 402 of 7000 Specs\nSUCCESS!\n")
			.with_result_file("junit_01.xml", b"<testsuite tests=\"402\" failures=\"0\"/>")
	}

	/// Pre-existing object, e.g. left behind by an earlier run or another tool.
	pub fn seed(
		self,
		kind: ResourceKind,
		namespace: Option<&str>,
		name: &str,
		labels: &[(&str, &str)],
		terminating: bool,
	) -> Self {
		{
			let mut state = self.state.lock().unwrap();
			state.next_uid += 1;
			let meta = ObjectMeta {
				name: Some(name.to_string()),
				namespace: namespace.map(str::to_string),
				uid: Some(format!("seed-{}", state.next_uid)),
				labels: Some(
					labels
						.iter()
						.map(|(k, v)| (k.to_string(), v.to_string()))
						.collect(),
				),
				deletion_timestamp: terminating.then(|| Time(chrono::Utc::now())),
				..Default::default()
			};
			state
				.objects
				.insert((kind, namespace.map(str::to_string), name.to_string()), meta);
			if kind == ResourceKind::Pod {
				state.pod_created_at = Some(Instant::now());
			}
		}
		self
	}

	pub fn fail_deletes_of(self, kind: ResourceKind) -> Self {
		self.state.lock().unwrap().failing_deletes.insert(kind);
		self
	}

	pub fn fail_creates_of(self, kind: ResourceKind) -> Self {
		self.state.lock().unwrap().failing_creates.insert(kind);
		self
	}

	/// Creation of `kind` never answers, like a partitioned API server.
	pub fn hang_creates_of(self, kind: ResourceKind) -> Self {
		self.state.lock().unwrap().hanging_creates.insert(kind);
		self
	}

	pub fn pod_read_outage(self, from_secs: u64, to_secs: u64) -> Self {
		self.state.lock().unwrap().pod_read_outage =
			Some((Duration::from_secs(from_secs), Duration::from_secs(to_secs)));
		self
	}

	pub fn hang_pod_reads_after(self, secs: u64) -> Self {
		self.state.lock().unwrap().pod_reads_hang_after = Some(Duration::from_secs(secs));
		self
	}

	pub fn set_unreachable(&self, unreachable: bool) {
		self.state.lock().unwrap().unreachable = unreachable;
	}

	pub fn calls(&self) -> usize {
		self.state.lock().unwrap().calls
	}

	pub fn created(&self) -> Vec<(ResourceKind, String)> {
		self.state.lock().unwrap().created.clone()
	}

	pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
		self.state.lock().unwrap().deleted.clone()
	}

	pub fn relabelled(&self) -> Vec<(ResourceKind, String)> {
		self.state.lock().unwrap().relabelled.clone()
	}

	pub fn log_requests(&self) -> Vec<LogOptions> {
		self.state.lock().unwrap().log_requests.clone()
	}

	pub fn object_count(&self) -> usize {
		self.state.lock().unwrap().objects.len()
	}

	pub fn get(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Option<ObjectMeta> {
		self
			.state
			.lock()
			.unwrap()
			.objects
			.get(&(kind, namespace.map(str::to_string), name.to_string()))
			.cloned()
	}

	pub fn has(&self, kind: ResourceKind, name: &str) -> bool {
		self
			.state
			.lock()
			.unwrap()
			.objects
			.keys()
			.any(|(k, _, n)| *k == kind && n == name)
	}

	fn enter(&self) -> Result<std::sync::MutexGuard<'_, State>, K8sError> {
		let mut state = self.state.lock().unwrap();
		state.calls += 1;
		if state.unreachable {
			return Err(K8sError::Unreachable {
				message: "connection refused".to_string(),
			});
		}
		Ok(state)
	}
}

fn key(kind: ResourceKind, name: &str, namespace: Option<&str>) -> Key {
	let namespace = if kind.is_namespaced() {
		namespace.map(str::to_string)
	} else {
		None
	};
	(kind, namespace, name.to_string())
}

fn matches_selector(meta: &ObjectMeta, selector: &str) -> bool {
	let labels = meta.labels.clone().unwrap_or_default();
	selector
		.split(',')
		.filter(|s| !s.is_empty())
		.all(|term| match term.split_once('=') {
			Some((k, v)) => labels.get(k).is_some_and(|l| l == v),
			None => labels.contains_key(term),
		})
}

fn not_found(kind: ResourceKind, name: &str) -> K8sError {
	K8sError::NotFound {
		kind,
		name: name.to_string(),
	}
}

fn pod_from(meta: ObjectMeta, snapshot: Option<&Snapshot>) -> Pod {
	let (phase, container) = match snapshot {
		Some(s) => (s.pod_phase, s.container),
		None => ("Pending", Container::Waiting("ContainerCreating")),
	};
	let state = match container {
		Container::Waiting(reason) => ContainerState {
			waiting: Some(ContainerStateWaiting {
				reason: Some(reason.to_string()),
				message: None,
			}),
			..Default::default()
		},
		Container::Running => ContainerState {
			running: Some(Default::default()),
			..Default::default()
		},
		Container::Terminated(code) => ContainerState {
			terminated: Some(ContainerStateTerminated {
				exit_code: code,
				..Default::default()
			}),
			..Default::default()
		},
	};
	Pod {
		metadata: meta,
		spec: None,
		status: Some(PodStatus {
			phase: Some(phase.to_string()),
			container_statuses: Some(vec![ContainerStatus {
				name: "conformance-container".to_string(),
				state: Some(state),
				..Default::default()
			}]),
			..Default::default()
		}),
	}
}

#[async_trait]
impl K8sClient for MockK8sClient {
	async fn server_version(&self) -> Result<String, K8sError> {
		let _state = self.enter()?;
		Ok("v1.32.1".to_string())
	}

	async fn create(&self, object: ClusterObject) -> Result<ObjectMeta, K8sError> {
		let hang = self.state.lock().unwrap().hanging_creates.contains(&object.kind());
		if hang {
			return std::future::pending().await;
		}
		let mut state = self.enter()?;
		let kind = object.kind();
		let name = object.name().to_string();
		let k = key(kind, &name, object.namespace());

		if state.objects.contains_key(&k) {
			return Err(K8sError::AlreadyExists { kind, name });
		}
		if state.failing_creates.contains(&kind) {
			return Err(K8sError::ApiError {
				message: format!("admission webhook denied creation of {name}"),
			});
		}
		if let Some(ns) = k.1.as_deref() {
			if !state
				.objects
				.contains_key(&(ResourceKind::Namespace, None, ns.to_string()))
			{
				return Err(not_found(ResourceKind::Namespace, ns));
			}
		}

		state.next_uid += 1;
		let mut meta = object.metadata().clone();
		meta.uid = Some(format!("uid-{}", state.next_uid));
		state.objects.insert(k, meta.clone());
		state.created.push((kind, name));
		if kind == ResourceKind::Pod {
			state.pod_created_at = Some(Instant::now());
		}
		Ok(meta)
	}

	async fn get_metadata(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
	) -> Result<ObjectMeta, K8sError> {
		let state = self.enter()?;
		state
			.objects
			.get(&key(kind, name, namespace))
			.cloned()
			.ok_or_else(|| not_found(kind, name))
	}

	async fn relabel(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		labels: BTreeMap<String, String>,
	) -> Result<(), K8sError> {
		let mut state = self.enter()?;
		let meta = state
			.objects
			.get_mut(&key(kind, name, namespace))
			.ok_or_else(|| not_found(kind, name))?;
		meta.labels.get_or_insert_with(BTreeMap::new).extend(labels);
		state.relabelled.push((kind, name.to_string()));
		Ok(())
	}

	async fn delete(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		_grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let mut state = self.enter()?;
		if state.failing_deletes.contains(&kind) {
			return Err(K8sError::ApiError {
				message: format!("admission webhook denied deletion of {name}"),
			});
		}
		let k = key(kind, name, namespace);
		if state.objects.remove(&k).is_none() {
			return Err(not_found(kind, name));
		}
		if kind == ResourceKind::Namespace {
			state
				.objects
				.retain(|(_, ns, _), _| ns.as_deref() != Some(name));
		}
		state.deleted.push((kind, name.to_string()));
		Ok(())
	}

	async fn list_metadata(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
		label_selector: &str,
	) -> Result<Vec<ObjectMeta>, K8sError> {
		let state = self.enter()?;
		Ok(state
			.objects
			.iter()
			.filter(|((k, ns, _), _)| {
				*k == kind && (namespace.is_none() || ns.as_deref() == namespace)
			})
			.filter(|(_, meta)| matches_selector(meta, label_selector))
			.map(|(_, meta)| meta.clone())
			.collect())
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		let (pod, hang) = {
			let state = self.enter()?;
			let meta = state
				.objects
				.get(&key(ResourceKind::Pod, name, Some(namespace)))
				.cloned()
				.ok_or_else(|| not_found(ResourceKind::Pod, name))?;
			let elapsed = state
				.pod_created_at
				.map(|t| Instant::now().saturating_duration_since(t))
				.unwrap_or_default();
			if let Some((from, to)) = state.pod_read_outage {
				if elapsed >= from && elapsed < to {
					return Err(K8sError::Unreachable {
						message: "i/o timeout".to_string(),
					});
				}
			}
			let hang = state.pod_reads_hang_after.is_some_and(|h| elapsed >= h);
			let snapshot = state.timeline.iter().rev().find(|s| s.offset <= elapsed);
			(pod_from(meta, snapshot), hang)
		};
		if hang {
			return std::future::pending().await;
		}
		Ok(pod)
	}

	async fn stream_logs(
		&self,
		name: &str,
		namespace: &str,
		_container: &str,
		opts: LogOptions,
	) -> Result<LogStream, K8sError> {
		let mut state = self.enter()?;
		if !state
			.objects
			.contains_key(&key(ResourceKind::Pod, name, Some(namespace)))
		{
			return Err(not_found(ResourceKind::Pod, name));
		}
		state.log_requests.push(opts);
		let connection = state
			.log_connections
			.pop_front()
			.unwrap_or_else(|| LogConnection::new(&[], StreamEnd::Eof));
		let started = state.pod_created_at.unwrap_or_else(Instant::now);

		let head = futures::stream::iter(
			connection
				.chunks
				.into_iter()
				.map(|c| Ok::<Bytes, io::Error>(Bytes::from(c))),
		);
		let stream: LogStream = match connection.end {
			StreamEnd::Eof => Box::pin(head),
			StreamEnd::Error => Box::pin(head.chain(futures::stream::once(async {
				Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"))
			}))),
			StreamEnd::CloseAt(offset) => Box::pin(head.chain(
				futures::stream::once(async move {
					tokio::time::sleep_until(started + offset).await;
				})
				.filter_map(|_| async { None::<Result<Bytes, io::Error>> }),
			)),
			StreamEnd::Pending => Box::pin(head.chain(futures::stream::pending())),
		};
		Ok(stream)
	}

	async fn read_file(
		&self,
		name: &str,
		namespace: &str,
		_container: &str,
		path: &str,
	) -> Result<Vec<u8>, K8sError> {
		let state = self.enter()?;
		if !state
			.objects
			.contains_key(&key(ResourceKind::Pod, name, Some(namespace)))
		{
			return Err(not_found(ResourceKind::Pod, name));
		}
		state
			.files
			.get(path)
			.cloned()
			.ok_or_else(|| K8sError::FileNotFound {
				path: path.to_string(),
			})
	}
}

/// Collects forwarded lines for assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
	lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
	pub fn lines(&self) -> Vec<String> {
		self.lines.lock().unwrap().clone()
	}
}

impl LogSink for RecordingSink {
	fn write_line(&mut self, line: &str) -> io::Result<()> {
		self.lines.lock().unwrap().push(line.to_string());
		Ok(())
	}
}

/// Short timeouts and deterministic backoff.
pub fn test_config(output_dir: &Path) -> RunConfig {
	RunConfig {
		output_dir: output_dir.to_path_buf(),
		layout: ArtifactLayout::PerRun,
		timeouts: RunTimeouts {
			run: Duration::from_secs(120),
			startup: Duration::from_secs(60),
			poll_interval: Duration::from_secs(10),
			log_drain: Duration::from_secs(5),
			cleanup_wait: Duration::from_secs(5),
			api_call: Duration::from_secs(5),
		},
		retry: RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(2),
			backoff_factor: 2.0,
			jitter: false,
		},
		..Default::default()
	}
}

pub fn client(mock: MockK8sClient) -> (Arc<MockK8sClient>, Arc<dyn K8sClient>) {
	let mock = Arc::new(mock);
	let dynamic: Arc<dyn K8sClient> = mock.clone();
	(mock, dynamic)
}

pub const MANAGED: (&str, &str) = ("sounder.dev/managed", "true");
