// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
	api::{Api, AttachParams, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams},
	config::{KubeConfigOptions, Kubeconfig},
	Client, Config, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncReadExt;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{debug, instrument};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{
	ClusterObject, ClusterRole, ClusterRoleBinding, ConfigMap, LogOptions, LogStream, Namespace,
	ObjectMeta, Pod, ResourceKind, ServiceAccount,
};

/// Production K8s client implementation using the kube crate.
pub struct KubeClient {
	client: Client,
}

impl KubeClient {
	/// Create a new KubeClient that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. KUBECONFIG environment variable
	/// 2. ~/.kube/config
	/// 3. In-cluster service account (when running in K8s)
	pub async fn new() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self { client })
	}

	/// Create a client from an explicit kubeconfig file, optionally pinning a context.
	///
	/// Falls back to [`KubeClient::new`] discovery when `path` is `None`.
	pub async fn from_kubeconfig(
		path: Option<&Path>,
		context: Option<&str>,
	) -> Result<Self, K8sError> {
		let options = KubeConfigOptions {
			context: context.map(str::to_string),
			..Default::default()
		};

		let config = match path {
			Some(path) => {
				let kubeconfig = Kubeconfig::read_from(path).map_err(|e| K8sError::Unreachable {
					message: format!("failed to read kubeconfig {}: {e}", path.display()),
				})?;
				Config::from_custom_kubeconfig(kubeconfig, &options).await
			}
			None if context.is_some() => Config::from_kubeconfig(&options).await,
			None => return Self::new().await,
		}
		.map_err(|e| K8sError::Unreachable {
			message: e.to_string(),
		})?;

		debug!(cluster_url = %config.cluster_url, "K8s client configured from kubeconfig");
		let client = Client::try_from(config)?;
		Ok(Self { client })
	}

	fn namespaced_api<K>(&self, namespace: Option<&str>) -> Api<K>
	where
		K: Resource<Scope = NamespaceResourceScope>,
		<K as Resource>::DynamicType: Default,
	{
		match namespace {
			Some(ns) => Api::namespaced(self.client.clone(), ns),
			None => Api::all(self.client.clone()),
		}
	}

	fn cluster_api<K>(&self) -> Api<K>
	where
		K: Resource<Scope = ClusterResourceScope>,
		<K as Resource>::DynamicType: Default,
	{
		Api::all(self.client.clone())
	}
}

async fn create_in<K>(api: Api<K>, kind: ResourceKind, object: &K) -> Result<ObjectMeta, K8sError>
where
	K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
	let name = object.meta().name.clone().unwrap_or_default();
	api
		.create(&PostParams::default(), object)
		.await
		.map(|created| created.meta().clone())
		.map_err(|e| K8sError::from_kube(kind, &name, e))
}

async fn get_meta_in<K>(api: Api<K>, kind: ResourceKind, name: &str) -> Result<ObjectMeta, K8sError>
where
	K: Resource + Clone + DeserializeOwned + Debug,
{
	api
		.get(name)
		.await
		.map(|obj| obj.meta().clone())
		.map_err(|e| K8sError::from_kube(kind, name, e))
}

async fn relabel_in<K>(
	api: Api<K>,
	kind: ResourceKind,
	name: &str,
	labels: &BTreeMap<String, String>,
) -> Result<(), K8sError>
where
	K: Resource + Clone + DeserializeOwned + Debug,
{
	let patch = serde_json::json!({ "metadata": { "labels": labels } });
	api
		.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
		.await
		.map(|_| ())
		.map_err(|e| K8sError::from_kube(kind, name, e))
}

async fn delete_in<K>(
	api: Api<K>,
	kind: ResourceKind,
	name: &str,
	grace_period_seconds: u32,
) -> Result<(), K8sError>
where
	K: Resource + Clone + DeserializeOwned + Debug,
{
	let dp = DeleteParams {
		grace_period_seconds: Some(grace_period_seconds),
		..DeleteParams::background()
	};
	api
		.delete(name, &dp)
		.await
		.map(|_| ())
		.map_err(|e| K8sError::from_kube(kind, name, e))
}

async fn list_meta_in<K>(api: Api<K>, label_selector: &str) -> Result<Vec<ObjectMeta>, K8sError>
where
	K: Resource + Clone + DeserializeOwned + Debug,
{
	let lp = ListParams::default().labels(label_selector);
	let list = api.list(&lp).await?;
	Ok(list.items.iter().map(|obj| obj.meta().clone()).collect())
}

#[async_trait]
impl K8sClient for KubeClient {
	async fn server_version(&self) -> Result<String, K8sError> {
		let info = self.client.apiserver_version().await?;
		Ok(info.git_version)
	}

	#[instrument(skip(self, object), fields(kind = %object.kind(), name = %object.name()))]
	async fn create(&self, object: ClusterObject) -> Result<ObjectMeta, K8sError> {
		let namespace = object.namespace().map(str::to_string);
		let ns = namespace.as_deref();
		match &object {
			ClusterObject::Namespace(o) => {
				create_in(self.cluster_api::<Namespace>(), object.kind(), o).await
			}
			ClusterObject::ServiceAccount(o) => {
				create_in(self.namespaced_api::<ServiceAccount>(ns), object.kind(), o).await
			}
			ClusterObject::ClusterRole(o) => {
				create_in(self.cluster_api::<ClusterRole>(), object.kind(), o).await
			}
			ClusterObject::ClusterRoleBinding(o) => {
				create_in(self.cluster_api::<ClusterRoleBinding>(), object.kind(), o).await
			}
			ClusterObject::ConfigMap(o) => {
				create_in(self.namespaced_api::<ConfigMap>(ns), object.kind(), o).await
			}
			ClusterObject::Pod(o) => create_in(self.namespaced_api::<Pod>(ns), object.kind(), o).await,
		}
	}

	async fn get_metadata(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
	) -> Result<ObjectMeta, K8sError> {
		match kind {
			ResourceKind::Namespace => get_meta_in(self.cluster_api::<Namespace>(), kind, name).await,
			ResourceKind::ServiceAccount => {
				get_meta_in(self.namespaced_api::<ServiceAccount>(namespace), kind, name).await
			}
			ResourceKind::ClusterRole => {
				get_meta_in(self.cluster_api::<ClusterRole>(), kind, name).await
			}
			ResourceKind::ClusterRoleBinding => {
				get_meta_in(self.cluster_api::<ClusterRoleBinding>(), kind, name).await
			}
			ResourceKind::ConfigMap => {
				get_meta_in(self.namespaced_api::<ConfigMap>(namespace), kind, name).await
			}
			ResourceKind::Pod => get_meta_in(self.namespaced_api::<Pod>(namespace), kind, name).await,
		}
	}

	async fn relabel(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		labels: BTreeMap<String, String>,
	) -> Result<(), K8sError> {
		match kind {
			ResourceKind::Namespace => {
				relabel_in(self.cluster_api::<Namespace>(), kind, name, &labels).await
			}
			ResourceKind::ServiceAccount => {
				relabel_in(self.namespaced_api::<ServiceAccount>(namespace), kind, name, &labels).await
			}
			ResourceKind::ClusterRole => {
				relabel_in(self.cluster_api::<ClusterRole>(), kind, name, &labels).await
			}
			ResourceKind::ClusterRoleBinding => {
				relabel_in(self.cluster_api::<ClusterRoleBinding>(), kind, name, &labels).await
			}
			ResourceKind::ConfigMap => {
				relabel_in(self.namespaced_api::<ConfigMap>(namespace), kind, name, &labels).await
			}
			ResourceKind::Pod => {
				relabel_in(self.namespaced_api::<Pod>(namespace), kind, name, &labels).await
			}
		}
	}

	async fn delete(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let grace = grace_period_seconds;
		match kind {
			ResourceKind::Namespace => {
				delete_in(self.cluster_api::<Namespace>(), kind, name, grace).await
			}
			ResourceKind::ServiceAccount => {
				delete_in(self.namespaced_api::<ServiceAccount>(namespace), kind, name, grace).await
			}
			ResourceKind::ClusterRole => {
				delete_in(self.cluster_api::<ClusterRole>(), kind, name, grace).await
			}
			ResourceKind::ClusterRoleBinding => {
				delete_in(self.cluster_api::<ClusterRoleBinding>(), kind, name, grace).await
			}
			ResourceKind::ConfigMap => {
				delete_in(self.namespaced_api::<ConfigMap>(namespace), kind, name, grace).await
			}
			ResourceKind::Pod => delete_in(self.namespaced_api::<Pod>(namespace), kind, name, grace).await,
		}
	}

	async fn list_metadata(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
		label_selector: &str,
	) -> Result<Vec<ObjectMeta>, K8sError> {
		match kind {
			ResourceKind::Namespace => list_meta_in(self.cluster_api::<Namespace>(), label_selector).await,
			ResourceKind::ServiceAccount => {
				list_meta_in(self.namespaced_api::<ServiceAccount>(namespace), label_selector).await
			}
			ResourceKind::ClusterRole => {
				list_meta_in(self.cluster_api::<ClusterRole>(), label_selector).await
			}
			ResourceKind::ClusterRoleBinding => {
				list_meta_in(self.cluster_api::<ClusterRoleBinding>(), label_selector).await
			}
			ResourceKind::ConfigMap => {
				list_meta_in(self.namespaced_api::<ConfigMap>(namespace), label_selector).await
			}
			ResourceKind::Pod => {
				list_meta_in(self.namespaced_api::<Pod>(namespace), label_selector).await
			}
		}
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		pods
			.get(name)
			.await
			.map_err(|e| K8sError::from_kube(ResourceKind::Pod, name, e))
	}

	async fn stream_logs(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		opts: LogOptions,
	) -> Result<LogStream, K8sError> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let lp = LogParams {
			container: Some(container.to_string()),
			follow: opts.follow,
			tail_lines: opts.tail,
			timestamps: opts.timestamps,
			since_time: opts.since_time,
			..Default::default()
		};

		let stream = pods.log_stream(name, &lp).await.map_err(|e| match e {
			kube::Error::Api(ref err) if err.code == 404 => K8sError::NotFound {
				kind: ResourceKind::Pod,
				name: name.into(),
			},
			_ => K8sError::StreamError {
				message: e.to_string(),
			},
		})?;

		let compat_stream = stream.compat();
		let lines_stream = tokio_util::io::ReaderStream::new(compat_stream);
		let mapped = lines_stream.map(|result| result.map_err(std::io::Error::other));
		Ok(Box::pin(mapped))
	}

	#[instrument(skip(self), fields(pod = %name, container = %container))]
	async fn read_file(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		path: &str,
	) -> Result<Vec<u8>, K8sError> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		let ap = AttachParams {
			container: Some(container.to_string()),
			stdin: false,
			stdout: true,
			stderr: true,
			tty: false,
			..Default::default()
		};

		let mut attached = pods
			.exec(name, vec!["cat", path], &ap)
			.await
			.map_err(|e| match e {
				kube::Error::Api(ref err) if err.code == 404 => K8sError::NotFound {
					kind: ResourceKind::Pod,
					name: name.into(),
				},
				_ => K8sError::ExecError {
					message: e.to_string(),
				},
			})?;

		let mut stdout = attached.stdout().ok_or_else(|| K8sError::ExecError {
			message: "stdout not available".into(),
		})?;
		let mut stderr = attached.stderr().ok_or_else(|| K8sError::ExecError {
			message: "stderr not available".into(),
		})?;
		let status = attached.take_status();

		let mut contents = Vec::new();
		let mut errors = Vec::new();
		let (out, err) = tokio::join!(
			stdout.read_to_end(&mut contents),
			stderr.read_to_end(&mut errors)
		);
		out.map_err(|e| K8sError::ExecError {
			message: e.to_string(),
		})?;
		err.map_err(|e| K8sError::ExecError {
			message: e.to_string(),
		})?;

		let status = match status {
			Some(status) => status.await,
			None => None,
		};
		attached.join().await.map_err(|e| K8sError::ExecError {
			message: e.to_string(),
		})?;

		match status {
			Some(s) if s.status.as_deref() == Some("Failure") => {
				let stderr = String::from_utf8_lossy(&errors);
				debug!(path, stderr = %stderr.trim(), "exec cat failed");
				if stderr.contains("No such file") {
					Err(K8sError::FileNotFound { path: path.into() })
				} else {
					Err(K8sError::ExecError {
						message: s.message.unwrap_or_else(|| stderr.trim().to_string()),
					})
				}
			}
			_ => Ok(contents),
		}
	}
}
