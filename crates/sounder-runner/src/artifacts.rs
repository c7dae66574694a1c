// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Copying result files out of the workload's results volume.

use std::path::PathBuf;
use std::sync::Arc;

use sounder_k8s::K8sClient;
use tracing::{debug, info, warn};

use crate::call::limited;
use crate::error::RunWarning;
use crate::manifests::{OUTPUT_CONTAINER, RESULTS_DIR};
use crate::types::{ArtifactLayout, WorkloadHandle};

/// Files every conformance run produces.
pub const DEFAULT_ARTIFACTS: &[&str] = &["e2e.log", "junit_01.xml"];

/// What a fetch produced.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
	pub artifact_dir: PathBuf,
	pub artifacts: Vec<PathBuf>,
	pub missing: Vec<String>,
	pub warnings: Vec<RunWarning>,
	/// Exit status read from the sentinel file, when one is configured.
	pub sentinel: Option<i32>,
}

pub struct ArtifactFetcher {
	client: Arc<dyn K8sClient>,
}

impl ArtifactFetcher {
	pub fn new(client: Arc<dyn K8sClient>) -> Self {
		Self { client }
	}

	/// Copy each known file independently; a failed file never blocks another.
	pub async fn fetch(&self, handle: &WorkloadHandle) -> FetchReport {
		let config = &handle.config;
		let dir = config.artifact_dir(&handle.run_id);
		let mut report = FetchReport {
			artifact_dir: dir.clone(),
			..Default::default()
		};

		let names: Vec<&str> = DEFAULT_ARTIFACTS
			.iter()
			.copied()
			.chain(config.extra_artifacts.iter().map(String::as_str))
			.collect();

		if let Err(e) = tokio::fs::create_dir_all(&dir).await {
			warn!(dir = %dir.display(), error = %e, "could not create artifact directory");
			for name in names {
				report.missing.push(name.to_string());
				report.warnings.push(RunWarning::ArtifactFetch {
					file: name.to_string(),
					reason: format!("creating {}: {e}", dir.display()),
				});
			}
			return report;
		}

		for name in names {
			let remote = format!("{RESULTS_DIR}/{name}");
			let read = limited(
				config.timeouts.api_call,
				self
					.client
					.read_file(&handle.pod_name, &handle.namespace, OUTPUT_CONTAINER, &remote),
			)
			.await;
			let contents = match read {
				Ok(c) => c,
				Err(e) => {
					warn!(file = %name, error = %e, "artifact fetch failed");
					report.missing.push(name.to_string());
					report.warnings.push(RunWarning::ArtifactFetch {
						file: name.to_string(),
						reason: e.to_string(),
					});
					continue;
				}
			};

			let dest = dir.join(name);
			if config.layout == ArtifactLayout::Flat && tokio::fs::try_exists(&dest).await.unwrap_or(false) {
				report
					.warnings
					.push(RunWarning::ArtifactOverwritten { path: dest.clone() });
			}

			match tokio::fs::write(&dest, &contents).await {
				Ok(()) => {
					debug!(file = %name, bytes = contents.len(), dest = %dest.display(), "artifact saved");
					report.artifacts.push(dest);
				}
				Err(e) => {
					report.missing.push(name.to_string());
					report.warnings.push(RunWarning::ArtifactFetch {
						file: name.to_string(),
						reason: format!("writing {}: {e}", dest.display()),
					});
				}
			}
		}

		if let Some(ref status_file) = config.status_file {
			report.sentinel = self.read_sentinel(handle, status_file, &mut report.warnings).await;
		}

		info!(
			dir = %dir.display(),
			fetched = report.artifacts.len(),
			missing = report.missing.len(),
			"artifact fetch complete"
		);
		report
	}

	async fn read_sentinel(
		&self,
		handle: &WorkloadHandle,
		status_file: &str,
		warnings: &mut Vec<RunWarning>,
	) -> Option<i32> {
		let remote = format!("{RESULTS_DIR}/{status_file}");
		let read = limited(
			handle.config.timeouts.api_call,
			self
				.client
				.read_file(&handle.pod_name, &handle.namespace, OUTPUT_CONTAINER, &remote),
		)
		.await;
		match read {
			Ok(bytes) => {
				let text = String::from_utf8_lossy(&bytes);
				match text.trim().parse::<i32>() {
					Ok(code) => Some(code),
					Err(_) => {
						warnings.push(RunWarning::ArtifactFetch {
							file: status_file.to_string(),
							reason: format!("status file content {:?} is not an exit code", text.trim()),
						});
						None
					}
				}
			}
			Err(e) => {
				warnings.push(RunWarning::ArtifactFetch {
					file: status_file.to_string(),
					reason: e.to_string(),
				});
				None
			}
		}
	}
}
