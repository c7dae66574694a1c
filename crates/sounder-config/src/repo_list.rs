// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! E2E registry override list (`KUBE_TEST_REPO_LIST`).

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::ConfigError;

/// A parsed registry override file.
///
/// `raw` is forwarded verbatim to the workload; `entries` is only used
/// to reject malformed files before anything touches the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoList {
	pub raw: String,
	pub entries: BTreeMap<String, String>,
}

/// Read and parse a YAML mapping of e2e registry keys to registries.
pub fn load_repo_list(path: &Path) -> Result<RepoList, ConfigError> {
	let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::RepoList {
		path: path.to_path_buf(),
		message: e.to_string(),
	})?;
	let entries = parse_repo_list(&raw).map_err(|message| ConfigError::RepoList {
		path: path.to_path_buf(),
		message,
	})?;
	debug!(path = %path.display(), entries = entries.len(), "loaded test repo list");
	Ok(RepoList { raw, entries })
}

fn parse_repo_list(raw: &str) -> Result<BTreeMap<String, String>, String> {
	let entries: BTreeMap<String, String> =
		serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
	if entries.is_empty() {
		return Err("no registry entries".to_string());
	}
	if let Some((key, _)) = entries.iter().find(|(_, v)| v.trim().is_empty()) {
		return Err(format!("registry for {key:?} is empty"));
	}
	Ok(entries)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_load_repo_list_parses_mapping() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("repo-list.yaml");
		let yaml = "dockerLibraryRegistry: mirror.example.com/library\ne2eRegistry: mirror.example.com/e2e\n";
		std::fs::write(&path, yaml).unwrap();

		let list = load_repo_list(&path).unwrap();
		assert_eq!(list.raw, yaml);
		assert_eq!(list.entries.len(), 2);
		assert_eq!(
			list.entries.get("e2eRegistry").map(String::as_str),
			Some("mirror.example.com/e2e")
		);
	}

	#[test]
	fn test_load_repo_list_rejects_non_mapping() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("repo-list.yaml");
		std::fs::write(&path, "- just\n- a list\n").unwrap();

		let err = load_repo_list(&path).unwrap_err();
		assert!(matches!(err, ConfigError::RepoList { .. }));
	}

	#[test]
	fn test_load_repo_list_rejects_empty_registry() {
		assert!(parse_repo_list("e2eRegistry: \"\"\n").is_err());
		assert!(parse_repo_list("{}").is_err());
	}

	#[test]
	fn test_load_repo_list_missing_file() {
		let err = load_repo_list(Path::new("/nonexistent/repo-list.yaml")).unwrap_err();
		assert!(err.to_string().contains("/nonexistent/repo-list.yaml"));
	}
}
