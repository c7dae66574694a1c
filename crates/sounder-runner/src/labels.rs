// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ownership labels stamped on every object a run creates.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sounder_k8s::ObjectMeta;

use crate::types::RunId;

pub const MANAGED_LABEL: &str = "sounder.dev/managed";
pub const RUN_ID_LABEL: &str = "sounder.dev/run-id";
pub const CREATED_AT_ANNOTATION: &str = "sounder.dev/created-at";
pub const MAX_LABEL_LENGTH: usize = 63;

/// Sanitize a string to be a valid Kubernetes label value.
///
/// K8s label values must:
/// - Be 63 characters or less
/// - Begin and end with an alphanumeric character
/// - Contain only alphanumeric characters, dashes, underscores, and dots
pub fn sanitize_label_value(value: &str) -> String {
	let sanitized: String = value
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
				c
			} else {
				'_'
			}
		})
		.collect();

	let trimmed = sanitized
		.trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
		.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());

	if trimmed.len() > MAX_LABEL_LENGTH {
		trimmed[..MAX_LABEL_LENGTH]
			.trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
			.to_string()
	} else {
		trimmed.to_string()
	}
}

/// Labels for objects owned by `run_id`.
pub fn run_labels(run_id: &RunId) -> BTreeMap<String, String> {
	let mut labels = BTreeMap::new();
	labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
	labels.insert(
		RUN_ID_LABEL.to_string(),
		sanitize_label_value(&run_id.to_string()),
	);
	labels
}

pub fn run_annotations(created_at: DateTime<Utc>) -> BTreeMap<String, String> {
	let mut annotations = BTreeMap::new();
	annotations.insert(
		CREATED_AT_ANNOTATION.to_string(),
		created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
	);
	annotations
}

/// Selector matching every object this tool manages.
pub fn managed_selector() -> String {
	format!("{MANAGED_LABEL}=true")
}

/// Selector matching the objects of a single run.
pub fn run_selector(run_id: &RunId) -> String {
	format!(
		"{MANAGED_LABEL}=true,{RUN_ID_LABEL}={}",
		sanitize_label_value(&run_id.to_string())
	)
}

pub fn is_managed(meta: &ObjectMeta) -> bool {
	meta
		.labels
		.as_ref()
		.and_then(|l| l.get(MANAGED_LABEL))
		.is_some_and(|v| v == "true")
}

pub fn owning_run(meta: &ObjectMeta) -> Option<&str> {
	meta
		.labels
		.as_ref()
		.and_then(|l| l.get(RUN_ID_LABEL))
		.map(String::as_str)
}
