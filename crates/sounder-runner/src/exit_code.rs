// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mapping run outcomes to a process exit code.

use crate::error::RunError;
use crate::types::{ExitCodePolicy, TerminalPhase};

pub const EXIT_SUCCEEDED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ARTIFACTS_INCOMPLETE: i32 = 2;
pub const EXIT_CONFLICT: i32 = 3;
pub const EXIT_NEVER_STARTED: i32 = 4;
/// Bad configuration, an invalid manifest or any other failure of the tool
/// itself. The workload outcome is not known.
pub const EXIT_TOOL_ERROR: i32 = 5;
/// Standalone cleanup left objects behind.
pub const EXIT_CLEANUP_INCOMPLETE: i32 = 6;
pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_UNKNOWN: i32 = 125;
pub const EXIT_CANCELLED: i32 = 130;

/// Resolve the final phase and exit code.
///
/// A Succeeded phase contradicted by a non-zero container exit or
/// sentinel resolves as Failed.
pub fn resolve(
	phase: TerminalPhase,
	container_exit_code: Option<i32>,
	sentinel: Option<i32>,
	artifacts_incomplete: bool,
	policy: &ExitCodePolicy,
) -> (TerminalPhase, i32) {
	let contradicted = container_exit_code.is_some_and(|c| c != 0) || sentinel.is_some_and(|s| s != 0);
	let phase = match phase {
		TerminalPhase::Succeeded if contradicted => TerminalPhase::Failed,
		other => other,
	};

	let code = match phase {
		TerminalPhase::Succeeded if artifacts_incomplete && policy.fail_on_missing_artifacts => {
			EXIT_ARTIFACTS_INCOMPLETE
		}
		TerminalPhase::Succeeded => EXIT_SUCCEEDED,
		TerminalPhase::Failed => EXIT_FAILED,
		TerminalPhase::Timeout => EXIT_TIMEOUT,
		TerminalPhase::Unknown => EXIT_UNKNOWN,
		TerminalPhase::Cancelled => EXIT_CANCELLED,
	};
	(phase, code)
}

/// Exit code for a run aborted by a fatal error.
pub fn for_error(error: &RunError) -> i32 {
	match error {
		RunError::ResourceConflict { .. } => EXIT_CONFLICT,
		RunError::WorkloadNeverStarted { .. } => EXIT_NEVER_STARTED,
		RunError::ClusterUnreachable(_) | RunError::K8s(_) => EXIT_UNKNOWN,
		RunError::Cancelled => EXIT_CANCELLED,
		RunError::InvalidManifest(_) => EXIT_TOOL_ERROR,
	}
}
