// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Conformance workload lifecycle for Sounder.
//!
//! This crate provides:
//! - Creation and adoption of the run's cluster objects
//! - Concurrent log streaming and phase polling with reconnects
//! - Artifact retrieval and exit code resolution
//! - Label-driven, idempotent cleanup

pub mod artifacts;
pub mod backoff;
pub mod bootstrap;
mod call;
pub mod cleanup;
pub mod error;
pub mod exit_code;
pub mod images;
pub mod labels;
pub mod logs;
pub mod manifests;
pub mod orchestrator;
pub mod phase;
pub mod types;

pub use artifacts::{ArtifactFetcher, FetchReport, DEFAULT_ARTIFACTS};
pub use bootstrap::{Bootstrapped, Bootstrapper};
pub use cleanup::{CleanupManager, CleanupTarget};
pub use error::{RunAborted, RunError, RunWarning};
pub use images::list_required_images;
pub use logs::{LogSink, LogStreamer, TeeSink, WriterSink};
pub use manifests::{build_manifests, Manifests};
pub use orchestrator::Orchestrator;
pub use phase::{classify_pod, PhaseOutcome, PhaseWaiter};
pub use types::{
	ArtifactLayout, ExitCodePolicy, Phase, RetryPolicy, RunConfig, RunId, RunResult, RunTimeouts,
	TerminalPhase, WorkloadHandle, CONFORMANCE_REPOSITORY, DEFAULT_CONFORMANCE_IMAGE,
};
