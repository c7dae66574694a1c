// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator-facing text. Workload output goes to stdout, everything else to stderr.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use sounder_runner::{RunConfig, RunId, RunResult, RunWarning, TeeSink, WriterSink};

pub const POD_OUTPUT_LOG: &str = "pod-output.log";

pub fn print_banner(run_id: &RunId, server_version: Option<&str>, config: &RunConfig) {
	eprintln!("sounder {}", env!("CARGO_PKG_VERSION"));
	if let Some(version) = server_version {
		eprintln!("  cluster version:   {version}");
	}
	eprintln!("  run id:            {run_id}");
	eprintln!("  namespace:         {}", config.namespace);
	eprintln!("  conformance image: {}", config.conformance_image);
	eprintln!("  focus:             {}", config.focus);
	if let Some(skip) = &config.skip {
		eprintln!("  skip:              {skip}");
	}
	eprintln!("  parallel:          {}", config.parallel);
	eprintln!("  output:            {}", config.artifact_dir(run_id).display());
	if config.dry_run {
		eprintln!("  dry run:           no objects will be created");
	}
	eprintln!();
}

pub fn print_warnings(warnings: &[RunWarning]) {
	if warnings.is_empty() {
		return;
	}
	eprintln!("{} warning(s):", warnings.len());
	for warning in warnings {
		eprintln!("  - {warning}");
	}
}

pub fn print_summary(result: &RunResult) {
	eprintln!();
	eprintln!("run {} finished: {}", result.run_id, result.phase);
	if let Some(code) = result.container_exit_code {
		eprintln!("  conformance container exit code: {code}");
	}
	for artifact in &result.artifacts {
		eprintln!("  artifact: {}", artifact.display());
	}
}

/// Stdout plus `pod-output.log` inside the artifact directory.
pub fn open_sink(artifact_dir: &Path) -> Result<TeeSink> {
	std::fs::create_dir_all(artifact_dir)
		.with_context(|| format!("failed to create {}", artifact_dir.display()))?;
	let path = artifact_dir.join(POD_OUTPUT_LOG);
	let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;

	Ok(TeeSink::new()
		.with(Box::new(WriterSink::new(io::stdout())))
		.with(Box::new(WriterSink::new(BufWriter::new(file)))))
}
