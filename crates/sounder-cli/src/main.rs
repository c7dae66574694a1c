// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sounder CLI - Kubernetes conformance runs
//!
//! Launches the upstream conformance image into a cluster, streams its
//! output, collects the results and removes everything it created.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sounder_config::{load_config_with_cli, load_repo_list, CliOverrides, SounderConfig};
use sounder_k8s::{K8sClient, KubeClient};
use sounder_runner::{
	exit_code, list_required_images, CleanupManager, CleanupTarget, Orchestrator, RunId,
	RunWarning, DEFAULT_CONFORMANCE_IMAGE,
};

mod logging;
mod output;
mod run_config;

use run_config::{conformance_image_for, to_run_config};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputLayoutArg {
	PerRun,
	Flat,
}

impl OutputLayoutArg {
	fn as_str(self) -> &'static str {
		match self {
			OutputLayoutArg::PerRun => "per-run",
			OutputLayoutArg::Flat => "flat",
		}
	}
}

/// Sounder - run Kubernetes conformance tests against a cluster
#[derive(Parser, Debug)]
#[command(name = "sounder", version, about, long_about = None)]
struct Args {
	/// Path to custom configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Kubeconfig file (defaults to KUBECONFIG or ~/.kube/config)
	#[arg(long)]
	kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use
	#[arg(long)]
	context: Option<String>,

	/// Namespace the workload runs in
	#[arg(short, long)]
	namespace: Option<String>,

	/// Parallel ginkgo nodes inside the workload
	#[arg(long)]
	parallel: Option<u32>,

	/// Verbosity of the inner test framework
	#[arg(long)]
	verbosity: Option<u32>,

	/// Directory receiving artifacts
	#[arg(short, long)]
	output_dir: Option<PathBuf>,

	/// Write artifacts into a per-run subdirectory or straight into the output directory
	#[arg(long, value_enum)]
	output_layout: Option<OutputLayoutArg>,

	/// Delete objects left behind by earlier runs instead of running
	#[arg(long, conflicts_with_all = ["list_images", "dry_run"])]
	cleanup: bool,

	/// Restrict --cleanup to a single run
	#[arg(long, requires = "cleanup")]
	run_id: Option<String>,

	/// Print the images a run needs and exit
	#[arg(long)]
	list_images: bool,

	/// Run only tests tagged [Conformance]
	#[arg(long)]
	conformance: bool,

	/// Focus regex for the test selection
	#[arg(long)]
	focus: Option<String>,

	/// Skip regex for the test selection
	#[arg(long)]
	skip: Option<String>,

	/// Conformance image (defaults to the one matching the server version)
	#[arg(long)]
	conformance_image: Option<String>,

	/// Utility image holding the results volume open
	#[arg(long)]
	busybox_image: Option<String>,

	/// Render the objects without creating anything
	#[arg(long)]
	dry_run: bool,

	/// YAML file overriding e2e image registries
	#[arg(long)]
	test_repo_list: Option<PathBuf>,

	/// Single registry replacing every e2e image registry
	#[arg(long)]
	test_repo: Option<String>,

	/// Maximum run time, e.g. `90m` or `6h`
	#[arg(long, value_parser = humantime::parse_duration)]
	timeout: Option<Duration>,

	/// Leave cluster objects in place after the run
	#[arg(long)]
	keep_resources: bool,

	/// Log level (overrides config)
	#[arg(short, long)]
	log_level: Option<String>,

	/// Output logs as JSON (overrides config)
	#[arg(long)]
	json_logs: bool,
}

impl Args {
	fn overrides(&self) -> CliOverrides {
		CliOverrides {
			config_file: self.config.clone(),
			kubeconfig: self.kubeconfig.clone(),
			context: self.context.clone(),
			namespace: self.namespace.clone(),
			parallel: self.parallel,
			verbosity: self.verbosity,
			output_dir: self.output_dir.clone(),
			output_layout: self.output_layout.map(|l| l.as_str().to_string()),
			dry_run: self.dry_run.then_some(true),
			keep_resources: self.keep_resources.then_some(true),
			conformance: self.conformance.then_some(true),
			focus: self.focus.clone(),
			skip: self.skip.clone(),
			conformance_image: self.conformance_image.clone(),
			busybox_image: self.busybox_image.clone(),
			test_repo_list: self.test_repo_list.clone(),
			test_repo: self.test_repo.clone(),
			run_timeout_secs: self.timeout.map(|t| t.as_secs()),
			log_level: self.log_level.clone(),
			log_format: self.json_logs.then(|| "json".to_string()),
		}
	}
}

#[tokio::main]
async fn main() {
	let args = match Args::try_parse() {
		Ok(args) => args,
		Err(e) => {
			let code = usage_exit_code(&e);
			let _ = e.print();
			std::process::exit(code);
		}
	};
	let code = match run(args).await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:#}");
			exit_code::EXIT_TOOL_ERROR
		}
	};
	std::process::exit(code);
}

/// `--help` and `--version` succeed; any other parse error is a usage error.
fn usage_exit_code(err: &clap::Error) -> i32 {
	if err.use_stderr() {
		exit_code::EXIT_TOOL_ERROR
	} else {
		exit_code::EXIT_SUCCEEDED
	}
}

fn cleanup_exit_code(warnings: &[RunWarning]) -> i32 {
	if warnings.is_empty() {
		exit_code::EXIT_SUCCEEDED
	} else {
		exit_code::EXIT_CLEANUP_INCOMPLETE
	}
}

async fn run(args: Args) -> Result<i32> {
	let config = load_config_with_cli(args.overrides()).context("failed to load configuration")?;
	logging::init_tracing(&config.logging)?;

	if args.list_images {
		return list_images(&config).await;
	}

	let client = connect(&config).await?;

	if args.cleanup {
		let target = match &args.run_id {
			Some(id) => CleanupTarget::Run(
				id.parse::<RunId>()
					.with_context(|| format!("invalid run id {id:?}"))?,
			),
			None => CleanupTarget::AllManaged,
		};
		return Ok(cleanup(client, &config, &target).await);
	}

	run_conformance(client, &config).await
}

async fn connect(config: &SounderConfig) -> Result<Arc<dyn K8sClient>> {
	let client = KubeClient::from_kubeconfig(
		config.cluster.kubeconfig.as_deref(),
		config.cluster.context.as_deref(),
	)
	.await
	.context("failed to configure cluster client")?;
	Ok(Arc::new(client))
}

async fn list_images(config: &SounderConfig) -> Result<i32> {
	let image = match &config.images.conformance {
		Some(image) => image.clone(),
		None => {
			let client = connect(config).await?;
			let version = client
				.server_version()
				.await
				.context("failed to read the server version")?;
			conformance_image_for(&version)
		}
	};
	for image in list_required_images(&to_run_config(config, image, None)) {
		println!("{image}");
	}
	Ok(exit_code::EXIT_SUCCEEDED)
}

async fn cleanup(client: Arc<dyn K8sClient>, config: &SounderConfig, target: &CleanupTarget) -> i32 {
	eprintln!("cleaning up {target}");
	let warnings = CleanupManager::new(
		client,
		config.timeouts.cleanup_wait,
		config.timeouts.poll_interval,
	)
	.with_call_timeout(config.timeouts.api_call)
	.cleanup(target)
	.await;
	output::print_warnings(&warnings);
	cleanup_exit_code(&warnings)
}

async fn run_conformance(client: Arc<dyn K8sClient>, config: &SounderConfig) -> Result<i32> {
	let dry_run = config.run.dry_run;

	// A dry run never talks to the cluster.
	let server_version = if dry_run {
		None
	} else {
		match client.server_version().await {
			Ok(version) => Some(version),
			Err(e) => {
				eprintln!("error: cannot reach the cluster: {e}");
				return Ok(exit_code::EXIT_UNKNOWN);
			}
		}
	};

	let image = match (&config.images.conformance, &server_version) {
		(Some(image), _) => image.clone(),
		(None, Some(version)) => conformance_image_for(version),
		(None, None) => {
			warn!(image = DEFAULT_CONFORMANCE_IMAGE, "no conformance image configured, using the default");
			DEFAULT_CONFORMANCE_IMAGE.to_string()
		}
	};

	let repo_list = match &config.run.test_repo_list {
		Some(path) => Some(load_repo_list(path)?.raw),
		None => None,
	};

	let orchestrator = Orchestrator::new(client, to_run_config(config, image, repo_list));
	output::print_banner(
		&orchestrator.run_id(),
		server_version.as_deref(),
		orchestrator.config(),
	);

	let cancel = CancellationToken::new();
	setup_ctrlc_handler(cancel.clone())?;

	let outcome = if dry_run {
		let mut sink = sounder_runner::WriterSink::new(std::io::stdout());
		orchestrator.start_run(&mut sink, cancel).await
	} else {
		let mut sink = output::open_sink(&orchestrator.artifact_dir())?;
		orchestrator.start_run(&mut sink, cancel).await
	};

	match outcome {
		Ok(result) => {
			if result.simulated {
				for manifest in &result.manifests {
					println!("---");
					print!("{manifest}");
				}
			} else {
				output::print_summary(&result);
			}
			output::print_warnings(&result.warnings);
			info!(run_id = %result.run_id, exit_code = result.exit_code, "exiting");
			Ok(result.exit_code)
		}
		Err(aborted) => {
			output::print_warnings(&aborted.warnings);
			eprintln!("error: {}", aborted.error);
			Ok(aborted.exit_code)
		}
	}
}

fn setup_ctrlc_handler(cancel: CancellationToken) -> Result<()> {
	ctrlc::set_handler(move || {
		info!("received Ctrl+C, cancelling run");
		cancel.cancel();
		eprintln!();
	})
	.context("failed to set Ctrl+C handler")?;

	Ok(())
}
