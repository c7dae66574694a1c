// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use sounder_config::{runtime::LoggingConfig, LogFormat};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// Diagnostics go to stderr (or the configured file) so workload output on
/// stdout stays clean. `RUST_LOG` wins over the configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("sounder={}", logging.level.as_str())));

	match &logging.file {
		Some(path) => {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.with_context(|| format!("failed to open log file {}", path.display()))?;
			let writer = Mutex::new(file);
			let registry = tracing_subscriber::registry().with(filter);
			match logging.format {
				LogFormat::Json => registry
					.with(fmt::layer().json().with_writer(writer))
					.init(),
				LogFormat::Compact => registry
					.with(fmt::layer().compact().with_ansi(false).with_writer(writer))
					.init(),
				LogFormat::Pretty => registry
					.with(fmt::layer().with_ansi(false).with_writer(writer))
					.init(),
			}
		}
		None => {
			let registry = tracing_subscriber::registry().with(filter);
			match logging.format {
				LogFormat::Json => registry
					.with(fmt::layer().json().with_writer(std::io::stderr))
					.init(),
				LogFormat::Compact => registry
					.with(fmt::layer().compact().with_writer(std::io::stderr))
					.init(),
				LogFormat::Pretty => registry
					.with(fmt::layer().with_writer(std::io::stderr))
					.init(),
			}
		}
	}
	Ok(())
}
