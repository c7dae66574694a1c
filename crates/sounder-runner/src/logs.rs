// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming of the conformance container's output.

use std::io::{self, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use sounder_k8s::{K8sClient, K8sError, LogOptions, Pod};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::calculate_delay;
use crate::call::{bounded, call_deadline};
use crate::error::{RunError, RunWarning};
use crate::manifests::CONFORMANCE_CONTAINER;
use crate::types::WorkloadHandle;

/// Receives workload output one complete line at a time.
pub trait LogSink: Send {
	fn write_line(&mut self, line: &str) -> io::Result<()>;

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// Writes lines to any `Write`, e.g. stdout or a file.
pub struct WriterSink<W: Write + Send> {
	writer: W,
}

impl<W: Write + Send> WriterSink<W> {
	pub fn new(writer: W) -> Self {
		Self { writer }
	}

	pub fn into_inner(self) -> W {
		self.writer
	}
}

impl<W: Write + Send> LogSink for WriterSink<W> {
	fn write_line(&mut self, line: &str) -> io::Result<()> {
		self.writer.write_all(line.as_bytes())?;
		self.writer.write_all(b"\n")
	}

	fn flush(&mut self) -> io::Result<()> {
		self.writer.flush()
	}
}

/// Fans each line out to several sinks.
#[derive(Default)]
pub struct TeeSink {
	sinks: Vec<Box<dyn LogSink>>,
}

impl TeeSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, sink: Box<dyn LogSink>) -> Self {
		self.sinks.push(sink);
		self
	}
}

impl LogSink for TeeSink {
	fn write_line(&mut self, line: &str) -> io::Result<()> {
		let mut first_err = None;
		for sink in &mut self.sinks {
			if let Err(e) = sink.write_line(line) {
				first_err.get_or_insert(e);
			}
		}
		first_err.map_or(Ok(()), Err)
	}

	/// Flushes every sink even when an earlier one fails.
	fn flush(&mut self) -> io::Result<()> {
		let mut first_err = None;
		for sink in &mut self.sinks {
			if let Err(e) = sink.flush() {
				first_err.get_or_insert(e);
			}
		}
		first_err.map_or(Ok(()), Err)
	}
}

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
struct LineFramer {
	buf: Vec<u8>,
}

impl LineFramer {
	fn push(&mut self, chunk: &[u8]) -> Vec<String> {
		self.buf.extend_from_slice(chunk);
		let mut lines = Vec::new();
		while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
			let rest = self.buf.split_off(pos + 1);
			let mut line = std::mem::replace(&mut self.buf, rest);
			line.pop();
			if line.last() == Some(&b'\r') {
				line.pop();
			}
			lines.push(String::from_utf8_lossy(&line).into_owned());
		}
		lines
	}

	/// Remaining bytes without a trailing newline.
	fn take_partial(&mut self) -> Option<String> {
		if self.buf.is_empty() {
			return None;
		}
		let partial = std::mem::take(&mut self.buf);
		Some(String::from_utf8_lossy(&partial).into_owned())
	}

	fn discard_partial(&mut self) {
		self.buf.clear();
	}
}

/// Split a kubelet `--timestamps` line into its timestamp and content.
fn split_timestamp(line: &str) -> (Option<DateTime<Utc>>, &str) {
	match line.split_once(' ') {
		Some((ts, rest)) => match DateTime::parse_from_rfc3339(ts) {
			Ok(t) => (Some(t.with_timezone(&Utc)), rest),
			Err(_) => (None, line),
		},
		None => match DateTime::parse_from_rfc3339(line) {
			Ok(t) => (Some(t.with_timezone(&Utc)), ""),
			Err(_) => (None, line),
		},
	}
}

/// Position in the log, used to skip lines replayed after a reconnect.
///
/// `sinceTime` has second precision on the server, so a reconnect replays
/// some lines already forwarded. Lines older than `last` are dropped and
/// the first `seen_at_last` lines stamped exactly `last` are skipped.
#[derive(Debug, Default)]
struct LogCursor {
	last: Option<DateTime<Utc>>,
	seen_at_last: usize,
	replay_skip: usize,
}

impl LogCursor {
	fn reconnect(&mut self) {
		self.replay_skip = self.seen_at_last;
	}

	/// Whether a line stamped `ts` should be forwarded.
	fn admit(&mut self, ts: Option<DateTime<Utc>>) -> bool {
		let Some(ts) = ts else {
			return true;
		};
		match self.last {
			Some(last) if ts < last => false,
			Some(last) if ts == last => {
				if self.replay_skip > 0 {
					self.replay_skip -= 1;
					false
				} else {
					self.seen_at_last += 1;
					true
				}
			}
			_ => {
				self.last = Some(ts);
				self.seen_at_last = 1;
				self.replay_skip = 0;
				true
			}
		}
	}
}

enum ContainerStart {
	Started,
	Gone,
	Cancelled,
}

/// Forwards the conformance container's output to a [`LogSink`].
pub struct LogStreamer {
	client: Arc<dyn K8sClient>,
	handle: WorkloadHandle,
}

impl LogStreamer {
	pub fn new(client: Arc<dyn K8sClient>, handle: WorkloadHandle) -> Self {
		Self { client, handle }
	}

	/// Stream until the container terminates or `cancel` fires.
	///
	/// Returns a warning when the reconnect budget ran out. Fails only
	/// when the container never started.
	pub async fn stream(
		&self,
		sink: &mut dyn LogSink,
		cancel: &CancellationToken,
	) -> Result<Option<RunWarning>, RunError> {
		match self.wait_for_start(cancel).await? {
			ContainerStart::Started => {}
			ContainerStart::Gone | ContainerStart::Cancelled => return Ok(None),
		}

		let retry = &self.handle.config.retry;
		let api_call = self.handle.config.timeouts.api_call;
		let mut framer = LineFramer::default();
		let mut cursor = LogCursor::default();
		let mut failures: u32 = 0;

		loop {
			let opts = LogOptions {
				follow: true,
				timestamps: true,
				since_time: cursor.last,
				tail: None,
			};

			let opened = bounded(
				cancel,
				Instant::now() + api_call,
				self.client.stream_logs(
					&self.handle.pod_name,
					&self.handle.namespace,
					CONFORMANCE_CONTAINER,
					opts,
				),
			)
			.await;
			let Some(opened) = opened else {
				flush(sink);
				return Ok(None);
			};

			let reason = match opened {
				Ok(mut stream) => {
					debug!(pod = %self.handle.pod_name, since = ?cursor.last, "log stream opened");
					loop {
						let item = tokio::select! {
							_ = cancel.cancelled() => {
								flush(sink);
								return Ok(None);
							}
							item = stream.next() => item,
						};
						match item {
							Some(Ok(chunk)) => {
								let mut forwarded = false;
								for line in framer.push(&chunk) {
									let (ts, content) = split_timestamp(&line);
									if cursor.admit(ts) {
										forward(sink, content);
										forwarded = true;
									}
								}
								if forwarded {
									failures = 0;
								}
							}
							Some(Err(e)) => break format!("stream error: {e}"),
							None => break "stream closed".to_string(),
						}
					}
				}
				Err(e) if e.is_not_found() => return Ok(None),
				Err(e) => format!("open failed: {e}"),
			};

			let Some(finished) = self.container_finished(cancel).await else {
				flush(sink);
				return Ok(None);
			};
			if finished {
				if let Some(partial) = framer.take_partial() {
					let (ts, content) = split_timestamp(&partial);
					if cursor.admit(ts) {
						forward(sink, content);
					}
				}
				flush(sink);
				info!(pod = %self.handle.pod_name, "log stream finished");
				return Ok(None);
			}

			failures += 1;
			if failures > retry.max_attempts {
				warn!(pod = %self.handle.pod_name, attempts = retry.max_attempts, reason = %reason, "giving up on log stream");
				flush(sink);
				return Ok(Some(RunWarning::StreamInterrupted {
					attempts: retry.max_attempts,
					reason,
				}));
			}

			let delay = calculate_delay(retry, failures - 1);
			warn!(
				pod = %self.handle.pod_name,
				attempt = failures,
				max_attempts = retry.max_attempts,
				delay_ms = delay.as_millis() as u64,
				reason = %reason,
				"log stream disconnected, reconnecting"
			);
			framer.discard_partial();
			cursor.reconnect();

			tokio::select! {
				_ = cancel.cancelled() => {
					flush(sink);
					return Ok(None);
				}
				_ = tokio::time::sleep(delay) => {}
			}
		}
	}

	async fn wait_for_start(&self, cancel: &CancellationToken) -> Result<ContainerStart, RunError> {
		let config = &self.handle.config;
		let deadline = Instant::now() + config.timeouts.startup;
		let mut attempt: u32 = 0;
		let mut last_reason = "container not created".to_string();

		loop {
			let result = bounded(
				cancel,
				call_deadline(config.timeouts.api_call, deadline),
				self.client.get_pod(&self.handle.pod_name, &self.handle.namespace),
			)
			.await;
			let Some(result) = result else {
				return Ok(ContainerStart::Cancelled);
			};

			match result {
				Ok(pod) => match conformance_state(&pod) {
					ContainerState::Started => {
						debug!(pod = %self.handle.pod_name, "conformance container started");
						return Ok(ContainerStart::Started);
					}
					ContainerState::Waiting(reason) => last_reason = reason,
				},
				Err(K8sError::NotFound { .. }) => return Ok(ContainerStart::Gone),
				Err(e) => {
					debug!(error = %e, "pod status check failed");
					last_reason = e.to_string();
				}
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(RunError::WorkloadNeverStarted {
					timeout_secs: config.timeouts.startup.as_secs(),
					reason: last_reason,
				});
			}

			let delay = calculate_delay(&config.retry, attempt).min(deadline - now);
			attempt = attempt.saturating_add(1);
			tokio::select! {
				_ = cancel.cancelled() => return Ok(ContainerStart::Cancelled),
				_ = tokio::time::sleep(delay) => {}
			}
		}
	}

	/// `None` when cancelled while asking.
	async fn container_finished(&self, cancel: &CancellationToken) -> Option<bool> {
		let api_call = self.handle.config.timeouts.api_call;
		let result = bounded(
			cancel,
			Instant::now() + api_call,
			self.client.get_pod(&self.handle.pod_name, &self.handle.namespace),
		)
		.await?;
		Some(match result {
			Ok(pod) => conformance_terminated(&pod),
			Err(e) => e.is_not_found(),
		})
	}
}

fn forward(sink: &mut dyn LogSink, line: &str) {
	if let Err(e) = sink.write_line(line) {
		warn!(error = %e, "log sink write failed");
	}
}

fn flush(sink: &mut dyn LogSink) {
	if let Err(e) = sink.flush() {
		warn!(error = %e, "log sink flush failed");
	}
}

enum ContainerState {
	Started,
	Waiting(String),
}

fn conformance_status(pod: &Pod) -> Option<&sounder_k8s::ContainerStatus> {
	pod
		.status
		.as_ref()
		.and_then(|s| s.container_statuses.as_ref())
		.and_then(|cs| cs.iter().find(|c| c.name == CONFORMANCE_CONTAINER))
}

fn conformance_state(pod: &Pod) -> ContainerState {
	let Some(state) = conformance_status(pod).and_then(|c| c.state.as_ref()) else {
		return ContainerState::Waiting("container status not reported".to_string());
	};
	if state.running.is_some() || state.terminated.is_some() {
		return ContainerState::Started;
	}
	let reason = state
		.waiting
		.as_ref()
		.and_then(|w| w.reason.clone())
		.unwrap_or_else(|| "waiting".to_string());
	ContainerState::Waiting(reason)
}

fn conformance_terminated(pod: &Pod) -> bool {
	conformance_status(pod)
		.and_then(|c| c.state.as_ref())
		.is_some_and(|s| s.terminated.is_some())
}
