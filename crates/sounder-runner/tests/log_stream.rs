// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod support;

use std::time::Duration;

use chrono::{DateTime, Utc};
use sounder_runner::{Orchestrator, RunWarning, TerminalPhase};
use support::{at, client, log_line, test_config, Container, LogConnection, MockK8sClient, RecordingSink, StreamEnd};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn running_until(secs: u64) -> Vec<support::Snapshot> {
	vec![
		at(0, "Running", Container::Running),
		at(secs, "Running", Container::Terminated(0)),
	]
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_disconnect_does_not_duplicate_lines() {
	let dir = TempDir::new().unwrap();
	let (mock, k8s) = client(
		MockK8sClient::new()
			.with_timeline(running_until(40))
			.with_logs(vec![
				LogConnection::new(
					&[
						&log_line(1, "one"),
						&log_line(2, "two"),
						"2025-01-01T00:00:03.000000000Z thr",
					],
					StreamEnd::Error,
				),
				// The server replays from the start of the cursor second.
				LogConnection::new(
					&[
						&log_line(2, "two"),
						&log_line(3, "three"),
						&log_line(4, "four"),
					],
					StreamEnd::CloseAt(Duration::from_secs(40)),
				),
			])
			.with_conformance_artifacts(),
	);
	let mut sink = RecordingSink::default();

	let result = Orchestrator::new(k8s, test_config(dir.path()))
		.start_run(&mut sink, CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(sink.lines(), vec!["one", "two", "three", "four"]);
	assert_eq!(result.phase, TerminalPhase::Succeeded);
	assert_eq!(result.exit_code, 0);
	assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);

	let requests = mock.log_requests();
	assert_eq!(requests.len(), 2);
	assert!(requests.iter().all(|r| r.follow && r.timestamps));
	assert_eq!(requests[0].since_time, None);
	let expected: DateTime<Utc> = "2025-01-01T00:00:02Z".parse().unwrap();
	assert_eq!(requests[1].since_time, Some(expected));
}

#[tokio::test(start_paused = true)]
async fn lines_split_across_chunks_are_forwarded_whole() {
	let dir = TempDir::new().unwrap();
	let (_mock, k8s) = client(
		MockK8sClient::new()
			.with_timeline(running_until(25))
			.with_logs(vec![LogConnection::new(
				&[
					"2025-01-01T00:00:01.000000000Z hel",
					"lo\n2025-01-01T00:00:02.000000000Z world\n",
				],
				StreamEnd::CloseAt(Duration::from_secs(25)),
			)])
			.with_conformance_artifacts(),
	);
	let mut sink = RecordingSink::default();

	Orchestrator::new(k8s, test_config(dir.path()))
		.start_run(&mut sink, CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(sink.lines(), vec!["hello", "world"]);
}

#[tokio::test(start_paused = true)]
async fn unterminated_final_line_is_flushed_when_container_exits() {
	let dir = TempDir::new().unwrap();
	let (_mock, k8s) = client(
		MockK8sClient::new()
			.with_timeline(running_until(25))
			.with_logs(vec![LogConnection::new(
				&[&log_line(1, "a"), "2025-01-01T00:00:02.000000000Z done"],
				StreamEnd::CloseAt(Duration::from_secs(25)),
			)])
			.with_conformance_artifacts(),
	);
	let mut sink = RecordingSink::default();

	Orchestrator::new(k8s, test_config(dir.path()))
		.start_run(&mut sink, CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(sink.lines(), vec!["a", "done"]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_become_a_warning_and_phase_is_unaffected() {
	let dir = TempDir::new().unwrap();
	let drops: Vec<LogConnection> = (0..4)
		.map(|_| LogConnection::new(&[], StreamEnd::Error))
		.collect();
	let (mock, k8s) = client(
		MockK8sClient::new()
			.with_timeline(running_until(25))
			.with_logs(drops)
			.with_conformance_artifacts(),
	);

	let result = Orchestrator::new(k8s, test_config(dir.path()))
		.start_run(&mut RecordingSink::default(), CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(result.phase, TerminalPhase::Succeeded);
	assert_eq!(result.exit_code, 0);
	assert_eq!(result.warnings.len(), 1);
	assert!(matches!(
		&result.warnings[0],
		RunWarning::StreamInterrupted { attempts: 3, .. }
	));
	assert_eq!(mock.log_requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn stream_is_cut_after_the_drain_window() {
	let dir = TempDir::new().unwrap();
	let (_mock, k8s) = client(
		MockK8sClient::new()
			.with_timeline(running_until(25))
			.with_logs(vec![LogConnection::new(
				&[&log_line(1, "last words")],
				StreamEnd::Pending,
			)])
			.with_conformance_artifacts(),
	);
	let mut sink = RecordingSink::default();
	let started = tokio::time::Instant::now();

	let result = Orchestrator::new(k8s, test_config(dir.path()))
		.start_run(&mut sink, CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(result.phase, TerminalPhase::Succeeded);
	assert_eq!(sink.lines(), vec!["last words"]);
	// Terminal at the 30s poll, plus the 5s drain window.
	assert!(started.elapsed() >= Duration::from_secs(35));
	assert!(started.elapsed() < Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_while_running_reconnects_from_the_cursor() {
	let dir = TempDir::new().unwrap();
	let (mock, k8s) = client(
		MockK8sClient::new()
			.with_timeline(running_until(40))
			.with_logs(vec![
				// The API server closed the follow request; the container keeps running.
				LogConnection::new(&[&log_line(1, "one"), &log_line(2, "two")], StreamEnd::Eof),
				LogConnection::new(
					&[&log_line(2, "two"), &log_line(3, "three")],
					StreamEnd::CloseAt(Duration::from_secs(40)),
				),
			])
			.with_conformance_artifacts(),
	);
	let mut sink = RecordingSink::default();

	let result = Orchestrator::new(k8s, test_config(dir.path()))
		.start_run(&mut sink, CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(sink.lines(), vec!["one", "two", "three"]);
	assert_eq!(result.phase, TerminalPhase::Succeeded);
	assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);

	let requests = mock.log_requests();
	assert_eq!(requests.len(), 2);
	assert_eq!(requests[0].since_time, None);
	let expected: DateTime<Utc> = "2025-01-01T00:00:02Z".parse().unwrap();
	assert_eq!(requests[1].since_time, Some(expected));
}
