// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exponential backoff delays.

use std::time::Duration;

use crate::types::RetryPolicy;

/// Delay before retry number `attempt` (zero based).
///
/// With jitter the capped delay is scaled by a factor in `[0.5, 1.5)`.
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
	let exponential_delay =
		policy.base_delay.as_secs_f64() * policy.backoff_factor.powi(attempt as i32);
	let capped_delay = exponential_delay.min(policy.max_delay.as_secs_f64());

	let final_delay = if policy.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		capped_delay * jitter_factor
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}
