// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::RunConfig;

/// Images a run pulls, conformance image first, without duplicates.
pub fn list_required_images(config: &RunConfig) -> Vec<String> {
	let mut images: Vec<String> = Vec::with_capacity(2);
	for image in [&config.conformance_image, &config.busybox_image] {
		let image = image.trim();
		if !image.is_empty() && !images.iter().any(|i| i == image) {
			images.push(image.to_string());
		}
	}
	images
}
