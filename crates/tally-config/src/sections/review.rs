// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Review prompt configuration section.

use serde::Deserialize;

const DEFAULT_MINIMUM_APP_LAUNCHES: u64 = 7;
const DEFAULT_DAYS_BETWEEN_REQUESTS: u32 = 7;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ReviewConfigLayer {
	pub minimum_app_launches: Option<u64>,
	pub days_between_requests: Option<u32>,
}

impl ReviewConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.minimum_app_launches.is_some() {
			self.minimum_app_launches = other.minimum_app_launches;
		}
		if other.days_between_requests.is_some() {
			self.days_between_requests = other.days_between_requests;
		}
	}

	pub fn finalize(self) -> ReviewConfig {
		ReviewConfig {
			minimum_app_launches: self
				.minimum_app_launches
				.unwrap_or(DEFAULT_MINIMUM_APP_LAUNCHES),
			days_between_requests: self
				.days_between_requests
				.unwrap_or(DEFAULT_DAYS_BETWEEN_REQUESTS),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewConfig {
	pub minimum_app_launches: u64,
	pub days_between_requests: u32,
}

impl Default for ReviewConfig {
	fn default() -> Self {
		ReviewConfigLayer::default().finalize()
	}
}
