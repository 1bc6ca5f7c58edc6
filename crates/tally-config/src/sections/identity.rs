// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity configuration section.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_KEY_PREFIX: &str = "tally_";

/// Default store location: `<data dir>/tally/store.json`, falling back to
/// the working directory when the platform has no data dir.
fn default_store_path() -> PathBuf {
	dirs::data_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join("tally")
		.join("store.json")
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct IdentityConfigLayer {
	pub key_prefix: Option<String>,
	pub platform: Option<String>,
	pub store_path: Option<PathBuf>,
}

impl IdentityConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.key_prefix.is_some() {
			self.key_prefix = other.key_prefix;
		}
		if other.platform.is_some() {
			self.platform = other.platform;
		}
		if other.store_path.is_some() {
			self.store_path = other.store_path;
		}
	}

	pub fn finalize(self) -> IdentityConfig {
		IdentityConfig {
			key_prefix: self
				.key_prefix
				.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
			platform: self.platform,
			store_path: self.store_path.unwrap_or_else(default_store_path),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConfig {
	pub key_prefix: String,
	/// Overrides the detected platform name when set.
	pub platform: Option<String>,
	pub store_path: PathBuf,
}

impl Default for IdentityConfig {
	fn default() -> Self {
		IdentityConfigLayer::default().finalize()
	}
}
