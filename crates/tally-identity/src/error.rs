// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Property store failures.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Failures surfaced by mutating identity and usage operations.
///
/// Reads never fail: an unreadable value is treated as absent.
#[derive(Debug, Error)]
pub enum IdentityError {
	#[error("failed to persist {key}: {source}")]
	Store {
		key: String,
		#[source]
		source: StoreError,
	},
}

impl IdentityError {
	pub(crate) fn store(key: impl Into<String>, source: StoreError) -> Self {
		IdentityError::Store {
			key: key.into(),
			source,
		}
	}
}

pub type Result<T> = std::result::Result<T, IdentityError>;
