// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for providers and the fan-out manager.

use tally_common_http::RetryableError;
use thiserror::Error;

/// Errors raised inside a provider.
///
/// These never reach callers of [`AnalyticsManager`](crate::AnalyticsManager);
/// the manager logs them and moves on to the next provider.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	/// API key or project token is missing.
	#[error("missing API key")]
	InvalidApiKey,

	/// Host could not be used as a base URL.
	#[error("invalid base URL: {0}")]
	InvalidBaseUrl(String),

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Backend answered with a non-success status.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// Backend asked us to slow down.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited { retry_after_secs: Option<u64> },

	/// Provider has been shut down.
	#[error("provider has been shut down")]
	ClientShutdown,

	/// Call arguments were rejected before enqueueing.
	#[error("validation failed: {0}")]
	ValidationFailed(String),

	#[error("serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	/// Catch-all for provider implementations outside this crate.
	#[error("provider failed: {0}")]
	ProviderFailed(String),
}

impl RetryableError for AnalyticsError {
	fn is_retryable(&self) -> bool {
		match self {
			AnalyticsError::RequestFailed(e) => e.is_retryable(),
			AnalyticsError::ServerError { status, .. } => {
				matches!(*status, 408 | 429 | 500 | 502 | 503 | 504)
			}
			AnalyticsError::RateLimited { .. } => true,
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
