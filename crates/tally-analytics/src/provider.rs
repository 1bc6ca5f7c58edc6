// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The backend abstraction every analytics adapter implements.

use std::sync::Arc;
use std::time::Duration;

use tally_analytics_core::{Properties, ProviderConfig, ProviderKind};
use tracing::debug;

use crate::batch::BatchConfig;
use crate::error::{AnalyticsError, Result};
use crate::mixpanel::MixpanelProvider;
use crate::posthog::PostHogProvider;

/// One analytics backend.
///
/// Implementations enqueue and return; delivery happens on their own
/// schedule. Errors returned here are logged by
/// [`AnalyticsManager`](crate::AnalyticsManager) and never reach its callers.
#[async_trait::async_trait]
pub trait AnalyticsProvider: Send + Sync {
	/// Stable name used in logs and recorded calls.
	fn name(&self) -> &str;

	/// Records an event. Fire-and-forget.
	async fn track(&self, event: &str, properties: Properties) -> Result<()>;

	/// Associates subsequent events with `user_id` and merges `properties`
	/// into the user's traits. Calling it again with the same id is harmless.
	async fn identify(&self, user_id: &str, properties: Properties) -> Result<()>;

	/// Merges traits into the identified user. No-op before `identify`.
	async fn set_user_properties(&self, properties: Properties) -> Result<()>;

	/// Forgets the identified user. Safe to call when nobody is identified.
	async fn reset(&self) -> Result<()>;

	/// Pushes anything queued to the backend, best effort.
	async fn flush(&self) -> Result<()>;
}

/// Turns a [`ProviderConfig`] into a live provider.
pub trait ProviderFactory: Send + Sync {
	fn create(&self, config: &ProviderConfig, is_debug: bool)
		-> Result<Arc<dyn AnalyticsProvider>>;
}

/// Builds the HTTP-backed PostHog and Mixpanel adapters.
#[derive(Debug, Clone)]
pub struct HttpProviderFactory {
	request_timeout: Duration,
	batch: Option<BatchConfig>,
}

impl Default for HttpProviderFactory {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(10),
			batch: None,
		}
	}
}

impl HttpProviderFactory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Overrides the batch settings otherwise picked from the debug flag.
	pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
		self.batch = Some(batch);
		self
	}
}

impl ProviderFactory for HttpProviderFactory {
	fn create(
		&self,
		config: &ProviderConfig,
		is_debug: bool,
	) -> Result<Arc<dyn AnalyticsProvider>> {
		if !config.is_enabled() {
			return Err(AnalyticsError::InvalidApiKey);
		}

		let host = config.resolved_host();
		if !(host.starts_with("http://") || host.starts_with("https://")) {
			return Err(AnalyticsError::InvalidBaseUrl(host));
		}

		let client = tally_common_http::new_client_with_timeout(self.request_timeout)?;
		let batch = self
			.batch
			.clone()
			.unwrap_or_else(|| BatchConfig::for_environment(is_debug));

		debug!(provider = %config.kind, host = %host, is_debug, "creating analytics provider");

		let provider: Arc<dyn AnalyticsProvider> = match config.kind {
			ProviderKind::PostHog => Arc::new(PostHogProvider::new(
				client,
				host,
				config.api_key.clone(),
				batch,
			)),
			ProviderKind::Mixpanel => Arc::new(MixpanelProvider::new(
				client,
				host,
				config.api_key.clone(),
				batch,
			)),
		};
		Ok(provider)
	}
}

/// Distinct-id bookkeeping shared by the HTTP adapters.
#[derive(Debug, Clone)]
pub(crate) struct DistinctIds {
	anonymous_id: String,
	identified: Option<String>,
}

impl DistinctIds {
	pub(crate) fn new() -> Self {
		Self {
			anonymous_id: uuid::Uuid::new_v4().to_string(),
			identified: None,
		}
	}

	/// The id events are attributed to right now.
	pub(crate) fn current(&self) -> &str {
		self.identified.as_deref().unwrap_or(&self.anonymous_id)
	}

	pub(crate) fn anonymous_id(&self) -> &str {
		&self.anonymous_id
	}

	pub(crate) fn identified(&self) -> Option<&str> {
		self.identified.as_deref()
	}

	pub(crate) fn identify(&mut self, user_id: &str) {
		self.identified = Some(user_id.to_string());
	}

	/// Drops the identified user and starts a fresh anonymous id.
	pub(crate) fn reset(&mut self) {
		self.identified = None;
		self.anonymous_id = uuid::Uuid::new_v4().to_string();
	}
}

pub(crate) fn require_event_name(event: &str) -> Result<()> {
	if event.trim().is_empty() {
		return Err(AnalyticsError::ValidationFailed(
			"event name must not be empty".to_string(),
		));
	}
	Ok(())
}

pub(crate) fn require_user_id(user_id: &str) -> Result<()> {
	if user_id.trim().is_empty() {
		return Err(AnalyticsError::ValidationFailed(
			"user id must not be empty".to_string(),
		));
	}
	Ok(())
}

/// Maps a backend response onto the crate's error type.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<()> {
	let status = response.status();

	if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
		let retry_after = response
			.headers()
			.get("Retry-After")
			.and_then(|v| v.to_str().ok())
			.and_then(|s| s.parse().ok());
		return Err(AnalyticsError::RateLimited {
			retry_after_secs: retry_after,
		});
	}

	if !status.is_success() {
		return Err(AnalyticsError::ServerError {
			status: status.as_u16(),
			message: response.text().await.unwrap_or_default(),
		});
	}

	Ok(())
}
