// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fan-out of tracking calls to every configured provider.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tally_analytics_core::{AppContext, CommonProperties, Properties, PropertyValue, ProviderConfig};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{AnalyticsError, Result};
use crate::provider::{AnalyticsProvider, HttpProviderFactory, ProviderFactory};

/// Per-provider bound on [`AnalyticsManager::flush`].
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

const DEBUG_ID_PREFIX: &str = "debug_";

#[derive(Default)]
struct ManagerState {
	providers: Vec<Arc<dyn AnalyticsProvider>>,
	common: Properties,
	current_user: Option<String>,
}

/// Broadcasts analytics calls to an ordered set of providers.
///
/// Every call is best effort. Provider errors are logged and panics caught,
/// so nothing raised by a provider reaches the caller or stops the
/// remaining providers from being called. With no providers configured every
/// operation is a no-op.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tally_analytics::{AnalyticsManager, AppContext, Properties, ProviderConfig, ProviderKind};
///
/// # async fn run() {
/// let manager = Arc::new(AnalyticsManager::with_default_factory(AppContext::detect()));
/// manager
/// 	.configure(vec![ProviderConfig::new(ProviderKind::PostHog, "phc_xxx")])
/// 	.await;
/// manager
/// 	.track("screen_view", Some(Properties::new().insert("screen_name", "home")))
/// 	.await;
/// manager.flush().await;
/// # }
/// ```
pub struct AnalyticsManager {
	context: AppContext,
	factory: Arc<dyn ProviderFactory>,
	flush_timeout: Duration,
	state: RwLock<ManagerState>,
}

impl AnalyticsManager {
	pub fn new(context: AppContext, factory: Arc<dyn ProviderFactory>) -> Self {
		Self {
			context,
			factory,
			flush_timeout: DEFAULT_FLUSH_TIMEOUT,
			state: RwLock::new(ManagerState::default()),
		}
	}

	/// Manager whose providers talk HTTP to PostHog and Mixpanel.
	pub fn with_default_factory(context: AppContext) -> Self {
		Self::new(context, Arc::new(HttpProviderFactory::new()))
	}

	pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
		self.flush_timeout = timeout;
		self
	}

	pub fn context(&self) -> &AppContext {
		&self.context
	}

	/// Replaces every provider with one per enabled entry of `configs`, in
	/// order, and recomputes the common properties.
	///
	/// Entries with a blank key are skipped silently. A provider the factory
	/// cannot build is logged and skipped.
	pub async fn configure(&self, configs: Vec<ProviderConfig>) {
		let mut providers = Vec::with_capacity(configs.len());
		for config in configs.iter().filter(|c| c.is_enabled()) {
			match self.factory.create(config, self.context.is_debug) {
				Ok(provider) => providers.push(provider),
				Err(e) => warn!(provider = %config.kind, error = %e, "skipping analytics provider"),
			}
		}
		self.install(providers).await;
	}

	/// Replaces every provider with `providers`, keeping their order.
	pub async fn configure_providers(&self, providers: Vec<Arc<dyn AnalyticsProvider>>) {
		self.install(providers).await;
	}

	async fn install(&self, providers: Vec<Arc<dyn AnalyticsProvider>>) {
		let common = CommonProperties::from_context(&self.context).to_properties();
		let names: Vec<String> = providers.iter().map(|p| p.name().to_string()).collect();

		let previous = {
			let mut state = self.state.write().await;
			state.common = common;
			std::mem::replace(&mut state.providers, providers)
		};

		info!(
			providers = ?names,
			replaced = previous.len(),
			environment = %self.context.environment(),
			user_type = %self.context.user_type(),
			"analytics configured"
		);
	}

	/// Sends `event` to every provider with the common properties underneath
	/// `properties`. Event values win on key collision.
	pub async fn track(&self, event: &str, properties: Option<Properties>) {
		if event.trim().is_empty() {
			warn!("dropping analytics event with empty name");
			return;
		}

		let common = self.state.read().await.common.clone();
		let merged = common.merge(properties.unwrap_or_default());
		debug!(event, property_count = merged.len(), "tracking analytics event");

		let event = event.to_string();
		self
			.broadcast("track", |provider| {
				let event = event.clone();
				let merged = merged.clone();
				async move { provider.track(&event, merged).await }
			})
			.await;
	}

	/// Attributes subsequent events to `user_id`.
	///
	/// Debug builds send `debug_<user_id>` and add `is_debug_user` and
	/// `original_user_id` to the traits so test traffic never lands on a
	/// production profile.
	pub async fn identify(&self, user_id: &str, properties: Option<Properties>) {
		if user_id.trim().is_empty() {
			warn!("ignoring identify with empty user id");
			return;
		}

		let mut properties = properties.unwrap_or_default();
		let effective_id = if self.context.is_debug {
			properties.set("is_debug_user", true);
			properties.set("original_user_id", user_id);
			format!("{DEBUG_ID_PREFIX}{user_id}")
		} else {
			user_id.to_string()
		};

		self.state.write().await.current_user = Some(effective_id.clone());
		debug!(user_id = %effective_id, "identifying analytics user");

		self
			.broadcast("identify", |provider| {
				let id = effective_id.clone();
				let properties = properties.clone();
				async move { provider.identify(&id, properties).await }
			})
			.await;
	}

	/// Sends user traits as given, without the common properties.
	pub async fn set_user_properties(&self, properties: Properties) {
		self
			.broadcast("set_user_properties", |provider| {
				let properties = properties.clone();
				async move { provider.set_user_properties(properties).await }
			})
			.await;
	}

	pub async fn set_user_property(&self, key: impl Into<String>, value: impl Into<PropertyValue>) {
		self
			.set_user_properties(Properties::new().insert(key, value))
			.await;
	}

	pub async fn reset(&self) {
		self.state.write().await.current_user = None;
		debug!("resetting analytics identity");
		self
			.broadcast("reset", |provider| async move { provider.reset().await })
			.await;
	}

	/// Drains every provider, waiting at most the flush timeout for each.
	pub async fn flush(&self) {
		let timeout = self.flush_timeout;
		self
			.broadcast("flush", |provider| async move {
				match tokio::time::timeout(timeout, provider.flush()).await {
					Ok(result) => result,
					Err(_) => Err(AnalyticsError::ProviderFailed(format!(
						"flush timed out after {}ms",
						timeout.as_millis()
					))),
				}
			})
			.await;
	}

	/// Effective id from the last `identify`, cleared by `reset`.
	pub async fn current_user_id(&self) -> Option<String> {
		self.state.read().await.current_user.clone()
	}

	pub async fn common_properties(&self) -> Properties {
		self.state.read().await.common.clone()
	}

	pub async fn provider_names(&self) -> Vec<String> {
		self
			.state
			.read()
			.await
			.providers
			.iter()
			.map(|p| p.name().to_string())
			.collect()
	}

	pub async fn provider_count(&self) -> usize {
		self.state.read().await.providers.len()
	}

	/// Calls `call` on each provider in order, outside the state lock.
	async fn broadcast<F, Fut>(&self, operation: &'static str, call: F)
	where
		F: Fn(Arc<dyn AnalyticsProvider>) -> Fut,
		Fut: Future<Output = Result<()>>,
	{
		let providers = self.state.read().await.providers.clone();

		for provider in providers {
			let name = provider.name().to_string();
			match AssertUnwindSafe(call(provider)).catch_unwind().await {
				Ok(Ok(())) => {}
				Ok(Err(e)) => {
					warn!(provider = %name, operation, error = %e, "analytics provider call failed");
				}
				Err(panic) => {
					error!(
						provider = %name,
						operation,
						panic = panic_message(panic.as_ref()),
						"analytics provider panicked"
					);
				}
			}
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.as_str()
	} else {
		"unknown panic"
	}
}
