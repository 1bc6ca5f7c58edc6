// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Install identity and user traits, persisted in a [`PropertyStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_analytics::AnalyticsManager;
use tally_analytics_core::{AppContext, Properties, PropertyValue};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::store::PropertyStore;
use crate::usage::read_launches;

pub const DEFAULT_KEY_PREFIX: &str = "tally_";

/// Naming and labelling for the identity manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySettings {
	/// Prepended to every store key the manager owns.
	pub key_prefix: String,
	/// Reported as the `platform` trait.
	pub platform: String,
}

impl Default for IdentitySettings {
	fn default() -> Self {
		Self {
			key_prefix: DEFAULT_KEY_PREFIX.to_string(),
			platform: std::env::consts::OS.to_string(),
		}
	}
}

#[derive(Debug, Clone)]
struct StoreKeys {
	user_id: String,
	installation_date: String,
	user_properties: String,
	first_launch: String,
}

impl StoreKeys {
	fn with_prefix(prefix: &str) -> Self {
		Self {
			user_id: format!("{prefix}user_id"),
			installation_date: format!("{prefix}installation_date"),
			user_properties: format!("{prefix}user_properties"),
			first_launch: format!("{prefix}first_launch"),
		}
	}
}

/// Owns the install's user id, installation date, first-launch flag and
/// stored custom traits, and reports identity changes to analytics.
///
/// The user id is created lazily on first read and then never changes until
/// [`IdentityManager::reset_user_identity`].
pub struct IdentityManager {
	store: Arc<dyn PropertyStore>,
	analytics: Arc<AnalyticsManager>,
	context: AppContext,
	settings: IdentitySettings,
	keys: StoreKeys,
	user_id: Mutex<Option<String>>,
	installation_date: Mutex<Option<DateTime<Utc>>>,
	first_launch: Mutex<()>,
}

impl IdentityManager {
	pub fn new(
		store: Arc<dyn PropertyStore>,
		analytics: Arc<AnalyticsManager>,
		context: AppContext,
		settings: IdentitySettings,
	) -> Self {
		let keys = StoreKeys::with_prefix(&settings.key_prefix);
		Self {
			store,
			analytics,
			context,
			settings,
			keys,
			user_id: Mutex::new(None),
			installation_date: Mutex::new(None),
			first_launch: Mutex::new(()),
		}
	}

	pub fn settings(&self) -> &IdentitySettings {
		&self.settings
	}

	/// Returns the install's user id, creating and persisting it on first use.
	///
	/// A freshly created id also gets the initial anonymous traits, which are
	/// stored and sent to analytics. Concurrent first callers all observe the
	/// same id.
	pub async fn current_user_id(&self) -> Result<String> {
		let mut cached = self.user_id.lock().await;
		if let Some(id) = cached.as_ref() {
			return Ok(id.clone());
		}

		if let Some(id) = self.read_string(&self.keys.user_id).await {
			*cached = Some(id.clone());
			return Ok(id);
		}

		let id = Uuid::new_v4().to_string();
		self
			.store
			.set(&self.keys.user_id, PropertyValue::from(id.as_str()))
			.await
			.map_err(|e| IdentityError::store(&self.keys.user_id, e))?;
		*cached = Some(id.clone());

		let initial = Properties::new()
			.insert("user_type", "anonymous")
			.insert("registration_method", "automatic")
			.insert("first_launch", true);
		self.persist_user_properties(initial.clone()).await?;
		drop(cached);

		info!(user_id = %id, "created install identity");
		self.analytics.set_user_properties(initial).await;
		Ok(id)
	}

	/// When this install first asked for its installation date.
	pub async fn installation_date(&self) -> Result<DateTime<Utc>> {
		let mut cached = self.installation_date.lock().await;
		if let Some(date) = *cached {
			return Ok(date);
		}

		let stored = match self.store.get(&self.keys.installation_date).await {
			Ok(value) => value.and_then(|v| v.as_timestamp()),
			Err(e) => {
				warn!(key = %self.keys.installation_date, error = %e, "failed to read installation date");
				None
			}
		};

		let date = match stored {
			Some(date) => date,
			None => {
				let now = Utc::now();
				self
					.store
					.set(&self.keys.installation_date, PropertyValue::from(now))
					.await
					.map_err(|e| IdentityError::store(&self.keys.installation_date, e))?;
				now
			}
		};

		*cached = Some(date);
		Ok(date)
	}

	/// Device, app and usage traits, with stored custom traits on top.
	pub async fn user_properties(&self) -> Result<Properties> {
		let installation_date = self.installation_date().await?;
		let launches = read_launches(self.store.as_ref()).await;

		let derived = Properties::new()
			.insert("installation_date", installation_date)
			.insert("platform", self.settings.platform.as_str())
			.insert("app_version", self.context.app_version.as_str())
			.insert("build_number", self.context.app_build.as_str())
			.insert("device_model", self.context.device_model.as_str())
			.insert("os_version", self.context.os_version.as_str())
			.insert("timezone", self.context.timezone.as_str())
			.insert("locale", self.context.locale.as_str())
			.insert("total_launches", launches);

		Ok(derived.merge(self.stored_user_properties().await))
	}

	/// Custom traits persisted so far.
	pub async fn stored_user_properties(&self) -> Properties {
		match self.store.get_mapping(&self.keys.user_properties).await {
			Ok(props) => props.unwrap_or_default(),
			Err(e) => {
				warn!(error = %e, "failed to read stored user properties");
				Properties::new()
			}
		}
	}

	/// Identifies the install's user with analytics, sending every trait.
	pub async fn initialize_user(&self) -> Result<String> {
		let user_id = self.current_user_id().await?;
		let properties = self.user_properties().await?;
		self.analytics.identify(&user_id, Some(properties)).await;
		info!(user_id = %user_id, "user initialized");
		Ok(user_id)
	}

	pub async fn set_user_property(
		&self,
		key: impl Into<String>,
		value: impl Into<PropertyValue>,
	) -> Result<()> {
		self
			.set_user_properties(Properties::new().insert(key, value))
			.await
	}

	/// Stores `properties` over the existing traits, then sends them.
	pub async fn set_user_properties(&self, properties: Properties) -> Result<()> {
		self.persist_user_properties(properties.clone()).await?;
		self.analytics.set_user_properties(properties).await;
		Ok(())
	}

	async fn persist_user_properties(&self, properties: Properties) -> Result<()> {
		let merged = self.stored_user_properties().await.merge(properties);
		self
			.store
			.set_mapping(&self.keys.user_properties, merged)
			.await
			.map_err(|e| IdentityError::store(&self.keys.user_properties, e))
	}

	/// True on the first call for this install, false on every later call,
	/// including after a restart.
	pub async fn is_first_launch(&self) -> Result<bool> {
		let _guard = self.first_launch.lock().await;
		let seen = match self.store.get(&self.keys.first_launch).await {
			Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
			Err(e) => {
				warn!(error = %e, "failed to read first-launch flag");
				false
			}
		};
		if seen {
			return Ok(false);
		}

		self
			.store
			.set(&self.keys.first_launch, PropertyValue::from(true))
			.await
			.map_err(|e| IdentityError::store(&self.keys.first_launch, e))?;
		Ok(true)
	}

	/// Emits `app_first_launch` when this is the install's first launch.
	/// Returns whether it was.
	pub async fn track_first_launch_events(&self) -> Result<bool> {
		if !self.is_first_launch().await? {
			return Ok(false);
		}

		let installation_date = self.installation_date().await?;
		self
			.analytics
			.track(
				"app_first_launch",
				Some(
					Properties::new()
						.insert("installation_date", installation_date)
						.insert("platform", self.settings.platform.as_str()),
				),
			)
			.await;
		self.set_user_property("first_launch_completed", true).await?;
		Ok(true)
	}

	pub async fn track_app_launch(&self) -> Result<()> {
		let user_id = self.current_user_id().await?;
		self
			.analytics
			.track(
				"app_launch",
				Some(
					Properties::new()
						.insert("launch_time", Utc::now())
						.insert("user_id", user_id),
				),
			)
			.await;
		Ok(())
	}

	pub async fn track_user_milestone(&self, milestone: &str, properties: Option<Properties>) -> Result<()> {
		let user_id = self.current_user_id().await?;
		let properties = properties
			.unwrap_or_default()
			.insert("milestone", milestone)
			.insert("user_id", user_id);
		self.analytics.track("user_milestone", Some(properties)).await;

		self
			.set_user_properties(
				Properties::new()
					.insert("last_milestone", milestone)
					.insert("last_milestone_date", Utc::now()),
			)
			.await
	}

	/// Forgets the current user and immediately establishes a new one.
	///
	/// The old id and stored traits are removed; the installation date and
	/// first-launch flag belong to the install and are kept.
	pub async fn reset_user_identity(&self) -> Result<String> {
		let previous = {
			let mut cached = self.user_id.lock().await;
			let previous = cached.take();
			for key in [&self.keys.user_id, &self.keys.user_properties] {
				self
					.store
					.remove(key)
					.await
					.map_err(|e| IdentityError::store(key.as_str(), e))?;
			}
			previous
		};

		self.analytics.reset().await;
		let user_id = self.initialize_user().await?;
		debug!(previous = ?previous, user_id = %user_id, "user identity reset");
		Ok(user_id)
	}

	async fn read_string(&self, key: &str) -> Option<String> {
		match self.store.get(key).await {
			Ok(Some(PropertyValue::String(s))) if !s.trim().is_empty() => Some(s),
			Ok(_) => None,
			Err(e) => {
				warn!(key, error = %e, "failed to read store; treating as absent");
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryStore;
	use tally_analytics::{CallLog, RecordedCall, RecordingFactory};
	use tally_analytics_core::{ProviderConfig, ProviderKind};

	async fn fixture(is_debug: bool) -> (IdentityManager, Arc<MemoryStore>, CallLog) {
		let log = CallLog::new();
		let context = AppContext::default()
			.with_app("demo", "3.1.0", "301")
			.with_debug(is_debug);
		let analytics = Arc::new(AnalyticsManager::new(
			context.clone(),
			Arc::new(RecordingFactory::new(log.clone())),
		));
		analytics
			.configure(vec![ProviderConfig::new(ProviderKind::PostHog, "k")])
			.await;

		let store = Arc::new(MemoryStore::new());
		let identity = IdentityManager::new(
			store.clone(),
			analytics,
			context,
			IdentitySettings {
				key_prefix: "t_".to_string(),
				platform: "ios".to_string(),
			},
		);
		(identity, store, log)
	}

	fn is_uuid_v4(id: &str) -> bool {
		Uuid::parse_str(id).map(|u| u.get_version_num() == 4).unwrap_or(false) && id == id.to_lowercase()
	}

	#[tokio::test]
	async fn user_id_is_created_once() {
		let (identity, store, _) = fixture(false).await;

		let first = identity.current_user_id().await.unwrap();
		let second = identity.current_user_id().await.unwrap();

		assert_eq!(first, second);
		assert!(is_uuid_v4(&first));
		assert_eq!(store.get("t_user_id").await.unwrap(), Some(PropertyValue::from(first.as_str())));
	}

	#[tokio::test]
	async fn new_identity_gets_initial_traits() {
		let (identity, _, log) = fixture(false).await;

		identity.current_user_id().await.unwrap();

		let stored = identity.stored_user_properties().await;
		assert_eq!(stored.get("user_type"), Some(&PropertyValue::from("anonymous")));
		assert_eq!(stored.get("registration_method"), Some(&PropertyValue::from("automatic")));
		assert_eq!(stored.get("first_launch"), Some(&PropertyValue::Bool(true)));
		assert!(matches!(
			log.calls_for("posthog").last(),
			Some(RecordedCall::SetUserProperties { .. })
		));
	}

	#[tokio::test]
	async fn existing_id_is_read_from_store() {
		let (identity, store, _) = fixture(false).await;
		store
			.set("t_user_id", PropertyValue::from("0d6f7c52-8a8e-4d8f-9d55-3b1c1f0a2b7e"))
			.await
			.unwrap();

		assert_eq!(
			identity.current_user_id().await.unwrap(),
			"0d6f7c52-8a8e-4d8f-9d55-3b1c1f0a2b7e"
		);
		assert!(identity.stored_user_properties().await.is_empty());
	}

	#[tokio::test]
	async fn concurrent_first_reads_agree() {
		let (identity, _, _) = fixture(false).await;
		let identity = Arc::new(identity);

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let identity = identity.clone();
				tokio::spawn(async move { identity.current_user_id().await.unwrap() })
			})
			.collect();

		let mut ids = Vec::new();
		for handle in handles {
			ids.push(handle.await.unwrap());
		}
		ids.dedup();
		assert_eq!(ids.len(), 1);
	}

	#[tokio::test]
	async fn installation_date_is_stable() {
		let (identity, _, _) = fixture(false).await;
		let first = identity.installation_date().await.unwrap();
		let second = identity.installation_date().await.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn user_properties_layer_stored_over_derived() {
		let (identity, _, _) = fixture(false).await;
		identity.set_user_property("platform", "custom").await.unwrap();

		let props = identity.user_properties().await.unwrap();

		assert_eq!(props.get("platform"), Some(&PropertyValue::from("custom")));
		assert_eq!(props.get("app_version"), Some(&PropertyValue::from("3.1.0")));
		assert_eq!(props.get("build_number"), Some(&PropertyValue::from("301")));
		assert_eq!(props.get("total_launches"), Some(&PropertyValue::Int(0)));
		assert!(props.get("installation_date").and_then(PropertyValue::as_timestamp).is_some());
	}

	#[tokio::test]
	async fn initialize_user_identifies_with_traits() {
		let (identity, _, log) = fixture(true).await;

		let user_id = identity.initialize_user().await.unwrap();

		let identify = log
			.calls_for("posthog")
			.into_iter()
			.find_map(|c| match c {
				RecordedCall::Identify { user_id, properties } => Some((user_id, properties)),
				_ => None,
			})
			.unwrap();
		assert_eq!(identify.0, format!("debug_{user_id}"));
		assert_eq!(identify.1.get("platform"), Some(&PropertyValue::from("ios")));
		assert_eq!(identify.1.get("original_user_id"), Some(&PropertyValue::from(user_id.as_str())));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_first_launch_checks_agree() {
		let (identity, _, _) = fixture(false).await;
		let identity = Arc::new(identity);

		let handles: Vec<_> = (0..16)
			.map(|_| {
				let identity = identity.clone();
				tokio::spawn(async move { identity.is_first_launch().await.unwrap() })
			})
			.collect();

		let mut firsts = 0;
		for handle in handles {
			if handle.await.unwrap() {
				firsts += 1;
			}
		}
		assert_eq!(firsts, 1);
	}

	#[tokio::test]
	async fn first_launch_is_reported_once() {
		let (identity, _, log) = fixture(false).await;

		assert!(identity.track_first_launch_events().await.unwrap());
		assert!(!identity.track_first_launch_events().await.unwrap());

		let first_launches = log
			.tracked_events()
			.into_iter()
			.filter(|(_, e)| e == "app_first_launch")
			.count();
		assert_eq!(first_launches, 1);
		assert_eq!(
			identity.stored_user_properties().await.get("first_launch_completed"),
			Some(&PropertyValue::Bool(true))
		);
	}

	#[tokio::test]
	async fn milestone_is_tracked_and_remembered() {
		let (identity, _, log) = fixture(false).await;

		identity
			.track_user_milestone("first_export", Some(Properties::new().insert("format", "pdf")))
			.await
			.unwrap();

		let calls = log.calls_for("posthog");
		let Some(RecordedCall::Track { event, properties }) = calls
			.iter()
			.find(|c| matches!(c, RecordedCall::Track { .. }))
		else {
			panic!("expected track");
		};
		assert_eq!(event, "user_milestone");
		assert_eq!(properties.get("milestone"), Some(&PropertyValue::from("first_export")));
		assert_eq!(properties.get("format"), Some(&PropertyValue::from("pdf")));

		let stored = identity.stored_user_properties().await;
		assert_eq!(stored.get("last_milestone"), Some(&PropertyValue::from("first_export")));
		assert!(stored.contains_key("last_milestone_date"));
	}

	#[tokio::test]
	async fn reset_replaces_identity_and_clears_traits() {
		let (identity, store, log) = fixture(false).await;
		let before = identity.current_user_id().await.unwrap();
		identity.set_user_property("plan", "pro").await.unwrap();

		let after = identity.reset_user_identity().await.unwrap();

		assert_ne!(before, after);
		assert_eq!(identity.current_user_id().await.unwrap(), after);
		assert!(!identity.stored_user_properties().await.contains_key("plan"));
		for key in store.keys().await.unwrap() {
			let value = store.get(&key).await.unwrap().unwrap();
			assert!(!value.to_string().contains(&before), "old id left under {key}");
		}
		assert!(log.calls_for("posthog").contains(&RecordedCall::Reset));
	}
}
