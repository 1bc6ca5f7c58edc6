// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Analytics configuration section.

use std::time::Duration;

use serde::Deserialize;
use tally_analytics_core::{ProviderConfig, ProviderKind, SecretString};

const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 5;

/// Configuration layer for analytics (all fields optional for merging).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AnalyticsConfigLayer {
	/// PostHog project API key.
	pub posthog_api_key: Option<SecretString>,
	/// PostHog ingestion host.
	pub posthog_host: Option<String>,
	/// Mixpanel project token.
	pub mixpanel_token: Option<SecretString>,
	/// Mixpanel ingestion host.
	pub mixpanel_host: Option<String>,
	/// Upper bound on a manager flush, in seconds.
	pub flush_timeout_secs: Option<u64>,
	/// Debug-build override.
	pub debug: Option<bool>,
	/// Treat this process as running on a simulator.
	pub simulator: Option<bool>,
}

impl AnalyticsConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: Self) {
		if other.posthog_api_key.is_some() {
			self.posthog_api_key = other.posthog_api_key;
		}
		if other.posthog_host.is_some() {
			self.posthog_host = other.posthog_host;
		}
		if other.mixpanel_token.is_some() {
			self.mixpanel_token = other.mixpanel_token;
		}
		if other.mixpanel_host.is_some() {
			self.mixpanel_host = other.mixpanel_host;
		}
		if other.flush_timeout_secs.is_some() {
			self.flush_timeout_secs = other.flush_timeout_secs;
		}
		if other.debug.is_some() {
			self.debug = other.debug;
		}
		if other.simulator.is_some() {
			self.simulator = other.simulator;
		}
	}

	/// Convert to resolved configuration with defaults applied.
	pub fn finalize(self) -> AnalyticsConfig {
		AnalyticsConfig {
			posthog_api_key: self.posthog_api_key.unwrap_or_default(),
			posthog_host: self.posthog_host,
			mixpanel_token: self.mixpanel_token.unwrap_or_default(),
			mixpanel_host: self.mixpanel_host,
			flush_timeout_secs: self
				.flush_timeout_secs
				.unwrap_or(DEFAULT_FLUSH_TIMEOUT_SECS),
			debug: self.debug.unwrap_or(cfg!(debug_assertions)),
			simulator: self.simulator.unwrap_or(false),
		}
	}
}

/// Resolved analytics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
	pub posthog_api_key: SecretString,
	pub posthog_host: Option<String>,
	pub mixpanel_token: SecretString,
	pub mixpanel_host: Option<String>,
	pub flush_timeout_secs: u64,
	pub debug: bool,
	pub simulator: bool,
}

impl AnalyticsConfig {
	pub fn flush_timeout(&self) -> Duration {
		Duration::from_secs(self.flush_timeout_secs)
	}

	/// PostHog then Mixpanel. Entries with a blank key are still listed;
	/// the manager skips them.
	pub fn provider_configs(&self) -> Vec<ProviderConfig> {
		let entry = |kind, key: &SecretString, host: &Option<String>| {
			let config = ProviderConfig::new(kind, key.clone());
			match host {
				Some(host) => config.with_host(host.clone()),
				None => config,
			}
		};

		vec![
			entry(
				ProviderKind::PostHog,
				&self.posthog_api_key,
				&self.posthog_host,
			),
			entry(
				ProviderKind::Mixpanel,
				&self.mixpanel_token,
				&self.mixpanel_host,
			),
		]
	}
}

impl Default for AnalyticsConfig {
	fn default() -> Self {
		AnalyticsConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = AnalyticsConfig::default();
		assert!(config.posthog_api_key.is_blank());
		assert!(config.mixpanel_token.is_blank());
		assert_eq!(config.flush_timeout(), Duration::from_secs(5));
		assert_eq!(config.debug, cfg!(debug_assertions));
		assert!(!config.simulator);
	}

	#[test]
	fn provider_configs_are_ordered_posthog_first() {
		let config = AnalyticsConfigLayer {
			posthog_api_key: Some("phc_1".into()),
			mixpanel_token: Some("mp_1".into()),
			mixpanel_host: Some("https://api-eu.mixpanel.com".into()),
			..Default::default()
		}
		.finalize();

		let providers = config.provider_configs();
		assert_eq!(providers.len(), 2);
		assert_eq!(providers[0].kind, ProviderKind::PostHog);
		assert_eq!(providers[0].api_key.expose(), "phc_1");
		assert_eq!(providers[0].host, None);
		assert_eq!(providers[1].kind, ProviderKind::Mixpanel);
		assert_eq!(
			providers[1].resolved_host(),
			"https://api-eu.mixpanel.com"
		);
	}

	#[test]
	fn blank_keys_yield_disabled_entries() {
		let providers = AnalyticsConfig::default().provider_configs();
		assert!(providers.iter().all(|p| !p.is_enabled()));
	}

	#[test]
	fn debug_output_hides_keys() {
		let config = AnalyticsConfigLayer {
			posthog_api_key: Some("phc_secret_value".into()),
			..Default::default()
		}
		.finalize();
		assert!(!format!("{config:?}").contains("phc_secret_value"));
	}
}
