// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Which analytics backends to configure, and with what credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tally_common_secret::SecretString;
use thiserror::Error;

/// Supported analytics backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
	PostHog,
	Mixpanel,
}

impl ProviderKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ProviderKind::PostHog => "posthog",
			ProviderKind::Mixpanel => "mixpanel",
		}
	}

	/// Ingestion host used when the config does not name one.
	pub fn default_host(&self) -> &'static str {
		match self {
			ProviderKind::PostHog => "https://us.i.posthog.com",
			ProviderKind::Mixpanel => "https://api.mixpanel.com",
		}
	}
}

impl fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown analytics provider: {0}")]
pub struct ParseProviderKindError(pub String);

impl FromStr for ProviderKind {
	type Err = ParseProviderKindError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"posthog" => Ok(ProviderKind::PostHog),
			"mixpanel" => Ok(ProviderKind::Mixpanel),
			other => Err(ParseProviderKindError(other.to_string())),
		}
	}
}

/// One entry of the ordered provider list handed to `configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
	pub kind: ProviderKind,
	pub api_key: SecretString,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
}

impl ProviderConfig {
	pub fn new(kind: ProviderKind, api_key: impl Into<SecretString>) -> Self {
		Self {
			kind,
			api_key: api_key.into(),
			host: None,
		}
	}

	pub fn with_host(mut self, host: impl Into<String>) -> Self {
		self.host = Some(host.into());
		self
	}

	/// A provider with a blank key is silently left out of the registry.
	pub fn is_enabled(&self) -> bool {
		!self.api_key.is_blank()
	}

	/// Configured host, or the backend default, without a trailing slash.
	pub fn resolved_host(&self) -> String {
		self
			.host
			.as_deref()
			.filter(|h| !h.trim().is_empty())
			.unwrap_or_else(|| self.kind.default_host())
			.trim_end_matches('/')
			.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn blank_key_disables_provider() {
		assert!(!ProviderConfig::new(ProviderKind::PostHog, "").is_enabled());
		assert!(!ProviderConfig::new(ProviderKind::Mixpanel, "  ").is_enabled());
		assert!(ProviderConfig::new(ProviderKind::Mixpanel, "tok").is_enabled());
	}

	#[test]
	fn host_defaults_per_kind() {
		let posthog = ProviderConfig::new(ProviderKind::PostHog, "k");
		assert_eq!(posthog.resolved_host(), "https://us.i.posthog.com");

		let custom = posthog.with_host("https://eu.i.posthog.com/");
		assert_eq!(custom.resolved_host(), "https://eu.i.posthog.com");

		let blank_host = ProviderConfig::new(ProviderKind::Mixpanel, "k").with_host("");
		assert_eq!(blank_host.resolved_host(), "https://api.mixpanel.com");
	}

	#[test]
	fn kind_parses_case_insensitively() {
		assert_eq!("PostHog".parse::<ProviderKind>(), Ok(ProviderKind::PostHog));
		assert_eq!(" mixpanel ".parse::<ProviderKind>(), Ok(ProviderKind::Mixpanel));
		assert!("amplitude".parse::<ProviderKind>().is_err());
	}

	#[test]
	fn debug_output_hides_key() {
		let config = ProviderConfig::new(ProviderKind::PostHog, "phc_secret");
		assert!(!format!("{config:?}").contains("phc_secret"));
	}

	proptest! {
		#[test]
		fn kind_display_roundtrips(kind in prop_oneof![Just(ProviderKind::PostHog), Just(ProviderKind::Mixpanel)]) {
			prop_assert_eq!(kind.to_string().parse::<ProviderKind>(), Ok(kind));
		}
	}
}
