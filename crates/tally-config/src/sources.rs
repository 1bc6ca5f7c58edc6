// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::TallyConfigLayer;
use crate::sections::{
	AnalyticsConfigLayer, IdentityConfigLayer, LoggingConfigLayer, ReviewConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<TallyConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<TallyConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(TallyConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `<config dir>/tally/config.toml`, when the platform has a config dir.
	pub fn user() -> Option<Self> {
		dirs::config_dir().map(|dir| Self::new(dir.join("tally").join("config.toml")))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<TallyConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(TallyConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: TallyConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TALLY_<FIELD>, see each section loader for the exact names.
/// Empty values count as unset.
#[derive(Default)]
pub struct EnvSource {
	vars: Option<HashMap<String, String>>,
}

impl EnvSource {
	/// Reads the process environment.
	pub fn new() -> Self {
		Self::default()
	}

	/// Reads from the given pairs instead of the process environment.
	pub fn from_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: Some(
				vars
					.into_iter()
					.map(|(k, v)| (k.into(), v.into()))
					.collect(),
			),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		let value = match &self.vars {
			Some(vars) => vars.get(name).cloned(),
			None => std::env::var(name).ok(),
		};
		value.filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
		self
			.var(name)
			.map(|v| match v.to_ascii_lowercase().as_str() {
				"true" | "1" | "yes" => Ok(true),
				"false" | "0" | "no" => Ok(false),
				_ => Err(ConfigError::InvalidValue {
					key: name.to_string(),
					message: format!("expected a boolean, got {v:?}"),
				}),
			})
			.transpose()
	}

	fn number<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: std::str::FromStr,
		T::Err: std::fmt::Display,
	{
		self
			.var(name)
			.map(|v| {
				v.parse::<T>().map_err(|e| ConfigError::InvalidValue {
					key: name.to_string(),
					message: e.to_string(),
				})
			})
			.transpose()
	}

	fn load_analytics(&self) -> Result<AnalyticsConfigLayer, ConfigError> {
		Ok(AnalyticsConfigLayer {
			posthog_api_key: self.var("TALLY_POSTHOG_API_KEY").map(Into::into),
			posthog_host: self.var("TALLY_POSTHOG_HOST"),
			mixpanel_token: self.var("TALLY_MIXPANEL_TOKEN").map(Into::into),
			mixpanel_host: self.var("TALLY_MIXPANEL_HOST"),
			flush_timeout_secs: self.number("TALLY_FLUSH_TIMEOUT_SECS")?,
			debug: self.bool("TALLY_DEBUG")?,
			simulator: self.bool("TALLY_SIMULATOR")?,
		})
	}

	fn load_identity(&self) -> IdentityConfigLayer {
		IdentityConfigLayer {
			key_prefix: self.var("TALLY_KEY_PREFIX"),
			platform: self.var("TALLY_PLATFORM"),
			store_path: self.var("TALLY_STORE_PATH").map(PathBuf::from),
		}
	}

	fn load_review(&self) -> Result<ReviewConfigLayer, ConfigError> {
		Ok(ReviewConfigLayer {
			minimum_app_launches: self.number("TALLY_REVIEW_MIN_LAUNCHES")?,
			days_between_requests: self.number("TALLY_REVIEW_DAYS_BETWEEN")?,
		})
	}

	fn load_logging(&self) -> Result<LoggingConfigLayer, ConfigError> {
		Ok(LoggingConfigLayer {
			level: self.var("TALLY_LOG_LEVEL"),
			json: self.bool("TALLY_LOG_JSON")?,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<TallyConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(TallyConfigLayer {
			analytics: Some(self.load_analytics()?),
			identity: Some(self.load_identity()),
			review: Some(self.load_review()?),
			logging: Some(self.load_logging()?),
		})
	}
}
