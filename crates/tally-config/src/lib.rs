// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for Tally.
//!
//! Sources are merged in precedence order (defaults, then a TOML file, then
//! `TALLY_*` environment variables) and finalized into a [`TallyConfig`]
//! with every default applied.
//!
//! ```toml
//! [analytics]
//! posthog_api_key = "phc_..."
//! mixpanel_token = "..."
//!
//! [identity]
//! key_prefix = "tally_"
//!
//! [review]
//! minimum_app_launches = 7
//! days_between_requests = 7
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

use std::path::PathBuf;

use tally_analytics_core::ProviderConfig;
use tracing::info;

pub use error::ConfigError;
pub use layer::TallyConfigLayer;
pub use sections::{
	AnalyticsConfig, AnalyticsConfigLayer, IdentityConfig, IdentityConfigLayer, LoggingConfig,
	LoggingConfigLayer, ReviewConfig, ReviewConfigLayer,
};
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TallyConfig {
	pub analytics: AnalyticsConfig,
	pub identity: IdentityConfig,
	pub review: ReviewConfig,
	pub logging: LoggingConfig,
}

impl TallyConfig {
	/// Ordered provider list for the analytics manager.
	pub fn provider_configs(&self) -> Vec<ProviderConfig> {
		self.analytics.provider_configs()
	}
}

/// Load configuration from the user config file and the environment.
pub fn load_config() -> Result<TallyConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
	if let Some(file) = TomlSource::user() {
		sources.push(Box::new(file));
	}
	sources.push(Box::new(EnvSource::new()));
	load_config_from_sources(sources)
}

/// Load configuration with an explicit file instead of the user config file.
pub fn load_config_with_file(path: impl Into<PathBuf>) -> Result<TallyConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(path)),
		Box::new(EnvSource::new()),
	])
}

/// Merge the given sources in precedence order and finalize.
pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<TallyConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = TallyConfigLayer::default();
	for source in &sources {
		let layer = source.load()?;
		tracing::debug!(source = source.name(), "merged config source");
		merged.merge(layer);
	}

	Ok(finalize(merged))
}

fn finalize(layer: TallyConfigLayer) -> TallyConfig {
	let config = TallyConfig {
		analytics: layer.analytics.unwrap_or_default().finalize(),
		identity: layer.identity.unwrap_or_default().finalize(),
		review: layer.review.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	info!(
		posthog = !config.analytics.posthog_api_key.is_blank(),
		mixpanel = !config.analytics.mixpanel_token.is_blank(),
		debug = config.analytics.debug,
		store_path = %config.identity.store_path.display(),
		"configuration loaded"
	);

	config
}
