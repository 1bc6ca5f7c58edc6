// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application and device facts, and the common properties derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::properties::Properties;

/// Build environment reported on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	Development,
	Production,
}

impl Environment {
	pub fn from_debug(is_debug: bool) -> Self {
		if is_debug {
			Environment::Development
		} else {
			Environment::Production
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Environment::Development => "development",
			Environment::Production => "production",
		}
	}
}

impl fmt::Display for Environment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Audience bucket used to filter debug traffic out of dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
	DebugSimulator,
	DebugDevice,
	Simulator,
	Production,
}

impl UserType {
	pub fn from_flags(is_debug: bool, is_simulator: bool) -> Self {
		match (is_debug, is_simulator) {
			(true, true) => UserType::DebugSimulator,
			(true, false) => UserType::DebugDevice,
			(false, true) => UserType::Simulator,
			(false, false) => UserType::Production,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			UserType::DebugSimulator => "debug_simulator",
			UserType::DebugDevice => "debug_device",
			UserType::Simulator => "simulator",
			UserType::Production => "production",
		}
	}
}

impl fmt::Display for UserType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Facts about the running application and the device it runs on.
///
/// [`AppContext::detect`] fills what the process can observe; embedders
/// override the rest with the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppContext {
	pub app_name: String,
	pub app_version: String,
	pub app_build: String,
	pub platform: String,
	pub os_version: String,
	pub device_model: String,
	pub device_class: String,
	pub is_debug: bool,
	pub is_simulator: bool,
	pub timezone: String,
	pub locale: String,
}

impl Default for AppContext {
	fn default() -> Self {
		Self {
			app_name: "tally".to_string(),
			app_version: "unknown".to_string(),
			app_build: "unknown".to_string(),
			platform: std::env::consts::OS.to_string(),
			os_version: "unknown".to_string(),
			device_model: std::env::consts::ARCH.to_string(),
			device_class: "desktop".to_string(),
			is_debug: false,
			is_simulator: false,
			timezone: "UTC".to_string(),
			locale: "en-US".to_string(),
		}
	}
}

impl AppContext {
	/// Detects debug mode, platform, architecture, timezone and locale from
	/// the current process.
	pub fn detect() -> Self {
		let timezone = std::env::var("TZ")
			.ok()
			.filter(|tz| !tz.trim().is_empty())
			.unwrap_or_else(|| "UTC".to_string());
		let locale = sys_locale::get_locale().unwrap_or_else(|| "en-US".to_string());

		Self {
			is_debug: cfg!(debug_assertions),
			timezone,
			locale,
			..Self::default()
		}
	}

	pub fn with_app(
		mut self,
		name: impl Into<String>,
		version: impl Into<String>,
		build: impl Into<String>,
	) -> Self {
		self.app_name = name.into();
		self.app_version = version.into();
		self.app_build = build.into();
		self
	}

	pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
		self.platform = platform.into();
		self
	}

	pub fn with_os_version(mut self, os_version: impl Into<String>) -> Self {
		self.os_version = os_version.into();
		self
	}

	pub fn with_device(mut self, model: impl Into<String>, class: impl Into<String>) -> Self {
		self.device_model = model.into();
		self.device_class = class.into();
		self
	}

	pub fn with_debug(mut self, is_debug: bool) -> Self {
		self.is_debug = is_debug;
		self
	}

	pub fn with_simulator(mut self, is_simulator: bool) -> Self {
		self.is_simulator = is_simulator;
		self
	}

	pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
		self.timezone = timezone.into();
		self
	}

	pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
		self.locale = locale.into();
		self
	}

	pub fn environment(&self) -> Environment {
		Environment::from_debug(self.is_debug)
	}

	pub fn user_type(&self) -> UserType {
		UserType::from_flags(self.is_debug, self.is_simulator)
	}
}

/// Process-wide attributes attached underneath every tracked event.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonProperties {
	pub app_version: String,
	pub app_build: String,
	pub os_version: String,
	pub device_model: String,
	pub device_class: String,
	pub is_debug: bool,
	pub is_simulator: bool,
	pub environment: Environment,
	pub user_type: UserType,
}

impl CommonProperties {
	pub fn from_context(context: &AppContext) -> Self {
		Self {
			app_version: context.app_version.clone(),
			app_build: context.app_build.clone(),
			os_version: context.os_version.clone(),
			device_model: context.device_model.clone(),
			device_class: context.device_class.clone(),
			is_debug: context.is_debug,
			is_simulator: context.is_simulator,
			environment: context.environment(),
			user_type: context.user_type(),
		}
	}

	pub fn to_properties(&self) -> Properties {
		Properties::new()
			.insert("app_version", self.app_version.as_str())
			.insert("app_build", self.app_build.as_str())
			.insert("os_version", self.os_version.as_str())
			.insert("device_model", self.device_model.as_str())
			.insert("device_class", self.device_class.as_str())
			.insert("is_debug", self.is_debug)
			.insert("is_simulator", self.is_simulator)
			.insert("environment", self.environment.as_str())
			.insert("user_type", self.user_type.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::PropertyValue;
	use proptest::prelude::*;

	#[test]
	fn user_type_covers_all_flag_combinations() {
		assert_eq!(UserType::from_flags(true, true).as_str(), "debug_simulator");
		assert_eq!(UserType::from_flags(true, false).as_str(), "debug_device");
		assert_eq!(UserType::from_flags(false, true).as_str(), "simulator");
		assert_eq!(UserType::from_flags(false, false).as_str(), "production");
	}

	#[test]
	fn environment_follows_debug_flag() {
		assert_eq!(Environment::from_debug(true).as_str(), "development");
		assert_eq!(Environment::from_debug(false).as_str(), "production");
	}

	#[test]
	fn common_properties_have_every_key() {
		let context = AppContext::default()
			.with_app("demo", "1.2.0", "45")
			.with_os_version("17.4")
			.with_device("iPhone", "phone")
			.with_debug(true)
			.with_simulator(true);

		let props = CommonProperties::from_context(&context).to_properties();

		for key in [
			"app_version",
			"app_build",
			"os_version",
			"device_model",
			"device_class",
			"is_debug",
			"is_simulator",
			"environment",
			"user_type",
		] {
			assert!(props.contains_key(key), "missing {key}");
		}
		assert_eq!(props.len(), 9);
		assert_eq!(props.get("app_version"), Some(&PropertyValue::from("1.2.0")));
		assert_eq!(props.get("environment"), Some(&PropertyValue::from("development")));
		assert_eq!(props.get("user_type"), Some(&PropertyValue::from("debug_simulator")));
	}

	#[test]
	fn detect_uses_build_profile() {
		let context = AppContext::detect();
		assert_eq!(context.is_debug, cfg!(debug_assertions));
		assert!(!context.locale.is_empty());
		assert!(!context.timezone.is_empty());
	}

	proptest! {
		#[test]
		fn derived_fields_are_pure(is_debug: bool, is_simulator: bool) {
			let context = AppContext::default()
				.with_debug(is_debug)
				.with_simulator(is_simulator);
			let common = CommonProperties::from_context(&context);

			prop_assert_eq!(common.user_type, UserType::from_flags(is_debug, is_simulator));
			prop_assert_eq!(common.environment, Environment::from_debug(is_debug));
		}
	}
}
