// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed events and the standard product-funnel events.

use tally_analytics_core::Properties;

use crate::manager::AnalyticsManager;

/// An event that knows its own name and properties.
///
/// ```
/// use tally_analytics::{AnalyticsEvent, Properties};
///
/// struct ContentShared {
///     content_type: String,
///     method: String,
/// }
///
/// impl AnalyticsEvent for ContentShared {
///     fn name(&self) -> &str {
///         "content_shared"
///     }
///
///     fn properties(&self) -> Properties {
///         Properties::new()
///             .insert("content_type", self.content_type.as_str())
///             .insert("share_method", self.method.as_str())
///     }
/// }
/// ```
pub trait AnalyticsEvent: Send + Sync {
	fn name(&self) -> &str;

	fn properties(&self) -> Properties {
		Properties::new()
	}
}

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq)]
pub enum StandardEvent {
	SignUp {
		method: String,
		properties: Properties,
	},
	Login {
		method: String,
		properties: Properties,
	},
	OnboardingStart,
	OnboardingStep {
		step: u32,
		step_name: Option<String>,
	},
	OnboardingComplete,
	PurchaseStarted {
		product_id: String,
		price: Option<f64>,
	},
	PurchaseCompleted {
		product_id: String,
		price: f64,
		currency: String,
	},
	PurchaseFailed {
		product_id: String,
		error: String,
	},
	FeatureUsed {
		feature_name: String,
		properties: Properties,
	},
	ScreenView {
		screen_name: String,
		properties: Properties,
	},
}

impl AnalyticsEvent for StandardEvent {
	fn name(&self) -> &str {
		match self {
			StandardEvent::SignUp { .. } => "sign_up",
			StandardEvent::Login { .. } => "login",
			StandardEvent::OnboardingStart => "onboarding_start",
			StandardEvent::OnboardingStep { .. } => "onboarding_step_completed",
			StandardEvent::OnboardingComplete => "onboarding_complete",
			StandardEvent::PurchaseStarted { .. } => "purchase_started",
			StandardEvent::PurchaseCompleted { .. } => "purchase_completed",
			StandardEvent::PurchaseFailed { .. } => "purchase_failed",
			StandardEvent::FeatureUsed { .. } => "feature_used",
			StandardEvent::ScreenView { .. } => "screen_view",
		}
	}

	fn properties(&self) -> Properties {
		match self {
			StandardEvent::SignUp { method, properties } | StandardEvent::Login { method, properties } => {
				properties.clone().insert("method", method.as_str())
			}
			StandardEvent::OnboardingStart | StandardEvent::OnboardingComplete => Properties::new(),
			StandardEvent::OnboardingStep { step, step_name } => {
				let mut props = Properties::new().insert("step", *step);
				if let Some(name) = step_name {
					props.set("step_name", name.as_str());
				}
				props
			}
			StandardEvent::PurchaseStarted { product_id, price } => {
				let mut props = Properties::new().insert("product_id", product_id.as_str());
				if let Some(price) = price {
					props.set("price", *price);
				}
				props
			}
			// `revenue` duplicates `price` for dashboards that key on it
			StandardEvent::PurchaseCompleted {
				product_id,
				price,
				currency,
			} => Properties::new()
				.insert("product_id", product_id.as_str())
				.insert("price", *price)
				.insert("currency", currency.as_str())
				.insert("revenue", *price),
			StandardEvent::PurchaseFailed { product_id, error } => Properties::new()
				.insert("product_id", product_id.as_str())
				.insert("error", error.as_str()),
			StandardEvent::FeatureUsed {
				feature_name,
				properties,
			} => properties.clone().insert("feature_name", feature_name.as_str()),
			StandardEvent::ScreenView {
				screen_name,
				properties,
			} => properties.clone().insert("screen_name", screen_name.as_str()),
		}
	}
}

impl AnalyticsManager {
	pub async fn track_event(&self, event: &(impl AnalyticsEvent + ?Sized)) {
		self.track(event.name(), Some(event.properties())).await;
	}

	pub async fn track_sign_up(&self, method: &str, properties: Option<Properties>) {
		self
			.track_event(&StandardEvent::SignUp {
				method: method.to_string(),
				properties: properties.unwrap_or_default(),
			})
			.await;
	}

	pub async fn track_login(&self, method: &str, properties: Option<Properties>) {
		self
			.track_event(&StandardEvent::Login {
				method: method.to_string(),
				properties: properties.unwrap_or_default(),
			})
			.await;
	}

	pub async fn track_onboarding_start(&self) {
		self.track_event(&StandardEvent::OnboardingStart).await;
	}

	pub async fn track_onboarding_step(&self, step: u32, step_name: Option<&str>) {
		self
			.track_event(&StandardEvent::OnboardingStep {
				step,
				step_name: step_name.map(str::to_string),
			})
			.await;
	}

	pub async fn track_onboarding_complete(&self) {
		self.track_event(&StandardEvent::OnboardingComplete).await;
	}

	pub async fn track_purchase_start(&self, product_id: &str, price: Option<f64>) {
		self
			.track_event(&StandardEvent::PurchaseStarted {
				product_id: product_id.to_string(),
				price,
			})
			.await;
	}

	/// `currency` defaults to [`DEFAULT_CURRENCY`].
	pub async fn track_purchase_complete(&self, product_id: &str, price: f64, currency: Option<&str>) {
		self
			.track_event(&StandardEvent::PurchaseCompleted {
				product_id: product_id.to_string(),
				price,
				currency: currency.unwrap_or(DEFAULT_CURRENCY).to_string(),
			})
			.await;
	}

	pub async fn track_purchase_failed(&self, product_id: &str, error: &str) {
		self
			.track_event(&StandardEvent::PurchaseFailed {
				product_id: product_id.to_string(),
				error: error.to_string(),
			})
			.await;
	}

	pub async fn track_feature_used(&self, feature_name: &str, properties: Option<Properties>) {
		self
			.track_event(&StandardEvent::FeatureUsed {
				feature_name: feature_name.to_string(),
				properties: properties.unwrap_or_default(),
			})
			.await;
	}

	pub async fn track_screen_view(&self, screen_name: &str, properties: Option<Properties>) {
		self
			.track_event(&StandardEvent::ScreenView {
				screen_name: screen_name.to_string(),
				properties: properties.unwrap_or_default(),
			})
			.await;
	}
}
