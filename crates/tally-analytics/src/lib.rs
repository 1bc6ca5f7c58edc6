// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Multi-provider analytics for Tally applications.
//!
//! One [`AnalyticsManager`] fans every tracking call out to the configured
//! backends (PostHog, Mixpanel, or any [`AnalyticsProvider`]), after placing
//! the app's common properties underneath the event's own.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally_analytics::{AnalyticsManager, AppContext, Properties, ProviderConfig, ProviderKind};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = Arc::new(AnalyticsManager::with_default_factory(
//!         AppContext::detect().with_app("notes", "1.4.0", "112"),
//!     ));
//!
//!     manager.configure(vec![
//!         ProviderConfig::new(ProviderKind::PostHog, "phc_xxx"),
//!         ProviderConfig::new(ProviderKind::Mixpanel, "mp_xxx"),
//!     ]).await;
//!
//!     manager.identify("user-123", Some(Properties::new().insert("plan", "pro"))).await;
//!     manager.track("button_clicked", Some(Properties::new()
//!         .insert("button_name", "checkout")
//!     )).await;
//!
//!     // Deliver anything still queued before exit
//!     manager.flush().await;
//! }
//! ```
//!
//! # Failure handling
//!
//! Every operation is best effort. A provider that errors or panics is
//! logged and skipped; the remaining providers still receive the call and
//! the caller never sees the failure.
//!
//! # Debug builds
//!
//! When [`AppContext::is_debug`] is set, identify calls are sent as
//! `debug_<id>` with `is_debug_user` and `original_user_id` traits, and the
//! HTTP adapters deliver each event immediately instead of batching.

pub mod batch;
pub mod error;
pub mod events;
pub mod manager;
pub mod mixpanel;
pub mod posthog;
pub mod provider;
pub mod recording;

pub use batch::{BatchConfig, BatchProcessor, BatchSender, EventKind, QueuedEvent};
pub use error::{AnalyticsError, Result};
pub use events::{AnalyticsEvent, StandardEvent, DEFAULT_CURRENCY};
pub use manager::{AnalyticsManager, DEFAULT_FLUSH_TIMEOUT};
pub use mixpanel::MixpanelProvider;
pub use posthog::PostHogProvider;
pub use provider::{AnalyticsProvider, HttpProviderFactory, ProviderFactory};
pub use recording::{CallLog, Operation, RecordedCall, RecordingFactory, RecordingProvider};

pub use tally_analytics_core::{
	AppContext, CommonProperties, Environment, Properties, PropertyValue, ProviderConfig,
	ProviderKind, SecretString, UserType,
};
