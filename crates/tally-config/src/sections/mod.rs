// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod analytics;
mod identity;
mod logging;
mod review;

pub use analytics::{AnalyticsConfig, AnalyticsConfigLayer};
pub use identity::{IdentityConfig, IdentityConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use review::{ReviewConfig, ReviewConfigLayer};
