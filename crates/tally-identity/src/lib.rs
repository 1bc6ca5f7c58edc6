// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Install identity, user traits and usage counters for Tally.
//!
//! [`IdentityManager`] keeps one user id per install in a [`PropertyStore`]
//! and keeps analytics informed of it. [`UsageTracker`] counts launches and
//! decides when a review prompt may be shown.

pub mod error;
pub mod identity;
pub mod store;
pub mod usage;

pub use error::{IdentityError, Result, StoreError};
pub use identity::{IdentityManager, IdentitySettings, DEFAULT_KEY_PREFIX};
pub use store::{JsonFileStore, MemoryStore, PropertyStore};
pub use usage::{ReviewPolicy, UsageTracker, APP_LAUNCHES_KEY, LAST_REVIEW_REQUEST_KEY};
