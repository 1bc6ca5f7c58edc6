// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Launch counting and review-prompt eligibility.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tally_analytics_core::PropertyValue;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{IdentityError, Result};
use crate::store::PropertyStore;

pub const APP_LAUNCHES_KEY: &str = "app_launches";
pub const LAST_REVIEW_REQUEST_KEY: &str = "last_review_request";

/// When the app may ask for a store review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewPolicy {
	pub minimum_app_launches: u64,
	pub days_between_requests: u32,
}

impl Default for ReviewPolicy {
	fn default() -> Self {
		Self {
			minimum_app_launches: 7,
			days_between_requests: 7,
		}
	}
}

/// Persisted launch counter and review-request bookkeeping.
#[derive(Debug)]
pub struct UsageTracker {
	store: Arc<dyn PropertyStore>,
	policy: ReviewPolicy,
	increment: Mutex<()>,
}

impl UsageTracker {
	pub fn new(store: Arc<dyn PropertyStore>, policy: ReviewPolicy) -> Self {
		Self {
			store,
			policy,
			increment: Mutex::new(()),
		}
	}

	pub fn policy(&self) -> ReviewPolicy {
		self.policy
	}

	/// Launches recorded so far; zero when nothing readable is stored.
	pub async fn launches(&self) -> u64 {
		read_launches(self.store.as_ref()).await
	}

	/// Adds one launch and returns the new total.
	pub async fn increment_app_launches(&self) -> Result<u64> {
		let _guard = self.increment.lock().await;
		let launches = self.launches().await.saturating_add(1);
		self
			.store
			.set(APP_LAUNCHES_KEY, PropertyValue::from(launches))
			.await
			.map_err(|e| IdentityError::store(APP_LAUNCHES_KEY, e))?;
		debug!(launches, "app launch recorded");
		Ok(launches)
	}

	pub async fn last_review_request(&self) -> Option<DateTime<Utc>> {
		match self.store.get(LAST_REVIEW_REQUEST_KEY).await {
			Ok(Some(value)) => value.as_timestamp(),
			Ok(None) => None,
			Err(e) => {
				warn!(error = %e, "failed to read last review request");
				None
			}
		}
	}

	/// True once the launch minimum is met and no review was requested within
	/// the policy interval before `now`.
	pub async fn should_request_review(&self, now: DateTime<Utc>) -> bool {
		if self.launches().await < self.policy.minimum_app_launches {
			return false;
		}

		match self.last_review_request().await {
			Some(last) => last < now - Duration::days(i64::from(self.policy.days_between_requests)),
			None => true,
		}
	}

	pub async fn record_review_request(&self, now: DateTime<Utc>) -> Result<()> {
		self
			.store
			.set(LAST_REVIEW_REQUEST_KEY, PropertyValue::from(now))
			.await
			.map_err(|e| IdentityError::store(LAST_REVIEW_REQUEST_KEY, e))
	}
}

pub(crate) async fn read_launches(store: &dyn PropertyStore) -> u64 {
	match store.get(APP_LAUNCHES_KEY).await {
		Ok(Some(PropertyValue::Int(n))) => u64::try_from(n).unwrap_or(0),
		Ok(_) => 0,
		Err(e) => {
			warn!(error = %e, "failed to read launch count");
			0
		}
	}
}
