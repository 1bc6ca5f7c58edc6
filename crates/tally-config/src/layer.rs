// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	AnalyticsConfigLayer, IdentityConfigLayer, LoggingConfigLayer, ReviewConfigLayer,
};

/// One source's view of the configuration; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TallyConfigLayer {
	#[serde(default)]
	pub analytics: Option<AnalyticsConfigLayer>,
	#[serde(default)]
	pub identity: Option<IdentityConfigLayer>,
	#[serde(default)]
	pub review: Option<ReviewConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl TallyConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: TallyConfigLayer) {
		merge_option(
			&mut self.analytics,
			other.analytics,
			AnalyticsConfigLayer::merge,
		);
		merge_option(&mut self.identity, other.identity, IdentityConfigLayer::merge);
		merge_option(&mut self.review, other.review, ReviewConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_layers_stay_empty() {
		let mut base = TallyConfigLayer::default();
		base.merge(TallyConfigLayer::default());
		assert!(base.analytics.is_none());
		assert!(base.logging.is_none());
	}

	#[test]
	fn missing_section_is_taken_from_other() {
		let mut base = TallyConfigLayer::default();
		base.merge(TallyConfigLayer {
			review: Some(ReviewConfigLayer {
				minimum_app_launches: Some(3),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(base.review.unwrap().minimum_app_launches, Some(3));
	}

	#[test]
	fn field_level_merge_keeps_unset_fields() {
		let mut base = TallyConfigLayer {
			logging: Some(LoggingConfigLayer {
				level: Some("debug".into()),
				json: Some(true),
			}),
			..Default::default()
		};
		base.merge(TallyConfigLayer {
			logging: Some(LoggingConfigLayer {
				level: Some("warn".into()),
				json: None,
			}),
			..Default::default()
		});

		let logging = base.logging.unwrap();
		assert_eq!(logging.level.as_deref(), Some("warn"));
		assert_eq!(logging.json, Some(true));
	}
}
