// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `key=value` property arguments.

use tally_analytics_core::{Properties, PropertyValue};

/// Parses one `-p key=value` argument. Used as a clap value parser.
pub fn parse_pair(raw: &str) -> Result<(String, PropertyValue), String> {
	let (key, value) = raw
		.split_once('=')
		.ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
	let key = key.trim();
	if key.is_empty() {
		return Err(format!("empty key in {raw:?}"));
	}
	Ok((key.to_string(), parse_value(value)))
}

/// Booleans, then integers, then finite floats; anything else is text.
pub fn parse_value(raw: &str) -> PropertyValue {
	if let Ok(b) = raw.parse::<bool>() {
		return PropertyValue::Bool(b);
	}
	if let Ok(i) = raw.parse::<i64>() {
		return PropertyValue::Int(i);
	}
	match raw.parse::<f64>() {
		Ok(f) if f.is_finite() => PropertyValue::Float(f),
		_ => PropertyValue::from(raw),
	}
}

/// Later pairs overwrite earlier ones. `None` when there are no pairs.
pub fn collect(pairs: Vec<(String, PropertyValue)>) -> Option<Properties> {
	if pairs.is_empty() {
		return None;
	}
	let mut properties = Properties::new();
	for (key, value) in pairs {
		properties.set(key, value);
	}
	Some(properties)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn values_pick_the_narrowest_type() {
		assert_eq!(parse_value("true"), PropertyValue::Bool(true));
		assert_eq!(parse_value("42"), PropertyValue::Int(42));
		assert_eq!(parse_value("9.99"), PropertyValue::Float(9.99));
		assert_eq!(parse_value("pro"), PropertyValue::from("pro"));
		assert_eq!(parse_value("inf"), PropertyValue::from("inf"));
		assert_eq!(parse_value(""), PropertyValue::from(""));
	}

	#[test]
	fn pair_splits_on_first_equals() {
		let (key, value) = parse_pair("query=a=b").unwrap();
		assert_eq!(key, "query");
		assert_eq!(value, PropertyValue::from("a=b"));
	}

	#[test]
	fn pair_requires_key_and_equals() {
		assert!(parse_pair("novalue").is_err());
		assert!(parse_pair("=1").is_err());
	}

	#[test]
	fn collect_keeps_last_value() {
		let props = collect(vec![
			("plan".into(), PropertyValue::from("free")),
			("plan".into(), PropertyValue::from("pro")),
		])
		.unwrap();
		assert_eq!(props.len(), 1);
		assert_eq!(props.get("plan"), Some(&PropertyValue::from("pro")));
		assert!(collect(Vec::new()).is_none());
	}

	proptest! {
		#[test]
		fn integers_parse_as_int(n in any::<i64>()) {
			prop_assert_eq!(parse_value(&n.to_string()), PropertyValue::Int(n));
		}
	}
}
