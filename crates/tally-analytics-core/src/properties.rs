// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ordered property bags for events and user traits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::PropertyValue;

/// A string-keyed bag of [`PropertyValue`]s.
///
/// Keys are kept sorted so that fan-out payloads and persisted traits are
/// deterministic.
///
/// # Example
///
/// ```
/// use tally_analytics_core::Properties;
///
/// let props = Properties::new()
///     .insert("screen_name", "settings")
///     .insert("step", 2)
///     .insert("is_premium", true);
/// assert_eq!(props.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	inner: BTreeMap<String, PropertyValue>,
}

impl Properties {
	pub fn new() -> Self {
		Self {
			inner: BTreeMap::new(),
		}
	}

	/// Builder-style insert; replaces any existing value for `key`.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<PropertyValue>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// In-place insert; returns the previous value for `key`.
	pub fn set<K, V>(&mut self, key: K, value: V) -> Option<PropertyValue>
	where
		K: Into<String>,
		V: Into<PropertyValue>,
	{
		self.inner.insert(key.into(), value.into())
	}

	/// Merges `other` over `self`. On key collision `other` wins.
	pub fn merge(mut self, other: Properties) -> Self {
		self.extend(other);
		self
	}

	/// In-place form of [`Properties::merge`].
	pub fn extend(&mut self, other: Properties) {
		self.inner.extend(other.inner);
	}

	pub fn get(&self, key: &str) -> Option<&PropertyValue> {
		self.inner.get(key)
	}

	pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
		self.inner.remove(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.inner.contains_key(key)
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.inner.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
		self.inner.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn into_inner(self) -> BTreeMap<String, PropertyValue> {
		self.inner
	}
}

impl From<BTreeMap<String, PropertyValue>> for Properties {
	fn from(inner: BTreeMap<String, PropertyValue>) -> Self {
		Self { inner }
	}
}

/// JSON objects become properties; any other JSON value yields an empty bag.
impl From<serde_json::Value> for Properties {
	fn from(value: serde_json::Value) -> Self {
		match PropertyValue::from(value) {
			PropertyValue::Mapping(inner) => Self { inner },
			_ => Self::new(),
		}
	}
}

impl<K, V> FromIterator<(K, V)> for Properties
where
	K: Into<String>,
	V: Into<PropertyValue>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			inner: iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}
}

impl IntoIterator for Properties {
	type Item = (String, PropertyValue);
	type IntoIter = std::collections::btree_map::IntoIter<String, PropertyValue>;

	fn into_iter(self) -> Self::IntoIter {
		self.inner.into_iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn new_is_empty() {
		let props = Properties::new();
		assert!(props.is_empty());
		assert_eq!(props.len(), 0);
	}

	#[test]
	fn insert_mixed_values() {
		let props = Properties::new()
			.insert("name", "Bob")
			.insert("age", 30)
			.insert("active", true);

		assert_eq!(props.len(), 3);
		assert_eq!(props.get("name"), Some(&PropertyValue::from("Bob")));
		assert_eq!(props.get("age"), Some(&PropertyValue::Int(30)));
		assert_eq!(props.get("active"), Some(&PropertyValue::Bool(true)));
	}

	#[test]
	fn merge_right_side_wins() {
		let common = Properties::new().insert("a", 0).insert("b", 2);
		let event = Properties::new().insert("a", 1);

		let merged = common.merge(event);

		assert_eq!(merged.len(), 2);
		assert_eq!(merged.get("a"), Some(&PropertyValue::Int(1)));
		assert_eq!(merged.get("b"), Some(&PropertyValue::Int(2)));
	}

	#[test]
	fn set_returns_previous() {
		let mut props = Properties::new().insert("k", "v");
		let previous = props.set("k", "v2");
		assert_eq!(previous, Some(PropertyValue::from("v")));
		assert_eq!(props.get("k"), Some(&PropertyValue::from("v2")));
		assert_eq!(props.len(), 1);
	}

	#[test]
	fn from_non_object_json_is_empty() {
		let props = Properties::from(serde_json::json!("not an object"));
		assert!(props.is_empty());
	}

	#[test]
	fn collects_from_pairs() {
		let props: Properties = vec![("x", 1), ("y", 2)].into_iter().collect();
		assert_eq!(props.keys().collect::<Vec<_>>(), vec!["x", "y"]);
	}

	#[test]
	fn serde_is_transparent_map() {
		let props = Properties::new().insert("plan", "pro");
		let json = serde_json::to_value(&props).unwrap();
		assert!(json.is_object());
		assert_eq!(json["plan"]["type"], "string");

		let back: Properties = serde_json::from_value(json).unwrap();
		assert_eq!(back, props);
	}

	proptest! {
		#[test]
		fn len_matches_unique_keys(keys in proptest::collection::vec("[a-z]{1,10}", 0..20)) {
			let unique: std::collections::HashSet<_> = keys.iter().cloned().collect();
			let mut props = Properties::new();
			for key in &keys {
				props = props.insert(key.clone(), "value");
			}
			prop_assert_eq!(props.len(), unique.len());
		}

		#[test]
		fn merge_keeps_every_right_value(
			left in proptest::collection::btree_map("[a-e]", any::<i64>(), 0..5),
			right in proptest::collection::btree_map("[a-e]", any::<i64>(), 0..5),
		) {
			let l: Properties = left.clone().into_iter().collect();
			let r: Properties = right.clone().into_iter().collect();
			let merged = l.merge(r);
			for (k, v) in &right {
				prop_assert_eq!(merged.get(k), Some(&PropertyValue::Int(*v)));
			}
			for (k, v) in &left {
				if !right.contains_key(k) {
					prop_assert_eq!(merged.get(k), Some(&PropertyValue::Int(*v)));
				}
			}
		}
	}
}
