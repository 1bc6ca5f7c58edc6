// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The closed set of values an analytics property may hold.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::properties::Properties;

/// A single property value.
///
/// Every backend adapter converts these into its own wire representation and
/// falls back to the [`Display`](fmt::Display) text for anything it cannot
/// carry natively, so no value is ever rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
	String(String),
	Int(i64),
	Float(f64),
	Bool(bool),
	Timestamp(DateTime<Utc>),
	Sequence(Vec<PropertyValue>),
	Mapping(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
	/// Short name of the variant, used in log fields.
	pub fn kind(&self) -> &'static str {
		match self {
			PropertyValue::String(_) => "string",
			PropertyValue::Int(_) => "int",
			PropertyValue::Float(_) => "float",
			PropertyValue::Bool(_) => "bool",
			PropertyValue::Timestamp(_) => "timestamp",
			PropertyValue::Sequence(_) => "sequence",
			PropertyValue::Mapping(_) => "mapping",
		}
	}

	/// True for every variant except sequences and mappings.
	pub fn is_scalar(&self) -> bool {
		!matches!(
			self,
			PropertyValue::Sequence(_) | PropertyValue::Mapping(_)
		)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			PropertyValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			PropertyValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	/// Floats, and integers widened to `f64`.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			PropertyValue::Float(f) => Some(*f),
			PropertyValue::Int(i) => Some(*i as f64),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			PropertyValue::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
		match self {
			PropertyValue::Timestamp(ts) => Some(*ts),
			_ => None,
		}
	}

	/// Replaces values JSON cannot hold (NaN and infinite floats) with their
	/// text, recursively. Used before persisting.
	pub fn normalized(self) -> PropertyValue {
		match self {
			PropertyValue::Float(f) if !f.is_finite() => PropertyValue::String(f.to_string()),
			PropertyValue::Sequence(items) => {
				PropertyValue::Sequence(items.into_iter().map(PropertyValue::normalized).collect())
			}
			PropertyValue::Mapping(map) => PropertyValue::Mapping(
				map.into_iter().map(|(k, v)| (k, v.normalized())).collect(),
			),
			other => other,
		}
	}
}

impl fmt::Display for PropertyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PropertyValue::String(s) => f.write_str(s),
			PropertyValue::Int(i) => write!(f, "{i}"),
			PropertyValue::Float(x) => write!(f, "{x}"),
			PropertyValue::Bool(b) => write!(f, "{b}"),
			PropertyValue::Timestamp(ts) => {
				f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
			}
			PropertyValue::Sequence(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
			PropertyValue::Mapping(map) => {
				f.write_str("{")?;
				for (i, (k, v)) in map.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}: {v}")?;
				}
				f.write_str("}")
			}
		}
	}
}

impl From<&str> for PropertyValue {
	fn from(value: &str) -> Self {
		PropertyValue::String(value.to_string())
	}
}

impl From<String> for PropertyValue {
	fn from(value: String) -> Self {
		PropertyValue::String(value)
	}
}

impl From<&String> for PropertyValue {
	fn from(value: &String) -> Self {
		PropertyValue::String(value.clone())
	}
}

impl From<i64> for PropertyValue {
	fn from(value: i64) -> Self {
		PropertyValue::Int(value)
	}
}

impl From<i32> for PropertyValue {
	fn from(value: i32) -> Self {
		PropertyValue::Int(value.into())
	}
}

impl From<u32> for PropertyValue {
	fn from(value: u32) -> Self {
		PropertyValue::Int(value.into())
	}
}

impl From<u64> for PropertyValue {
	fn from(value: u64) -> Self {
		match i64::try_from(value) {
			Ok(i) => PropertyValue::Int(i),
			Err(_) => PropertyValue::Float(value as f64),
		}
	}
}

impl From<usize> for PropertyValue {
	fn from(value: usize) -> Self {
		PropertyValue::from(value as u64)
	}
}

impl From<f64> for PropertyValue {
	fn from(value: f64) -> Self {
		PropertyValue::Float(value)
	}
}

impl From<f32> for PropertyValue {
	fn from(value: f32) -> Self {
		PropertyValue::Float(value.into())
	}
}

impl From<bool> for PropertyValue {
	fn from(value: bool) -> Self {
		PropertyValue::Bool(value)
	}
}

impl From<DateTime<Utc>> for PropertyValue {
	fn from(value: DateTime<Utc>) -> Self {
		PropertyValue::Timestamp(value)
	}
}

impl<T> From<Vec<T>> for PropertyValue
where
	T: Into<PropertyValue>,
{
	fn from(values: Vec<T>) -> Self {
		PropertyValue::Sequence(values.into_iter().map(Into::into).collect())
	}
}

impl From<BTreeMap<String, PropertyValue>> for PropertyValue {
	fn from(map: BTreeMap<String, PropertyValue>) -> Self {
		PropertyValue::Mapping(map)
	}
}

impl From<Properties> for PropertyValue {
	fn from(props: Properties) -> Self {
		PropertyValue::Mapping(props.into_inner())
	}
}

impl From<serde_json::Value> for PropertyValue {
	fn from(value: serde_json::Value) -> Self {
		use serde_json::Value;

		match value {
			Value::Null => PropertyValue::String("null".to_string()),
			Value::Bool(b) => PropertyValue::Bool(b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => PropertyValue::Int(i),
				None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			Value::String(s) => PropertyValue::String(s),
			Value::Array(items) => {
				PropertyValue::Sequence(items.into_iter().map(PropertyValue::from).collect())
			}
			Value::Object(map) => PropertyValue::Mapping(
				map.into_iter().map(|(k, v)| (k, PropertyValue::from(v))).collect(),
			),
		}
	}
}
