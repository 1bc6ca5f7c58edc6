// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for analytics credentials.
//!
//! Provider API keys and project tokens travel through configuration,
//! provider construction and log statements. [`Secret<T>`] keeps them out of
//! every formatted and serialized form:
//!
//! ```
//! use tally_common_secret::Secret;
//!
//! let token = Secret::new("phc_live_token".to_string());
//! assert_eq!(format!("{token}"), "[REDACTED]");
//! assert_eq!(format!("{token:?}"), "Secret(\"[REDACTED]\")");
//! assert_eq!(token.expose(), "phc_live_token");
//! ```
//!
//! Structured logging goes through `Display`/`Debug`, so
//! `info!(api_key = %token)` records `[REDACTED]`.

use std::fmt;
use zeroize::Zeroize;

/// Placeholder written wherever a secret would otherwise appear.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must never be logged or serialized in clear text.
///
/// There is no `Deref`; callers opt in with [`Secret::expose`]. The inner
/// value is zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

/// The common case: a secret string such as an API key.
pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Borrow the clear-text value.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Returns a clone of the clear-text value, leaving this wrapper to be
	/// zeroized when dropped.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.inner.clone()
	}
}

impl Secret<String> {
	/// True when the secret is empty or whitespace only.
	///
	/// Providers configured with a blank credential are skipped.
	pub fn is_blank(&self) -> bool {
		self.inner.trim().is_empty()
	}
}

impl From<String> for Secret<String> {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for Secret<String> {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl<T> Default for Secret<T>
where
	T: Zeroize + Default,
{
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Secret, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	impl<T> Serialize for Secret<T>
	where
		T: Serialize + Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}
