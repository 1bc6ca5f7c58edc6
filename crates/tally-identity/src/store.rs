// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key/value persistence for identity state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tally_analytics_core::{Properties, PropertyValue};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Backing store for identity, traits and counters.
#[async_trait]
pub trait PropertyStore: Send + Sync + std::fmt::Debug {
	async fn get(&self, key: &str) -> Result<Option<PropertyValue>, StoreError>;

	async fn set(&self, key: &str, value: PropertyValue) -> Result<(), StoreError>;

	/// Removing a missing key is not an error.
	async fn remove(&self, key: &str) -> Result<(), StoreError>;

	async fn keys(&self) -> Result<Vec<String>, StoreError>;

	/// Reads `key` as a property mapping. Any other stored shape reads as
	/// absent.
	async fn get_mapping(&self, key: &str) -> Result<Option<Properties>, StoreError> {
		Ok(match self.get(key).await? {
			Some(PropertyValue::Mapping(map)) => Some(Properties::from(map)),
			_ => None,
		})
	}

	async fn set_mapping(&self, key: &str, properties: Properties) -> Result<(), StoreError> {
		self.set(key, PropertyValue::from(properties)).await
	}
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
	values: RwLock<BTreeMap<String, PropertyValue>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl PropertyStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<PropertyValue>, StoreError> {
		Ok(self.values.read().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: PropertyValue) -> Result<(), StoreError> {
		self.values.write().await.insert(key.to_string(), value);
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.values.write().await.remove(key);
		Ok(())
	}

	async fn keys(&self) -> Result<Vec<String>, StoreError> {
		Ok(self.values.read().await.keys().cloned().collect())
	}
}

/// Store persisted as one JSON document.
///
/// The document is read once on [`JsonFileStore::open`] and rewritten in
/// full on every change. Values are normalized first so that non-finite
/// floats survive as text.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
	values: Mutex<BTreeMap<String, PropertyValue>>,
}

impl JsonFileStore {
	/// Opens the store at `path`. A missing file is an empty store; so is a
	/// file that cannot be read or parsed, which is logged and later
	/// overwritten.
	pub async fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let values = match read_document(&path).await {
			Ok(values) => values,
			Err(e) => {
				warn!(path = ?path, error = %e, "unreadable property store; starting empty");
				BTreeMap::new()
			}
		};

		debug!(path = ?path, keys = values.len(), "property store opened");
		Self {
			path,
			values: Mutex::new(values),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn write_document(&self, values: &BTreeMap<String, PropertyValue>) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await?;
		}

		let contents = serde_json::to_string_pretty(values)?;

		let temp_path = self.path.with_extension("tmp");
		let mut file = fs::File::create(&temp_path).await?;
		file.write_all(contents.as_bytes()).await?;
		file.sync_all().await?;
		drop(file);

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let perms = std::fs::Permissions::from_mode(0o600);
			if let Err(e) = std::fs::set_permissions(&temp_path, perms) {
				warn!(path = ?temp_path, error = %e, "failed to set store permissions to 0600");
			}
		}

		fs::rename(&temp_path, &self.path).await?;
		Ok(())
	}

	/// Applies `change` to a copy of the map and commits it only once the
	/// copy is on disk.
	async fn update<F>(&self, change: F) -> Result<(), StoreError>
	where
		F: FnOnce(&mut BTreeMap<String, PropertyValue>),
	{
		let mut values = self.values.lock().await;
		let mut next = values.clone();
		change(&mut next);
		self.write_document(&next).await?;
		*values = next;
		Ok(())
	}
}

async fn read_document(path: &Path) -> Result<BTreeMap<String, PropertyValue>, StoreError> {
	match fs::read_to_string(path).await {
		Ok(contents) => Ok(serde_json::from_str(&contents)?),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
		Err(e) => Err(e.into()),
	}
}

#[async_trait]
impl PropertyStore for JsonFileStore {
	async fn get(&self, key: &str) -> Result<Option<PropertyValue>, StoreError> {
		Ok(self.values.lock().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: PropertyValue) -> Result<(), StoreError> {
		let value = value.normalized();
		self
			.update(|values| {
				values.insert(key.to_string(), value);
			})
			.await
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		if !self.values.lock().await.contains_key(key) {
			return Ok(());
		}
		self
			.update(|values| {
				values.remove(key);
			})
			.await
	}

	async fn keys(&self) -> Result<Vec<String>, StoreError> {
		Ok(self.values.lock().await.keys().cloned().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use tempfile::TempDir;

	#[tokio::test]
	async fn memory_store_roundtrip() {
		let store = MemoryStore::new();

		store.set("k", PropertyValue::from("v")).await.unwrap();
		assert_eq!(store.get("k").await.unwrap(), Some(PropertyValue::from("v")));

		store.remove("k").await.unwrap();
		store.remove("k").await.unwrap();
		assert_eq!(store.get("k").await.unwrap(), None);
	}

	#[tokio::test]
	async fn mapping_helpers_ignore_other_shapes() {
		let store = MemoryStore::new();
		store.set("scalar", PropertyValue::from(3)).await.unwrap();
		store
			.set_mapping("traits", Properties::new().insert("plan", "pro"))
			.await
			.unwrap();

		assert_eq!(store.get_mapping("scalar").await.unwrap(), None);
		assert_eq!(
			store.get_mapping("traits").await.unwrap(),
			Some(Properties::new().insert("plan", "pro"))
		);
	}

	#[tokio::test]
	async fn file_store_survives_reopen() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("nested").join("store.json");
		let ts = Utc.with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap();

		{
			let store = JsonFileStore::open(&path).await;
			store.set("installed", PropertyValue::from(ts)).await.unwrap();
			store.set("count", PropertyValue::from(3)).await.unwrap();
		}

		let reopened = JsonFileStore::open(&path).await;
		assert_eq!(reopened.get("installed").await.unwrap(), Some(PropertyValue::Timestamp(ts)));
		assert_eq!(reopened.get("count").await.unwrap(), Some(PropertyValue::Int(3)));
		assert_eq!(reopened.keys().await.unwrap(), vec!["count", "installed"]);
	}

	#[tokio::test]
	async fn corrupt_file_opens_empty() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("store.json");
		std::fs::write(&path, "{not json").unwrap();

		let store = JsonFileStore::open(&path).await;
		assert!(store.keys().await.unwrap().is_empty());

		store.set("k", PropertyValue::from(true)).await.unwrap();
		let reopened = JsonFileStore::open(&path).await;
		assert_eq!(reopened.get("k").await.unwrap(), Some(PropertyValue::Bool(true)));
	}

	#[tokio::test]
	async fn non_finite_floats_persist_as_text() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("store.json");

		let store = JsonFileStore::open(&path).await;
		store.set("ratio", PropertyValue::Float(f64::NAN)).await.unwrap();

		let reopened = JsonFileStore::open(&path).await;
		assert_eq!(reopened.get("ratio").await.unwrap(), Some(PropertyValue::from("NaN")));
	}

	#[tokio::test]
	async fn failed_write_keeps_previous_state() {
		let dir = TempDir::new().unwrap();
		// a directory where the document should be makes the rename fail
		let path = dir.path().join("store.json");
		std::fs::create_dir_all(path.join("occupied")).unwrap();

		let store = JsonFileStore::open(&path).await;
		let result = store.set("k", PropertyValue::from(1)).await;

		assert!(result.is_err());
		assert_eq!(store.get("k").await.unwrap(), None);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn file_store_is_private() {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new().unwrap();
		let path = dir.path().join("store.json");
		let store = JsonFileStore::open(&path).await;
		store.set("k", PropertyValue::from("v")).await.unwrap();

		let mode = std::fs::metadata(&path).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}
}
