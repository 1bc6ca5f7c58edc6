// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mixpanel adapter: events go to `/track`, profile updates to `/engage`.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tally_analytics_core::{Properties, PropertyValue, SecretString};
use tokio::sync::RwLock;
use tracing::debug;

use crate::batch::{BatchConfig, BatchProcessor, BatchSender, EventKind, QueuedEvent};
use crate::error::Result;
use crate::provider::{
	check_response, require_event_name, require_user_id, AnalyticsProvider, DistinctIds,
};

const LIB_NAME: &str = "tally";
const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Converts a property value to Mixpanel's JSON form.
///
/// Mixpanel takes flat lists and objects of scalars; anything nested deeper
/// is sent as its text.
pub fn to_mixpanel_value(value: &PropertyValue) -> Value {
	coerce(value, 0)
}

fn coerce(value: &PropertyValue, depth: usize) -> Value {
	match value {
		PropertyValue::String(s) => Value::String(s.clone()),
		PropertyValue::Int(i) => Value::from(*i),
		PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
			.map(Value::Number)
			.unwrap_or_else(|| Value::String(value.to_string())),
		PropertyValue::Bool(b) => Value::Bool(*b),
		PropertyValue::Timestamp(ts) => Value::String(ts.format(DATE_FORMAT).to_string()),
		PropertyValue::Sequence(_) | PropertyValue::Mapping(_) if depth > 0 => {
			Value::String(value.to_string())
		}
		PropertyValue::Sequence(items) => {
			Value::Array(items.iter().map(|v| coerce(v, depth + 1)).collect())
		}
		PropertyValue::Mapping(map) => Value::Object(
			map
				.iter()
				.map(|(k, v)| (k.clone(), coerce(v, depth + 1)))
				.collect(),
		),
	}
}

pub fn to_mixpanel_properties(properties: &Properties) -> Map<String, Value> {
	properties
		.iter()
		.map(|(k, v)| (k.to_string(), to_mixpanel_value(v)))
		.collect()
}

#[derive(Debug, Serialize)]
struct TrackEntry {
	event: String,
	properties: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct EngageEntry<'a> {
	#[serde(rename = "$token")]
	token: &'a str,
	#[serde(rename = "$distinct_id")]
	distinct_id: String,
	#[serde(rename = "$set")]
	set: Map<String, Value>,
}

struct MixpanelSender {
	client: Client,
	host: String,
	token: SecretString,
}

impl MixpanelSender {
	fn track_entry(&self, event: QueuedEvent) -> TrackEntry {
		let mut properties = event.properties;
		properties.insert("token".to_string(), Value::from(self.token.expose().as_str()));
		properties.insert("distinct_id".to_string(), Value::String(event.distinct_id));
		properties.insert("time".to_string(), Value::from(event.timestamp.timestamp_millis()));
		properties.insert("$insert_id".to_string(), Value::String(event.insert_id));
		properties.insert("mp_lib".to_string(), Value::from(LIB_NAME));
		properties.insert("$lib_version".to_string(), Value::from(LIB_VERSION));
		TrackEntry {
			event: event.event_name,
			properties,
		}
	}

	async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<()> {
		let url = format!("{}{endpoint}", self.host);
		let response = self.client.post(&url).json(body).send().await?;
		check_response(response).await
	}
}

#[async_trait::async_trait]
impl BatchSender for MixpanelSender {
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()> {
		let (captures, profiles): (Vec<_>, Vec<_>) = events
			.into_iter()
			.partition(|e| e.kind == EventKind::Capture);

		if !captures.is_empty() {
			let entries: Vec<TrackEntry> = captures.into_iter().map(|e| self.track_entry(e)).collect();
			debug!(count = entries.len(), "sending Mixpanel events");
			self.post("/track", &entries).await?;
		}

		if !profiles.is_empty() {
			let entries: Vec<EngageEntry<'_>> = profiles
				.into_iter()
				.map(|e| EngageEntry {
					token: self.token.expose(),
					distinct_id: e.distinct_id,
					set: e.properties,
				})
				.collect();
			debug!(count = entries.len(), "sending Mixpanel profile updates");
			self.post("/engage", &entries).await?;
		}

		Ok(())
	}
}

/// Sends events and people-profile updates to a Mixpanel project.
pub struct MixpanelProvider {
	processor: Arc<BatchProcessor>,
	ids: RwLock<DistinctIds>,
}

impl MixpanelProvider {
	pub fn new(client: Client, host: String, token: SecretString, batch: BatchConfig) -> Self {
		let sender = Arc::new(MixpanelSender {
			client,
			host,
			token,
		});
		let processor = Arc::new(BatchProcessor::new(batch, sender));
		processor.spawn();

		Self {
			processor,
			ids: RwLock::new(DistinctIds::new()),
		}
	}

	pub async fn distinct_id(&self) -> String {
		self.ids.read().await.current().to_string()
	}

	pub async fn queue_len(&self) -> usize {
		self.processor.queue_len().await
	}
}

impl Drop for MixpanelProvider {
	fn drop(&mut self) {
		self.processor.shutdown();
	}
}

#[async_trait::async_trait]
impl AnalyticsProvider for MixpanelProvider {
	fn name(&self) -> &str {
		"mixpanel"
	}

	async fn track(&self, event: &str, properties: Properties) -> Result<()> {
		require_event_name(event)?;
		let distinct_id = self.distinct_id().await;
		self
			.processor
			.enqueue(QueuedEvent::new(
				EventKind::Capture,
				distinct_id,
				event,
				to_mixpanel_properties(&properties),
			))
			.await
	}

	async fn identify(&self, user_id: &str, properties: Properties) -> Result<()> {
		require_user_id(user_id)?;

		let previous = {
			let mut ids = self.ids.write().await;
			let previous = ids.current().to_string();
			ids.identify(user_id);
			previous
		};

		if previous != user_id {
			let mut link = Map::new();
			link.insert("$identified_id".to_string(), Value::from(user_id));
			link.insert("$anon_id".to_string(), Value::String(previous));
			self
				.processor
				.enqueue(QueuedEvent::new(EventKind::Capture, user_id, "$identify", link))
				.await?;
		}

		if properties.is_empty() {
			return Ok(());
		}

		self
			.processor
			.enqueue(QueuedEvent::new(
				EventKind::Identify,
				user_id,
				"$identify",
				to_mixpanel_properties(&properties),
			))
			.await
	}

	async fn set_user_properties(&self, properties: Properties) -> Result<()> {
		let Some(user_id) = self.ids.read().await.identified().map(str::to_string) else {
			debug!("Mixpanel set_user_properties before identify; ignoring");
			return Ok(());
		};

		self
			.processor
			.enqueue(QueuedEvent::new(
				EventKind::SetProperties,
				user_id,
				"$set",
				to_mixpanel_properties(&properties),
			))
			.await
	}

	async fn reset(&self) -> Result<()> {
		self.ids.write().await.reset();
		Ok(())
	}

	async fn flush(&self) -> Result<()> {
		self.processor.flush().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use std::time::Duration;
	use tally_common_http::RetryConfig;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn provider_for(server: &MockServer) -> MixpanelProvider {
		MixpanelProvider::new(
			Client::new(),
			server.uri(),
			SecretString::from("mp_token"),
			BatchConfig {
				max_batch_size: 100,
				flush_interval: Duration::from_secs(3600),
				max_queue_size: 100,
				retry: RetryConfig::none(),
			},
		)
	}

	async fn mount_ok(server: &MockServer) {
		for endpoint in ["/track", "/engage"] {
			Mock::given(method("POST"))
				.and(path(endpoint))
				.respond_with(ResponseTemplate::new(200).set_body_string("1"))
				.mount(server)
				.await;
		}
	}

	async fn bodies_for(server: &MockServer, endpoint: &str) -> Vec<Value> {
		server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.filter(|r| r.url.path() == endpoint)
			.map(|r| serde_json::from_slice(&r.body).unwrap())
			.collect()
	}

	#[test]
	fn timestamps_use_mixpanel_date_format() {
		let ts = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
		assert_eq!(to_mixpanel_value(&PropertyValue::from(ts)), Value::from("2024-01-31T23:59:58"));
	}

	#[test]
	fn nested_containers_become_text() {
		let value = PropertyValue::from(vec![
			PropertyValue::from(1),
			PropertyValue::from(vec![2, 3]),
		]);
		assert_eq!(to_mixpanel_value(&value), serde_json::json!([1, "[2, 3]"]));

		let flat = PropertyValue::from(Properties::new().insert("a", true));
		assert_eq!(to_mixpanel_value(&flat), serde_json::json!({"a": true}));
	}

	#[test]
	fn non_finite_floats_become_text() {
		assert_eq!(to_mixpanel_value(&PropertyValue::Float(f64::INFINITY)), Value::from("inf"));
	}

	#[tokio::test]
	async fn track_posts_to_track_endpoint() {
		let server = MockServer::start().await;
		mount_ok(&server).await;

		let provider = provider_for(&server);
		provider
			.track("feature_used", Properties::new().insert("feature_name", "export"))
			.await
			.unwrap();
		provider.flush().await.unwrap();

		let tracks = bodies_for(&server, "/track").await;
		assert_eq!(tracks.len(), 1);
		let entry = &tracks[0][0];
		assert_eq!(entry["event"], "feature_used");
		assert_eq!(entry["properties"]["token"], "mp_token");
		assert_eq!(entry["properties"]["feature_name"], "export");
		assert_eq!(entry["properties"]["distinct_id"], provider.distinct_id().await);
		assert!(entry["properties"]["time"].is_i64());
		assert!(entry["properties"]["$insert_id"].is_string());
		assert!(bodies_for(&server, "/engage").await.is_empty());
	}

	#[tokio::test]
	async fn identify_sets_profile_via_engage() {
		let server = MockServer::start().await;
		mount_ok(&server).await;

		let provider = provider_for(&server);
		provider
			.identify("user-9", Properties::new().insert("plan", "free"))
			.await
			.unwrap();
		provider
			.set_user_properties(Properties::new().insert("plan", "pro"))
			.await
			.unwrap();
		provider.flush().await.unwrap();

		let engage = bodies_for(&server, "/engage").await;
		let entries = engage[0].as_array().unwrap();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0]["$token"], "mp_token");
		assert_eq!(entries[0]["$distinct_id"], "user-9");
		assert_eq!(entries[0]["$set"]["plan"], "free");
		assert_eq!(entries[1]["$set"]["plan"], "pro");

		let tracks = bodies_for(&server, "/track").await;
		assert_eq!(tracks[0][0]["event"], "$identify");
		assert_eq!(tracks[0][0]["properties"]["$identified_id"], "user-9");
	}

	#[tokio::test]
	async fn repeated_identify_does_not_relink() {
		let server = MockServer::start().await;
		let provider = provider_for(&server);

		let traits = Properties::new().insert("plan", "free");
		provider.identify("user-9", traits.clone()).await.unwrap();
		provider.identify("user-9", traits).await.unwrap();

		// one link event plus two profile updates
		assert_eq!(provider.queue_len().await, 3);
	}

	#[tokio::test]
	async fn identify_without_traits_skips_engage() {
		let server = MockServer::start().await;
		mount_ok(&server).await;

		let provider = provider_for(&server);
		provider.identify("user-9", Properties::new()).await.unwrap();
		assert_eq!(provider.queue_len().await, 1);
		provider.flush().await.unwrap();

		assert!(bodies_for(&server, "/engage").await.is_empty());
		let tracks = bodies_for(&server, "/track").await;
		assert_eq!(tracks[0][0]["event"], "$identify");
	}

	#[tokio::test]
	async fn set_properties_without_identity_is_noop() {
		let server = MockServer::start().await;
		let provider = provider_for(&server);

		provider
			.set_user_properties(Properties::new().insert("k", 1))
			.await
			.unwrap();

		assert_eq!(provider.queue_len().await, 0);
	}
}
