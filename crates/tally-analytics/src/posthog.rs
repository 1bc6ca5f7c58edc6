// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! PostHog adapter over the `/batch/` capture endpoint.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
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

/// Converts a property value to PostHog's JSON form.
///
/// Timestamps become RFC 3339 strings and non-finite floats become their
/// text; containers are converted recursively.
pub fn to_posthog_value(value: &PropertyValue) -> Value {
	match value {
		PropertyValue::String(s) => Value::String(s.clone()),
		PropertyValue::Int(i) => Value::from(*i),
		PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
			.map(Value::Number)
			.unwrap_or_else(|| Value::String(value.to_string())),
		PropertyValue::Bool(b) => Value::Bool(*b),
		PropertyValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
		PropertyValue::Sequence(items) => Value::Array(items.iter().map(to_posthog_value).collect()),
		PropertyValue::Mapping(map) => Value::Object(
			map
				.iter()
				.map(|(k, v)| (k.clone(), to_posthog_value(v)))
				.collect(),
		),
	}
}

pub fn to_posthog_properties(properties: &Properties) -> Map<String, Value> {
	properties
		.iter()
		.map(|(k, v)| (k.to_string(), to_posthog_value(v)))
		.collect()
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
	api_key: &'a str,
	batch: Vec<CaptureEntry>,
}

#[derive(Debug, Serialize)]
struct CaptureEntry {
	event: String,
	distinct_id: String,
	properties: Map<String, Value>,
	timestamp: DateTime<Utc>,
	uuid: String,
}

struct PostHogSender {
	client: Client,
	endpoint: String,
	api_key: SecretString,
}

#[async_trait::async_trait]
impl BatchSender for PostHogSender {
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()> {
		let batch: Vec<CaptureEntry> = events
			.into_iter()
			.map(|e| {
				let mut properties = e.properties;
				properties.insert("$lib".to_string(), Value::from(LIB_NAME));
				properties.insert("$lib_version".to_string(), Value::from(LIB_VERSION));
				CaptureEntry {
					event: e.event_name,
					distinct_id: e.distinct_id,
					properties,
					timestamp: e.timestamp,
					uuid: e.insert_id,
				}
			})
			.collect();

		let request = BatchRequest {
			api_key: self.api_key.expose(),
			batch,
		};

		debug!(url = %self.endpoint, count = request.batch.len(), "sending PostHog batch");

		let response = self.client.post(&self.endpoint).json(&request).send().await?;
		check_response(response).await
	}
}

/// Sends captures, `$identify` and `$set` events to a PostHog project.
pub struct PostHogProvider {
	processor: Arc<BatchProcessor>,
	ids: RwLock<DistinctIds>,
}

impl PostHogProvider {
	pub fn new(client: Client, host: String, api_key: SecretString, batch: BatchConfig) -> Self {
		let sender = Arc::new(PostHogSender {
			client,
			endpoint: format!("{host}/batch/"),
			api_key,
		});
		let processor = Arc::new(BatchProcessor::new(batch, sender));
		processor.spawn();

		Self {
			processor,
			ids: RwLock::new(DistinctIds::new()),
		}
	}

	/// The distinct id new events are attributed to.
	pub async fn distinct_id(&self) -> String {
		self.ids.read().await.current().to_string()
	}

	pub async fn queue_len(&self) -> usize {
		self.processor.queue_len().await
	}
}

impl Drop for PostHogProvider {
	fn drop(&mut self) {
		self.processor.shutdown();
	}
}

#[async_trait::async_trait]
impl AnalyticsProvider for PostHogProvider {
	fn name(&self) -> &str {
		"posthog"
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
				to_posthog_properties(&properties),
			))
			.await
	}

	async fn identify(&self, user_id: &str, properties: Properties) -> Result<()> {
		require_user_id(user_id)?;

		let anonymous_id = {
			let mut ids = self.ids.write().await;
			let anonymous_id = ids.anonymous_id().to_string();
			ids.identify(user_id);
			anonymous_id
		};

		let mut payload = Map::new();
		payload.insert(
			"$set".to_string(),
			Value::Object(to_posthog_properties(&properties)),
		);
		payload.insert("$anon_distinct_id".to_string(), Value::String(anonymous_id));

		self
			.processor
			.enqueue(QueuedEvent::new(EventKind::Identify, user_id, "$identify", payload))
			.await
	}

	async fn set_user_properties(&self, properties: Properties) -> Result<()> {
		let Some(user_id) = self.ids.read().await.identified().map(str::to_string) else {
			debug!("PostHog set_user_properties before identify; ignoring");
			return Ok(());
		};

		let mut payload = Map::new();
		payload.insert(
			"$set".to_string(),
			Value::Object(to_posthog_properties(&properties)),
		);

		self
			.processor
			.enqueue(QueuedEvent::new(EventKind::SetProperties, user_id, "$set", payload))
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
