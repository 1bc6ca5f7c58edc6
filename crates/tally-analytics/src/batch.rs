// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event batching and background flush shared by the HTTP provider adapters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_common_http::{retry, RetryConfig};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AnalyticsError, Result};

/// Configuration for an adapter's event queue.
#[derive(Debug, Clone)]
pub struct BatchConfig {
	/// Queue length that triggers an immediate flush.
	pub max_batch_size: usize,
	/// Interval between automatic flushes.
	pub flush_interval: Duration,
	/// Events beyond this are dropped oldest-first.
	pub max_queue_size: usize,
	/// Backoff applied to each batch delivery.
	pub retry: RetryConfig,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			max_batch_size: 20,
			flush_interval: Duration::from_secs(30),
			max_queue_size: 1000,
			retry: RetryConfig::default(),
		}
	}
}

impl BatchConfig {
	/// Debug builds deliver every event straight away.
	pub fn debug() -> Self {
		Self {
			max_batch_size: 1,
			flush_interval: Duration::from_secs(1),
			..Self::default()
		}
	}

	pub fn for_environment(is_debug: bool) -> Self {
		if is_debug {
			Self::debug()
		} else {
			Self::default()
		}
	}
}

/// What a queued entry asks the backend to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
	Capture,
	Identify,
	SetProperties,
}

/// An entry waiting to be sent. Properties are already in the backend's
/// JSON shape.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
	pub kind: EventKind,
	pub distinct_id: String,
	pub event_name: String,
	pub properties: serde_json::Map<String, serde_json::Value>,
	pub timestamp: DateTime<Utc>,
	/// Per-event id backends use to deduplicate retried deliveries.
	pub insert_id: String,
}

impl QueuedEvent {
	pub fn new(
		kind: EventKind,
		distinct_id: impl Into<String>,
		event_name: impl Into<String>,
		properties: serde_json::Map<String, serde_json::Value>,
	) -> Self {
		Self {
			kind,
			distinct_id: distinct_id.into(),
			event_name: event_name.into(),
			properties,
			timestamp: Utc::now(),
			insert_id: uuid::Uuid::new_v4().to_string(),
		}
	}
}

/// Delivers a batch to one backend.
#[async_trait::async_trait]
pub trait BatchSender: Send + Sync {
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()>;
}

/// Queue plus background flush loop for one provider.
pub struct BatchProcessor {
	config: BatchConfig,
	sender: Arc<dyn BatchSender>,
	queue: Mutex<VecDeque<QueuedEvent>>,
	shutdown: AtomicBool,
	flush_notify: Notify,
}

impl BatchProcessor {
	/// Batch and queue sizes below one are raised to one.
	pub fn new(mut config: BatchConfig, sender: Arc<dyn BatchSender>) -> Self {
		config.max_batch_size = config.max_batch_size.max(1);
		config.max_queue_size = config.max_queue_size.max(1);
		Self {
			config,
			sender,
			queue: Mutex::new(VecDeque::new()),
			shutdown: AtomicBool::new(false),
			flush_notify: Notify::new(),
		}
	}

	/// Starts [`BatchProcessor::run`] on the current tokio runtime.
	///
	/// Outside a runtime nothing is spawned and events wait for an explicit
	/// [`BatchProcessor::flush`].
	pub fn spawn(self: &Arc<Self>) -> Option<JoinHandle<()>> {
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				let processor = Arc::clone(self);
				Some(handle.spawn(async move { processor.run().await }))
			}
			Err(_) => {
				warn!("no tokio runtime; analytics events flush only on demand");
				None
			}
		}
	}

	pub async fn enqueue(&self, event: QueuedEvent) -> Result<()> {
		if self.is_shutdown() {
			return Err(AnalyticsError::ClientShutdown);
		}

		let mut queue = self.queue.lock().await;

		while queue.len() >= self.config.max_queue_size {
			let Some(dropped) = queue.pop_front() else {
				break;
			};
			warn!(
				event_name = %dropped.event_name,
				distinct_id = %dropped.distinct_id,
				"dropped analytics event due to queue overflow"
			);
		}

		queue.push_back(event);

		if queue.len() >= self.config.max_batch_size {
			drop(queue);
			self.flush_notify.notify_one();
		}

		Ok(())
	}

	/// Sends everything queued right now as one batch.
	///
	/// Transient failures are retried per [`BatchConfig::retry`]; after that
	/// the batch is dropped and the last error returned.
	pub async fn flush(&self) -> Result<()> {
		let events: Vec<QueuedEvent> = {
			let mut queue = self.queue.lock().await;
			queue.drain(..).collect()
		};

		if events.is_empty() {
			return Ok(());
		}

		debug!(count = events.len(), "flushing analytics batch");
		retry(&self.config.retry, || self.sender.send_batch(events.clone())).await
	}

	pub async fn queue_len(&self) -> usize {
		self.queue.lock().await.len()
	}

	/// Stops accepting events and wakes the run loop for a final flush.
	pub fn shutdown(&self) {
		self.shutdown.store(true, Ordering::SeqCst);
		self.flush_notify.notify_one();
	}

	pub fn is_shutdown(&self) -> bool {
		self.shutdown.load(Ordering::SeqCst)
	}

	/// Flushes on every interval tick and whenever the batch size is reached.
	pub async fn run(&self) {
		info!(
			flush_interval_ms = self.config.flush_interval.as_millis() as u64,
			max_batch_size = self.config.max_batch_size,
			"starting analytics batch processor"
		);

		loop {
			tokio::select! {
				_ = tokio::time::sleep(self.config.flush_interval) => {}
				_ = self.flush_notify.notified() => {}
			}

			if let Err(e) = self.flush().await {
				error!(error = %e, "failed to deliver analytics batch");
			}

			if self.is_shutdown() {
				break;
			}
		}

		info!("analytics batch processor stopped");
	}
}
