// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory provider that records the fan-out it receives.
//!
//! Several recorders can share one [`CallLog`] so a test can observe the
//! order in which the manager reached each provider.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tally_analytics_core::{Properties, ProviderConfig, ProviderKind};

use crate::error::{AnalyticsError, Result};
use crate::provider::{AnalyticsProvider, ProviderFactory};

/// One call received by a [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
	Track { event: String, properties: Properties },
	Identify { user_id: String, properties: Properties },
	SetUserProperties { properties: Properties },
	Reset,
	Flush,
}

impl RecordedCall {
	pub fn operation(&self) -> Operation {
		match self {
			RecordedCall::Track { .. } => Operation::Track,
			RecordedCall::Identify { .. } => Operation::Identify,
			RecordedCall::SetUserProperties { .. } => Operation::SetUserProperties,
			RecordedCall::Reset => Operation::Reset,
			RecordedCall::Flush => Operation::Flush,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Track,
	Identify,
	SetUserProperties,
	Reset,
	Flush,
}

/// Shared, ordered log of `(provider name, call)` tuples.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
	entries: Arc<Mutex<Vec<(String, RecordedCall)>>>,
}

impl CallLog {
	pub fn new() -> Self {
		Self::default()
	}

	fn push(&self, provider: &str, call: RecordedCall) {
		if let Ok(mut entries) = self.entries.lock() {
			entries.push((provider.to_string(), call));
		}
	}

	pub fn entries(&self) -> Vec<(String, RecordedCall)> {
		self
			.entries
			.lock()
			.map(|e| e.clone())
			.unwrap_or_default()
	}

	/// Calls received by one provider, in order.
	pub fn calls_for(&self, provider: &str) -> Vec<RecordedCall> {
		self
			.entries()
			.into_iter()
			.filter(|(name, _)| name == provider)
			.map(|(_, call)| call)
			.collect()
	}

	/// Names of the events each `Track` carried, across all providers.
	pub fn tracked_events(&self) -> Vec<(String, String)> {
		self
			.entries()
			.into_iter()
			.filter_map(|(name, call)| match call {
				RecordedCall::Track { event, .. } => Some((name, event)),
				_ => None,
			})
			.collect()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().map(|e| e.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clear(&self) {
		if let Ok(mut entries) = self.entries.lock() {
			entries.clear();
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Misbehaviour {
	Fail,
	Panic,
}

/// Provider that only records. It can be told to fail or panic on chosen
/// operations; the call is recorded either way.
#[derive(Debug)]
pub struct RecordingProvider {
	name: String,
	log: CallLog,
	failing: HashSet<Operation>,
	panicking: HashSet<Operation>,
}

impl RecordingProvider {
	pub fn new(name: impl Into<String>) -> Self {
		Self::with_log(name, CallLog::new())
	}

	pub fn with_log(name: impl Into<String>, log: CallLog) -> Self {
		Self {
			name: name.into(),
			log,
			failing: HashSet::new(),
			panicking: HashSet::new(),
		}
	}

	/// Returns an error from `operation` after recording it.
	pub fn failing_on(mut self, operation: Operation) -> Self {
		self.failing.insert(operation);
		self
	}

	/// Panics inside `operation` after recording it.
	pub fn panicking_on(mut self, operation: Operation) -> Self {
		self.panicking.insert(operation);
		self
	}

	pub fn log(&self) -> &CallLog {
		&self.log
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		self.log.calls_for(&self.name)
	}

	fn misbehaviour(&self, operation: Operation) -> Option<Misbehaviour> {
		if self.panicking.contains(&operation) {
			Some(Misbehaviour::Panic)
		} else if self.failing.contains(&operation) {
			Some(Misbehaviour::Fail)
		} else {
			None
		}
	}

	fn record(&self, call: RecordedCall) -> Result<()> {
		let operation = call.operation();
		self.log.push(&self.name, call);
		match self.misbehaviour(operation) {
			Some(Misbehaviour::Panic) => panic!("{} panicked on {operation:?}", self.name),
			Some(Misbehaviour::Fail) => Err(AnalyticsError::ProviderFailed(format!(
				"{} failed on {operation:?}",
				self.name
			))),
			None => Ok(()),
		}
	}
}

#[async_trait::async_trait]
impl AnalyticsProvider for RecordingProvider {
	fn name(&self) -> &str {
		&self.name
	}

	async fn track(&self, event: &str, properties: Properties) -> Result<()> {
		self.record(RecordedCall::Track {
			event: event.to_string(),
			properties,
		})
	}

	async fn identify(&self, user_id: &str, properties: Properties) -> Result<()> {
		self.record(RecordedCall::Identify {
			user_id: user_id.to_string(),
			properties,
		})
	}

	async fn set_user_properties(&self, properties: Properties) -> Result<()> {
		self.record(RecordedCall::SetUserProperties { properties })
	}

	async fn reset(&self) -> Result<()> {
		self.record(RecordedCall::Reset)
	}

	async fn flush(&self) -> Result<()> {
		self.record(RecordedCall::Flush)
	}
}

/// Factory that builds a [`RecordingProvider`] named after each configured
/// kind, all writing to one [`CallLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
	log: CallLog,
	failing: HashMap<ProviderKind, Vec<Operation>>,
	panicking: HashMap<ProviderKind, Vec<Operation>>,
}

impl RecordingFactory {
	pub fn new(log: CallLog) -> Self {
		Self {
			log,
			..Self::default()
		}
	}

	pub fn failing_on(mut self, kind: ProviderKind, operation: Operation) -> Self {
		self.failing.entry(kind).or_default().push(operation);
		self
	}

	pub fn panicking_on(mut self, kind: ProviderKind, operation: Operation) -> Self {
		self.panicking.entry(kind).or_default().push(operation);
		self
	}

	pub fn log(&self) -> &CallLog {
		&self.log
	}
}

impl ProviderFactory for RecordingFactory {
	fn create(
		&self,
		config: &ProviderConfig,
		_is_debug: bool,
	) -> Result<Arc<dyn AnalyticsProvider>> {
		let mut provider = RecordingProvider::with_log(config.kind.as_str(), self.log.clone());
		for operation in self.failing.get(&config.kind).into_iter().flatten() {
			provider = provider.failing_on(*operation);
		}
		for operation in self.panicking.get(&config.kind).into_iter().flatten() {
			provider = provider.panicking_on(*operation);
		}
		Ok(Arc::new(provider))
	}
}
