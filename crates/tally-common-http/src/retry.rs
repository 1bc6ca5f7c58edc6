// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exponential backoff for provider deliveries.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// A single attempt, no waiting.
	pub fn none() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}
}

/// Classifies an error as transient.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self.status().is_some_and(|s| {
			matches!(s.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
		})
	}
}

fn delay_for(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped = exponential.min(cfg.max_delay.as_secs_f64());
	let delay = if cfg.jitter {
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};
	Duration::from_secs_f64(delay)
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. The last error is returned.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0;
	loop {
		match f().await {
			Ok(value) => return Ok(value),
			Err(err) => {
				attempt += 1;
				if !err.is_retryable() || attempt >= cfg.max_attempts {
					return Err(err);
				}

				let delay = delay_for(cfg, attempt - 1);
				warn!(
					error = %err,
					attempt,
					max_attempts = cfg.max_attempts,
					delay_ms = delay.as_millis() as u64,
					"retrying delivery"
				);
				tokio::time::sleep(delay).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	#[derive(Debug)]
	struct Flaky {
		retryable: bool,
	}

	impl std::fmt::Display for Flaky {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "flaky(retryable={})", self.retryable)
		}
	}

	impl RetryableError for Flaky {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	fn fast() -> RetryConfig {
		RetryConfig {
			max_attempts: 4,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	#[tokio::test]
	async fn permanent_error_is_not_retried() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<(), Flaky> = retry(&fast(), || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(Flaky { retryable: false })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn transient_error_stops_at_max_attempts() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<(), Flaky> = retry(&fast(), || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(Flaky { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 4);
	}

	#[tokio::test]
	async fn recovers_after_transient_failures() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<&str, Flaky> = retry(&fast(), || {
			let counter = Arc::clone(&counter);
			async move {
				if counter.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(Flaky { retryable: true })
				} else {
					Ok("delivered")
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), "delivered");
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn delay_is_capped() {
		let cfg = RetryConfig {
			jitter: false,
			..RetryConfig::default()
		};
		assert!((delay_for(&cfg, 0).as_secs_f64() - 0.2).abs() < 1e-6);
		assert_eq!(delay_for(&cfg, 20), cfg.max_delay);
	}
}
