// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP plumbing shared by the provider adapters.
//!
//! - [`builder`]: a `reqwest` client builder carrying the Tally User-Agent
//! - [`retry`]: exponential backoff with jitter for transient delivery failures

mod client;
mod retry;

pub use client::{builder, new_client_with_timeout, user_agent};
pub use retry::{retry, RetryConfig, RetryableError};
