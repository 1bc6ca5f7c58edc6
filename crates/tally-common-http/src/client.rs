// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client builder preloaded with the Tally User-Agent.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Builds a client with a request timeout.
pub fn new_client_with_timeout(timeout: Duration) -> Result<Client, reqwest::Error> {
	builder().timeout(timeout).build()
}

/// `tally/{os}-{arch}/{version}`, e.g. `tally/linux-x86_64/0.1.0`.
pub fn user_agent() -> String {
	format!(
		"tally/{}-{}/{}",
		std::env::consts::OS,
		std::env::consts::ARCH,
		CRATE_VERSION
	)
}
