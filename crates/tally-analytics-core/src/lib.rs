// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Tally analytics pipeline.
//!
//! - [`PropertyValue`] / [`Properties`]: the closed value model carried by
//!   every event, identify call and stored user trait
//! - [`AppContext`] / [`CommonProperties`]: process-wide facts attached to
//!   every outbound event
//! - [`ProviderConfig`]: which analytics backends to fan out to

pub mod context;
pub mod properties;
pub mod provider_config;
pub mod value;

pub use context::{AppContext, CommonProperties, Environment, UserType};
pub use properties::Properties;
pub use provider_config::{ParseProviderKindError, ProviderConfig, ProviderKind};
pub use value::PropertyValue;

pub use tally_common_secret::{Secret, SecretString};
