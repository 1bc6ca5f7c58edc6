// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `tally`: runs the app launch sequence against the configured analytics
//! providers, then one command.

mod props;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tally_analytics::AnalyticsManager;
use tally_analytics_core::{AppContext, PropertyValue};
use tally_config::{LoggingConfig, TallyConfig};
use tally_identity::{
	IdentityManager, IdentitySettings, JsonFileStore, PropertyStore, ReviewPolicy, UsageTracker,
};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tally", version, about = "Analytics fan-out and install identity")]
struct Args {
	/// Config file to use instead of the user config file
	#[arg(long, global = true, env = "TALLY_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Run the launch sequence only
	Launch,
	/// Track an event
	Track {
		event: String,
		/// Event property, repeatable
		#[arg(short = 'p', long = "property", value_parser = props::parse_pair)]
		properties: Vec<(String, PropertyValue)>,
	},
	/// Identify with an explicit user id
	Identify {
		user_id: String,
		#[arg(short = 'p', long = "property", value_parser = props::parse_pair)]
		properties: Vec<(String, PropertyValue)>,
	},
	/// Store and send one user trait
	Set { key: String, value: String },
	/// Record a named milestone
	Milestone {
		name: String,
		#[arg(short = 'p', long = "property", value_parser = props::parse_pair)]
		properties: Vec<(String, PropertyValue)>,
	},
	/// Print the install's user id and traits
	Whoami,
	/// Discard the current identity and start a new one
	Reset,
	/// Show launch count and review-prompt eligibility
	ReviewStatus {
		/// Record that a review prompt was shown now
		#[arg(long)]
		record: bool,
	},
	/// Print version information
	Version,
}

struct App {
	analytics: Arc<AnalyticsManager>,
	identity: IdentityManager,
	usage: UsageTracker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("tally {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	let config = match &args.config {
		Some(path) => tally_config::load_config_with_file(path),
		None => tally_config::load_config(),
	}
	.context("failed to load configuration")?;

	init_tracing(&config.logging);

	let app = start(&config).await?;
	session(&app, args.command).await
}

/// Launch sequence, then `command`, then a flush. Launch failures are
/// logged and never stop the command or the flush.
async fn session(app: &App, command: Command) -> anyhow::Result<()> {
	launch(app).await;
	let result = run(app, command).await;
	app.analytics.flush().await;
	result
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);

	if logging.json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}
}

async fn start(config: &TallyConfig) -> anyhow::Result<App> {
	let mut context = AppContext::detect()
		.with_app("tally", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_VERSION"))
		.with_debug(config.analytics.debug)
		.with_simulator(config.analytics.simulator);
	if let Some(platform) = &config.identity.platform {
		context = context.with_platform(platform.clone());
	}

	let analytics = Arc::new(
		AnalyticsManager::with_default_factory(context.clone())
			.with_flush_timeout(config.analytics.flush_timeout()),
	);
	analytics.configure(config.provider_configs()).await;

	let store: Arc<dyn PropertyStore> =
		Arc::new(JsonFileStore::open(&config.identity.store_path).await);
	let mut settings = IdentitySettings {
		key_prefix: config.identity.key_prefix.clone(),
		..IdentitySettings::default()
	};
	if let Some(platform) = &config.identity.platform {
		settings.platform = platform.clone();
	}

	let policy = ReviewPolicy {
		minimum_app_launches: config.review.minimum_app_launches,
		days_between_requests: config.review.days_between_requests,
	};

	tracing::info!(
		providers = ?analytics.provider_names().await,
		store = %config.identity.store_path.display(),
		"tally started"
	);

	Ok(App::assemble(analytics, store, context, settings, policy))
}

impl App {
	fn assemble(
		analytics: Arc<AnalyticsManager>,
		store: Arc<dyn PropertyStore>,
		context: AppContext,
		settings: IdentitySettings,
		policy: ReviewPolicy,
	) -> Self {
		Self {
			identity: IdentityManager::new(store.clone(), analytics.clone(), context, settings),
			usage: UsageTracker::new(store, policy),
			analytics,
		}
	}
}

async fn launch(app: &App) {
	if let Err(e) = app.identity.initialize_user().await {
		warn!(error = %e, "failed to initialize user");
	}
	if let Err(e) = app.identity.track_first_launch_events().await {
		warn!(error = %e, "failed to record first launch");
	}
	if let Err(e) = app.identity.track_app_launch().await {
		warn!(error = %e, "failed to track app launch");
	}
	if let Err(e) = app.usage.increment_app_launches().await {
		warn!(error = %e, "failed to count app launch");
	}
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
	match command {
		Command::Launch | Command::Version => {}
		Command::Track { event, properties } => {
			app.analytics.track(&event, props::collect(properties)).await;
		}
		Command::Identify { user_id, properties } => {
			app.analytics.identify(&user_id, props::collect(properties)).await;
		}
		Command::Set { key, value } => {
			app
				.identity
				.set_user_property(key, props::parse_value(&value))
				.await?;
		}
		Command::Milestone { name, properties } => {
			app
				.identity
				.track_user_milestone(&name, props::collect(properties))
				.await?;
		}
		Command::Whoami => {
			println!("user_id: {}", app.identity.current_user_id().await?);
			for (key, value) in app.identity.user_properties().await?.iter() {
				println!("{key}: {value}");
			}
		}
		Command::Reset => {
			let user_id = app.identity.reset_user_identity().await?;
			println!("user_id: {user_id}");
		}
		Command::ReviewStatus { record } => {
			let now = Utc::now();
			let eligible = app.usage.should_request_review(now).await;
			println!("launches: {}", app.usage.launches().await);
			match app.usage.last_review_request().await {
				Some(last) => println!("last_review_request: {}", last.to_rfc3339()),
				None => println!("last_review_request: never"),
			}
			println!("should_request_review: {eligible}");
			if record {
				app.usage.record_review_request(now).await?;
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;
	use tally_analytics::{CallLog, RecordedCall, RecordingFactory};
	use tally_analytics_core::{ProviderConfig, ProviderKind};
	use tally_identity::StoreError;

	/// Reads nothing and refuses every write.
	#[derive(Debug)]
	struct ReadOnlyStore;

	#[async_trait::async_trait]
	impl PropertyStore for ReadOnlyStore {
		async fn get(&self, _key: &str) -> Result<Option<PropertyValue>, StoreError> {
			Ok(None)
		}

		async fn set(&self, _key: &str, _value: PropertyValue) -> Result<(), StoreError> {
			Err(StoreError::Io(std::io::Error::new(
				std::io::ErrorKind::PermissionDenied,
				"read-only",
			)))
		}

		async fn remove(&self, _key: &str) -> Result<(), StoreError> {
			Ok(())
		}

		async fn keys(&self) -> Result<Vec<String>, StoreError> {
			Ok(Vec::new())
		}
	}

	async fn app_with_store(store: Arc<dyn PropertyStore>, log: CallLog) -> App {
		let context = AppContext::default().with_app("tally", "0.1.0", "1");
		let analytics = Arc::new(AnalyticsManager::new(
			context.clone(),
			Arc::new(RecordingFactory::new(log)),
		));
		analytics
			.configure(vec![ProviderConfig::new(ProviderKind::Mixpanel, "mp")])
			.await;
		App::assemble(
			analytics,
			store,
			context,
			IdentitySettings::default(),
			ReviewPolicy::default(),
		)
	}

	#[tokio::test]
	async fn command_runs_when_store_is_unwritable() {
		let log = CallLog::new();
		let app = app_with_store(Arc::new(ReadOnlyStore), log.clone()).await;

		let command = Command::Track {
			event: "purchase".to_string(),
			properties: vec![("price".to_string(), PropertyValue::Int(1))],
		};
		session(&app, command).await.unwrap();

		let events: Vec<String> = log.tracked_events().into_iter().map(|(_, e)| e).collect();
		assert!(events.contains(&"purchase".to_string()), "tracked: {events:?}");
		assert!(matches!(log.calls_for("mixpanel").last(), Some(RecordedCall::Flush)));
	}

	#[tokio::test]
	async fn launch_sequence_reaches_providers_before_command() {
		let log = CallLog::new();
		let store = Arc::new(tally_identity::MemoryStore::new());
		let app = app_with_store(store, log.clone()).await;

		session(&app, Command::Launch).await.unwrap();

		let events: Vec<String> = log.tracked_events().into_iter().map(|(_, e)| e).collect();
		assert_eq!(events, vec!["app_first_launch", "app_launch"]);
		assert_eq!(app.usage.launches().await, 1);
	}

	#[test]
	fn args_are_well_formed() {
		Args::command().debug_assert();
	}

	#[test]
	fn track_collects_repeated_properties() {
		let args = Args::try_parse_from(["tally", "track", "purchase", "-p", "price=9.5", "-p", "gift=true"])
			.unwrap();
		match args.command {
			Command::Track { event, properties } => {
				assert_eq!(event, "purchase");
				assert_eq!(
					properties,
					vec![
						("price".to_string(), PropertyValue::Float(9.5)),
						("gift".to_string(), PropertyValue::Bool(true)),
					]
				);
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn config_flag_is_global() {
		let args = Args::try_parse_from(["tally", "whoami", "--config", "/tmp/tally.toml"]).unwrap();
		assert_eq!(args.config, Some(PathBuf::from("/tmp/tally.toml")));
	}

	#[test]
	fn malformed_property_is_rejected() {
		assert!(Args::try_parse_from(["tally", "track", "e", "-p", "oops"]).is_err());
	}
}
