use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loyalty_config::{normalize, validate_config, ConfigLoader, LoyaltyConfig, StorageBackend};
use loyalty_core::EngineBuilder;
use loyalty_service::api::{self, AppState};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "loyalty")]
#[command(about = "Loyalty points backend", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Optional TOML configuration file
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Address the HTTP API listens on
	#[arg(short = 'a', long, env = "RUN_ADDRESS")]
	run_address: Option<String>,

	/// Base address of the accrual calculator
	#[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS")]
	accrual_address: Option<String>,

	/// Directory of the file storage backend
	#[arg(short = 'd', long, value_name = "DIR")]
	storage_path: Option<PathBuf>,

	#[arg(long, env = "LOYALTY_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the loyalty service
	Start,
	/// Validate the configuration
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let config = load_config(&cli).await?;

	setup_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

	match cli.command {
		Some(Commands::Start) | None => start_service(config).await,
		Some(Commands::Validate) => {
			info!("Configuration is valid");
			info!("Run address: {}", config.server.run_address);
			info!("Accrual system: {}", config.accrual.system_address);
			info!("Storage backend: {:?}", config.storage.backend);
			Ok(())
		}
	}
}

/// Layers the command line over the file and environment configuration.
async fn load_config(cli: &Cli) -> Result<LoyaltyConfig> {
	let mut loader = ConfigLoader::new();
	if let Some(path) = &cli.config {
		loader = loader.with_file(path);
	}

	let mut config = loader.load().await.context("Failed to load configuration")?;

	if let Some(run_address) = &cli.run_address {
		config.server.run_address = run_address.clone();
	}
	if let Some(accrual_address) = &cli.accrual_address {
		config.accrual.system_address = accrual_address.clone();
	}
	if let Some(path) = &cli.storage_path {
		config.storage.backend = StorageBackend::File;
		config.storage.path = Some(path.clone());
	}

	normalize(&mut config);
	validate_config(&config).context("Invalid configuration")?;
	Ok(config)
}

async fn start_service(config: LoyaltyConfig) -> Result<()> {
	info!("Starting loyalty service");

	let engine = EngineBuilder::new(config.clone())
		.build()
		.context("Failed to build engine")?;

	let listener = tokio::net::TcpListener::bind(&config.server.run_address)
		.await
		.with_context(|| format!("Failed to bind {}", config.server.run_address))?;

	engine.start().await.context("Failed to start engine")?;

	let state = AppState::new(engine.orders(), engine.balances());
	let served = api::serve(listener, state, setup_shutdown_signal()).await;

	info!("Shutdown signal received, stopping services...");
	engine
		.shutdown()
		.await
		.context("Failed to shutdown engine")?;

	served?;
	info!("Loyalty service stopped");
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
