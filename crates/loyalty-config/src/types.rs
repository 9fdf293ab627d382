//! Configuration types for the loyalty service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoyaltyConfig {
	/// Default tracing filter when `RUST_LOG` is not set
	pub log_level: String,
	/// HTTP listener settings
	pub server: ServerConfig,
	/// External accrual calculator
	pub accrual: AccrualConfig,
	/// Reconciliation loop settings
	pub reconciler: ReconcilerConfig,
	/// Order and balance persistence
	pub storage: StorageConfig,
}

impl Default for LoyaltyConfig {
	fn default() -> Self {
		Self {
			log_level: "info".to_string(),
			server: ServerConfig::default(),
			accrual: AccrualConfig::default(),
			reconciler: ReconcilerConfig::default(),
			storage: StorageConfig::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
	/// Address the HTTP API binds to, e.g. `0.0.0.0:8081`
	pub run_address: String,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			run_address: "0.0.0.0:8081".to_string(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccrualConfig {
	/// Base URL of the accrual calculator
	pub system_address: String,
	/// Timeout of a single status request
	pub request_timeout_ms: u64,
}

impl AccrualConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}

impl Default for AccrualConfig {
	fn default() -> Self {
		Self {
			system_address: "http://localhost:8080".to_string(),
			request_timeout_ms: 10_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerConfig {
	/// Pause between two polling cycles
	pub poll_interval_secs: u64,
	/// Whether a 5xx from the calculator marks the order INVALID
	/// (otherwise the order is retried on the next cycle)
	pub invalidate_on_server_error: bool,
}

impl ReconcilerConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs)
	}
}

impl Default for ReconcilerConfig {
	fn default() -> Self {
		Self {
			poll_interval_secs: 5,
			invalidate_on_server_error: true,
		}
	}
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	Memory,
	File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
	/// Storage backend: "memory" or "file"
	pub backend: StorageBackend,
	/// Storage path for file backend
	pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: StorageBackend::File,
			path: Some(PathBuf::from("./data/storage")),
		}
	}
}
