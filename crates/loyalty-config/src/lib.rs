// loyalty-config/src/lib.rs

use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
///
/// Values are layered: built-in defaults, then the TOML file (if any), then
/// environment overrides. `${VAR}` references inside the file are replaced
/// before parsing.
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
	/// Replaces the process environment when set
	env_vars: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "LOYALTY_".to_string(),
			env_vars: None,
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Reads variables from `vars` instead of the process environment.
	pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
		self.env_vars = Some(vars);
		self
	}

	pub async fn load(&self) -> Result<LoyaltyConfig, ConfigError> {
		let mut config = match &self.file_path {
			Some(file_path) => self.load_from_file(file_path).await?,
			None => LoyaltyConfig::default(),
		};

		self.apply_env_overrides(&mut config)?;
		normalize(&mut config);
		validate_config(&config)?;

		Ok(config)
	}

	/// Parses a TOML document, substituting `${VAR}` references first.
	pub fn parse(&self, content: &str) -> Result<LoyaltyConfig, ConfigError> {
		let substituted_content = self.substitute_env_vars(content)?;

		toml::from_str(&substituted_content).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn var(&self, name: &str) -> Option<String> {
		match &self.env_vars {
			Some(vars) => vars.get(name).cloned(),
			None => env::var(name).ok(),
		}
	}

	async fn load_from_file(&self, file_path: &Path) -> Result<LoyaltyConfig, ConfigError> {
		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.display().to_string()));
			}
			Err(e) => return Err(e.into()),
		};

		debug!("Loaded configuration file {}", file_path.display());
		self.parse(&content)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = self
				.var(var_name)
				.ok_or_else(|| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut LoyaltyConfig) -> Result<(), ConfigError> {
		// Names shared with other deployments of the service
		if let Some(run_address) = self.var("RUN_ADDRESS") {
			config.server.run_address = run_address;
		}

		if let Some(accrual_address) = self.var("ACCRUAL_SYSTEM_ADDRESS") {
			config.accrual.system_address = accrual_address;
		}

		if let Some(log_level) = self.var(&format!("{}LOG_LEVEL", self.env_prefix)) {
			config.log_level = log_level;
		}

		if let Some(path) = self.var(&format!("{}STORAGE_PATH", self.env_prefix)) {
			config.storage.backend = StorageBackend::File;
			config.storage.path = Some(PathBuf::from(path));
		}

		if let Some(backend) = self.var(&format!("{}STORAGE_BACKEND", self.env_prefix)) {
			config.storage.backend = match backend.to_ascii_lowercase().as_str() {
				"memory" => StorageBackend::Memory,
				"file" => StorageBackend::File,
				other => {
					return Err(ConfigError::ValidationError(format!(
						"Invalid storage backend: {}",
						other
					)))
				}
			};
		}

		if let Some(interval) = self.var(&format!("{}POLL_INTERVAL_SECS", self.env_prefix)) {
			config.reconciler.poll_interval_secs = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid poll interval: {}", e))
			})?;
		}

		Ok(())
	}
}

/// Completes shorthand addresses such as `:8081` or `localhost:8080`.
pub fn normalize(config: &mut LoyaltyConfig) {
	let run_address = config.server.run_address.trim();
	config.server.run_address = if run_address.starts_with(':') {
		format!("0.0.0.0{}", run_address)
	} else {
		run_address.to_string()
	};

	let accrual = config.accrual.system_address.trim().trim_end_matches('/');
	let accrual = if accrual.starts_with(':') {
		format!("localhost{}", accrual)
	} else {
		accrual.to_string()
	};
	config.accrual.system_address = if accrual.contains("://") || accrual.is_empty() {
		accrual
	} else {
		format!("http://{}", accrual)
	};
}

pub fn validate_config(config: &LoyaltyConfig) -> Result<(), ConfigError> {
	if config.server.run_address.is_empty() {
		return Err(ConfigError::ValidationError(
			"server.run_address must not be empty".to_string(),
		));
	}

	let accrual = &config.accrual.system_address;
	if !accrual.starts_with("http://") && !accrual.starts_with("https://") {
		return Err(ConfigError::ValidationError(
			"accrual.system_address must be a valid HTTP/HTTPS URL".to_string(),
		));
	}

	if config.accrual.request_timeout_ms == 0 {
		return Err(ConfigError::ValidationError(
			"accrual.request_timeout_ms must be positive".to_string(),
		));
	}

	if config.reconciler.poll_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"reconciler.poll_interval_secs must be at least 1".to_string(),
		));
	}

	if config.storage.backend == StorageBackend::File && config.storage.path.is_none() {
		return Err(ConfigError::ValidationError(
			"storage.path is required for the file backend".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[tokio::test]
	async fn test_defaults_without_file() {
		let config = ConfigLoader::new()
			.with_env_vars(HashMap::new())
			.load()
			.await
			.unwrap();

		assert_eq!(config.server.run_address, "0.0.0.0:8081");
		assert_eq!(config.accrual.system_address, "http://localhost:8080");
		assert_eq!(config.reconciler.poll_interval_secs, 5);
		assert!(config.reconciler.invalidate_on_server_error);
		assert_eq!(config.storage.backend, StorageBackend::File);
	}

	#[tokio::test]
	async fn test_file_with_substitution_and_overrides() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("loyalty.toml");
		tokio::fs::write(
			&file,
			r#"
log_level = "debug"

[accrual]
system_address = "${ACCRUAL_HOST}"

[reconciler]
poll_interval_secs = 2
invalidate_on_server_error = false

[storage]
backend = "memory"
"#,
		)
		.await
		.unwrap();

		let config = ConfigLoader::new()
			.with_file(&file)
			.with_env_vars(vars(&[
				("ACCRUAL_HOST", "http://accrual:8080/"),
				("RUN_ADDRESS", ":9000"),
				("LOYALTY_POLL_INTERVAL_SECS", "7"),
			]))
			.load()
			.await
			.unwrap();

		assert_eq!(config.log_level, "debug");
		assert_eq!(config.accrual.system_address, "http://accrual:8080");
		assert_eq!(config.server.run_address, "0.0.0.0:9000");
		assert_eq!(config.reconciler.poll_interval_secs, 7);
		assert!(!config.reconciler.invalidate_on_server_error);
		assert_eq!(config.storage.backend, StorageBackend::Memory);
	}

	#[tokio::test]
	async fn test_shorthand_accrual_address_gets_scheme() {
		let config = ConfigLoader::new()
			.with_env_vars(vars(&[("ACCRUAL_SYSTEM_ADDRESS", ":8080")]))
			.load()
			.await
			.unwrap();

		assert_eq!(config.accrual.system_address, "http://localhost:8080");
	}

	#[tokio::test]
	async fn test_missing_substitution_variable() {
		let loader = ConfigLoader::new().with_env_vars(HashMap::new());
		let err = loader
			.parse("[accrual]\nsystem_address = \"${NOPE}\"\n")
			.unwrap_err();

		assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "NOPE"));
	}

	#[tokio::test]
	async fn test_custom_env_prefix() {
		let config = ConfigLoader::new()
			.with_env_prefix("POINTS_")
			.with_env_vars(vars(&[
				("POINTS_POLL_INTERVAL_SECS", "9"),
				("POINTS_LOG_LEVEL", "warn"),
				("LOYALTY_POLL_INTERVAL_SECS", "3"),
			]))
			.load()
			.await
			.unwrap();

		assert_eq!(config.reconciler.poll_interval_secs, 9);
		assert_eq!(config.log_level, "warn");
	}

	#[tokio::test]
	async fn test_missing_file() {
		let err = ConfigLoader::new()
			.with_file("/definitely/not/here.toml")
			.load()
			.await
			.unwrap_err();

		assert!(matches!(err, ConfigError::FileNotFound(_)));
	}

	#[test]
	fn test_validation_rejects_zero_interval() {
		let mut config = LoyaltyConfig::default();
		config.reconciler.poll_interval_secs = 0;

		assert!(matches!(
			validate_config(&config),
			Err(ConfigError::ValidationError(_))
		));
	}

	#[test]
	fn test_validation_rejects_file_backend_without_path() {
		let mut config = LoyaltyConfig::default();
		config.storage.path = None;

		assert!(validate_config(&config).is_err());
	}
}
