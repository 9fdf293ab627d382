//! File-based storage backend.
//!
//! Every key is stored as one JSON file under a base directory. Writes go
//! to a temporary file first and are moved into place, so readers never
//! observe a half-written value.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

const EXTENSION: &str = "bin";

/// File-based storage implementation.
///
/// This implementation stores data as files on the filesystem, providing
/// simple persistence without requiring an external database.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Makes a key filesystem-safe.
	fn sanitize(key: &str) -> String {
		key.replace(['/', ':', '\\'], "_")
	}

	/// Converts a storage key to the path of its file.
	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", Self::sanitize(key), EXTENSION))
	}

	/// Writes `value` next to `path` under a unique temporary name.
	async fn write_temp(&self, path: &Path, value: Vec<u8>) -> Result<PathBuf, StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(temp_path)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let temp_path = self.write_temp(&path, value).await?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn set_bytes_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		let temp_path = self.write_temp(&path, value).await?;

		// hard_link refuses to replace an existing file
		let linked = fs::hard_link(&temp_path, &path).await;
		if let Err(e) = fs::remove_file(&temp_path).await {
			warn!("Failed to remove temporary file {}: {}", temp_path.display(), e);
		}

		match linked {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let prefix = Self::sanitize(prefix);
		let mut values = Vec::new();

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			let matches = path.extension().is_some_and(|ext| ext == EXTENSION)
				&& path
					.file_name()
					.and_then(|name| name.to_str())
					.is_some_and(|name| name.starts_with(&prefix));
			if !matches {
				continue;
			}

			match fs::read(&path).await {
				Ok(data) => values.push(data),
				// deleted between listing and reading
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
				Err(e) => return Err(StorageError::Backend(e.to_string())),
			}
		}

		Ok(values)
	}
}
