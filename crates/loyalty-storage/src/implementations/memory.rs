//! In-memory storage backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

/// In-memory storage implementation
///
/// Nothing survives a restart; used for development and tests.
#[derive(Default)]
pub struct MemoryStorage {
	data: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.data
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.data.insert(key.to_string(), value);
		Ok(())
	}

	async fn set_bytes_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		match self.data.entry(key.to_string()) {
			Entry::Occupied(_) => Ok(false),
			Entry::Vacant(slot) => {
				slot.insert(value);
				Ok(true)
			}
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.remove(key);
		Ok(())
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		Ok(self
			.data
			.iter()
			.filter(|entry| entry.key().starts_with(prefix))
			.map(|entry| entry.value().clone())
			.collect())
	}
}
