//! Storage module for the loyalty backend.
//!
//! This module provides a small key-value abstraction with interchangeable
//! backends (in-memory, file-based), a typed service on top of it, and the
//! order and balance stores the rest of the system works against.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod locks;
pub mod stores;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use stores::{
	BalanceStore, KvBalanceStore, KvOrderStore, OrderStore, StoreError, StoreResult,
};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// back the order and balance stores. Keys are plain strings of the form
/// `namespace:id`.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Stores raw bytes only if the key is not present yet.
	///
	/// Returns `false` without touching the existing value when the key is
	/// taken. The check and the write happen as one step.
	async fn set_bytes_if_absent(&self, key: &str, value: Vec<u8>)
		-> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Returns the values of every key starting with `prefix`.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic JSON serialization.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, replacing any previous one.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend.set_bytes(&key(namespace, id), encode(data)?).await
	}

	/// Stores a value only if nothing is stored under `namespace:id` yet.
	pub async fn store_if_absent<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		self.backend
			.set_bytes_if_absent(&key(namespace, id), encode(data)?)
			.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Like [`Self::retrieve`] but maps a missing key to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Deserializes every value stored in `namespace`.
	pub async fn scan<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		self.backend
			.scan_prefix(&prefix)
			.await?
			.iter()
			.map(|bytes| decode(bytes.as_slice()))
			.collect()
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key(namespace, id)).await
	}
}
