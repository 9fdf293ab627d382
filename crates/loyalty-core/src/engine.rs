//! Wiring of stores, gateway and services into one running engine.

use crate::balance::BalanceService;
use crate::error::CoreError;
use crate::lifecycle::{LifecycleManager, LifecycleState};
use crate::orders::OrderService;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use loyalty_accrual::{AccrualGateway, HttpAccrualGateway};
use loyalty_config::{LoyaltyConfig, StorageBackend};
use loyalty_storage::implementations::{file::FileStorage, memory::MemoryStorage};
use loyalty_storage::{
	BalanceStore, KvBalanceStore, KvOrderStore, OrderStore, StorageInterface, StorageService,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The loyalty backend: request-path services plus the reconciliation task.
pub struct LoyaltyEngine {
	orders: Arc<OrderService>,
	balances: Arc<BalanceService>,
	reconciler: Mutex<Option<Reconciler>>,
	lifecycle: LifecycleManager,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl LoyaltyEngine {
	pub fn orders(&self) -> Arc<OrderService> {
		self.orders.clone()
	}

	pub fn balances(&self) -> Arc<BalanceService> {
		self.balances.clone()
	}

	/// Starts the reconciliation task.
	pub async fn start(&self) -> Result<(), CoreError> {
		let reconciler = self
			.reconciler
			.lock()
			.await
			.take()
			.ok_or_else(|| CoreError::Lifecycle("Engine was already started".to_string()))?;

		self.lifecycle.start().await?;
		let handle = reconciler.spawn(self.lifecycle.subscribe_shutdown());
		*self.task.lock().await = Some(handle);

		info!("Loyalty engine started");
		Ok(())
	}

	/// Stops the reconciliation task and waits for it to finish.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		info!("Shutting down loyalty engine");
		self.lifecycle.begin_shutdown().await?;

		if let Some(handle) = self.task.lock().await.take() {
			if let Err(e) = handle.await {
				error!("Reconciler task ended abnormally: {}", e);
				self.lifecycle.set_state(LifecycleState::Failed).await?;
				return Err(CoreError::Shutdown(e.to_string()));
			}
		}

		self.lifecycle.finish_shutdown().await?;
		info!("Loyalty engine shutdown complete");
		Ok(())
	}

	pub async fn get_state(&self) -> LifecycleState {
		self.lifecycle.get_state().await
	}
}

/// Builds a [`LoyaltyEngine`] from configuration.
///
/// The storage backend and the accrual gateway follow the configuration
/// unless replaced with [`EngineBuilder::with_storage`] or
/// [`EngineBuilder::with_gateway`].
pub struct EngineBuilder {
	config: LoyaltyConfig,
	storage: Option<Box<dyn StorageInterface>>,
	gateway: Option<Arc<dyn AccrualGateway>>,
}

impl EngineBuilder {
	pub fn new(config: LoyaltyConfig) -> Self {
		Self {
			config,
			storage: None,
			gateway: None,
		}
	}

	pub fn with_storage(mut self, storage: Box<dyn StorageInterface>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_gateway(mut self, gateway: Arc<dyn AccrualGateway>) -> Self {
		self.gateway = Some(gateway);
		self
	}

	pub fn build(self) -> Result<LoyaltyEngine, CoreError> {
		let backend = match self.storage {
			Some(storage) => storage,
			None => storage_from_config(&self.config)?,
		};
		let storage = Arc::new(StorageService::new(backend));

		let gateway = match self.gateway {
			Some(gateway) => gateway,
			None => Arc::new(
				HttpAccrualGateway::new(
					&self.config.accrual.system_address,
					self.config.accrual.request_timeout(),
				)
				.map_err(|e| CoreError::ServiceInit(e.to_string()))?,
			),
		};

		let orders: Arc<dyn OrderStore> = Arc::new(KvOrderStore::new(storage.clone()));
		let balances: Arc<dyn BalanceStore> = Arc::new(KvBalanceStore::new(storage));

		let settings = ReconcilerSettings {
			poll_interval: self.config.reconciler.poll_interval(),
			invalidate_on_server_error: self.config.reconciler.invalidate_on_server_error,
		};
		let reconciler = Reconciler::new(orders.clone(), balances.clone(), gateway, settings);

		Ok(LoyaltyEngine {
			orders: Arc::new(OrderService::new(orders)),
			balances: Arc::new(BalanceService::new(balances)),
			reconciler: Mutex::new(Some(reconciler)),
			lifecycle: LifecycleManager::new(),
			task: Mutex::new(None),
		})
	}
}

fn storage_from_config(config: &LoyaltyConfig) -> Result<Box<dyn StorageInterface>, CoreError> {
	match config.storage.backend {
		StorageBackend::Memory => Ok(Box::new(MemoryStorage::new())),
		StorageBackend::File => {
			let path = config.storage.path.clone().ok_or_else(|| {
				CoreError::Configuration("storage.path is required for the file backend".to_string())
			})?;
			std::fs::create_dir_all(&path).map_err(|e| {
				CoreError::ServiceInit(format!(
					"Failed to create storage directory {}: {}",
					path.display(),
					e
				))
			})?;
			info!("Using file storage at {}", path.display());
			Ok(Box::new(FileStorage::new(path)))
		}
	}
}
