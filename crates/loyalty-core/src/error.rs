// loyalty-core/src/error.rs

use loyalty_accrual::AccrualError;
use loyalty_storage::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Accrual error: {0}")]
	Accrual(#[from] AccrualError),

	#[error("Accrual service failed with status {0}")]
	RemoteFailure(u16),

	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Service initialization error: {0}")]
	ServiceInit(String),

	#[error("Lifecycle error: {0}")]
	Lifecycle(String),

	#[error("Shutdown error: {0}")]
	Shutdown(String),
}
