//! Order and balance stores.
//!
//! These traits are the only view the services and the reconciliation loop
//! have of persistence. The `Kv*` adapters implement them on top of
//! [`StorageService`](crate::StorageService), so any [`StorageInterface`]
//! backend can serve them.
//!
//! [`StorageInterface`]: crate::StorageInterface

use async_trait::async_trait;
use loyalty_types::{Balance, Order, OrderId, UserId, Withdrawal};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::StorageError;

mod balances;
mod orders;

pub use balances::KvBalanceStore;
pub use orders::KvOrderStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by the order and balance stores.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The order number is already registered.
	#[error("Order number {0} is already registered")]
	DuplicateNumber(String),
	/// A withdrawal would take the balance below zero.
	#[error("Insufficient funds: requested {requested}, available {available}")]
	InsufficientFunds {
		requested: Decimal,
		available: Decimal,
	},
	/// Crediting `amount` would overflow the accrued total.
	#[error("Crediting {amount} overflows the accrued total of {accrued}")]
	AmountOverflow { accrued: Decimal, amount: Decimal },
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Persistence of orders.
///
/// Order numbers are unique across all users; [`OrderStore::insert`] is the
/// place where that is enforced.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Adds a new order, failing with [`StoreError::DuplicateNumber`] when
	/// its number is already taken.
	async fn insert(&self, order: &Order) -> StoreResult<()>;

	/// Upserts an order by its identifier.
	async fn save(&self, order: &Order) -> StoreResult<()>;

	async fn find_by_number(&self, number: &str) -> StoreResult<Option<Order>>;

	/// Orders of one user, oldest first.
	async fn find_by_user(&self, user_id: UserId) -> StoreResult<Vec<Order>>;

	/// Every order still in NEW or PROCESSING, oldest first.
	async fn find_pending(&self) -> StoreResult<Vec<Order>>;
}

/// Persistence of balances and withdrawals.
///
/// All mutations of one user's balance are serialized by the store.
#[async_trait]
pub trait BalanceStore: Send + Sync {
	/// Returns the balance of a user, or a zero balance if none exists.
	async fn find_by_user(&self, user_id: UserId) -> StoreResult<Balance>;

	/// Upserts a balance by user.
	async fn save(&self, balance: &Balance) -> StoreResult<()>;

	/// Adds `amount` to the accrued total of `user_id` for `order_id`.
	///
	/// The credit is recorded together with the balance, so crediting the
	/// same order again is a no-op and returns `false`.
	async fn credit(&self, user_id: UserId, order_id: OrderId, amount: Decimal)
		-> StoreResult<bool>;

	/// The sum credited to `user_id` for `order_id`, if any.
	async fn credited_amount(&self, user_id: UserId, order_id: OrderId)
		-> StoreResult<Option<Decimal>>;

	/// Debits a withdrawal if the spendable balance covers it and records it.
	///
	/// Fails with [`StoreError::InsufficientFunds`] (balance untouched) or
	/// [`StoreError::DuplicateNumber`] when the order number was already
	/// used for a withdrawal.
	async fn withdraw(&self, withdrawal: &Withdrawal) -> StoreResult<Balance>;

	/// Withdrawals of one user, oldest first.
	async fn withdrawals_for(&self, user_id: UserId) -> StoreResult<Vec<Withdrawal>>;
}
