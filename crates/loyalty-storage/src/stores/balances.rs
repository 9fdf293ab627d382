use async_trait::async_trait;
use loyalty_types::{Balance, OrderId, UserId, Withdrawal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

use super::{BalanceStore, StoreError, StoreResult};
use crate::locks::KeyedLocks;
use crate::StorageService;

const BALANCES: &str = "balances";
const WITHDRAWALS: &str = "withdrawals";
const WITHDRAWAL_NUMBERS: &str = "withdrawal_numbers";

/// What is persisted under `balances:<user>`.
///
/// The credited orders and their sums live in the same value as the totals,
/// so a credit and its idempotency marker are written in one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BalanceRecord {
	#[serde(flatten)]
	balance: Balance,
	#[serde(default)]
	credited_orders: BTreeMap<OrderId, Decimal>,
}

impl BalanceRecord {
	fn empty(user_id: UserId) -> Self {
		Self {
			balance: Balance::empty(user_id),
			credited_orders: BTreeMap::new(),
		}
	}
}

/// [`BalanceStore`] backed by a key-value [`StorageService`].
///
/// Every read-modify-write of a user's record runs under that user's lock.
pub struct KvBalanceStore {
	storage: Arc<StorageService>,
	locks: KeyedLocks,
}

impl KvBalanceStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			locks: KeyedLocks::new(),
		}
	}

	async fn load(&self, user_id: UserId) -> StoreResult<BalanceRecord> {
		Ok(self
			.storage
			.find(BALANCES, &user_id.to_string())
			.await?
			.unwrap_or_else(|| BalanceRecord::empty(user_id)))
	}

	async fn persist(&self, record: &BalanceRecord) -> StoreResult<()> {
		self.storage
			.store(BALANCES, &record.balance.user_id.to_string(), record)
			.await?;
		Ok(())
	}

	/// Best-effort removal of a withdrawal whose debit could not be saved.
	async fn discard_withdrawal(&self, withdrawal: &Withdrawal) {
		if let Err(e) = self
			.storage
			.remove(WITHDRAWALS, &withdrawal.id.to_string())
			.await
		{
			error!("Failed to discard withdrawal {}: {}", withdrawal.id, e);
		}
		if let Err(e) = self
			.storage
			.remove(WITHDRAWAL_NUMBERS, &withdrawal.number)
			.await
		{
			error!(
				"Failed to release withdrawal number {}: {}",
				withdrawal.number, e
			);
		}
	}
}

#[async_trait]
impl BalanceStore for KvBalanceStore {
	async fn find_by_user(&self, user_id: UserId) -> StoreResult<Balance> {
		Ok(self.load(user_id).await?.balance)
	}

	async fn save(&self, balance: &Balance) -> StoreResult<()> {
		let _guard = self.locks.lock(&balance.user_id.to_string()).await;

		let mut record = self.load(balance.user_id).await?;
		record.balance = balance.clone();
		self.persist(&record).await
	}

	async fn credit(
		&self,
		user_id: UserId,
		order_id: OrderId,
		amount: Decimal,
	) -> StoreResult<bool> {
		let _guard = self.locks.lock(&user_id.to_string()).await;

		let mut record = self.load(user_id).await?;
		if record.credited_orders.contains_key(&order_id) {
			debug!("Order {} already credited to {}", order_id, user_id);
			return Ok(false);
		}

		record.balance.accrued = record.balance.accrued.checked_add(amount).ok_or(
			StoreError::AmountOverflow {
				accrued: record.balance.accrued,
				amount,
			},
		)?;
		record.credited_orders.insert(order_id, amount);
		self.persist(&record).await?;
		Ok(true)
	}

	async fn credited_amount(
		&self,
		user_id: UserId,
		order_id: OrderId,
	) -> StoreResult<Option<Decimal>> {
		Ok(self
			.load(user_id)
			.await?
			.credited_orders
			.get(&order_id)
			.copied())
	}

	async fn withdraw(&self, withdrawal: &Withdrawal) -> StoreResult<Balance> {
		let _guard = self.locks.lock(&withdrawal.user_id.to_string()).await;

		let mut record = self.load(withdrawal.user_id).await?;
		if !record.balance.covers(withdrawal.sum) {
			return Err(StoreError::InsufficientFunds {
				requested: withdrawal.sum,
				available: record.balance.current(),
			});
		}

		if !self
			.storage
			.store_if_absent(WITHDRAWAL_NUMBERS, &withdrawal.number, &withdrawal.id)
			.await?
		{
			return Err(StoreError::DuplicateNumber(withdrawal.number.clone()));
		}

		if let Err(e) = self
			.storage
			.store(WITHDRAWALS, &withdrawal.id.to_string(), withdrawal)
			.await
		{
			self.discard_withdrawal(withdrawal).await;
			return Err(e.into());
		}

		record.balance.withdrawn += withdrawal.sum;
		if let Err(e) = self.persist(&record).await {
			self.discard_withdrawal(withdrawal).await;
			return Err(e);
		}

		Ok(record.balance)
	}

	async fn withdrawals_for(&self, user_id: UserId) -> StoreResult<Vec<Withdrawal>> {
		let mut withdrawals: Vec<Withdrawal> = self.storage.scan(WITHDRAWALS).await?;
		withdrawals.retain(|w| w.user_id == user_id);
		withdrawals.sort_by(|a, b| a.processed_at.cmp(&b.processed_at));
		Ok(withdrawals)
	}
}
