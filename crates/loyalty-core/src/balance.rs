//! Balance read and withdrawal path.

use loyalty_storage::{BalanceStore, StoreError};
use loyalty_types::{is_valid_luhn, UserId, Withdrawal};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

/// Spendable points and the total already spent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceView {
	pub current: Decimal,
	pub withdrawn: Decimal,
}

#[derive(Debug, Error)]
pub enum WithdrawError {
	#[error("Order number fails the Luhn check")]
	InvalidNumber,
	#[error("Withdrawal sum must be positive, got {0}")]
	InvalidSum(Decimal),
	#[error("Insufficient funds: requested {requested}, available {available}")]
	InsufficientFunds {
		requested: Decimal,
		available: Decimal,
	},
	#[error("Order number {0} was already used for a withdrawal")]
	DuplicateNumber(String),
	#[error(transparent)]
	Store(StoreError),
}

impl From<StoreError> for WithdrawError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::InsufficientFunds {
				requested,
				available,
			} => Self::InsufficientFunds {
				requested,
				available,
			},
			StoreError::DuplicateNumber(number) => Self::DuplicateNumber(number),
			other => Self::Store(other),
		}
	}
}

pub struct BalanceService {
	balances: Arc<dyn BalanceStore>,
}

impl BalanceService {
	pub fn new(balances: Arc<dyn BalanceStore>) -> Self {
		Self { balances }
	}

	pub async fn balance(&self, user_id: UserId) -> Result<BalanceView, StoreError> {
		let balance = self.balances.find_by_user(user_id).await?;
		Ok(BalanceView {
			current: balance.current(),
			withdrawn: balance.withdrawn,
		})
	}

	/// Spends `sum` points of `user_id` against the order `number`.
	#[instrument(skip(self))]
	pub async fn withdraw(
		&self,
		user_id: UserId,
		number: &str,
		sum: Decimal,
	) -> Result<Withdrawal, WithdrawError> {
		let number = number.trim();
		if !is_valid_luhn(number) {
			return Err(WithdrawError::InvalidNumber);
		}
		if sum <= Decimal::ZERO {
			return Err(WithdrawError::InvalidSum(sum));
		}

		let withdrawal = Withdrawal::new(user_id, number, sum);
		let balance = self.balances.withdraw(&withdrawal).await?;
		info!(
			"Withdrew {} for order {}, {} left",
			sum,
			number,
			balance.current()
		);

		Ok(withdrawal)
	}

	/// Withdrawals of `user_id`, oldest first.
	pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
		self.balances.withdrawals_for(user_id).await
	}
}
