//! Balance and withdrawal types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UserId;

/// Running point totals of a single user.
///
/// Both totals only ever grow, and `withdrawn` never exceeds `accrued`
/// once a mutation is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
	pub user_id: UserId,
	/// Sum of every accrual ever credited.
	pub accrued: Decimal,
	/// Sum of every withdrawal ever made.
	pub withdrawn: Decimal,
}

impl Balance {
	/// The zero balance a user has before the first credit.
	pub fn empty(user_id: UserId) -> Self {
		Self {
			user_id,
			accrued: Decimal::ZERO,
			withdrawn: Decimal::ZERO,
		}
	}

	/// Points that can still be spent.
	pub fn current(&self) -> Decimal {
		self.accrued - self.withdrawn
	}

	/// Whether `sum` can be withdrawn without going below zero.
	pub fn covers(&self, sum: Decimal) -> bool {
		self.current() >= sum
	}
}

/// A spend of points against a future order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
	pub id: Uuid,
	pub user_id: UserId,
	/// Number of the order the points were spent on.
	pub number: String,
	pub sum: Decimal,
	pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
	pub fn new(user_id: UserId, number: impl Into<String>, sum: Decimal) -> Self {
		Self {
			id: Uuid::new_v4(),
			user_id,
			number: number.into(),
			sum,
			processed_at: Utc::now(),
		}
	}
}
