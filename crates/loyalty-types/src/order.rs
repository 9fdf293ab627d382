//! Order types for the loyalty system.
//!
//! An order ties an externally visible, Luhn-valid order number to the user
//! who submitted it and tracks how far the accrual calculator has got with it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a user, issued by the authentication layer.
pub type UserId = Uuid;

/// Generated identifier of an order, distinct from its order number.
pub type OrderId = Uuid;

/// Reconciliation status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Accepted locally, not yet seen by the accrual calculator.
	New,
	/// The calculator knows the order but has not decided yet.
	Processing,
	/// The calculator refused the order. Terminal.
	Invalid,
	/// The calculator awarded points. Terminal.
	Processed,
}

impl OrderStatus {
	/// Returns true for INVALID and PROCESSED.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Invalid | Self::Processed)
	}

	/// Returns true while the order still needs polling.
	pub fn is_pending(&self) -> bool {
		!self.is_terminal()
	}

	/// Whether moving from `self` to `next` keeps the status moving forward.
	///
	/// Terminal states never change, nothing goes back to NEW, and
	/// PROCESSING may be observed repeatedly.
	pub fn can_advance_to(&self, next: OrderStatus) -> bool {
		match (self, next) {
			(Self::Invalid | Self::Processed, _) => false,
			(_, Self::New) => false,
			_ => true,
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::New => write!(f, "NEW"),
			Self::Processing => write!(f, "PROCESSING"),
			Self::Invalid => write!(f, "INVALID"),
			Self::Processed => write!(f, "PROCESSED"),
		}
	}
}

/// A purchase order submitted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Generated unique identifier.
	pub id: OrderId,
	/// Owner of the order.
	pub user_id: UserId,
	/// Luhn-valid order number, unique across all users.
	pub number: String,
	/// Current reconciliation status.
	pub status: OrderStatus,
	/// Points awarded; only present once the order is PROCESSED.
	pub accrual: Option<Decimal>,
	/// When the order was submitted.
	pub created_at: DateTime<Utc>,
}

impl Order {
	/// Creates a fresh NEW order for `user_id`.
	pub fn new(user_id: UserId, number: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4(),
			user_id,
			number: number.into(),
			status: OrderStatus::New,
			accrual: None,
			created_at: Utc::now(),
		}
	}

	pub fn is_pending(&self) -> bool {
		self.status.is_pending()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_serializes_in_upper_case() {
		let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
		assert_eq!(json, "\"PROCESSING\"");

		let status: OrderStatus = serde_json::from_str("\"PROCESSED\"").unwrap();
		assert_eq!(status, OrderStatus::Processed);
	}

	#[test]
	fn test_status_only_moves_forward() {
		assert!(OrderStatus::New.can_advance_to(OrderStatus::Processing));
		assert!(OrderStatus::New.can_advance_to(OrderStatus::Processed));
		assert!(OrderStatus::Processing.can_advance_to(OrderStatus::Processing));
		assert!(OrderStatus::Processing.can_advance_to(OrderStatus::Invalid));

		assert!(!OrderStatus::Processing.can_advance_to(OrderStatus::New));
		assert!(!OrderStatus::Processed.can_advance_to(OrderStatus::Processed));
		assert!(!OrderStatus::Invalid.can_advance_to(OrderStatus::Processing));
	}

	#[test]
	fn test_new_order_is_pending_without_accrual() {
		let order = Order::new(Uuid::new_v4(), "79927398713");
		assert_eq!(order.status, OrderStatus::New);
		assert!(order.accrual.is_none());
		assert!(order.is_pending());
	}
}
