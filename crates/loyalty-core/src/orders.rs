//! Order submission.

use loyalty_storage::{OrderStore, StoreError};
use loyalty_types::{is_valid_luhn, Order, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Why an order number was not accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
	#[error("Order number fails the Luhn check")]
	InvalidNumber,
	#[error("Order number was already submitted by this user")]
	AlreadyLoadedBySameUser,
	#[error("Order number was already submitted by another user")]
	AlreadyLoadedByOtherUser,
	#[error(transparent)]
	Store(StoreError),
}

/// Accepts order numbers from users and lists their orders.
pub struct OrderService {
	orders: Arc<dyn OrderStore>,
}

impl OrderService {
	pub fn new(orders: Arc<dyn OrderStore>) -> Self {
		Self { orders }
	}

	/// Registers `number` as a NEW order of `user_id`.
	///
	/// Numbers are unique across users; resubmitting a number yields
	/// [`SubmitError::AlreadyLoadedBySameUser`] or
	/// [`SubmitError::AlreadyLoadedByOtherUser`] depending on the owner.
	#[instrument(skip(self))]
	pub async fn submit(&self, user_id: UserId, number: &str) -> Result<Order, SubmitError> {
		let number = number.trim();
		if !is_valid_luhn(number) {
			return Err(SubmitError::InvalidNumber);
		}

		if let Some(existing) = self
			.orders
			.find_by_number(number)
			.await
			.map_err(SubmitError::Store)?
		{
			return Err(ownership_conflict(&existing, user_id));
		}

		let order = Order::new(user_id, number);
		match self.orders.insert(&order).await {
			Ok(()) => {
				debug!("Accepted order {} as {}", order.number, order.id);
				Ok(order)
			}
			Err(StoreError::DuplicateNumber(_)) => {
				// lost the race against a concurrent submission
				match self
					.orders
					.find_by_number(number)
					.await
					.map_err(SubmitError::Store)?
				{
					Some(existing) => Err(ownership_conflict(&existing, user_id)),
					None => Err(SubmitError::Store(StoreError::DuplicateNumber(
						number.to_string(),
					))),
				}
			}
			Err(e) => Err(SubmitError::Store(e)),
		}
	}

	/// Orders of `user_id`, oldest first.
	pub async fn orders_for(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
		self.orders.find_by_user(user_id).await
	}
}

fn ownership_conflict(existing: &Order, user_id: UserId) -> SubmitError {
	if existing.user_id == user_id {
		SubmitError::AlreadyLoadedBySameUser
	} else {
		SubmitError::AlreadyLoadedByOtherUser
	}
}
