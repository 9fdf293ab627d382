use async_trait::async_trait;
use loyalty_types::{Order, OrderId, UserId};
use std::sync::Arc;
use tracing::error;

use super::{OrderStore, StoreError, StoreResult};
use crate::StorageService;

const ORDERS: &str = "orders";
const ORDER_NUMBERS: &str = "order_numbers";

/// [`OrderStore`] backed by a key-value [`StorageService`].
///
/// Orders live under `orders:<id>`; `order_numbers:<number>` maps a number
/// to its order id and is written with insert-if-absent, which is what makes
/// numbers unique.
pub struct KvOrderStore {
	storage: Arc<StorageService>,
}

impl KvOrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn all(&self) -> StoreResult<Vec<Order>> {
		let mut orders: Vec<Order> = self.storage.scan(ORDERS).await?;
		orders.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.number.cmp(&b.number))
		});
		Ok(orders)
	}
}

#[async_trait]
impl OrderStore for KvOrderStore {
	async fn insert(&self, order: &Order) -> StoreResult<()> {
		let id = order.id.to_string();

		if !self
			.storage
			.store_if_absent(ORDER_NUMBERS, &order.number, &order.id)
			.await?
		{
			return Err(StoreError::DuplicateNumber(order.number.clone()));
		}

		if let Err(e) = self.storage.store(ORDERS, &id, order).await {
			// release the number so the user can submit it again
			if let Err(cleanup) = self.storage.remove(ORDER_NUMBERS, &order.number).await {
				error!(
					"Failed to release order number {} after failed insert: {}",
					order.number, cleanup
				);
			}
			return Err(e.into());
		}

		Ok(())
	}

	async fn save(&self, order: &Order) -> StoreResult<()> {
		self.storage
			.store(ORDERS, &order.id.to_string(), order)
			.await?;
		Ok(())
	}

	async fn find_by_number(&self, number: &str) -> StoreResult<Option<Order>> {
		let Some(id) = self.storage.find::<OrderId>(ORDER_NUMBERS, number).await? else {
			return Ok(None);
		};
		Ok(self.storage.find(ORDERS, &id.to_string()).await?)
	}

	async fn find_by_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
		let mut orders = self.all().await?;
		orders.retain(|order| order.user_id == user_id);
		Ok(orders)
	}

	async fn find_pending(&self) -> StoreResult<Vec<Order>> {
		let mut orders = self.all().await?;
		orders.retain(Order::is_pending);
		Ok(orders)
	}
}
