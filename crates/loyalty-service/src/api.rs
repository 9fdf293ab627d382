//! HTTP API of the loyalty backend.
//!
//! The caller is identified by the `X-User-Id` header, which the
//! authentication gateway in front of this service sets to the user's UUID.

use axum::{
	extract::{rejection::JsonRejection, FromRequestParts, State},
	http::{request::Parts, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use chrono::{DateTime, Utc};
use loyalty_core::{BalanceService, OrderService, SubmitError, WithdrawError};
use loyalty_types::{Order, OrderStatus, UserId, Withdrawal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
	orders: Arc<OrderService>,
	balances: Arc<BalanceService>,
}

impl AppState {
	pub fn new(orders: Arc<OrderService>, balances: Arc<BalanceService>) -> Self {
		Self { orders, balances }
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/api/user/orders", post(submit_order).get(list_orders))
		.route("/api/user/balance", get(get_balance))
		.route("/api/user/balance/withdraw", post(withdraw))
		.route("/api/user/withdrawals", get(list_withdrawals))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Serves the API on `listener` until `shutdown` completes.
pub async fn serve(
	listener: tokio::net::TcpListener,
	state: AppState,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
	info!("API server listening on {}", listener.local_addr()?);

	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

/// The authenticated caller.
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
	S: Send + Sync,
{
	type Rejection = StatusCode;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		parts
			.headers
			.get(USER_ID_HEADER)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.trim().parse().ok())
			.map(CurrentUser)
			.ok_or(StatusCode::UNAUTHORIZED)
	}
}

#[derive(Debug, Serialize)]
struct OrderResponse {
	number: String,
	status: OrderStatus,
	#[serde(
		with = "rust_decimal::serde::float_option",
		skip_serializing_if = "Option::is_none"
	)]
	accrual: Option<Decimal>,
	uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
	fn from(order: Order) -> Self {
		Self {
			number: order.number,
			status: order.status,
			accrual: order.accrual,
			uploaded_at: order.created_at,
		}
	}
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
	#[serde(with = "rust_decimal::serde::float")]
	current: Decimal,
	#[serde(with = "rust_decimal::serde::float")]
	withdrawn: Decimal,
}

#[derive(Debug, Deserialize)]
struct WithdrawRequest {
	order: String,
	#[serde(with = "rust_decimal::serde::float")]
	sum: Decimal,
}

#[derive(Debug, Serialize)]
struct WithdrawalResponse {
	order: String,
	#[serde(with = "rust_decimal::serde::float")]
	sum: Decimal,
	processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
	fn from(withdrawal: Withdrawal) -> Self {
		Self {
			order: withdrawal.number,
			sum: withdrawal.sum,
			processed_at: withdrawal.processed_at,
		}
	}
}

fn internal_error(e: impl std::fmt::Display) -> StatusCode {
	error!("Request failed: {}", e);
	StatusCode::INTERNAL_SERVER_ERROR
}

/// Empty lists answer 204 instead of `[]`.
fn list_response<T: Serialize>(items: Vec<T>) -> Response {
	if items.is_empty() {
		StatusCode::NO_CONTENT.into_response()
	} else {
		Json(items).into_response()
	}
}

async fn health_check() -> StatusCode {
	StatusCode::OK
}

async fn submit_order(
	State(state): State<AppState>,
	CurrentUser(user): CurrentUser,
	body: String,
) -> StatusCode {
	if body.trim().is_empty() {
		return StatusCode::BAD_REQUEST;
	}

	match state.orders.submit(user, &body).await {
		Ok(_) => StatusCode::ACCEPTED,
		Err(SubmitError::AlreadyLoadedBySameUser) => StatusCode::OK,
		Err(SubmitError::AlreadyLoadedByOtherUser) => StatusCode::CONFLICT,
		Err(SubmitError::InvalidNumber) => StatusCode::UNPROCESSABLE_ENTITY,
		Err(SubmitError::Store(e)) => internal_error(e),
	}
}

async fn list_orders(
	State(state): State<AppState>,
	CurrentUser(user): CurrentUser,
) -> Result<Response, StatusCode> {
	let orders = state.orders.orders_for(user).await.map_err(internal_error)?;
	Ok(list_response(
		orders
			.into_iter()
			.map(OrderResponse::from)
			.collect::<Vec<OrderResponse>>(),
	))
}

async fn get_balance(
	State(state): State<AppState>,
	CurrentUser(user): CurrentUser,
) -> Result<Json<BalanceResponse>, StatusCode> {
	let view = state.balances.balance(user).await.map_err(internal_error)?;
	Ok(Json(BalanceResponse {
		current: view.current,
		withdrawn: view.withdrawn,
	}))
}

async fn withdraw(
	State(state): State<AppState>,
	CurrentUser(user): CurrentUser,
	payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> StatusCode {
	let Ok(Json(request)) = payload else {
		return StatusCode::BAD_REQUEST;
	};

	match state
		.balances
		.withdraw(user, &request.order, request.sum)
		.await
	{
		Ok(_) => StatusCode::OK,
		Err(WithdrawError::InsufficientFunds { .. }) => StatusCode::PAYMENT_REQUIRED,
		Err(WithdrawError::InvalidNumber | WithdrawError::InvalidSum(_)) => {
			StatusCode::UNPROCESSABLE_ENTITY
		}
		Err(WithdrawError::DuplicateNumber(_)) => StatusCode::CONFLICT,
		Err(WithdrawError::Store(e)) => internal_error(e),
	}
}

async fn list_withdrawals(
	State(state): State<AppState>,
	CurrentUser(user): CurrentUser,
) -> Result<Response, StatusCode> {
	let withdrawals = state
		.balances
		.withdrawals(user)
		.await
		.map_err(internal_error)?;
	Ok(list_response(
		withdrawals
			.into_iter()
			.map(WithdrawalResponse::from)
			.collect::<Vec<WithdrawalResponse>>(),
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{header, Request};
	use loyalty_storage::{
		implementations::memory::MemoryStorage, BalanceStore, KvBalanceStore, KvOrderStore,
		StorageService,
	};
	use serde_json::Value;
	use tower::ServiceExt;
	use uuid::Uuid;

	struct Harness {
		app: Router,
		balances: Arc<KvBalanceStore>,
	}

	fn harness() -> Harness {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let balances = Arc::new(KvBalanceStore::new(storage.clone()));
		let state = AppState::new(
			Arc::new(OrderService::new(Arc::new(KvOrderStore::new(storage)))),
			Arc::new(BalanceService::new(balances.clone())),
		);
		Harness {
			app: router(state),
			balances,
		}
	}

	impl Harness {
		async fn send(&self, request: Request<Body>) -> Response {
			self.app.clone().oneshot(request).await.unwrap()
		}
	}

	fn submit(user: UserId, number: &str) -> Request<Body> {
		Request::post("/api/user/orders")
			.header(USER_ID_HEADER, user.to_string())
			.header(header::CONTENT_TYPE, "text/plain")
			.body(Body::from(number.to_string()))
			.unwrap()
	}

	fn get(user: UserId, uri: &str) -> Request<Body> {
		Request::get(uri)
			.header(USER_ID_HEADER, user.to_string())
			.body(Body::empty())
			.unwrap()
	}

	fn withdraw_request(user: UserId, body: &str) -> Request<Body> {
		Request::post("/api/user/balance/withdraw")
			.header(USER_ID_HEADER, user.to_string())
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	async fn json(response: Response) -> Value {
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn test_missing_or_malformed_user_is_unauthorized() {
		let harness = harness();

		let response = harness
			.send(
				Request::get("/api/user/balance")
					.body(Body::empty())
					.unwrap(),
			)
			.await;
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

		let response = harness
			.send(
				Request::get("/api/user/balance")
					.header(USER_ID_HEADER, "not-a-uuid")
					.body(Body::empty())
					.unwrap(),
			)
			.await;
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn test_order_submission_status_codes() {
		let harness = harness();
		let owner = Uuid::new_v4();
		let other = Uuid::new_v4();

		assert_eq!(
			harness.send(submit(owner, "79927398713")).await.status(),
			StatusCode::ACCEPTED
		);
		assert_eq!(
			harness.send(submit(owner, "79927398713")).await.status(),
			StatusCode::OK
		);
		assert_eq!(
			harness.send(submit(other, "79927398713")).await.status(),
			StatusCode::CONFLICT
		);
		assert_eq!(
			harness.send(submit(owner, "79927398710")).await.status(),
			StatusCode::UNPROCESSABLE_ENTITY
		);
		assert_eq!(
			harness.send(submit(owner, "  ")).await.status(),
			StatusCode::BAD_REQUEST
		);
	}

	#[tokio::test]
	async fn test_order_listing() {
		let harness = harness();
		let user = Uuid::new_v4();

		let response = harness.send(get(user, "/api/user/orders")).await;
		assert_eq!(response.status(), StatusCode::NO_CONTENT);

		harness.send(submit(user, "12345678903")).await;
		let response = harness.send(get(user, "/api/user/orders")).await;
		assert_eq!(response.status(), StatusCode::OK);

		let body = json(response).await;
		assert_eq!(body[0]["number"], "12345678903");
		assert_eq!(body[0]["status"], "NEW");
		assert!(body[0].get("accrual").is_none());
		assert!(body[0]["uploaded_at"].is_string());
	}

	#[tokio::test]
	async fn test_balance_and_withdrawal_flow() {
		let harness = harness();
		let user = Uuid::new_v4();
		harness
			.balances
			.credit(user, Uuid::new_v4(), Decimal::new(7295, 1))
			.await
			.unwrap();

		let response = harness
			.send(withdraw_request(
				user,
				r#"{"order": "2377225624", "sum": 751}"#,
			))
			.await;
		assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

		let response = harness
			.send(withdraw_request(
				user,
				r#"{"order": "2377225624", "sum": 500}"#,
			))
			.await;
		assert_eq!(response.status(), StatusCode::OK);

		let response = harness
			.send(withdraw_request(
				user,
				r#"{"order": "2377225624", "sum": 1}"#,
			))
			.await;
		assert_eq!(response.status(), StatusCode::CONFLICT);

		let body = json(harness.send(get(user, "/api/user/balance")).await).await;
		assert_eq!(body["current"].as_f64(), Some(229.5));
		assert_eq!(body["withdrawn"].as_f64(), Some(500.0));

		let body = json(harness.send(get(user, "/api/user/withdrawals")).await).await;
		assert_eq!(body[0]["order"], "2377225624");
		assert_eq!(body[0]["sum"].as_f64(), Some(500.0));
	}

	#[tokio::test]
	async fn test_withdraw_rejects_bad_input() {
		let harness = harness();
		let user = Uuid::new_v4();

		let response = harness.send(withdraw_request(user, "not json")).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);

		let response = harness
			.send(withdraw_request(
				user,
				r#"{"order": "123456789", "sum": 1}"#,
			))
			.await;
		assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

		let response = harness
			.send(withdraw_request(
				user,
				r#"{"order": "2377225624", "sum": -3}"#,
			))
			.await;
		assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

		let response = harness.send(get(user, "/api/user/withdrawals")).await;
		assert_eq!(response.status(), StatusCode::NO_CONTENT);
	}

	#[tokio::test]
	async fn test_health() {
		let response = harness()
			.send(Request::get("/health").body(Body::empty()).unwrap())
			.await;
		assert_eq!(response.status(), StatusCode::OK);
	}
}
