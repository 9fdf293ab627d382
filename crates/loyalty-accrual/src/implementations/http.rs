//! HTTP client for the accrual calculator.
//!
//! Speaks `GET <host>/api/orders/{number}` and maps the documented
//! responses (200, 204, 429, 5xx) onto [`AccrualOutcome`].

use async_trait::async_trait;
use loyalty_types::{AccrualResult, RemoteStatus};
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::{AccrualError, AccrualGateway, AccrualOutcome};

/// Body of a 200 response.
#[derive(Debug, Deserialize)]
struct AccrualResponse {
	#[serde(default)]
	order: Option<String>,
	status: String,
	#[serde(default, with = "rust_decimal::serde::float_option")]
	accrual: Option<Decimal>,
}

/// Accrual gateway over HTTP.
pub struct HttpAccrualGateway {
	client: reqwest::Client,
	base_url: String,
}

impl HttpAccrualGateway {
	/// Creates a gateway for the calculator at `base_url`.
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AccrualError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| AccrualError::Transport(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}

	fn order_url(&self, number: &str) -> String {
		format!("{}/api/orders/{}", self.base_url, number)
	}

	async fn decode(number: &str, response: Response) -> Result<AccrualResult, AccrualError> {
		let body: AccrualResponse = response
			.json()
			.await
			.map_err(|e| AccrualError::Protocol(format!("Failed to parse response: {}", e)))?;

		if let Some(reported) = &body.order {
			if reported != number {
				return Err(AccrualError::Protocol(format!(
					"Asked for order {} but got {}",
					number, reported
				)));
			}
		}

		let status: RemoteStatus = body
			.status
			.parse()
			.map_err(|e: loyalty_types::UnknownStatus| AccrualError::Protocol(e.to_string()))?;

		match (status, body.accrual) {
			(RemoteStatus::Processed, Some(accrual)) if accrual.is_sign_negative() => Err(
				AccrualError::Protocol(format!("Negative accrual {} for order {}", accrual, number)),
			),
			(RemoteStatus::Processed, Some(accrual)) => Ok(AccrualResult::processed(number, accrual)),
			(RemoteStatus::Processed, None) => Err(AccrualError::Protocol(format!(
				"Order {} processed without accrual",
				number
			))),
			(status, _) => Ok(AccrualResult::with_status(number, status)),
		}
	}
}

/// Reads `Retry-After` as whole seconds; absent or malformed means zero.
fn retry_after(response: &Response) -> Duration {
	let seconds = response
		.headers()
		.get(RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.trim().parse::<u64>().ok())
		.unwrap_or(0);
	Duration::from_secs(seconds)
}

#[async_trait]
impl AccrualGateway for HttpAccrualGateway {
	#[instrument(skip(self))]
	async fn query(&self, number: &str) -> Result<AccrualOutcome, AccrualError> {
		let response = self
			.client
			.get(self.order_url(number))
			.send()
			.await
			.map_err(|e| AccrualError::Transport(format!("HTTP request failed: {}", e)))?;

		let status = response.status();
		debug!("Accrual service answered {} for order {}", status, number);

		match status {
			StatusCode::OK => Ok(AccrualOutcome::Resolved(Self::decode(number, response).await?)),
			StatusCode::NO_CONTENT => Ok(AccrualOutcome::Resolved(AccrualResult::with_status(
				number,
				RemoteStatus::NotRegistered,
			))),
			StatusCode::TOO_MANY_REQUESTS => Ok(AccrualOutcome::RateLimited(retry_after(&response))),
			status if status.is_server_error() => Ok(AccrualOutcome::ServerError(status.as_u16())),
			status => Err(AccrualError::UnexpectedStatus(status.as_u16())),
		}
	}
}
