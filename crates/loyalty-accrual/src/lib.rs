//! Client side of the external accrual calculator.
//!
//! The reconciliation loop talks to the calculator only through the
//! [`AccrualGateway`] trait, so tests can script its answers and the HTTP
//! client stays a detail of [`implementations::http`].

use async_trait::async_trait;
use loyalty_types::AccrualResult;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod http;
}

pub use implementations::http::HttpAccrualGateway;

/// Errors that leave the order untouched and are retried on the next cycle.
#[derive(Debug, Error)]
pub enum AccrualError {
	/// The request could not be sent or the response not read.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The calculator answered with a status code it never documents.
	#[error("Unexpected response status: {0}")]
	UnexpectedStatus(u16),
	/// The response body broke the wire contract.
	#[error("Protocol error: {0}")]
	Protocol(String),
}

/// What the calculator said about one order.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
	/// A definite status for the order.
	Resolved(AccrualResult),
	/// The calculator is overloaded; nothing may be sent before the delay.
	RateLimited(Duration),
	/// The calculator failed internally (5xx).
	ServerError(u16),
}

/// Trait for querying the accrual calculator.
#[async_trait]
pub trait AccrualGateway: Send + Sync {
	/// Asks the calculator for the status of `number`.
	async fn query(&self, number: &str) -> Result<AccrualOutcome, AccrualError>;
}
