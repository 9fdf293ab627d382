//! Vocabulary of the external accrual calculator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::OrderStatus;

/// Error returned when the calculator reports a status we do not know.
#[derive(Debug, Error)]
#[error("Unknown accrual status: {0}")]
pub struct UnknownStatus(pub String);

/// Status of an order as reported by the accrual calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
	/// The calculator has never heard of the order.
	NotRegistered,
	Registered,
	Processing,
	Invalid,
	Processed,
}

impl RemoteStatus {
	/// Maps the remote status onto the local order status.
	pub fn to_local(self) -> OrderStatus {
		match self {
			Self::NotRegistered | Self::Invalid => OrderStatus::Invalid,
			Self::Registered | Self::Processing => OrderStatus::Processing,
			Self::Processed => OrderStatus::Processed,
		}
	}
}

impl FromStr for RemoteStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"NOT_REGISTERED" => Ok(Self::NotRegistered),
			"REGISTERED" => Ok(Self::Registered),
			"PROCESSING" => Ok(Self::Processing),
			"INVALID" => Ok(Self::Invalid),
			"PROCESSED" => Ok(Self::Processed),
			other => Err(UnknownStatus(other.to_string())),
		}
	}
}

/// A decoded answer of the calculator for one order.
///
/// `accrual` is always present for `Processed` and absent otherwise; the
/// gateway rejects responses that break this.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualResult {
	pub number: String,
	pub status: RemoteStatus,
	pub accrual: Option<Decimal>,
}

impl AccrualResult {
	pub fn processed(number: impl Into<String>, accrual: Decimal) -> Self {
		Self {
			number: number.into(),
			status: RemoteStatus::Processed,
			accrual: Some(accrual),
		}
	}

	pub fn with_status(number: impl Into<String>, status: RemoteStatus) -> Self {
		Self {
			number: number.into(),
			status,
			accrual: None,
		}
	}
}
