//! Shared domain types for the loyalty backend.
//!
//! Every other crate in the workspace speaks in these types: orders and
//! their reconciliation status, user balances, withdrawals, and the status
//! vocabulary of the external accrual calculator.

pub mod accrual;
pub mod balance;
pub mod order;
pub mod validation;

pub use accrual::*;
pub use balance::*;
pub use order::*;
pub use validation::is_valid_luhn;
