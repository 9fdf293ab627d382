//! Core of the loyalty backend.
//!
//! [`OrderService`] and [`BalanceService`] serve the request path, the
//! [`Reconciler`] settles pending orders with the accrual calculator in the
//! background, and [`LoyaltyEngine`] ties them to one lifecycle.

pub mod balance;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod orders;
pub mod reconciler;

pub use balance::{BalanceService, BalanceView, WithdrawError};
pub use engine::{EngineBuilder, LoyaltyEngine};
pub use error::CoreError;
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use orders::{OrderService, SubmitError};
pub use reconciler::{CycleReport, Reconciler, ReconcilerSettings};
