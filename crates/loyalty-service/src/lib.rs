//! HTTP service of the loyalty backend.
//!
//! The binary in `main.rs` loads configuration, starts the
//! [`LoyaltyEngine`](loyalty_core::LoyaltyEngine) and serves [`api::router`]
//! until a shutdown signal arrives.

pub mod api;
