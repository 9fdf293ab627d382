//! Reconciliation of pending orders against the accrual calculator.
//!
//! The reconciler wakes up on a fixed interval, asks the calculator about
//! every NEW or PROCESSING order one at a time and writes the answers back.
//! A rate-limit answer abandons the rest of the batch; the loop sleeps for
//! the requested delay and then resumes on its normal cadence.

use crate::error::CoreError;
use loyalty_accrual::{AccrualError, AccrualGateway, AccrualOutcome};
use loyalty_storage::{BalanceStore, OrderStore};
use loyalty_types::{Order, OrderStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
	/// Time between two cycles.
	pub poll_interval: Duration,
	/// Whether a 5xx from the calculator marks the order INVALID.
	pub invalidate_on_server_error: bool,
}

impl Default for ReconcilerSettings {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(5),
			invalidate_on_server_error: true,
		}
	}
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
	/// Orders the calculator was asked about.
	pub examined: usize,
	/// Orders whose stored status changed.
	pub updated: usize,
	/// Orders credited and marked PROCESSED.
	pub credited: usize,
	pub failed: usize,
	/// Set when the calculator asked us to back off.
	pub suspended_for: Option<Duration>,
}

enum Step {
	Unchanged,
	Updated(OrderStatus),
	Credited(Decimal),
	Suspend(Duration),
}

pub struct Reconciler {
	orders: Arc<dyn OrderStore>,
	balances: Arc<dyn BalanceStore>,
	gateway: Arc<dyn AccrualGateway>,
	settings: ReconcilerSettings,
}

impl Reconciler {
	pub fn new(
		orders: Arc<dyn OrderStore>,
		balances: Arc<dyn BalanceStore>,
		gateway: Arc<dyn AccrualGateway>,
		settings: ReconcilerSettings,
	) -> Self {
		Self {
			orders,
			balances,
			gateway,
			settings,
		}
	}

	/// Runs the loop on its own task until `shutdown` fires.
	pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
		tokio::spawn(async move { self.run(shutdown).await })
	}

	async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
		let period = self.settings.poll_interval;
		let mut ticker = time::interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		info!("Reconciler started, polling every {:?}", period);

		loop {
			tokio::select! {
				_ = ticker.tick() => {}
				_ = shutdown.recv() => break,
			}

			let report = self.run_cycle().await;
			if report.examined > 0 {
				debug!(?report, "Reconciliation cycle finished");
			}

			if let Some(delay) = report.suspended_for {
				warn!("Accrual service rate limited us, pausing for {:?}", delay);
				tokio::select! {
					_ = time::sleep(delay) => {}
					_ = shutdown.recv() => break,
				}
				ticker.reset();
			}
		}

		info!("Reconciler stopped");
	}

	/// Processes every pending order once.
	///
	/// Failures of single orders are logged and counted; the orders stay
	/// pending and are picked up again by the next cycle.
	#[instrument(skip(self))]
	pub async fn run_cycle(&self) -> CycleReport {
		let mut report = CycleReport::default();

		let pending = match self.orders.find_pending().await {
			Ok(pending) => pending,
			Err(e) => {
				error!("Failed to load pending orders: {}", e);
				return report;
			}
		};

		for order in pending {
			report.examined += 1;
			match self.reconcile(order).await {
				Ok(Step::Unchanged) => {}
				Ok(Step::Updated(status)) => {
					debug!("Order moved to {}", status);
					report.updated += 1;
				}
				Ok(Step::Credited(sum)) => {
					debug!("Order credited with {}", sum);
					report.updated += 1;
					report.credited += 1;
				}
				Ok(Step::Suspend(delay)) => {
					report.suspended_for = Some(delay);
					break;
				}
				Err(e) => {
					report.failed += 1;
					warn!("Order left pending: {}", e);
				}
			}
		}

		report
	}

	#[instrument(skip(self, order), fields(number = %order.number, status = %order.status))]
	async fn reconcile(&self, mut order: Order) -> Result<Step, CoreError> {
		if let Some(sum) = self
			.balances
			.credited_amount(order.user_id, order.id)
			.await?
		{
			// credited earlier but the PROCESSED save did not land
			info!("Completing previously credited order with {}", sum);
			return self.mark_processed(order, sum).await;
		}

		let (next, accrual) = match self.gateway.query(&order.number).await? {
			AccrualOutcome::RateLimited(delay) => return Ok(Step::Suspend(delay)),
			AccrualOutcome::ServerError(code) if self.settings.invalidate_on_server_error => {
				warn!("Accrual service failed with {}, invalidating order", code);
				(OrderStatus::Invalid, None)
			}
			AccrualOutcome::ServerError(code) => return Err(CoreError::RemoteFailure(code)),
			AccrualOutcome::Resolved(result) => (result.status.to_local(), result.accrual),
		};

		if next == order.status || !order.status.can_advance_to(next) {
			debug!("No change for order");
			return Ok(Step::Unchanged);
		}

		if next == OrderStatus::Processed {
			let Some(sum) = accrual else {
				return Err(AccrualError::Protocol(format!(
					"Order {} processed without accrual",
					order.number
				))
				.into());
			};

			// the credit must land before the order leaves the pending set
			let fresh = self.balances.credit(order.user_id, order.id, sum).await?;
			if !fresh {
				debug!("Credit for order was already applied");
			}

			info!("Order processed, credited {}", sum);
			return self.mark_processed(order, sum).await;
		}

		order.status = next;
		self.orders.save(&order).await?;
		Ok(Step::Updated(next))
	}

	async fn mark_processed(&self, mut order: Order, sum: Decimal) -> Result<Step, CoreError> {
		order.status = OrderStatus::Processed;
		order.accrual = Some(sum);
		self.orders.save(&order).await?;
		Ok(Step::Credited(sum))
	}
}
