//! Timed reconcile loop.
//!
//! Runs one [`Reconciler`] pass per tick until the stop channel flips. It
//! shares the store with the HTTP handlers, so scheduled and manual scans
//! see the same recipients. A pass in flight when the stop arrives is
//! dropped; every recipient write is a single guarded transition, so
//! nothing is left half-applied.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::reconcile::Reconciler;

/// Run the reconcile loop until `stop` carries `true` or its sender is gone.
pub async fn run(reconciler: Arc<Reconciler>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = every.as_secs(), "scheduler_ready");

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    info!("scheduler_stopping");
                    break;
                }
            }
            _ = ticker.tick() => {
                match reconciler.run().await {
                    Ok(report) => info!(
                        promoted_delivered = report.promoted_delivered,
                        processed_bounces = report.processed_bounces,
                        "scheduled_scan_complete"
                    ),
                    Err(e) => error!(error = %e, "scheduled_scan_failed"),
                }
            }
        }
    }

    info!("scheduler_shutdown_complete");
}
