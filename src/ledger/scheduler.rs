//! Periodic full recomputation of account balances.

use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};

use crate::{ledger::Ledger, store::DocumentStore};

/// How often balances are recomputed unless configured otherwise.
pub const DEFAULT_RECALCULATION_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Start a background task that recomputes every balance each `period`.
///
/// The first run happens one `period` after the task starts. If a run takes
/// longer than `period`, the missed runs are skipped. Failures are logged and
/// the task keeps going.
pub fn spawn_balance_recalculation<S: DocumentStore>(
    ledger: Ledger<S>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            tracing::debug!("starting scheduled balance recalculation");

            if let Err(error) = ledger.recompute_all_balances().await {
                tracing::error!("scheduled balance recalculation failed: {error}");
            }
        }
    })
}
