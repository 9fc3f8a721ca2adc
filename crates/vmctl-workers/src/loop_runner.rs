//! Shared loop skeleton every worker binary (deploy, ops, reaper,
//! ticket scheduler, host-info obtainer) runs: claim one unit of work,
//! process it, sleep a short interval when busy or a longer one when
//! idle, and stop as soon as a graceful-shutdown flag is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};
use vmctl_hypervisor::HypervisorAdapter;
use vmctl_store::conn::BlockingPool;
use vmctl_store::tx::with_tx;

/// Sleep/idle tuning shared by every worker loop, read from
/// configuration at process start.
#[derive(Debug, Clone, Copy)]
pub struct LoopIntervals {
    /// Sleep applied at the top of every iteration, busy or not.
    pub initial_sleep: Duration,
    /// Additional sleep applied only when an iteration found nothing
    /// to claim.
    pub idle_sleep: Duration,
    /// Consecutive idle iterations before the hypervisor adapter's
    /// [`HypervisorAdapter::idle`] hook is polled.
    pub idle_threshold: u32,
}

impl Default for LoopIntervals {
    fn default() -> Self {
        Self {
            initial_sleep: Duration::from_millis(200),
            idle_sleep: Duration::from_secs(2),
            idle_threshold: 50,
        }
    }
}

/// Runs `attempt` in a loop inside its own blocking-pool connection
/// until `run` is cleared. `attempt` returns `Ok(true)` when it did
/// useful work (resets the idle counter) or `Ok(false)` when there was
/// nothing to claim.
///
/// A transaction-body error is logged and the loop keeps going — one
/// bad action must not take down the whole worker process.
pub fn run<F>(
    pool: &BlockingPool,
    hv: &dyn HypervisorAdapter,
    run: &Arc<AtomicBool>,
    intervals: LoopIntervals,
    mut attempt: F,
) where
    F: FnMut(&mut postgres::Transaction<'_>, &dyn HypervisorAdapter) -> Result<bool, Box<dyn std::error::Error>>,
{
    let mut idle_counter = 0u32;

    while run.load(Ordering::SeqCst) {
        thread::sleep(intervals.initial_sleep);

        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(err) => {
                error!(%err, "failed to check out a database connection");
                thread::sleep(intervals.idle_sleep);
                continue;
            }
        };

        let did_work = with_tx(&mut conn, |tx| attempt(tx, hv));

        match did_work {
            Ok(true) => idle_counter = 0,
            Ok(false) => {
                idle_counter += 1;
                if idle_counter > intervals.idle_threshold {
                    idle_counter = 0;
                    if hv.idle() {
                        warn!("hypervisor adapter reports idle");
                    }
                }
                thread::sleep(intervals.idle_sleep);
            }
            Err(err) => error!(%err, "worker iteration failed"),
        }
    }
}
