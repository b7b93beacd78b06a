//! The fixed-interval discovery loop.
//!
//! One cycle runs at a time: fetch, then dispatch, then wait for the next
//! tick. A failing cycle is logged and forgotten. Shutdown is cooperative;
//! the loop only observes it between cycles, so an in-flight render or
//! script run always completes.

use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::discovery::Discovery;
use crate::dispatch::{Dispatcher, Outcome};
use crate::error::ConfdError;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    /// Stop the loop when the notification script fails.
    pub script_fail_fast: bool,
}

/// Run one fetch → dispatch cycle.
pub async fn run_cycle<D: Discovery>(
    discovery: &D,
    dispatcher: &mut Dispatcher,
) -> Result<Outcome, ConfdError> {
    let payload = discovery.fetch().await?;
    dispatcher.handle(&payload).await
}

/// Poll until `shutdown` flips to `true` or its sender goes away.
///
/// Returns `Err` only for a script failure under fail-fast.
pub async fn run_poll_loop<D: Discovery>(
    discovery: D,
    mut dispatcher: Dispatcher,
    settings: PollSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConfdError> {
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Polling {} every {:?}",
        discovery.endpoint(),
        settings.interval
    );

    loop {
        let stop = *shutdown.borrow();
        if stop {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        match run_cycle(&discovery, &mut dispatcher).await {
            Ok(Outcome::Unchanged) => {}
            Ok(outcome) => info!("Discovery cycle finished: {:?}", outcome),
            Err(e) if e.is_script_failure() && settings.script_fail_fast => {
                error!("Notification script failed, stopping: {}", e);
                return Err(e);
            }
            Err(e @ ConfdError::Fetch { .. }) => warn!("Discovery fetch failed: {}", e),
            Err(e) => error!("Discovery cycle failed: {}", e),
        }
    }

    info!("Poll loop stopped");
    Ok(())
}
