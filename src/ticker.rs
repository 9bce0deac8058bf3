//! Tokio glue for driving the sweeper.
//!
//! The core only exposes [`crate::outbox::Outbox::tick`]; any scheduler can
//! call it. For tokio embedders this module arms an interval task that takes
//! the shared outbox mutex each period — the same single mutex every other
//! entry point must go through, so all operations stay serialised.

use crate::outbox::Outbox;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared, mutex-serialised outbox handle for multi-threaded embedders.
pub type SharedOutbox = Arc<Mutex<Outbox>>;

/// Wrap an outbox for sharing with [`spawn_ticker`].
pub fn shared(outbox: Outbox) -> SharedOutbox {
    Arc::new(Mutex::new(outbox))
}

/// Spawn a task that calls `tick()` every `period` until aborted.
///
/// Dropping the outbox elsewhere poisons nothing: a poisoned mutex stops the
/// ticker with a warning instead of panicking the runtime.
pub fn spawn_ticker(outbox: SharedOutbox, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match outbox.lock() {
                Ok(mut outbox) => outbox.tick(),
                Err(_) => {
                    tracing::warn!("outbox mutex poisoned, stopping ticker");
                    break;
                }
            }
        }
    })
}
