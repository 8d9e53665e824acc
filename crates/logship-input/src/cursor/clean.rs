//! Background eviction of idle resources.
//!
//! Resources whose worker is gone and whose updates have all been
//! acknowledged keep their registry record for the configured TTL, so a
//! restart within the window resumes seamlessly. Past the TTL the record is
//! garbage: this task removes it from the in-memory table and the registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::store::Store;

/// Periodically sweep expired resources until `cancel` fires. The loop holds
/// its own store reference, keeping the registry open while sweeps may still
/// run.
pub(crate) async fn cleanup_loop(store: Arc<Store>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                store.cleanup(Utc::now().timestamp_millis());
            }
        }
    }
    debug!("resource cleaner stopped");
}
