//! Async subscription driver for the secret feed.
//!
//! Bridges a `watch` channel carrying versioned secret snapshots to the
//! [`SecretFeedAdapter`]. The driver is a single task, so updates are
//! applied one at a time; two updates can never interleave into one
//! published set.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{SecretFeedAdapter, VersionedSecret};
use crate::observability::debug;

impl SecretFeedAdapter {
    /// Drives the adapter from a `watch` channel of secret snapshots until
    /// cancelled or the channel closes.
    ///
    /// The snapshot currently in the channel is applied first (seed the
    /// channel with the current bundle before spawning the driver), then
    /// every subsequent change. Intermediate snapshots may be skipped if
    /// updates outpace the driver; only the latest matters, which is the
    /// standard behavior of `watch` channels and exactly the freshness
    /// model of a wholesale-replaced key set.
    pub async fn run(
        &self,
        mut updates: watch::Receiver<VersionedSecret>,
        cancel: CancellationToken,
    ) {
        loop {
            let bundle = updates.borrow_and_update().clone();
            self.on_secret_update(&bundle);

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Cancellation signal received; stopping secret feed");
                    return;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        debug!("Secret feed channel closed; stopping");
                        return;
                    }
                }
            }
        }
    }
}
