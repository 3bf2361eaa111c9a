// Background presence sweep: periodically marks stale presence rows offline
// so abrupt disconnects do not leave phantom "online" users. Best-effort and
// cancellable; it never blocks a caller.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use caseboard_store::Database;

use crate::memory::MemoryPressure;

pub struct PresenceSweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The sweep cadence doubles while the process is under memory pressure.
fn effective_interval(base: Duration, pressure_high: bool) -> Duration {
    if pressure_high {
        base * 2
    } else {
        base
    }
}

impl PresenceSweeper {
    pub fn spawn(
        db: Arc<Database>,
        base_interval: Duration,
        stale_threshold: chrono::Duration,
        pressure: MemoryPressure,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                let interval = effective_interval(base_interval, pressure.is_high());
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        match db.sweep_stale_presence(chrono::Utc::now(), stale_threshold) {
                            Ok(_) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, "presence sweep failed; will retry next interval");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::info!("presence sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Tear the sweeper down on session end.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}
