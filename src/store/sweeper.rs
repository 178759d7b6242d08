use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::executor::QueryExecutor;
use crate::store::SessionTable;

/// Sweep period used when a zero interval is requested.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

impl<E: QueryExecutor> SessionTable<E> {
    /// Spawns a background task that purges expired rows every `interval`.
    ///
    /// Nothing is swept unless this is called. The task stops on the first
    /// tick after [`close`](Self::close), or when its handle is aborted.
    /// Failed sweeps are logged and retried on the next tick.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let table = self.clone();
        let interval = if interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            interval
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if table.is_closed() {
                    tracing::debug!("session table closed, stopping sweeper");
                    break;
                }

                if let Err(err) = table.sweep_expired().await {
                    tracing::warn!(err = %err, "failed to sweep expired sessions");
                }
            }
        })
    }
}
