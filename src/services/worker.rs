use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

use crate::infrastructure::InMemoryTempStore;

/// Periodically deletes staged objects nobody committed or removed, such as
/// those left behind by an abandoned form.
pub struct StagingSweeper {
    store: InMemoryTempStore,
    max_age_hours: u64,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingSweeper {
    pub fn new(
        store: InMemoryTempStore,
        max_age_hours: u64,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            max_age_hours,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Staging sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep();
                }
            }
        }
    }

    /// Runs one pass and returns the number of objects removed.
    pub fn sweep(&self) -> usize {
        let Some(cutoff) = i64::try_from(self.max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        let purged = self.store.purge_older_than(cutoff);
        if purged > 0 {
            tracing::info!("🧹 Removed {} abandoned staged objects", purged);
        }
        purged
    }
}
