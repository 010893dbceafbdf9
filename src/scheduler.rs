use crate::tracker::TrackerCore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Interval, MissedTickBehavior};

/// Periodic notification check. Each tick waits for the previous check to
/// finish, and the interval is rebuilt when `checkIntervalSeconds` changes.
#[derive(Clone)]
pub struct ReminderScheduler {
    core: Arc<TrackerCore>,
}

impl ReminderScheduler {
    pub fn new(core: Arc<TrackerCore>) -> Self {
        Self { core }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let mut period = self.current_period();
        let mut interval = build_interval(period);
        tracing::info!(interval_secs = period.as_secs(), "reminder scheduler started");

        loop {
            interval.tick().await;

            let core = self.core.clone();
            match tokio::task::spawn_blocking(move || core.check_for_notifications()).await {
                Ok(batch) if !batch.is_empty() => {
                    tracing::debug!(count = batch.len(), "reminder tick produced notifications");
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(error = %error, "notification check task failed");
                }
            }

            let next = self.current_period();
            if next != period {
                tracing::info!(interval_secs = next.as_secs(), "reminder interval changed");
                period = next;
                interval = build_interval(period);
                interval.reset();
            }
        }
    }

    fn current_period(&self) -> Duration {
        Duration::from_secs(self.core.get_settings().check_interval_seconds.max(1))
    }
}

fn build_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
