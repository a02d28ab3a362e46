//! Background Refresh
//!
//! Periodically sweeps the pool and redials every slot that should be
//! refreshed. The task only holds a weak reference to the pool, so a dropped
//! pool ends it on the next tick.

use chanpool_core::PoolError;
use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::connection::duration_millis;
use crate::pool::PoolInner;

/// Default period between sweeps.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Refresh task handle
#[derive(Debug)]
pub struct Refresher {
    interval: Duration,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Refresher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts ticking. The first sweep runs one period after start.
    ///
    /// Fails if the period is zero or no tokio runtime is running.
    pub(crate) fn start(&self, pool: Weak<PoolInner>) -> Result<(), PoolError> {
        if self.interval.is_zero() {
            return Err(PoolError::scheduler_start(
                "refresh interval must be greater than 0",
            ));
        }

        let runtime =
            Handle::try_current().map_err(|e| PoolError::scheduler_start(e.to_string()))?;

        let period = self.interval;
        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(pool) = pool.upgrade() else {
                    debug!("Pool dropped, stopping refresher");
                    break;
                };
                if pool.is_closed() {
                    break;
                }

                pool.refresh_in_background().await;
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }

        info!(interval_ms = duration_millis(period), "Refresher started");
        Ok(())
    }

    /// Stops the task. Safe to call more than once.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Refresher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_interval_fails() {
        let refresher = Refresher::new(Duration::ZERO);
        let result = refresher.start(Weak::new());
        assert!(matches!(result, Err(PoolError::SchedulerStart { .. })));
        assert!(!refresher.is_running());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let refresher = Refresher::new(DEFAULT_REFRESH_INTERVAL);
        let result = refresher.start(Weak::new());
        assert!(matches!(result, Err(PoolError::SchedulerStart { .. })));
    }

    #[tokio::test]
    async fn test_stop() {
        let refresher = Refresher::new(Duration::from_secs(60));
        refresher.start(Weak::new()).unwrap();
        assert!(refresher.is_running());

        refresher.stop();
        assert!(!refresher.is_running());
        refresher.stop();
    }

    #[tokio::test]
    async fn test_exits_when_pool_is_gone() {
        let refresher = Refresher::new(Duration::from_millis(10));
        refresher.start(Weak::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!refresher.is_running());
    }
}
