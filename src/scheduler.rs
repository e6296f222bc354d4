use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

/// Callback fired by a timer.
pub type TimerTask = Arc<dyn Fn() + Send + Sync>;

/// Timer seam used for polling, retry backoff and progress sampling.
pub trait Scheduler: Send + Sync {
    /// Fires `task` every `interval`, first after one full interval.
    fn schedule_repeating(&self, interval: Duration, task: TimerTask) -> TimerHandle;

    /// Fires `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Owning handle of a scheduled timer. Dropping the handle cancels the
/// timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// [`Scheduler`] backed by tokio tasks. Must be used inside a tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

// tokio intervals panic on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, task: TimerTask) -> TimerHandle {
        let period = interval.max(MIN_PERIOD);
        let join = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });
        TimerHandle::new(move || join.abort())
    }

    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let join = tokio::spawn(async move {
            time::sleep(delay).await;
            task();
        });
        TimerHandle::new(move || join.abort())
    }
}
