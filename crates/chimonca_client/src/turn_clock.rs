//! One-second countdown with an expiry callback.
//!
//! Drives both the turn timer and the disconnect grace window. Starting a
//! clock cancels whatever it was already counting, so at most one countdown
//! per [`TurnClock`] is ever live.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, instrument, trace};

const TICK: Duration = Duration::from_secs(1);

/// A restartable countdown.
#[derive(Debug)]
pub struct TurnClock {
    duration: Duration,
    remaining: Arc<watch::Sender<Option<u32>>>,
    active: Option<JoinHandle<()>>,
}

impl TurnClock {
    /// Creates a stopped clock counting down `duration` when started.
    pub fn new(duration: Duration) -> Self {
        let (remaining, _) = watch::channel(None);
        Self {
            duration,
            remaining: Arc::new(remaining),
            active: None,
        }
    }

    /// Whole seconds in one countdown, rounded up.
    fn total_seconds(&self) -> u32 {
        let secs = self.duration.as_secs() + u64::from(self.duration.subsec_nanos() > 0);
        u32::try_from(secs).unwrap_or(u32::MAX)
    }

    /// Starts counting down, replacing any running countdown.
    ///
    /// `on_expire` runs once when the countdown reaches zero, unless the
    /// clock is stopped or restarted first.
    #[instrument(skip(self, on_expire), fields(seconds = self.total_seconds()))]
    pub fn start<F>(&mut self, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop();
        let total = self.total_seconds();
        self.remaining.send_replace(Some(total));
        let remaining = Arc::clone(&self.remaining);

        self.active = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + TICK, TICK);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut left = total;
            while left > 0 {
                ticks.tick().await;
                left -= 1;
                trace!(left, "Tick");
                if left > 0 {
                    remaining.send_replace(Some(left));
                }
            }
            remaining.send_replace(None);
            debug!("Countdown expired");
            on_expire();
        }));
        debug!("Countdown started");
    }

    /// Stops the countdown. Safe to call when nothing runs.
    pub fn stop(&mut self) {
        if let Some(task) = self.active.take() {
            task.abort();
            trace!("Countdown stopped");
        }
        self.remaining.send_replace(None);
    }

    /// Whether a countdown is in flight.
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Seconds left, `None` when stopped.
    pub fn remaining(&self) -> Option<u32> {
        *self.remaining.borrow()
    }

    /// Watches the seconds left.
    pub fn subscribe(&self) -> watch::Receiver<Option<u32>> {
        self.remaining.subscribe()
    }
}

impl Drop for TurnClock {
    fn drop(&mut self) {
        if let Some(task) = self.active.take() {
            task.abort();
        }
    }
}
