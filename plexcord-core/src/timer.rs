//! Restartable countdown timers
//!
//! A [`Countdown`] does not run a callback. When it expires it sends an event
//! tagged with its generation into the owner's channel, so the expiry is
//! handled by the same loop that handles alerts. Re-arming or cancelling
//! bumps the generation; an expiry that was already queued is then
//! recognised as stale by [`Countdown::fired`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Seconds without an accepted alert before the session is considered over
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between connection liveness probes
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// A single cancellable timer
#[derive(Debug)]
pub struct Countdown {
    period: Duration,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            generation: 0,
            handle: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether a countdown is outstanding
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the countdown, replacing any outstanding one.
    ///
    /// On expiry `event(generation)` is sent to `tx`.
    pub fn arm<T, F>(&mut self, tx: &mpsc::Sender<T>, event: F)
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let period = self.period;
        let tx = tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            let _ = tx.send(event(generation)).await;
        }));
    }

    /// Stop the countdown. No-op when nothing is outstanding.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Acknowledge an expiry event.
    ///
    /// Returns true if `generation` belongs to the outstanding countdown,
    /// which is then considered finished. Stale expiries return false.
    pub fn fired(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            self.generation = self.generation.wrapping_add(1);
            true
        } else {
            false
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// The listener's two timers: update staleness and connection liveness.
#[derive(Debug)]
pub struct TimeoutMonitor {
    pub update: Countdown,
    pub connection: Countdown,
}

impl TimeoutMonitor {
    pub fn new() -> Self {
        Self::with_periods(UPDATE_TIMEOUT, CONNECTION_TIMEOUT)
    }

    pub fn with_periods(update: Duration, connection: Duration) -> Self {
        Self {
            update: Countdown::new(update),
            connection: Countdown::new(connection),
        }
    }

    /// Cancel both timers
    pub fn cancel_all(&mut self) {
        self.update.cancel();
        self.connection.cancel();
    }
}

impl Default for TimeoutMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_countdown_fires_after_period() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut countdown = Countdown::new(Duration::from_secs(30));
        countdown.arm(&tx, |generation| generation);
        assert!(countdown.is_armed());

        let generation = rx.recv().await.unwrap();
        assert!(countdown.fired(generation));
        assert!(!countdown.is_armed());

        // A second acknowledgement of the same expiry is stale
        assert!(!countdown.fired(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_invalidates_previous_expiry() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut countdown = Countdown::new(Duration::from_secs(30));
        countdown.arm(&tx, |generation| generation);
        let first = countdown.generation;

        tokio::time::advance(Duration::from_secs(10)).await;
        countdown.arm(&tx, |generation| generation);

        let generation = rx.recv().await.unwrap();
        assert_ne!(generation, first);
        assert!(countdown.fired(generation));
        assert!(!countdown.fired(first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_expiry() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut countdown = Countdown::new(Duration::from_secs(30));
        countdown.arm(&tx, |generation| generation);
        countdown.cancel();
        countdown.cancel();
        assert!(!countdown.is_armed());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_queued_before_cancel_is_stale() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut countdown = Countdown::new(Duration::from_secs(1));
        countdown.arm(&tx, |generation| generation);

        let generation = rx.recv().await.unwrap();
        countdown.cancel();
        assert!(!countdown.fired(generation));
    }

    #[test]
    fn test_monitor_periods() {
        let monitor = TimeoutMonitor::new();
        assert_eq!(monitor.update.period(), Duration::from_secs(30));
        assert_eq!(monitor.connection.period(), Duration::from_secs(60));
    }
}
