//! Stat feed subscription.
//!
//! Each subscription owns its counters; nothing is shared between stat
//! subscribers, so attaching a second subscriber with a different window
//! never changes what an existing one reports.
//!
//! Window k covers the events observed after tick k-1 (or attach, for the
//! first window) up to tick k. Counters reset as each snapshot is produced.
//! Missed ticks are delayed rather than bursted, so a caller that is slow to
//! take its snapshot only stretches its own window.

use crate::errors::TelemetryError;
use crate::event::{CallEvent, StatSnapshot};
use crate::observability::metrics;
use futures::Stream;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Shortest accepted stat window.
pub const MIN_WINDOW_SECS: u64 = 1;

/// Validate a window length given in whole seconds.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidWindow` below [`MIN_WINDOW_SECS`].
pub fn window_from_secs(secs: u64) -> Result<Duration, TelemetryError> {
    if secs < MIN_WINDOW_SECS {
        return Err(TelemetryError::InvalidWindow(secs));
    }
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, Default)]
struct WindowCounts {
    by_method: HashMap<String, u64>,
    by_consumer: HashMap<String, u64>,
}

impl WindowCounts {
    fn record(&mut self, event: &CallEvent) {
        *self.by_method.entry(event.method.clone()).or_insert(0) += 1;
        *self.by_consumer.entry(event.consumer.clone()).or_insert(0) += 1;
    }

    fn take(&mut self) -> StatSnapshot {
        StatSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            by_method: std::mem::take(&mut self.by_method),
            by_consumer: std::mem::take(&mut self.by_consumer),
        }
    }
}

/// Handle on the stat hub's delivery queue plus a private window.
#[derive(Debug)]
pub struct StatSubscription {
    receiver: mpsc::Receiver<CallEvent>,
    window: Duration,
    ticker: Interval,
    counts: WindowCounts,
}

impl StatSubscription {
    /// The first window closes one full `window` after this call.
    pub(crate) fn new(receiver: mpsc::Receiver<CallEvent>, window: Duration) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + window, window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            receiver,
            window,
            ticker,
            counts: WindowCounts::default(),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Fold events until the current window closes, then return its counts.
    ///
    /// Returns `None` once the hub has closed this subscription. The partial
    /// window in progress at close is discarded.
    pub async fn next_snapshot(&mut self) -> Option<StatSnapshot> {
        loop {
            tokio::select! {
                biased;

                _ = self.ticker.tick() => {
                    // Events already queued at the tick belong to this window.
                    while let Ok(event) = self.receiver.try_recv() {
                        self.counts.record(&event);
                    }
                    let snapshot = self.counts.take();
                    metrics::record_window_emitted();
                    trace!(
                        target: "telemetry.subscription",
                        feed = "stat",
                        window_secs = self.window.as_secs(),
                        calls = snapshot.total_calls(),
                        "Stat window closed"
                    );
                    return Some(snapshot);
                }

                event = self.receiver.recv() => {
                    match event {
                        Some(event) => self.counts.record(&event),
                        None => {
                            debug!(
                                target: "telemetry.subscription",
                                feed = "stat",
                                window_secs = self.window.as_secs(),
                                "Stat subscription closed"
                            );
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Adapt into a `Stream` of window snapshots.
    pub fn into_stream(self) -> impl Stream<Item = StatSnapshot> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let snapshot = subscription.next_snapshot().await?;
            Some((snapshot, subscription))
        })
    }
}
