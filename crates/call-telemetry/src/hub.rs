//! Broadcast hub: a subscriber set plus a single dispatch loop.
//!
//! Both telemetry feeds use this hub. The log feed forwards events as-is; the
//! stat feed folds them into per-subscription windows on the receiving side.
//!
//! ```text
//! authorizer ──emit──► [inbound queue] ──► dispatch loop
//!                                              │ snapshot set (read lock)
//!                                              ├──► [queue 1] ──► subscription 1
//!                                              ├──► [queue 2] ──► subscription 2
//!                                              └──► [queue N] ──► subscription N
//! ```
//!
//! # Rules
//!
//! - **Per-subscriber FIFO**: one inbound queue and one dispatch loop, so each
//!   subscriber sees events in emission order.
//! - **Snapshot delivery**: the set is copied under the read lock and the lock
//!   is released before delivery; attach never waits on a slow subscriber.
//! - **Late attach**: a subscriber added after a broadcast started does not
//!   receive that event.
//! - **Eviction**: delivery waits up to `delivery_timeout` for queue space. A
//!   subscriber that times out, or whose receiver is gone, is removed and its
//!   stream ends. With no timeout, delivery blocks indefinitely.
//! - **Shutdown**: the inbound queue is closed to new emits, every event it
//!   already accepted is broadcast, then every subscriber sender is dropped
//!   (close notification) and the loop exits for good.

use crate::errors::TelemetryError;
use crate::event::CallEvent;
use crate::observability::metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Which feed a hub serves. Used for log targets and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubKind {
    /// Raw per-call event log.
    Log,
    /// Windowed usage statistics.
    Stat,
}

impl HubKind {
    /// Returns the hub kind as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            HubKind::Log => "log",
            HubKind::Stat => "stat",
        }
    }
}

/// Queue sizing and delivery policy for a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSettings {
    /// Capacity of the inbound queue fed by the authorizer.
    pub inbound_capacity: usize,
    /// Capacity of each subscriber's delivery queue.
    pub subscriber_capacity: usize,
    /// How long delivery waits for queue space before evicting.
    /// `None` blocks indefinitely.
    pub delivery_timeout: Option<Duration>,
}

impl HubSettings {
    /// Minimum capacity is 1 (clamped).
    #[must_use]
    pub fn new(
        inbound_capacity: usize,
        subscriber_capacity: usize,
        delivery_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inbound_capacity: inbound_capacity.max(1),
            subscriber_capacity: subscriber_capacity.max(1),
            delivery_timeout,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::new(1024, 256, Some(Duration::from_secs(5)))
    }
}

/// Why the dispatch loop dropped a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eviction {
    Timeout,
    Closed,
}

impl Eviction {
    const fn as_str(self) -> &'static str {
        match self {
            Eviction::Timeout => "timeout",
            Eviction::Closed => "closed",
        }
    }
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<CallEvent>,
}

/// Subscriber set guarded by the hub's lock.
struct SubscriberSet {
    /// Set once by the dispatch loop on shutdown; attach fails afterwards.
    closed: bool,
    entries: Vec<Subscriber>,
}

/// Cloneable handle used by the authorizer to feed a hub.
#[derive(Clone, Debug)]
pub struct HubSender {
    kind: HubKind,
    inbound: mpsc::Sender<CallEvent>,
}

impl HubSender {
    /// Queue an event for broadcast.
    ///
    /// Waits while the inbound queue is full. Once the hub has shut down the
    /// event is dropped; emitting never fails the call.
    pub async fn emit(&self, event: CallEvent) {
        if self.inbound.send(event).await.is_err() {
            trace!(
                target: "telemetry.hub",
                hub = self.kind.as_str(),
                "Hub closed, event dropped"
            );
        }
    }
}

/// Handle to a running hub.
pub struct Hub {
    kind: HubKind,
    settings: HubSettings,
    sender: HubSender,
    subscribers: Arc<RwLock<SubscriberSet>>,
    next_id: AtomicU64,
    /// Cancelled by the dispatch loop when it has fully stopped.
    stopped: CancellationToken,
}

impl Hub {
    /// Create a hub and spawn its dispatch loop.
    ///
    /// The loop runs until `shutdown` is cancelled.
    #[must_use]
    pub fn spawn(kind: HubKind, settings: HubSettings, shutdown: CancellationToken) -> Self {
        let settings = HubSettings::new(
            settings.inbound_capacity,
            settings.subscriber_capacity,
            settings.delivery_timeout,
        );
        let (inbound, receiver) = mpsc::channel(settings.inbound_capacity);
        let subscribers = Arc::new(RwLock::new(SubscriberSet {
            closed: false,
            entries: Vec::new(),
        }));
        let stopped = CancellationToken::new();

        let dispatch = DispatchLoop {
            kind,
            receiver,
            subscribers: Arc::clone(&subscribers),
            delivery_timeout: settings.delivery_timeout,
            shutdown,
            stopped: stopped.clone(),
        };
        tokio::spawn(dispatch.run());

        Self {
            kind,
            settings,
            sender: HubSender { kind, inbound },
            subscribers,
            next_id: AtomicU64::new(1),
            stopped,
        }
    }

    /// Register a new subscriber and return its delivery queue.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::ShuttingDown` once the hub has closed.
    pub async fn attach(&self) -> Result<mpsc::Receiver<CallEvent>, TelemetryError> {
        let (sender, receiver) = mpsc::channel(self.settings.subscriber_capacity);

        let mut set = self.subscribers.write().await;
        if set.closed {
            return Err(TelemetryError::ShuttingDown);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        set.entries.push(Subscriber { id, sender });
        metrics::set_subscribers_active(self.kind.as_str(), set.entries.len());

        debug!(
            target: "telemetry.hub",
            hub = self.kind.as_str(),
            subscriber_id = id,
            subscribers = set.entries.len(),
            "Subscriber attached"
        );

        Ok(receiver)
    }

    /// Handle for feeding events into this hub.
    #[must_use]
    pub fn sender(&self) -> HubSender {
        self.sender.clone()
    }

    /// Current number of attached subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.entries.len()
    }

    /// Whether the dispatch loop has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Wait until the dispatch loop has closed every subscriber and exited.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }
}

struct DispatchLoop {
    kind: HubKind,
    receiver: mpsc::Receiver<CallEvent>,
    subscribers: Arc<RwLock<SubscriberSet>>,
    delivery_timeout: Option<Duration>,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl DispatchLoop {
    #[instrument(skip_all, name = "telemetry.hub.dispatch", fields(hub = self.kind.as_str()))]
    async fn run(mut self) {
        // Waiters on `stopped` are released even if this task unwinds.
        let _stopped = self.stopped.clone().drop_guard();

        debug!(target: "telemetry.hub", hub = self.kind.as_str(), "Dispatch loop started");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    break;
                }

                event = self.receiver.recv() => {
                    match event {
                        Some(event) => self.broadcast(event).await,
                        None => break,
                    }
                }
            }
        }

        self.close_all().await;
    }

    async fn broadcast(&self, event: CallEvent) {
        let targets: Vec<(u64, mpsc::Sender<CallEvent>)> = {
            let set = self.subscribers.read().await;
            set.entries
                .iter()
                .map(|s| (s.id, s.sender.clone()))
                .collect()
        };

        let mut evicted = Vec::new();
        for (id, sender) in targets {
            match deliver(&sender, event.clone(), self.delivery_timeout).await {
                Ok(()) => metrics::record_event_delivered(self.kind.as_str()),
                Err(reason) => evicted.push((id, reason)),
            }
        }

        if !evicted.is_empty() {
            self.evict(&evicted).await;
        }
    }

    async fn evict(&self, evicted: &[(u64, Eviction)]) {
        let mut set = self.subscribers.write().await;
        set.entries
            .retain(|s| !evicted.iter().any(|(id, _)| *id == s.id));
        metrics::set_subscribers_active(self.kind.as_str(), set.entries.len());

        for (id, reason) in evicted {
            metrics::record_subscriber_evicted(self.kind.as_str(), reason.as_str());
            match reason {
                Eviction::Timeout => warn!(
                    target: "telemetry.hub",
                    hub = self.kind.as_str(),
                    subscriber_id = id,
                    "Subscriber evicted: delivery timed out"
                ),
                Eviction::Closed => debug!(
                    target: "telemetry.hub",
                    hub = self.kind.as_str(),
                    subscriber_id = id,
                    "Subscriber detached"
                ),
            }
        }
    }

    async fn close_all(&mut self) {
        // Stop accepting emits, then flush what was already accepted.
        self.receiver.close();
        let mut drained = 0_usize;
        while let Some(event) = self.receiver.recv().await {
            self.broadcast(event).await;
            drained += 1;
        }

        let mut set = self.subscribers.write().await;
        set.closed = true;
        let closed = set.entries.len();
        set.entries.clear();
        metrics::set_subscribers_active(self.kind.as_str(), 0);

        info!(
            target: "telemetry.hub",
            hub = self.kind.as_str(),
            subscribers_closed = closed,
            events_drained = drained,
            "Dispatch loop stopped"
        );
    }
}

async fn deliver(
    sender: &mpsc::Sender<CallEvent>,
    event: CallEvent,
    delivery_timeout: Option<Duration>,
) -> Result<(), Eviction> {
    match delivery_timeout {
        Some(limit) => match tokio::time::timeout(limit, sender.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Eviction::Closed),
            Err(_) => Err(Eviction::Timeout),
        },
        None => sender.send(event).await.map_err(|_| Eviction::Closed),
    }
}
