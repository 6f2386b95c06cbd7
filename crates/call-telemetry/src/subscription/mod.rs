//! Caller-held handles for the two telemetry feeds.
//!
//! - [`LogSubscription`] - raw `CallEvent`s in authorization order
//! - [`StatSubscription`] - per-window counts by method and by consumer
//!
//! Both are lazy and non-restartable: once the hub closes the subscriber
//! queue (shutdown or eviction) the handle yields nothing further.

pub mod log;
pub mod stat;

pub use log::LogSubscription;
pub use stat::{window_from_secs, StatSubscription, MIN_WINDOW_SECS};

/// Which feed to attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Raw event log.
    Log,
    /// Usage statistics with a window length in whole seconds.
    Stat { window_secs: u64 },
}

/// A live subscription of either kind.
#[derive(Debug)]
pub enum Subscription {
    Log(LogSubscription),
    Stat(StatSubscription),
}

impl Subscription {
    #[must_use]
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Subscription::Log(_) => SubscriptionKind::Log,
            Subscription::Stat(stat) => SubscriptionKind::Stat {
                window_secs: stat.window().as_secs(),
            },
        }
    }
}
