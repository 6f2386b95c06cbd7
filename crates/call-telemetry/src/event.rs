//! Telemetry payloads carried by the hubs.

use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Immutable record of one authorized call.
///
/// Created by the authorizer right after the ACL check passes. Each hub
/// subscriber receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallEvent {
    /// Consumer identity from call metadata.
    pub consumer: String,
    /// Fully qualified method name (`/pkg.Svc/Method`).
    pub method: String,
    /// Remote address, when the transport exposes one.
    pub peer: Option<SocketAddr>,
}

impl CallEvent {
    /// Event for an authorized call with no peer address.
    #[must_use]
    pub fn new(consumer: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            method: method.into(),
            peer: None,
        }
    }

    /// Attach the remote address, if the transport reported one.
    #[must_use]
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }
}

/// Per-window usage counts emitted by a stat subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatSnapshot {
    /// Unix time (seconds) at which the window closed.
    pub timestamp: i64,
    /// Calls per method observed during the window.
    pub by_method: HashMap<String, u64>,
    /// Calls per consumer observed during the window.
    pub by_consumer: HashMap<String, u64>,
}

impl StatSnapshot {
    /// Whether the window saw no calls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.by_consumer.is_empty()
    }

    /// Total calls counted in the window.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.by_consumer.values().sum()
    }
}
