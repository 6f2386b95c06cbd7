//! Observability for the telemetry core.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]` and record only
//! consumer identity and method name as fields. Metric labels are bounded
//! to prevent cardinality explosion:
//! - `hub`: 2 values (log, stat)
//! - `outcome`: 3 values (allowed, unauthenticated, permission_denied)
//! - `reason`: 2 values (timeout, closed)
//!
//! Consumer and method names are never used as metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `telemetry_calls_total` | Counter | `outcome` | Authorization decisions |
//! | `telemetry_events_delivered_total` | Counter | `hub` | Events handed to subscriber queues |
//! | `telemetry_subscribers_active` | Gauge | `hub` | Current subscriber set size |
//! | `telemetry_subscribers_evicted_total` | Counter | `hub`, `reason` | Slow or gone subscribers removed |
//! | `telemetry_windows_emitted_total` | Counter | none | Stat snapshots produced |

pub mod metrics;

pub use metrics::{
    record_call, record_event_delivered, record_subscriber_evicted, record_window_emitted,
    set_subscribers_active,
};
