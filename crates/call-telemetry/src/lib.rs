//! Call Telemetry Library
//!
//! Access-controlled call telemetry for a gRPC server:
//!
//! - Consumer identity from call metadata, checked against an ACL
//! - One `CallEvent` per authorized call, unary or streaming
//! - Raw event log feed for any number of subscribers
//! - Windowed usage statistics, each subscriber with its own window
//! - Idempotent shutdown that closes every open feed
//!
//! # Architecture
//!
//! ```text
//! inbound call
//!   └── AuthorizeLayer / CallAuthorizer
//!       ├── reject: UNAUTHENTICATED / PERMISSION_DENIED (no event)
//!       └── allow: emit CallEvent
//!           ├── log hub  ──► LogSubscription (one per subscriber)
//!           └── stat hub ──► StatSubscription (own window + counters)
//!
//! TelemetryService owns both hubs and the shutdown token.
//! ```
//!
//! # Modules
//!
//! - [`acl`] - Consumer to method-pattern access list
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with gRPC status mapping
//! - [`event`] - Event and snapshot payloads
//! - [`grpc`] - Call authorizer and tower layer
//! - [`hub`] - Broadcast hub with bounded per-subscriber queues
//! - [`observability`] - Metrics facade
//! - [`service`] - Subscription lifecycle and shutdown
//! - [`subscription`] - Log and stat subscription handles

pub mod acl;
pub mod config;
pub mod errors;
pub mod event;
pub mod grpc;
pub mod hub;
pub mod observability;
pub mod service;
pub mod subscription;

pub use acl::Acl;
pub use config::Config;
pub use errors::TelemetryError;
pub use event::{CallEvent, StatSnapshot};
pub use grpc::{AuthorizeLayer, CallAuthorizer, DispatchRules};
pub use hub::{HubKind, HubSettings};
pub use service::TelemetryService;
pub use subscription::{LogSubscription, StatSubscription, Subscription, SubscriptionKind};
