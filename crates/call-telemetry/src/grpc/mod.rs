//! gRPC boundary: call authorization and its tower layer.
//!
//! - `authorizer` - consumer extraction, ACL check, telemetry emission
//! - `auth_layer` - tower layer wrapping a tonic server with the authorizer
//!
//! # Security
//!
//! Every inbound call must carry exactly one `consumer` metadata value and
//! match an ACL pattern before it reaches application handlers. Rejections
//! use generic messages; the consumer identity is logged, never echoed.

pub mod auth_layer;
pub mod authorizer;

pub use auth_layer::{AuthorizeLayer, AuthorizeService};
pub use authorizer::{extract_consumer, CallAuthorizer, DispatchRules, CONSUMER_METADATA_KEY};
