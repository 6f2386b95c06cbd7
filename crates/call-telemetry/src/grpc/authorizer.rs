//! Call authorization and telemetry emission.
//!
//! Every inbound call, unary or streaming, goes through the same step:
//!
//! 1. Extract the consumer identity from the `consumer` metadata key
//!    (exactly one value, else `UNAUTHENTICATED`)
//! 2. Check the ACL (`PERMISSION_DENIED` on no match)
//! 3. Emit one `CallEvent` to the log and stat hubs, subject to
//!    [`DispatchRules`]
//! 4. Run the wrapped handler and return its result untouched
//!
//! Rejected calls never reach the handler and emit nothing. Streaming calls
//! emit once when the call is established, not per message.

use crate::acl::Acl;
use crate::errors::TelemetryError;
use crate::event::CallEvent;
use crate::hub::{HubKind, HubSender};
use crate::observability::metrics;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::{debug, instrument, trace};

/// Metadata key carrying the consumer identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

/// Per-method opt-outs from either feed.
///
/// The log-subscription endpoint is normally exempted from the log feed so a
/// logging call is not reported into the stream it opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRules {
    log_exempt: HashSet<String>,
    stat_exempt: HashSet<String>,
}

impl DispatchRules {
    /// Rules with no exemptions: every authorized call reaches both hubs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exempt_from_log(mut self, method: impl Into<String>) -> Self {
        self.log_exempt.insert(method.into());
        self
    }

    #[must_use]
    pub fn exempt_from_stat(mut self, method: impl Into<String>) -> Self {
        self.stat_exempt.insert(method.into());
        self
    }

    /// Whether calls to `method` are emitted to the given hub.
    #[must_use]
    pub fn emits_to(&self, hub: HubKind, method: &str) -> bool {
        match hub {
            HubKind::Log => !self.log_exempt.contains(method),
            HubKind::Stat => !self.stat_exempt.contains(method),
        }
    }
}

/// Extract the consumer identity from call metadata.
///
/// # Errors
///
/// Returns `TelemetryError::Unauthenticated` if the key is absent, present
/// more than once, or not valid ASCII.
pub fn extract_consumer(metadata: &MetadataMap) -> Result<String, TelemetryError> {
    let mut values = metadata.get_all(CONSUMER_METADATA_KEY).iter();

    let value = values.next().ok_or_else(|| {
        TelemetryError::Unauthenticated("missing consumer metadata".to_string())
    })?;

    if values.next().is_some() {
        return Err(TelemetryError::Unauthenticated(
            "multiple consumer metadata values".to_string(),
        ));
    }

    value
        .to_str()
        .map(str::to_string)
        .map_err(|_| TelemetryError::Unauthenticated("consumer metadata is not ASCII".to_string()))
}

/// Authorizes calls against the ACL and feeds both hubs.
///
/// Cheap to clone; shared by every in-flight call.
#[derive(Clone, Debug)]
pub struct CallAuthorizer {
    acl: Arc<Acl>,
    log: HubSender,
    stat: HubSender,
    rules: Arc<DispatchRules>,
}

impl CallAuthorizer {
    #[must_use]
    pub fn new(acl: Arc<Acl>, log: HubSender, stat: HubSender, rules: DispatchRules) -> Self {
        Self {
            acl,
            log,
            stat,
            rules: Arc::new(rules),
        }
    }

    /// Identity and ACL check only. No telemetry is emitted.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for bad metadata, `PermissionDenied` on ACL miss.
    pub fn authorize(
        &self,
        metadata: &MetadataMap,
        method: &str,
    ) -> Result<CallEvent, TelemetryError> {
        let consumer = extract_consumer(metadata)?;
        self.acl.check(&consumer, method)?;
        Ok(CallEvent::new(consumer, method))
    }

    /// Hand an authorized event to each hub its method is not exempt from.
    pub async fn emit(&self, event: CallEvent) {
        let to_log = self.rules.emits_to(HubKind::Log, &event.method);
        let to_stat = self.rules.emits_to(HubKind::Stat, &event.method);

        match (to_log, to_stat) {
            (true, true) => {
                self.log.emit(event.clone()).await;
                self.stat.emit(event).await;
            }
            (true, false) => self.log.emit(event).await,
            (false, true) => self.stat.emit(event).await,
            (false, false) => {
                trace!(
                    target: "telemetry.grpc.auth",
                    method = %event.method,
                    "Method exempt from both feeds"
                );
            }
        }
    }

    /// Authorize a call and, on success, emit its event.
    ///
    /// # Errors
    ///
    /// Returns the gRPC status the caller should see on rejection.
    #[instrument(skip_all, name = "telemetry.grpc.admit", fields(method = %method))]
    pub async fn admit(
        &self,
        metadata: &MetadataMap,
        method: &str,
        peer: Option<SocketAddr>,
    ) -> Result<CallEvent, Status> {
        match self.authorize(metadata, method) {
            Ok(event) => {
                metrics::record_call("allowed");
                let event = event.with_peer(peer);
                trace!(
                    target: "telemetry.grpc.auth",
                    consumer = %event.consumer,
                    "Call authorized"
                );
                self.emit(event.clone()).await;
                Ok(event)
            }
            Err(err) => {
                metrics::record_call(err.kind());
                debug!(
                    target: "telemetry.grpc.auth",
                    error = %err,
                    "Call rejected"
                );
                Err(err.into())
            }
        }
    }

    /// Wrap a handler: admit the call, then run `handler` and pass its result
    /// or error through unchanged.
    ///
    /// # Errors
    ///
    /// The rejection status, or whatever the handler returned.
    pub async fn intercept<R, F, Fut>(
        &self,
        metadata: &MetadataMap,
        method: &str,
        handler: F,
    ) -> Result<R, Status>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, Status>>,
    {
        self.admit(metadata, method, None).await?;
        handler().await
    }
}
