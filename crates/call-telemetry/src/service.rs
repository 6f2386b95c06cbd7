//! Subscription lifecycle: owns both hubs and the shutdown signal.
//!
//! `TelemetryService` is the single owner of the log hub, the stat hub and the
//! root cancellation token. RPC handlers call [`TelemetryService::attach_log`]
//! or [`TelemetryService::attach_stat`] to open a feed; the server wraps its
//! routes with the [`CallAuthorizer`] it hands out.
//!
//! Shutdown is a one-way, idempotent transition. The first call cancels the
//! root token; each hub finishes the broadcast in flight, closes every
//! subscriber queue and stops. Later calls are no-ops. Attach fails with
//! `ShuttingDown` from the moment shutdown starts.

use crate::acl::Acl;
use crate::config::Config;
use crate::errors::TelemetryError;
use crate::grpc::{CallAuthorizer, DispatchRules};
use crate::hub::{Hub, HubKind, HubSettings};
use crate::subscription::{
    window_from_secs, LogSubscription, StatSubscription, Subscription, SubscriptionKind,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Owner of the telemetry hubs.
///
/// Must be created inside a Tokio runtime; both dispatch loops are spawned on
/// construction. Dropping the service shuts it down.
pub struct TelemetryService {
    acl: Arc<Acl>,
    log_hub: Hub,
    stat_hub: Hub,
    rules: DispatchRules,
    cancel_token: CancellationToken,
    /// Whether shutdown has started.
    is_shut_down: AtomicBool,
}

impl TelemetryService {
    /// Spawn both hubs with the given policy.
    #[must_use]
    pub fn new(acl: Acl, settings: HubSettings, rules: DispatchRules) -> Self {
        let cancel_token = CancellationToken::new();
        let log_hub = Hub::spawn(HubKind::Log, settings, cancel_token.child_token());
        let stat_hub = Hub::spawn(HubKind::Stat, settings, cancel_token.child_token());

        info!(
            target: "telemetry.service",
            consumers = acl.consumer_count(),
            inbound_capacity = settings.inbound_capacity,
            subscriber_capacity = settings.subscriber_capacity,
            delivery_timeout = ?settings.delivery_timeout,
            "Telemetry service started"
        );

        Self {
            acl: Arc::new(acl),
            log_hub,
            stat_hub,
            rules,
            cancel_token,
            is_shut_down: AtomicBool::new(false),
        }
    }

    /// Build from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.acl.clone(),
            config.hub_settings(),
            config.dispatch_rules(),
        )
    }

    /// Load configuration from the environment and build.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Config` if the environment is incomplete or
    /// malformed.
    pub fn from_env() -> Result<Self, TelemetryError> {
        let config = Config::from_env()?;
        debug!(target: "telemetry.service", config = ?config, "Configuration loaded");
        Ok(Self::from_config(&config))
    }

    /// Authorizer feeding this service's hubs. Clone freely.
    #[must_use]
    pub fn authorizer(&self) -> CallAuthorizer {
        CallAuthorizer::new(
            Arc::clone(&self.acl),
            self.log_hub.sender(),
            self.stat_hub.sender(),
            self.rules.clone(),
        )
    }

    /// Access list shared with every authorizer this service hands out.
    #[must_use]
    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    /// Open a subscription of the requested kind.
    ///
    /// # Errors
    ///
    /// - `InvalidWindow` for a stat window under one second
    /// - `ShuttingDown` once shutdown has started
    #[instrument(skip_all, name = "telemetry.service.attach", fields(kind = ?kind))]
    pub async fn attach(&self, kind: SubscriptionKind) -> Result<Subscription, TelemetryError> {
        match kind {
            SubscriptionKind::Log => self.attach_log().await.map(Subscription::Log),
            SubscriptionKind::Stat { window_secs } => {
                self.attach_stat(window_secs).await.map(Subscription::Stat)
            }
        }
    }

    /// Open a raw event log feed.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::ShuttingDown` once shutdown has started.
    pub async fn attach_log(&self) -> Result<LogSubscription, TelemetryError> {
        self.ensure_running()?;
        let receiver = self.log_hub.attach().await?;
        Ok(LogSubscription::new(receiver))
    }

    /// Open a statistics feed reporting every `window_secs` seconds.
    ///
    /// # Errors
    ///
    /// `InvalidWindow` below one second, `ShuttingDown` once shutdown has
    /// started.
    pub async fn attach_stat(&self, window_secs: u64) -> Result<StatSubscription, TelemetryError> {
        let window = window_from_secs(window_secs)?;
        self.ensure_running()?;
        let receiver = self.stat_hub.attach().await?;
        Ok(StatSubscription::new(receiver, window))
    }

    /// Current subscriber count on one hub.
    pub async fn subscriber_count(&self, hub: HubKind) -> usize {
        match hub {
            HubKind::Log => self.log_hub.subscriber_count().await,
            HubKind::Stat => self.stat_hub.subscriber_count().await,
        }
    }

    /// Start shutdown. Returns `true` for the call that started it, `false`
    /// for every later call.
    pub fn shutdown(&self) -> bool {
        if self.is_shut_down.swap(true, Ordering::SeqCst) {
            debug!(target: "telemetry.service", "Shutdown already in progress");
            return false;
        }

        info!(target: "telemetry.service", "Telemetry service shutting down");
        self.cancel_token.cancel();
        true
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down.load(Ordering::SeqCst)
    }

    /// Wait until both hubs have closed every subscriber and stopped.
    ///
    /// Only returns after [`shutdown`](Self::shutdown) has been called.
    pub async fn wait_closed(&self) {
        tokio::join!(self.log_hub.stopped(), self.stat_hub.stopped());
        debug!(target: "telemetry.service", "All hubs stopped");
    }

    /// Shut down when `token` is cancelled, e.g. the server's signal token.
    ///
    /// The spawned task holds only a weak handle, so it never keeps the
    /// service alive. It exits early if the service shuts down or is dropped
    /// first.
    pub fn shutdown_on(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        let own_token = self.cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    if let Some(service) = service.upgrade() {
                        service.shutdown();
                    }
                }
                () = own_token.cancelled() => {}
            }
        })
    }

    fn ensure_running(&self) -> Result<(), TelemetryError> {
        if self.is_shut_down() {
            return Err(TelemetryError::ShuttingDown);
        }
        Ok(())
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
