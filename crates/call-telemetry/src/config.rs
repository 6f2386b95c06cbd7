//! Call telemetry configuration.
//!
//! Configuration is loaded from environment variables. The ACL is parsed at
//! load time so a malformed list fails startup instead of the first call.

use crate::acl::Acl;
use crate::errors::TelemetryError;
use crate::grpc::DispatchRules;
use crate::hub::HubSettings;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default capacity of each hub's inbound queue.
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of each subscriber's delivery queue.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Default delivery timeout before a slow subscriber is evicted.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5000;

/// Methods kept out of the log feed unless overridden.
pub const DEFAULT_LOG_EXEMPT_METHODS: &str = "/main.Admin/Logging";

/// Call telemetry configuration.
#[derive(Clone)]
pub struct Config {
    /// Parsed access control list (`TELEMETRY_ACL`, JSON).
    pub acl: Acl,

    /// Hub inbound queue capacity (default: 1024).
    pub inbound_queue_capacity: usize,

    /// Per-subscriber delivery queue capacity (default: 256).
    pub subscriber_queue_capacity: usize,

    /// Delivery wait before eviction (default: 5s). `None` blocks indefinitely.
    pub delivery_timeout: Option<Duration>,

    /// Methods not emitted to the log hub.
    pub log_exempt_methods: Vec<String>,

    /// Methods not emitted to the stat hub.
    pub stat_exempt_methods: Vec<String>,
}

/// Custom Debug implementation that keeps ACL contents out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("acl_consumers", &self.acl.consumer_count())
            .field("inbound_queue_capacity", &self.inbound_queue_capacity)
            .field("subscriber_queue_capacity", &self.subscriber_queue_capacity)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("log_exempt_methods", &self.log_exempt_methods)
            .field("stat_exempt_methods", &self.stat_exempt_methods)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for TelemetryError {
    fn from(err: ConfigError) -> Self {
        TelemetryError::Config(err.to_string())
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let acl_text = vars
            .get("TELEMETRY_ACL")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEMETRY_ACL".to_string()))?;
        let acl = Acl::from_json(acl_text)
            .map_err(|e| ConfigError::InvalidValue(format!("TELEMETRY_ACL: {e}")))?;

        let inbound_queue_capacity = parse_capacity(
            vars,
            "TELEMETRY_INBOUND_QUEUE_CAPACITY",
            DEFAULT_INBOUND_QUEUE_CAPACITY,
        )?;

        let subscriber_queue_capacity = parse_capacity(
            vars,
            "TELEMETRY_SUBSCRIBER_QUEUE_CAPACITY",
            DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
        )?;

        // 0 disables the timeout: delivery waits as long as it takes
        let delivery_timeout_ms = match vars.get("TELEMETRY_DELIVERY_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!("TELEMETRY_DELIVERY_TIMEOUT_MS: {raw}"))
            })?,
            None => DEFAULT_DELIVERY_TIMEOUT_MS,
        };
        let delivery_timeout =
            (delivery_timeout_ms > 0).then(|| Duration::from_millis(delivery_timeout_ms));

        let log_exempt_methods = parse_list(
            vars.get("TELEMETRY_LOG_EXEMPT_METHODS")
                .map_or(DEFAULT_LOG_EXEMPT_METHODS, String::as_str),
        );

        let stat_exempt_methods = parse_list(
            vars.get("TELEMETRY_STAT_EXEMPT_METHODS")
                .map_or("", String::as_str),
        );

        Ok(Config {
            acl,
            inbound_queue_capacity,
            subscriber_queue_capacity,
            delivery_timeout,
            log_exempt_methods,
            stat_exempt_methods,
        })
    }

    /// Queue sizing and delivery policy shared by both hubs.
    #[must_use]
    pub fn hub_settings(&self) -> HubSettings {
        HubSettings::new(
            self.inbound_queue_capacity,
            self.subscriber_queue_capacity,
            self.delivery_timeout,
        )
    }

    /// Per-method feed exemptions.
    #[must_use]
    pub fn dispatch_rules(&self) -> DispatchRules {
        let rules = self
            .log_exempt_methods
            .iter()
            .fold(DispatchRules::new(), |rules, m| rules.exempt_from_log(m.as_str()));
        self.stat_exempt_methods
            .iter()
            .fold(rules, |rules, m| rules.exempt_from_stat(m.as_str()))
    }
}

fn parse_capacity(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(key) {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(format!("{key}: {raw}"))),
        },
        None => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
