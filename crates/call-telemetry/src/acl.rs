//! Access control list for inbound calls.
//!
//! Maps a consumer identity to the method patterns it may call. A pattern is
//! either an exact fully qualified method (`/pkg.Svc/Get`) or a service
//! wildcard (`/pkg.Svc/*`) granting every method on that one service.
//!
//! The list is built once before the hubs start and is read-only afterwards,
//! so it is shared behind an `Arc` without locking.

use crate::errors::TelemetryError;
use std::collections::HashMap;

/// Path segment that turns a pattern into a service wildcard.
const WILDCARD_SEGMENT: &str = "*";

/// One permitted-method pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodPattern {
    /// Matches exactly this method name.
    Exact(String),
    /// Matches every method whose service prefix equals this one.
    Service(String),
}

impl MethodPattern {
    /// Parse a pattern string from the ACL source.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.rsplit_once('/') {
            Some((service, WILDCARD_SEGMENT)) if !service.is_empty() => {
                MethodPattern::Service(service.to_string())
            }
            _ => MethodPattern::Exact(raw.to_string()),
        }
    }

    /// Whether this pattern grants `method`.
    #[must_use]
    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodPattern::Exact(exact) => exact == method,
            MethodPattern::Service(service) => match method.rsplit_once('/') {
                Some((method_service, name)) => !name.is_empty() && method_service == service,
                None => false,
            },
        }
    }
}

/// Immutable consumer -> permitted methods mapping.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    entries: HashMap<String, Vec<MethodPattern>>,
}

impl Acl {
    /// Build from an already parsed mapping.
    #[must_use]
    pub fn from_map(raw: HashMap<String, Vec<String>>) -> Self {
        let entries = raw
            .into_iter()
            .map(|(consumer, patterns)| {
                let patterns = patterns.iter().map(|p| MethodPattern::parse(p)).collect();
                (consumer, patterns)
            })
            .collect();
        Self { entries }
    }

    /// Parse the JSON form: an object of consumer -> array of pattern strings.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::AclParse` if the text is not such an object.
    pub fn from_json(text: &str) -> Result<Self, TelemetryError> {
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(text).map_err(|e| TelemetryError::AclParse(e.to_string()))?;
        Ok(Self::from_map(raw))
    }

    /// Whether `consumer` may call `method`. Unknown consumers are denied.
    #[must_use]
    pub fn is_allowed(&self, consumer: &str, method: &str) -> bool {
        self.entries
            .get(consumer)
            .is_some_and(|patterns| patterns.iter().any(|p| p.matches(method)))
    }

    /// Check access, returning a permission error on denial.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::PermissionDenied` if no pattern matches.
    pub fn check(&self, consumer: &str, method: &str) -> Result<(), TelemetryError> {
        if self.is_allowed(consumer, method) {
            Ok(())
        } else {
            Err(TelemetryError::PermissionDenied {
                consumer: consumer.to_string(),
                method: method.to_string(),
            })
        }
    }

    /// Number of consumers with an entry.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.entries.len()
    }
}
