//! Event Records
//!
//! The structured event produced by every successful tick. Records are built
//! by [`EventFactory`](crate::factory::EventFactory) from backend output and
//! are immutable afterwards: they are persisted and broadcast, then dropped.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "timestamp": "2026-01-01T12:00:00Z",
//!   "code": "PAY-4021",
//!   "category": "PAYMENT",
//!   "location": "checkout/payment_gateway.rs:142",
//!   "service": "payment-service",
//!   "correlationId": "7c0f7b3e-7d3a-4c55-9a53-2f1a7a4b9e10",
//!   "orderId": "5a8f2e61-1b7c-4d0e-8f63-6c2d9b1e4a77",
//!   "message": "Card authorization declined by issuer",
//!   "stackTrace": "PaymentDeclined at ..."
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed set of event categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Payment authorization, capture and refund failures
    Payment,
    /// Stock reservation and catalog failures
    Inventory,
    /// Login, token and session failures
    Authentication,
    /// Query, connection pool and migration failures
    Database,
    /// Timeouts, DNS and upstream connectivity failures
    Network,
    /// Rejected input and schema violations
    Validation,
    /// Fulfilment and carrier failures
    Shipping,
    /// Third-party integration failures
    Integration,
}

impl ErrorCategory {
    /// Every category, in declaration order
    pub const ALL: [ErrorCategory; 8] = [
        Self::Payment,
        Self::Inventory,
        Self::Authentication,
        Self::Database,
        Self::Network,
        Self::Validation,
        Self::Shipping,
        Self::Integration,
    ];

    /// Wire name of the category
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::Inventory => "INVENTORY",
            Self::Authentication => "AUTHENTICATION",
            Self::Database => "DATABASE",
            Self::Network => "NETWORK",
            Self::Validation => "VALIDATION",
            Self::Shipping => "SHIPPING",
            Self::Integration => "INTEGRATION",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown category: {wanted}"))
    }
}

/// A generated event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// When the event supposedly happened
    pub timestamp: DateTime<Utc>,
    /// Application error code (e.g. `PAY-4021`)
    pub code: String,
    /// Event category
    pub category: ErrorCategory,
    /// Source location (file, module or endpoint)
    pub location: String,
    /// Emitting service name
    pub service: String,
    /// Request correlation identifier (UUID v4)
    pub correlation_id: Uuid,
    /// Order identifier (UUID v4)
    pub order_id: Uuid,
    /// Human-readable message
    pub message: String,
    /// Stack trace text
    pub stack_trace: String,
}

impl EventRecord {
    /// Identifiers that are not version 4 UUIDs, by field name
    #[must_use]
    pub fn non_v4_identifiers(&self) -> Vec<&'static str> {
        let mut bad = Vec::new();
        if self.correlation_id.get_version_num() != 4 {
            bad.push("correlationId");
        }
        if self.order_id.get_version_num() != 4 {
            bad.push("orderId");
        }
        bad
    }
}

/// An event read back from storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Storage-assigned row id
    pub id: i64,
    /// When the store accepted the event
    pub received_at: DateTime<Utc>,
    /// The event itself
    pub event: EventRecord,
}

#[cfg(test)]
pub(crate) fn sample_record() -> EventRecord {
    EventRecord {
        timestamp: Utc::now(),
        code: "PAY-4021".to_string(),
        category: ErrorCategory::Payment,
        location: "checkout/payment_gateway.rs:142".to_string(),
        service: "payment-service".to_string(),
        correlation_id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        message: "Card authorization declined by issuer".to_string(),
        stack_trace: "PaymentDeclined\n  at authorize (payment_gateway.rs:142)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names() {
        let json = serde_json::to_string(&ErrorCategory::Authentication).unwrap();
        assert_eq!(json, "\"AUTHENTICATION\"");

        let parsed: ErrorCategory = serde_json::from_str("\"SHIPPING\"").unwrap();
        assert_eq!(parsed, ErrorCategory::Shipping);
    }

    #[test]
    fn test_category_from_str_is_case_insensitive() {
        assert_eq!("network".parse::<ErrorCategory>(), Ok(ErrorCategory::Network));
        assert!("weather".parse::<ErrorCategory>().is_err());
    }

    #[test]
    fn test_record_uses_camel_case() {
        let value = serde_json::to_value(sample_record()).unwrap();
        assert!(value.get("correlationId").is_some());
        assert!(value.get("stackTrace").is_some());
        assert!(value.get("stack_trace").is_none());
    }

    #[test]
    fn test_non_v4_identifiers() {
        let mut record = sample_record();
        assert!(record.non_v4_identifiers().is_empty());

        record.order_id = Uuid::nil();
        assert_eq!(record.non_v4_identifiers(), vec!["orderId"]);
    }
}
