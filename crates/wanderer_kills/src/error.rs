//! Error types for the kill pipeline

use thiserror::Error;

/// Reasons a killmail payload cannot be turned into a [`crate::Killmail`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("zkillboard format not supported")]
    ZkillboardFormatNotSupported,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<&'static str>),

    #[error("invalid field types: {0}")]
    InvalidFieldTypes(String),

    #[error("invalid format")]
    InvalidFormat,
}

impl AdapterError {
    /// Stable reason code used in logs and counters.
    pub fn reason(&self) -> &'static str {
        match self {
            AdapterError::ZkillboardFormatNotSupported => "zkillboard_format_not_supported",
            AdapterError::MissingRequiredFields(_) => "missing_required_fields",
            AdapterError::InvalidFieldTypes(_) => "invalid_field_types",
            AdapterError::InvalidFormat => "invalid_format",
        }
    }
}

/// Failures of an external name lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("entity not found")]
    NotFound,

    #[error("lookup timed out")]
    Timeout,

    #[error("lookup failed with HTTP status {status}")]
    Http { status: u16 },

    #[error("lookup failed permanently: {0}")]
    Permanent(String),
}

impl LookupError {
    /// Timeouts, throttling and server-side errors are worth another try.
    pub fn is_retriable(&self) -> bool {
        match self {
            LookupError::Timeout => true,
            LookupError::Http { status } => *status == 429 || (500..600).contains(status),
            LookupError::NotFound | LookupError::Permanent(_) => false,
        }
    }
}

/// Kill timestamp problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("kill time missing")]
    Missing,

    #[error("unparseable kill time {0:?}")]
    Invalid(String),
}

/// Why a payload was not stored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("adaptation failed: {0}")]
    Adapter(#[from] AdapterError),
}

/// Kill feed transport errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to connect to kill feed {0}: {1}")]
    Connect(String, String),

    #[error("Kill feed connection closed")]
    Closed,

    #[error("Kill feed protocol error: {0}")]
    Protocol(String),

    #[error("Failed to encode kill feed message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes() {
        assert_eq!(
            AdapterError::MissingRequiredFields(vec!["victim"]).reason(),
            "missing_required_fields"
        );
        assert_eq!(
            AdapterError::MissingRequiredFields(vec!["killmail_id", "victim"]).to_string(),
            "missing required fields: killmail_id, victim"
        );
    }

    #[test]
    fn retriable_lookup_errors() {
        assert!(LookupError::Timeout.is_retriable());
        assert!(LookupError::Http { status: 503 }.is_retriable());
        assert!(LookupError::Http { status: 429 }.is_retriable());
        assert!(!LookupError::Http { status: 404 }.is_retriable());
        assert!(!LookupError::NotFound.is_retriable());
    }
}
