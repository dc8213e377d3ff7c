// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::fmt;

/// Error code string reported by the gateway in an error-code record
/// (e.g. an outdoor unit fault such as "U4").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayErrorCode(pub String);

impl GatewayErrorCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An all-blank or empty code means the fault has cleared.
    pub fn is_cleared(&self) -> bool {
        self.0.trim_matches(|c: char| c == '\0' || c.is_whitespace()).is_empty()
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cleared() {
            write!(f, "(cleared)")
        } else {
            write!(f, "{}", self.0.trim_end_matches('\0'))
        }
    }
}

/// All errors that can occur in the dsair-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum DsAirError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    /// Bad magic byte or tail marker. The stream has no resync marker, so the
    /// connection must be dropped.
    #[error("Malformed frame: {details}")]
    MalformedFrame { details: String },

    /// A record body ended before all announced fields were read.
    #[error("Truncated {record} record: needed {needed} bytes, {remaining} left")]
    Truncated {
        record: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A field carried a value outside its closed vocabulary.
    #[error("Invalid {field} value: {value}")]
    InvalidField { field: &'static str, value: u32 },

    #[error("Invalid UTF-8 in {field}")]
    InvalidText { field: &'static str },

    #[error("Command timeout: seq={sequence} {command}")]
    CommandTimeout { sequence: u32, command: String },

    #[error("Unknown device: {key}")]
    UnknownDevice { key: String },

    #[error("Gateway not ready")]
    NotReady,

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Channel closed")]
    ChannelClosed,
}

impl DsAirError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DsAirError::Io(_)
                | DsAirError::ConnectionTimeout
                | DsAirError::MalformedFrame { .. }
                | DsAirError::CommandTimeout { .. }
                | DsAirError::NotReady
                | DsAirError::Disconnected
                | DsAirError::ChannelClosed
        )
    }

    /// Whether this error only affects one record and decoding can continue.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            DsAirError::Truncated { .. }
                | DsAirError::InvalidField { .. }
                | DsAirError::InvalidText { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DsAirError>;
