//! Error types for snmp-query.
//!
//! One [`Error`] enum covers every failure the engine can surface. Failures
//! are always delivered through a query's stream or failure callback; a bad
//! datagram never tears down the engine, and per-query errors never leak to
//! other in-flight queries.

use std::net::SocketAddr;
use std::time::Duration;

use crate::oid::Oid;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// Expected different tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data truncated unexpectedly.
    TruncatedData,
    /// Indefinite length not supported.
    IndefiniteLength,
    /// Length field too long or exceeding message bounds.
    InvalidLength,
    /// Zero-length integer.
    ZeroLengthInteger,
    /// Integer value overflow.
    IntegerOverflow,
    /// Unknown SNMP version.
    UnknownVersion(i32),
    /// Unknown PDU type tag.
    UnknownPduType(u8),
    /// Unknown security model.
    UnknownSecurityModel(i32),
    /// msgFlags declared privacy without authentication.
    InvalidMsgFlags,
    /// Security name in response differs from the configured one.
    UsernameMismatch,
    /// Engine boots/time outside the RFC 3414 value range.
    InvalidEngineField,
    /// HMAC verification failed.
    BadDigest,
    /// Decryption produced garbage.
    BadCiphertext,
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version: {}", v),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model: {}", m),
            Self::InvalidMsgFlags => write!(f, "invalid msgFlags: privacy without authentication"),
            Self::UsernameMismatch => write!(f, "security name mismatch in response"),
            Self::InvalidEngineField => write!(f, "engine boots/time out of range"),
            Self::BadDigest => write!(f, "HMAC verification failed"),
            Self::BadCiphertext => write!(f, "decryption failed"),
        }
    }
}

/// OID validation error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OidErrorKind {
    /// Invalid arc value in a dotted string.
    InvalidArc,
    /// OID has too many arcs (exceeds MAX_OID_LEN).
    TooManyArcs { count: usize, max: usize },
    /// Subidentifier overflow during decoding.
    SubidentifierOverflow,
    /// Truncated base-128 subidentifier.
    Truncated,
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArc => write!(f, "invalid arc value"),
            Self::TooManyArcs { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
            Self::SubidentifierOverflow => write!(f, "subidentifier overflow"),
            Self::Truncated => write!(f, "truncated subidentifier"),
        }
    }
}

/// The main error type for all snmp-query operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error during network communication.
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {}", t)).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// No response arrived within the configured budget.
    #[error("Timeout [{elapsed:?}] requesting: {target} {oid}")]
    Timeout {
        target: SocketAddr,
        elapsed: Duration,
        oid: Oid,
    },

    /// SNMPv3 authentication failed for this remote.
    #[error("Authentication failed{}", target.map(|t| format!(": {}", t)).unwrap_or_default())]
    AuthenticationFailed { target: Option<SocketAddr> },

    /// Invalid OID format.
    #[error("invalid OID{}: {kind}", input.as_deref().map(|i| format!(" {:?}", i)).unwrap_or_default())]
    InvalidOid {
        kind: OidErrorKind,
        input: Option<Box<str>>,
    },

    /// BER decoding error.
    #[error("decode error at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// The engine was closed while the query was in flight.
    #[error("Closed")]
    Closed,

    /// Configuration error (bad bind address, incompatible protocols).
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a decode error.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Decode { offset, kind }
    }

    /// Create an invalid OID error from a kind (no input string).
    pub fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind, input: None }
    }

    /// Create an invalid OID error with the input string that failed.
    pub fn invalid_oid_with_input(kind: OidErrorKind, input: impl Into<Box<str>>) -> Self {
        Self::InvalidOid {
            kind,
            input: Some(input.into()),
        }
    }

    /// Check whether this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn timeout_display_names_target_and_oid() {
        let e = Error::Timeout {
            target: "127.0.0.1:161".parse().unwrap(),
            elapsed: Duration::from_secs(5),
            oid: oid!(1, 1, 1),
        };
        let s = e.to_string();
        assert!(s.starts_with("Timeout"), "{s}");
        assert!(s.contains("127.0.0.1:161"), "{s}");
        assert!(s.contains("1.1.1"), "{s}");
    }

    #[test]
    fn closed_is_terse() {
        assert_eq!(Error::Closed.to_string(), "Closed");
    }
}
