//! SNMPv3 User-based Security Model (RFC 3414).
//!
//! - USM security parameter encoding/decoding
//! - Key localization (password-to-key derivation)
//! - Authentication (HMAC-MD5-96, HMAC-SHA-96, HMAC-SHA-256)
//! - Privacy (DES-CBC, AES-128-CFB)
//! - The per-remote authoritative engine state the client discovers and
//!   keeps in sync

pub mod auth;
mod engine;
mod privacy;
mod usm;

pub use auth::LocalizedKey;
pub use engine::{DISCOVERY_OID, RemoteEngine, ReportClass, classify_report};
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;

use bytes::Bytes;

/// Authentication protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
    /// HMAC-SHA-256 (RFC 7860)
    Sha256,
}

impl AuthProtocol {
    /// Digest output length in bytes; also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Truncated MAC length carried in msgAuthenticationParameters.
    pub fn mac_len(self) -> usize {
        match self {
            Self::Md5 | Self::Sha1 => 12,
            Self::Sha256 => 24,
        }
    }
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
            Self::Sha256 => write!(f, "SHA-256"),
        }
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414 Section 8)
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes128,
}

impl PrivProtocol {
    /// Localized key material required, in bytes.
    pub fn key_len(self) -> usize {
        // DES needs 8 key bytes + 8 pre-IV bytes
        16
    }
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes128 => write!(f, "AES"),
        }
    }
}

/// Remote login/password specification for SNMPv3.
///
/// Structural equality drives session replacement: whenever the credentials
/// for a remote change, the cached engine state is discarded and discovery
/// restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsmCredentials {
    /// Security (user) name.
    pub security_name: Bytes,
    /// Authentication protocol and password.
    pub auth: Option<(AuthProtocol, String)>,
    /// Privacy protocol and password. Requires `auth`.
    pub privacy: Option<(PrivProtocol, String)>,
}

impl UsmCredentials {
    /// Create credentials with no authentication (noAuthNoPriv).
    pub fn new(security_name: impl Into<Bytes>) -> Self {
        Self {
            security_name: security_name.into(),
            auth: None,
            privacy: None,
        }
    }

    /// Add authentication.
    pub fn auth(mut self, protocol: AuthProtocol, password: impl Into<String>) -> Self {
        self.auth = Some((protocol, password.into()));
        self
    }

    /// Add privacy (encryption). Only honored when authentication is set.
    pub fn privacy(mut self, protocol: PrivProtocol, password: impl Into<String>) -> Self {
        self.privacy = Some((protocol, password.into()));
        self
    }

    /// Security level flags implied by the configured protocols.
    pub fn requires_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Whether messages are encrypted.
    pub fn requires_privacy(&self) -> bool {
        self.auth.is_some() && self.privacy.is_some()
    }
}
