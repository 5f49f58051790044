//! Authentication key derivation and HMAC operations (RFC 3414).
//!
//! Password-to-key runs the 1MB expansion from RFC 3414 A.2, then the key
//! is localized to the authoritative engine id. MACs are truncated per
//! protocol (96 bits for MD5/SHA-1, 192 bits for SHA-256).

use digest::Digest;
use hmac::{Hmac, Mac};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;

/// Localized authentication key.
///
/// Derived from a password and bound to a specific engine id. Key material
/// is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive a localized key from a password and engine id (RFC 3414 A.2).
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        let mut master = password_to_key(protocol, password);
        let key = localize_key(protocol, &master, engine_id);
        master.zeroize();
        Self { key, protocol }
    }

    /// The protocol this key is for.
    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Truncated MAC length for this key's protocol.
    pub fn mac_len(&self) -> usize {
        self.protocol.mac_len()
    }

    /// Compute the truncated HMAC over a message.
    pub fn compute_hmac(&self, data: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length, so new_from_slice cannot fail
        let mut full = match self.protocol {
            AuthProtocol::Md5 => {
                let mut mac =
                    Hmac::<md5::Md5>::new_from_slice(&self.key).expect("HMAC key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            AuthProtocol::Sha1 => {
                let mut mac =
                    Hmac::<sha1::Sha1>::new_from_slice(&self.key).expect("HMAC key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            AuthProtocol::Sha256 => {
                let mut mac =
                    Hmac::<sha2::Sha256>::new_from_slice(&self.key).expect("HMAC key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        full.truncate(self.protocol.mac_len());
        full
    }

    /// Verify a truncated HMAC in constant time.
    pub fn verify_hmac(&self, data: &[u8], expected: &[u8]) -> bool {
        if expected.len() != self.protocol.mac_len() {
            return false;
        }
        let computed = self.compute_hmac(data);
        computed.ct_eq(expected).into()
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Password-to-key transformation (RFC 3414 Section A.2.1).
///
/// Hashes a 1MB stream produced by repeating the password.
pub fn password_to_key(protocol: AuthProtocol, password: &[u8]) -> Vec<u8> {
    match protocol {
        AuthProtocol::Md5 => password_to_key_impl::<md5::Md5>(password),
        AuthProtocol::Sha1 => password_to_key_impl::<sha1::Sha1>(password),
        AuthProtocol::Sha256 => password_to_key_impl::<sha2::Sha256>(password),
    }
}

fn password_to_key_impl<D: Digest>(password: &[u8]) -> Vec<u8> {
    const EXPANSION_SIZE: usize = 1_048_576;

    let mut hasher = D::new();

    if password.is_empty() {
        // Degenerate but accepted: hash of nothing
        return hasher.finalize().to_vec();
    }

    let mut produced = 0;
    while produced < EXPANSION_SIZE {
        let take = password.len().min(EXPANSION_SIZE - produced);
        hasher.update(&password[..take]);
        produced += take;
    }

    hasher.finalize().to_vec()
}

/// Key localization (RFC 3414 Section 2.6): H(master || engine_id || master).
pub fn localize_key(protocol: AuthProtocol, master: &[u8], engine_id: &[u8]) -> Vec<u8> {
    fn localize<D: Digest>(master: &[u8], engine_id: &[u8]) -> Vec<u8> {
        let mut hasher = D::new();
        hasher.update(master);
        hasher.update(engine_id);
        hasher.update(master);
        hasher.finalize().to_vec()
    }

    match protocol {
        AuthProtocol::Md5 => localize::<md5::Md5>(master, engine_id),
        AuthProtocol::Sha1 => localize::<sha1::Sha1>(master, engine_id),
        AuthProtocol::Sha256 => localize::<sha2::Sha256>(master, engine_id),
    }
}
