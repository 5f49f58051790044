//! Privacy (encryption) protocols for SNMPv3 (RFC 3414, RFC 3826).
//!
//! Salt/IV construction:
//!
//! - DES-CBC: privParameters = engineBoots (4) || counter (4); the IV is the
//!   pre-IV (last 8 bytes of the 16-byte localized key) XOR the salt.
//! - AES-128-CFB: privParameters = 64-bit counter; the IV is
//!   engineBoots (4) || engineTime (4) || salt (8), concatenated.

use std::sync::atomic::{AtomicU64, Ordering};

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb_mode::cipher::AsyncStreamCipher;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AuthProtocol, PrivProtocol, auth};
use crate::error::{DecodeErrorKind, Error, Result};

type DesCbcEnc = cbc::Encryptor<des::Des>;
type DesCbcDec = cbc::Decryptor<des::Des>;
type Aes128CfbEnc = cfb_mode::Encryptor<aes::Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<aes::Aes128>;

/// Monotonic salt source, seeded from OS randomness.
///
/// Sharing one counter per remote engine keeps salts unique across the
/// engine's lifetime, which is what the IV constructions require.
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    /// Create a counter seeded from cryptographic randomness.
    pub fn new() -> Self {
        let mut buf = [0u8; 8];
        // The OS random source not being available is unrecoverable
        getrandom::fill(&mut buf).expect("OS random source");
        Self(AtomicU64::new(u64::from_ne_bytes(buf)))
    }

    /// Next salt value.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SaltCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SaltCounter")
    }
}

/// Localized privacy key.
///
/// Derived with the authentication protocol's hash, then cut to the length
/// the cipher needs. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
}

impl PrivKey {
    /// Derive a privacy key from a password and engine id.
    ///
    /// Uses the auth protocol's password-to-key + localization (RFC 3414
    /// A.2), keeping the first 16 bytes: DES uses 8 key bytes + 8 pre-IV
    /// bytes, AES-128 uses all 16 as the cipher key.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Self {
        let mut master = auth::password_to_key(auth_protocol, password);
        let mut localized = auth::localize_key(auth_protocol, &master, engine_id);
        master.zeroize();
        localized.truncate(protocol.key_len());
        Self {
            key: localized,
            protocol,
        }
    }

    /// The privacy protocol of this key.
    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Encrypt a scoped PDU.
    ///
    /// Returns `(ciphertext, priv_params)` where priv_params is the salt to
    /// carry in msgPrivacyParameters.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: u64,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        match self.protocol {
            PrivProtocol::Des => {
                let mut salt8 = [0u8; 8];
                salt8[..4].copy_from_slice(&engine_boots.to_be_bytes());
                salt8[4..].copy_from_slice(&(salt as u32).to_be_bytes());

                let mut iv = [0u8; 8];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = self.key[8 + i] ^ salt8[i];
                }

                // CBC needs whole blocks; pad with zeros, the BER length
                // inside tells the decoder where the PDU really ends
                let mut buffer = plaintext.to_vec();
                let rem = buffer.len() % 8;
                if rem != 0 {
                    buffer.resize(buffer.len() + (8 - rem), 0);
                }
                let padded_len = buffer.len();

                let cipher = DesCbcEnc::new_from_slices(&self.key[..8], &iv)
                    .map_err(|_| Error::Config("bad DES key/IV length".into()))?;
                let ciphertext = cipher
                    .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
                    .map_err(|_| Error::Config("DES padding".into()))?
                    .to_vec();
                Ok((ciphertext, salt8.to_vec()))
            }
            PrivProtocol::Aes128 => {
                let salt8 = salt.to_be_bytes();

                let mut iv = [0u8; 16];
                iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
                iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
                iv[8..].copy_from_slice(&salt8);

                let mut data = plaintext.to_vec();
                let enc = Aes128CfbEnc::new_from_slices(&self.key, &iv)
                    .map_err(|_| Error::Config("bad AES key/IV length".into()))?;
                enc.encrypt(&mut data);
                Ok((data, salt8.to_vec()))
            }
        }
    }

    /// Decrypt a scoped PDU using the salt from msgPrivacyParameters.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        priv_params: &[u8],
        engine_boots: u32,
        engine_time: u32,
    ) -> Result<Vec<u8>> {
        if priv_params.len() != 8 {
            return Err(Error::decode(0, DecodeErrorKind::BadCiphertext));
        }

        match self.protocol {
            PrivProtocol::Des => {
                if ciphertext.is_empty() || ciphertext.len() % 8 != 0 {
                    return Err(Error::decode(0, DecodeErrorKind::BadCiphertext));
                }

                let mut iv = [0u8; 8];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = self.key[8 + i] ^ priv_params[i];
                }

                let mut buffer = ciphertext.to_vec();
                let cipher = DesCbcDec::new_from_slices(&self.key[..8], &iv)
                    .map_err(|_| Error::decode(0, DecodeErrorKind::BadCiphertext))?;
                let plaintext = cipher
                    .decrypt_padded_mut::<NoPadding>(&mut buffer)
                    .map_err(|_| Error::decode(0, DecodeErrorKind::BadCiphertext))?
                    .to_vec();
                Ok(plaintext)
            }
            PrivProtocol::Aes128 => {
                let mut iv = [0u8; 16];
                iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
                iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
                iv[8..].copy_from_slice(priv_params);

                let mut data = ciphertext.to_vec();
                let dec = Aes128CfbDec::new_from_slices(&self.key, &iv)
                    .map_err(|_| Error::decode(0, DecodeErrorKind::BadCiphertext))?;
                dec.decrypt(&mut data);
                Ok(data)
            }
        }
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
