//! USM security parameters (RFC 3414).
//!
//! Carried in the v3 message header as an OCTET STRING wrapping a
//! BER-encoded SEQUENCE:
//!
//! ```text
//! UsmSecurityParameters ::= SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
//!     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
//!     msgUserName                  OCTET STRING (SIZE(0..32)),
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};

/// USM security parameters.
#[derive(Debug, Clone)]
pub struct UsmSecurityParams {
    /// Authoritative engine id.
    pub engine_id: Bytes,
    /// Engine boot count.
    pub engine_boots: u32,
    /// Engine time (seconds since last boot).
    pub engine_time: u32,
    /// Security (user) name.
    pub username: Bytes,
    /// Authentication parameters (truncated HMAC, or empty).
    pub auth_params: Bytes,
    /// Privacy parameters (salt, or empty).
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    /// Empty parameters, as sent in discovery requests.
    pub fn empty() -> Self {
        Self {
            engine_id: Bytes::new(),
            engine_boots: 0,
            engine_time: 0,
            username: Bytes::new(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    /// Encode to a standalone BER blob.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_unsigned32(crate::ber::tag::INTEGER, self.engine_time);
            buf.push_unsigned32(crate::ber::tag::INTEGER, self.engine_boots);
            buf.push_octet_string(&self.engine_id);
        });
        buf.finish()
    }

    /// Decode from a BER blob.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let engine_id = seq.read_octet_string()?;

        // RFC 3414 bounds both counters to 0..2^31-1
        let raw_boots = seq.read_integer()?;
        let raw_time = seq.read_integer()?;
        if raw_boots < 0 || raw_time < 0 {
            return Err(Error::decode(
                seq.offset(),
                DecodeErrorKind::InvalidEngineField,
            ));
        }

        let username = seq.read_octet_string()?;
        let auth_params = seq.read_octet_string()?;
        let priv_params = seq.read_octet_string()?;

        Ok(Self {
            engine_id,
            engine_boots: raw_boots as u32,
            engine_time: raw_time as u32,
            username,
            auth_params,
            priv_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let params = UsmSecurityParams {
            engine_id: Bytes::from_static(b"engine-xyz"),
            engine_boots: 42,
            engine_time: 123456,
            username: Bytes::from_static(b"admin"),
            auth_params: Bytes::from_static(&[0u8; 12]),
            priv_params: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
        };

        let decoded = UsmSecurityParams::decode(params.encode()).unwrap();
        assert_eq!(decoded.engine_id, params.engine_id);
        assert_eq!(decoded.engine_boots, 42);
        assert_eq!(decoded.engine_time, 123456);
        assert_eq!(decoded.username, params.username);
        assert_eq!(decoded.auth_params, params.auth_params);
        assert_eq!(decoded.priv_params, params.priv_params);
    }

    #[test]
    fn empty_roundtrip() {
        let decoded = UsmSecurityParams::decode(UsmSecurityParams::empty().encode()).unwrap();
        assert!(decoded.engine_id.is_empty());
        assert_eq!(decoded.engine_boots, 0);
        assert_eq!(decoded.engine_time, 0);
    }

    #[test]
    fn negative_boots_rejected() {
        // SEQ { "" , -1, 0, "", "", "" }
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(b"");
            buf.push_octet_string(b"");
            buf.push_octet_string(b"");
            buf.push_unsigned32(crate::ber::tag::INTEGER, 0);
            buf.push_integer(-1);
            buf.push_octet_string(b"");
        });
        assert!(UsmSecurityParams::decode(buf.finish()).is_err());
    }
}
