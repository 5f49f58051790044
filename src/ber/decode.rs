//! BER decoding.
//!
//! Zero-copy decoding over `Bytes`. Sub-decoders carve out constructed
//! contents by declared length so a hostile inner length can never escape
//! its container.

use super::{decode_length, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use bytes::Bytes;

/// BER decoder that reads from a byte buffer.
pub struct Decoder {
    data: Bytes,
    offset: usize,
    /// Offset of `data` within the original datagram, for error reporting
    /// and for locating fields in the raw message.
    base: usize,
}

impl Decoder {
    /// Create a new decoder from bytes.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            offset: 0,
            base: 0,
        }
    }

    /// Offset from the start of the original datagram.
    pub fn offset(&self) -> usize {
        self.base + self.offset
    }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Check if all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.offset)
            .ok_or_else(|| Error::decode(self.offset(), DecodeErrorKind::TruncatedData))?;
        self.offset += 1;
        Ok(byte)
    }

    /// Read a tag byte.
    pub fn read_tag(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Read a length field.
    pub fn read_length(&mut self) -> Result<usize> {
        let (len, consumed) = decode_length(&self.data[self.offset..], self.offset())?;
        self.offset += consumed;
        if len > self.remaining() {
            return Err(Error::decode(self.offset(), DecodeErrorKind::InvalidLength));
        }
        Ok(len)
    }

    /// Read raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(Error::decode(self.offset(), DecodeErrorKind::TruncatedData));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Skip bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(Error::decode(self.offset(), DecodeErrorKind::TruncatedData));
        }
        self.offset += len;
        Ok(())
    }

    /// Read and expect a specific tag, returning the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let actual = self.read_tag()?;
        if actual != expected {
            return Err(Error::decode(
                self.offset() - 1,
                DecodeErrorKind::UnexpectedTag { expected, actual },
            ));
        }
        self.read_length()
    }

    /// Carve out a sub-decoder over the next `len` bytes.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let base = self.offset();
        let data = self.read_bytes(len)?;
        Ok(Decoder {
            data,
            offset: 0,
            base,
        })
    }

    /// Read a SEQUENCE header and return a decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        let len = self.expect_tag(tag::SEQUENCE)?;
        self.sub_decoder(len)
    }

    /// Read a BER INTEGER (signed).
    pub fn read_integer(&mut self) -> Result<i32> {
        let len = self.expect_tag(tag::INTEGER)?;
        self.read_integer_value(len)
    }

    /// Read a signed integer value given the content length.
    pub fn read_integer_value(&mut self, len: usize) -> Result<i32> {
        if len == 0 {
            return Err(Error::decode(
                self.offset(),
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        if len > 4 {
            // Permissive: truncate to the low 4 bytes, matching net-snmp
            tracing::warn!(target: "snmp_query::ber", length = len, "integer too long, truncating");
        }

        let bytes = self.read_bytes(len)?;

        let mut value: i32 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for &byte in bytes.iter().take(4) {
            value = (value << 8) | (byte as i32);
        }

        Ok(value)
    }

    /// Read an unsigned 32-bit value given the content length.
    ///
    /// Accepts the leading zero byte emitted for values with the high bit set.
    pub fn read_unsigned32_value(&mut self, len: usize) -> Result<u32> {
        if len == 0 {
            return Err(Error::decode(
                self.offset(),
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        let bytes = self.read_bytes(len)?;
        let mut iter = bytes.iter().copied();
        if len > 4 {
            // Leading zeros are fine; anything else overflows
            for _ in 0..len - 4 {
                if iter.next() != Some(0) {
                    return Err(Error::decode(
                        self.offset(),
                        DecodeErrorKind::IntegerOverflow,
                    ));
                }
            }
        }
        let mut value: u32 = 0;
        for byte in iter {
            value = (value << 8) | (byte as u32);
        }
        Ok(value)
    }

    /// Read an unsigned 64-bit value given the content length (Counter64).
    pub fn read_unsigned64_value(&mut self, len: usize) -> Result<u64> {
        if len == 0 {
            return Err(Error::decode(
                self.offset(),
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        let bytes = self.read_bytes(len)?;
        let mut iter = bytes.iter().copied();
        if len > 8 {
            for _ in 0..len - 8 {
                if iter.next() != Some(0) {
                    return Err(Error::decode(
                        self.offset(),
                        DecodeErrorKind::IntegerOverflow,
                    ));
                }
            }
        }
        let mut value: u64 = 0;
        for byte in iter {
            value = (value << 8) | (byte as u64);
        }
        Ok(value)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<crate::oid::Oid> {
        let len = self.expect_tag(tag::OBJECT_IDENTIFIER)?;
        let data = self.read_bytes(len)?;
        crate::oid::Oid::from_ber(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::EncodeBuf;

    #[test]
    fn truncated_sequence_rejected() {
        // SEQUENCE claiming 16 bytes but only 2 present
        let mut d = Decoder::new(Bytes::from_static(&[0x30, 0x10, 0x02, 0x01]));
        assert!(d.read_sequence().is_err());
    }

    #[test]
    fn unexpected_tag_names_both() {
        let mut d = Decoder::new(Bytes::from_static(&[0x04, 0x00]));
        let err = d.read_integer().unwrap_err();
        match err {
            Error::Decode {
                kind: DecodeErrorKind::UnexpectedTag { expected, actual },
                ..
            } => {
                assert_eq!(expected, tag::INTEGER);
                assert_eq!(actual, tag::OCTET_STRING);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sub_decoder_bounds_inner_reads() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| buf.push_integer(7));
        let mut outer = Decoder::new(buf.finish());
        let mut inner = outer.read_sequence().unwrap();
        assert_eq!(inner.read_integer().unwrap(), 7);
        assert!(inner.is_empty());
        assert!(outer.is_empty());
    }

    #[test]
    fn unsigned_roundtrip_via_value_len() {
        let mut buf = EncodeBuf::new();
        buf.push_unsigned32(tag::COUNTER32, 3_000_000_000);
        let mut d = Decoder::new(buf.finish());
        let len = d.expect_tag(tag::COUNTER32).unwrap();
        assert_eq!(d.read_unsigned32_value(len).unwrap(), 3_000_000_000);
    }

    #[test]
    fn signed_integer_sign_extension() {
        let mut d = Decoder::new(Bytes::from_static(&[0x02, 0x01, 0xFF]));
        assert_eq!(d.read_integer().unwrap(), -1);
    }
}
