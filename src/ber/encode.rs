//! BER encoding.
//!
//! Writes into a reverse buffer: content first, then length and tag are
//! prepended, so nested constructed types never need length pre-calculation.

use super::{encode_length, tag};
use bytes::Bytes;

/// Buffer for BER encoding that writes backwards.
pub struct EncodeBuf {
    buf: Vec<u8>,
}

impl EncodeBuf {
    /// Create a new encode buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(512)
    }

    /// Create a new encode buffer with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current length of encoded data.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Push bytes (stored reversed so `finish` restores wire order).
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().rev());
    }

    /// Push a BER length encoding.
    pub fn push_length(&mut self, len: usize) {
        let (bytes, count) = encode_length(len);
        self.buf.extend_from_slice(&bytes[..count]);
    }

    /// Push a BER tag.
    pub fn push_tag(&mut self, tag: u8) {
        self.buf.push(tag);
    }

    /// Encode a constructed type (SEQUENCE, PDU, ...).
    ///
    /// The closure encodes the contents; length and tag wrap them afterwards.
    /// Because the buffer is reversed, contents must be pushed in reverse
    /// field order.
    pub fn push_constructed<F>(&mut self, tag: u8, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let start_len = self.len();
        f(self);
        let content_len = self.len() - start_len;
        self.push_length(content_len);
        self.push_tag(tag);
    }

    /// Encode a SEQUENCE.
    pub fn push_sequence<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.push_constructed(tag::SEQUENCE, f);
    }

    /// Encode an INTEGER.
    pub fn push_integer(&mut self, value: i32) {
        let bytes = value.to_be_bytes();
        // Shortest two's-complement representation
        let mut start = 0;
        while start < 3
            && ((bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0))
        {
            start += 1;
        }
        self.push_bytes(&bytes[start..]);
        self.push_length(4 - start);
        self.push_tag(tag::INTEGER);
    }

    /// Encode an unsigned 32-bit integer with a specific tag.
    ///
    /// Values with the high bit set get a leading zero byte so they are not
    /// read back as negative.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 3 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
            start += 1;
        }
        if bytes[start] & 0x80 != 0 {
            self.push_bytes(&bytes[start..]);
            self.buf.push(0);
            self.push_length(4 - start + 1);
        } else {
            self.push_bytes(&bytes[start..]);
            self.push_length(4 - start);
        }
        self.push_tag(tag);
    }

    /// Encode an unsigned 64-bit integer with a specific tag (Counter64).
    pub fn push_unsigned64(&mut self, tag: u8, value: u64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 7 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
            start += 1;
        }
        if bytes[start] & 0x80 != 0 {
            self.push_bytes(&bytes[start..]);
            self.buf.push(0);
            self.push_length(8 - start + 1);
        } else {
            self.push_bytes(&bytes[start..]);
            self.push_length(8 - start);
        }
        self.push_tag(tag);
    }

    /// Encode an OCTET STRING.
    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_tlv(tag::OCTET_STRING, data);
    }

    /// Encode a NULL.
    pub fn push_null(&mut self) {
        self.push_empty(tag::NULL);
    }

    /// Encode a tag with zero-length content.
    pub fn push_empty(&mut self, tag: u8) {
        self.push_length(0);
        self.push_tag(tag);
    }

    /// Encode an arbitrary primitive TLV.
    pub fn push_tlv(&mut self, tag: u8, data: &[u8]) {
        self.push_bytes(data);
        self.push_length(data.len());
        self.push_tag(tag);
    }

    /// Encode an OBJECT IDENTIFIER.
    pub fn push_oid(&mut self, oid: &crate::oid::Oid) {
        let ber = oid.to_ber();
        self.push_bytes(&ber);
        self.push_length(ber.len());
        self.push_tag(tag::OBJECT_IDENTIFIER);
    }

    /// Finalize and return the encoded bytes in wire order.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }
}

impl Default for EncodeBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_minimal_encoding() {
        let cases: [(i32, &[u8]); 6] = [
            (0, &[0x02, 0x01, 0x00]),
            (127, &[0x02, 0x01, 0x7F]),
            (128, &[0x02, 0x02, 0x00, 0x80]),
            (-1, &[0x02, 0x01, 0xFF]),
            (-129, &[0x02, 0x02, 0xFF, 0x7F]),
            (12345, &[0x02, 0x02, 0x30, 0x39]),
        ];
        for (value, expected) in cases {
            let mut buf = EncodeBuf::new();
            buf.push_integer(value);
            assert_eq!(buf.finish().as_ref(), expected, "value {value}");
        }
    }

    #[test]
    fn unsigned32_high_bit_gets_leading_zero() {
        let mut buf = EncodeBuf::new();
        buf.push_unsigned32(tag::COUNTER32, 0xFFFF_FFFF);
        assert_eq!(
            buf.finish().as_ref(),
            &[0x41, 0x05, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn sequence_nesting() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_integer(1);
            buf.push_integer(2);
        });
        // Reverse field order inside the closure: 2 was pushed last, so it
        // comes out first.
        assert_eq!(
            buf.finish().as_ref(),
            &[0x30, 0x06, 0x02, 0x01, 0x02, 0x02, 0x01, 0x01]
        );
    }

    #[test]
    fn octet_string_wire_order() {
        let mut buf = EncodeBuf::new();
        buf.push_octet_string(b"public");
        assert_eq!(
            buf.finish().as_ref(),
            &[0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c']
        );
    }
}
