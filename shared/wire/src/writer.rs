use crate::kind::WireKind;

/// A member tag within a struct or tagged value. Tag 0 is reserved for the
/// end-of-object marker.
pub type MemberTag = u32;

/// Growable byte buffer that wire values serialize themselves into
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// LEB128: seven bits per byte, high bit set while more bytes follow
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                return;
            }
        }
    }

    /// Signed integers zigzag first so small negatives stay small on the wire
    pub fn write_zigzag(&mut self, value: i64) {
        self.write_varint(((value << 1) ^ (value >> 63)) as u64);
    }

    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Varint byte length followed by the raw bytes
    pub fn write_len_prefixed(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Member key: `(tag << 3) | kind`. Tag 0 would collide with the
    /// end-of-object marker.
    pub fn write_key(&mut self, tag: MemberTag, kind: WireKind) {
        debug_assert!(tag != 0, "member tag 0 is reserved for the end marker");
        self.write_varint(((tag as u64) << 3) | kind.code() as u64);
    }

    /// Terminates the member list of a struct or tagged value
    pub fn write_end(&mut self) {
        self.buf.push(0);
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

// Tests
