use crate::{
    error::WireError,
    kind::WireKind,
    writer::MemberTag,
};

/// Default recursion budget for nested structs, lists and tagged values
pub const MAX_DEPTH: u8 = 64;

/// Cursor over a received payload. All reads are bounds-checked and report
/// the byte offset at which decoding failed.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    cursor: usize,
    max_depth: u8,
    depth: u8,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_depth(buf, MAX_DEPTH)
    }

    pub fn with_max_depth(buf: &'a [u8], max_depth: u8) -> Self {
        Self {
            buf,
            cursor: 0,
            max_depth,
            depth: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == self.buf.len()
    }

    pub fn read_byte(&mut self) -> Result<u8, WireError> {
        let Some(byte) = self.buf.get(self.cursor).copied() else {
            return Err(WireError::CorruptStream {
                offset: self.cursor,
            });
        };
        self.cursor += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::CorruptStream {
                offset: self.cursor,
            });
        }
        let bytes = &self.buf[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let start = self.cursor;
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_byte()?;
            // At shift 63 only the lowest bit fits; anything else either
            // overflows u64 or asks for an eleventh byte.
            if shift == 63 && byte > 1 {
                return Err(WireError::CorruptStream { offset: start });
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(WireError::CorruptStream { offset: start });
            }
        }
    }

    pub fn read_zigzag(&mut self) -> Result<i64, WireError> {
        let raw = self.read_varint()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    pub fn read_fixed32(&mut self) -> Result<u32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, WireError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8], WireError> {
        let offset = self.cursor;
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(WireError::CorruptStream { offset });
        }
        self.read_bytes(len as usize)
    }

    /// Reads the next member key. `None` is the end-of-object marker.
    pub fn read_key(&mut self) -> Result<Option<(MemberTag, WireKind)>, WireError> {
        let offset = self.cursor;
        let key = self.read_varint()?;
        if key == 0 {
            return Ok(None);
        }
        let kind = WireKind::from_code((key & 0x07) as u8, offset)?;
        let tag = key >> 3;
        if tag > MemberTag::MAX as u64 {
            return Err(WireError::CorruptStream { offset });
        }
        Ok(Some((tag as MemberTag, kind)))
    }

    /// Reads a list's element kind byte
    pub fn read_elem_kind(&mut self) -> Result<WireKind, WireError> {
        let offset = self.cursor;
        let code = self.read_byte()?;
        WireKind::from_code(code, offset)
    }

    /// Reads a list's element count. Every element occupies at least one
    /// byte, so a count beyond the remaining buffer is corrupt rather than a
    /// reason to preallocate.
    pub fn read_count(&mut self) -> Result<usize, WireError> {
        let offset = self.cursor;
        let count = self.read_varint()?;
        if count > self.remaining() as u64 {
            return Err(WireError::CorruptStream { offset });
        }
        Ok(count as usize)
    }

    pub fn descend(&mut self) -> Result<(), WireError> {
        if self.depth == self.max_depth {
            return Err(WireError::DepthLimitExceeded {
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn ascend(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth -= 1;
    }

    /// Skips one whole value of the given kind. This is what lets a decoder
    /// pass over members added by a newer schema revision.
    pub fn skip_kind(&mut self, kind: WireKind) -> Result<(), WireError> {
        walk(self, kind, &mut |_| Ok(()))
    }
}

/// Walks one value of `kind`, consuming exactly its bytes and invoking
/// `on_tagged` with every type tag encountered along the way.
pub(crate) fn walk(
    reader: &mut ByteReader,
    kind: WireKind,
    on_tagged: &mut dyn FnMut(u64) -> Result<(), WireError>,
) -> Result<(), WireError> {
    match kind {
        WireKind::Varint => {
            reader.read_varint()?;
        }
        WireKind::Fixed32 => {
            reader.read_fixed32()?;
        }
        WireKind::Fixed64 => {
            reader.read_fixed64()?;
        }
        WireKind::Bytes => {
            reader.read_len_prefixed()?;
        }
        WireKind::Struct => {
            reader.descend()?;
            while let Some((_, member_kind)) = reader.read_key()? {
                walk(reader, member_kind, on_tagged)?;
            }
            reader.ascend();
        }
        WireKind::List => {
            reader.descend()?;
            let elem_kind = reader.read_elem_kind()?;
            let count = reader.read_count()?;
            for _ in 0..count {
                walk(reader, elem_kind, on_tagged)?;
            }
            reader.ascend();
        }
        WireKind::Tagged => {
            reader.descend()?;
            let tag = reader.read_varint()?;
            on_tagged(tag)?;
            while let Some((_, member_kind)) = reader.read_key()? {
                walk(reader, member_kind, on_tagged)?;
            }
            reader.ascend();
        }
    }
    Ok(())
}

// Tests
