use std::collections::BTreeMap;

use crate::{
    error::WireError,
    kind::WireKind,
    reader::{walk, ByteReader},
    writer::{ByteWriter, MemberTag},
};

/// A value that knows how to frame itself on the wire.
///
/// `kind()` is an associated function rather than a method because list
/// elements and member keys name a type's kind before any value exists.
pub trait Wire: Sized {
    fn kind() -> WireKind;

    fn ser(&self, writer: &mut ByteWriter);

    fn de(reader: &mut ByteReader) -> Result<Self, WireError>;
}

// Primitives

impl Wire for bool {
    fn kind() -> WireKind {
        WireKind::Varint
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_varint(*self as u64);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let offset = reader.offset();
        match reader.read_varint()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(WireError::BadBool { offset }),
        }
    }
}

macro_rules! impl_wire_unsigned {
    ($($t:ty),*) => {
        $(
            impl Wire for $t {
                fn kind() -> WireKind {
                    WireKind::Varint
                }

                fn ser(&self, writer: &mut ByteWriter) {
                    writer.write_varint((*self).into());
                }

                fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
                    let offset = reader.offset();
                    let raw = reader.read_varint()?;
                    <$t>::try_from(raw).map_err(|_| WireError::CorruptStream { offset })
                }
            }
        )*
    };
}

macro_rules! impl_wire_signed {
    ($($t:ty),*) => {
        $(
            impl Wire for $t {
                fn kind() -> WireKind {
                    WireKind::Varint
                }

                fn ser(&self, writer: &mut ByteWriter) {
                    writer.write_zigzag((*self).into());
                }

                fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
                    let offset = reader.offset();
                    let raw = reader.read_zigzag()?;
                    <$t>::try_from(raw).map_err(|_| WireError::CorruptStream { offset })
                }
            }
        )*
    };
}

impl_wire_unsigned!(u8, u16, u32, u64);
impl_wire_signed!(i8, i16, i32, i64);

impl Wire for f32 {
    fn kind() -> WireKind {
        WireKind::Fixed32
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_fixed32(self.to_bits());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(f32::from_bits(reader.read_fixed32()?))
    }
}

impl Wire for f64 {
    fn kind() -> WireKind {
        WireKind::Fixed64
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_fixed64(self.to_bits());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(f64::from_bits(reader.read_fixed64()?))
    }
}

impl Wire for String {
    fn kind() -> WireKind {
        WireKind::Bytes
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_len_prefixed(self.as_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let offset = reader.offset();
        let bytes = reader.read_len_prefixed()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8 { offset })
    }
}

/// Raw byte payload. A `Vec<u8>` would otherwise frame as a `List` of
/// varints, one element per byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Wire for Blob {
    fn kind() -> WireKind {
        WireKind::Bytes
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_len_prefixed(&self.0);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self(reader.read_len_prefixed()?.to_vec()))
    }
}

// Collections

impl<T: Wire> Wire for Vec<T> {
    fn kind() -> WireKind {
        WireKind::List
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_byte(T::kind().code());
        writer.write_varint(self.len() as u64);
        for item in self {
            item.ser(writer);
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        reader.descend()?;
        let offset = reader.offset();
        let elem_kind = reader.read_elem_kind()?;
        if elem_kind != T::kind() {
            return Err(WireError::KindMismatch {
                expected: T::kind(),
                found: elem_kind,
                offset,
            });
        }
        let count = reader.read_count()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::de(reader)?);
        }
        reader.ascend();
        Ok(items)
    }
}

// Maps frame as a list of key/value pair structs. BTreeMap keeps iteration
// order deterministic, which checksummed state requires.
impl<K: Wire + Ord, V: Wire> Wire for BTreeMap<K, V> {
    fn kind() -> WireKind {
        WireKind::List
    }

    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_byte(WireKind::Struct.code());
        writer.write_varint(self.len() as u64);
        for (key, value) in self {
            write_member(writer, 1, key);
            write_member(writer, 2, value);
            writer.write_end();
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        reader.descend()?;
        let offset = reader.offset();
        let elem_kind = reader.read_elem_kind()?;
        if elem_kind != WireKind::Struct {
            return Err(WireError::KindMismatch {
                expected: WireKind::Struct,
                found: elem_kind,
                offset,
            });
        }
        let count = reader.read_count()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let entry_offset = reader.offset();
            let mut key: Option<K> = None;
            let mut value: Option<V> = None;
            read_members(reader, |r, tag, kind| {
                match tag {
                    1 => key = Some(read_member(r, kind)?),
                    2 => value = Some(read_member(r, kind)?),
                    _ => r.skip_kind(kind)?,
                }
                Ok(())
            })?;
            let Some(key) = key else {
                return Err(WireError::MissingMember {
                    member: 1,
                    offset: entry_offset,
                });
            };
            let Some(value) = value else {
                return Err(WireError::MissingMember {
                    member: 2,
                    offset: entry_offset,
                });
            };
            map.insert(key, value);
        }
        reader.ascend();
        Ok(map)
    }
}

// Member helpers

/// Writes one tagged member: key, then payload
pub fn write_member<T: Wire>(writer: &mut ByteWriter, tag: MemberTag, value: &T) {
    writer.write_key(tag, T::kind());
    value.ser(writer);
}

/// Optional members are encoded by omission
pub fn write_opt_member<T: Wire>(writer: &mut ByteWriter, tag: MemberTag, value: &Option<T>) {
    if let Some(value) = value {
        write_member(writer, tag, value);
    }
}

/// Reads a member's payload once its key has named `found` as the kind. A
/// recognized member whose kind disagrees with the type is a hard error,
/// never something to skip.
pub fn read_member<T: Wire>(reader: &mut ByteReader, found: WireKind) -> Result<T, WireError> {
    if found != T::kind() {
        return Err(WireError::KindMismatch {
            expected: T::kind(),
            found,
            offset: reader.offset(),
        });
    }
    T::de(reader)
}

/// Drives a struct or tagged-value member loop. `on_member` must consume
/// each member's payload, by decoding it or by skipping it.
pub fn read_members<F>(reader: &mut ByteReader, mut on_member: F) -> Result<(), WireError>
where
    F: FnMut(&mut ByteReader, MemberTag, WireKind) -> Result<(), WireError>,
{
    reader.descend()?;
    while let Some((tag, kind)) = reader.read_key()? {
        on_member(reader, tag, kind)?;
    }
    reader.ascend();
    Ok(())
}

// Whole-buffer entry points

/// Serializes a value into a standalone buffer
pub fn encode<T: Wire>(value: &T) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    value.ser(&mut writer);
    writer.to_bytes()
}

/// Decodes a standalone buffer, requiring every byte to be consumed
pub fn decode<T: Wire>(bytes: &[u8]) -> Result<T, WireError> {
    let mut reader = ByteReader::new(bytes);
    let value = T::de(&mut reader)?;
    if !reader.is_empty() {
        return Err(WireError::TrailingBytes {
            offset: reader.offset(),
            remaining: reader.remaining(),
        });
    }
    Ok(value)
}

/// Structurally validates a buffer without building any values: framing,
/// length claims, nesting depth. Type tags are not resolved here; pass a
/// registry lookup to [`validate_with`] for that.
pub fn validate(bytes: &[u8], kind: WireKind) -> Result<(), WireError> {
    validate_with(bytes, kind, |_| Ok(()))
}

/// Structural validation that also reports every type tag encountered, so a
/// caller can check them against its registry
pub fn validate_with<F>(bytes: &[u8], kind: WireKind, mut on_tagged: F) -> Result<(), WireError>
where
    F: FnMut(u64) -> Result<(), WireError>,
{
    let mut reader = ByteReader::new(bytes);
    walk(&mut reader, kind, &mut on_tagged)?;
    if !reader.is_empty() {
        return Err(WireError::TrailingBytes {
            offset: reader.offset(),
            remaining: reader.remaining(),
        });
    }
    Ok(())
}

// Tests
