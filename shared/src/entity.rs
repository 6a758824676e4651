use std::fmt;

use tandem_wire::{read_member, read_members, write_member, ByteReader, ByteWriter, Wire, WireError, WireKind};

/// Application-defined category of entity (player, guild, match, ...)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntityKind(pub u16);

impl Wire for EntityKind {
    fn kind() -> WireKind {
        WireKind::Varint
    }

    fn ser(&self, writer: &mut ByteWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self(u16::de(reader)?))
    }
}

/// Identity of one synchronized model instance
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntityId {
    pub kind: EntityKind,
    pub value: u64,
}

impl EntityId {
    pub fn new(kind: EntityKind, value: u64) -> Self {
        Self { kind, value }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.kind.0, self.value)
    }
}

impl Wire for EntityId {
    fn kind() -> WireKind {
        WireKind::Struct
    }

    fn ser(&self, writer: &mut ByteWriter) {
        write_member(writer, 1, &self.kind);
        write_member(writer, 2, &self.value);
        writer.write_end();
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let mut kind = None;
        let mut value = None;
        read_members(reader, |r, tag, wire_kind| {
            match tag {
                1 => kind = Some(read_member(r, wire_kind)?),
                2 => value = Some(read_member(r, wire_kind)?),
                _ => r.skip_kind(wire_kind)?,
            }
            Ok(())
        })?;
        Ok(Self {
            kind: kind.unwrap_or(EntityKind(0)),
            value: value.unwrap_or_default(),
        })
    }
}

// Tests
