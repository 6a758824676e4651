// The low three bits of every member key name one of these kinds, which is
// all a decoder needs to skip a member it does not recognize.

use crate::error::WireError;

/// How a wire value is framed on the stream
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WireKind {
    /// LEB128 variable-length integer (booleans and zigzagged signed ints too)
    Varint,
    /// Four little-endian bytes
    Fixed32,
    /// Eight little-endian bytes
    Fixed64,
    /// Varint byte length followed by that many raw bytes
    Bytes,
    /// Tagged members terminated by an end-of-object marker
    Struct,
    /// Element kind byte, varint count, then that many payloads
    List,
    /// Varint type tag followed by tagged members, for polymorphic values
    Tagged,
}

impl WireKind {
    pub fn code(self) -> u8 {
        match self {
            WireKind::Varint => 0,
            WireKind::Fixed32 => 1,
            WireKind::Fixed64 => 2,
            WireKind::Bytes => 3,
            WireKind::Struct => 4,
            WireKind::List => 5,
            WireKind::Tagged => 6,
        }
    }

    /// Decodes a three-bit kind code. Code 7 is reserved and rejected so a
    /// future revision can extend the key format.
    pub fn from_code(code: u8, offset: usize) -> Result<Self, WireError> {
        match code {
            0 => Ok(WireKind::Varint),
            1 => Ok(WireKind::Fixed32),
            2 => Ok(WireKind::Fixed64),
            3 => Ok(WireKind::Bytes),
            4 => Ok(WireKind::Struct),
            5 => Ok(WireKind::List),
            6 => Ok(WireKind::Tagged),
            7 => Err(WireError::ReservedWireKind { offset }),
            _ => Err(WireError::CorruptStream { offset }),
        }
    }
}

// Tests
