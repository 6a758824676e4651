use thiserror::Error;

use crate::kind::WireKind;

/// Errors that can occur while decoding or validating a wire payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The stream ended early or a varint was malformed
    #[error("Corrupt wire stream at byte offset {offset}")]
    CorruptStream {
        offset: usize,
    },

    /// A tagged value named a type code that is not part of the protocol
    #[error("Unknown type tag {tag} in tagged value")]
    UnknownTypeTag {
        tag: u32,
    },

    /// Nesting exceeded the reader's recursion budget (SECURITY: deeply
    /// nested payloads could otherwise exhaust the stack)
    #[error("Wire value nested deeper than the limit of {limit} levels")]
    DepthLimitExceeded {
        limit: u8,
    },

    /// A known member arrived with a different wire kind than its schema
    /// declares
    #[error("Wire kind mismatch at byte offset {offset}: expected {expected:?}, found {found:?}")]
    KindMismatch {
        expected: WireKind,
        found: WireKind,
        offset: usize,
    },

    /// A member key used the reserved wire kind code 7
    #[error("Reserved wire kind code at byte offset {offset}")]
    ReservedWireKind {
        offset: usize,
    },

    /// A string member was not valid UTF-8
    #[error("Invalid UTF-8 in string at byte offset {offset}")]
    InvalidUtf8 {
        offset: usize,
    },

    /// A boolean member held a value other than 0 or 1
    #[error("Boolean out of range at byte offset {offset}")]
    BadBool {
        offset: usize,
    },

    /// A structurally required member (e.g. a map entry's key) was absent
    #[error("Missing required member {member} at byte offset {offset}")]
    MissingMember {
        member: u32,
        offset: usize,
    },

    /// A whole-buffer decode finished with bytes left over
    #[error("Decode left {remaining} undecoded bytes at offset {offset}")]
    TrailingBytes {
        offset: usize,
        remaining: usize,
    },
}
