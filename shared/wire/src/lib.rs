//! # Tandem Wire
//! Tagged binary wire format shared by tandem-server & tandem-client.
//!
//! Every struct member travels as `(member tag, wire kind, payload)`, so a
//! decoder can skip members it does not recognize and default members it
//! never receives. That one property is what lets old and new protocol
//! revisions interoperate in both directions.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod error;
mod kind;
mod reader;
mod wire;
mod writer;

pub use error::WireError;
pub use kind::WireKind;
pub use reader::{ByteReader, MAX_DEPTH};
pub use wire::{
    decode, encode, read_member, read_members, validate, validate_with, write_member,
    write_opt_member, Blob, Wire,
};
pub use writer::{ByteWriter, MemberTag};
