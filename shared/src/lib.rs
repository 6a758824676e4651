//! # Tandem Shared
//! Common functionality shared between tandem-server & tandem-client crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use tandem_wire::{
    decode, encode, read_member, read_members, validate, validate_with, write_member,
    write_opt_member, Blob, ByteReader, ByteWriter, MemberTag, Wire, WireError, WireKind,
    MAX_DEPTH,
};

pub mod action;
pub mod checksum;
pub mod diag;
pub mod entity;
pub mod named;
pub mod packet;
pub mod persist;
pub mod schema;
pub mod session;
pub mod timer;
pub mod transport;
pub mod types;

pub use action::{
    apply_committed, apply_tick, execute, ActionPolicy, ActionResult, ExecuteMode, Model,
    ModelAction, OpReceiver, RejectReason,
};
pub use checksum::{step_wire, ChecksumContext, Digest, NoopContext, Xxh3Context};
pub use diag::NetworkProbe;
pub use entity::{EntityId, EntityKind};
pub use named::Named;
pub use packet::{packet_tags, ClientPacket, ServerPacket};
pub use persist::{MemoryStore, ModelStore, PersistError, StoredModel};
pub use schema::{
    MemberDescriptor, Schema, SchemaBuilder, SchemaError, SchemaRange, SchemaVersion, Shape,
    TypeDescriptor, TypeTag,
};
pub use session::{loss_codes, LossCategory, SessionLossReason, SessionToken};
pub use timer::Timer;
pub use transport::{PacketReceiver, PacketSender, TransportError};
pub use types::{ClientSeq, OpSeq, ProtocolVersion, Tick};
