// The session protocol: everything that crosses the transport, framed as
// tagged values so either endpoint can skip what it does not understand.

use tandem_wire::{
    read_member, read_members, write_member, write_opt_member, Blob, ByteReader, ByteWriter, Wire,
    WireError, WireKind,
};

use crate::{
    action::RejectReason,
    checksum::Digest,
    entity::EntityId,
    named::Named,
    schema::SchemaVersion,
    session::{SessionLossReason, SessionToken},
    types::{ClientSeq, OpSeq, ProtocolVersion, Tick},
};

/// Stable type tags of the packet family. Tags are forever; retire a packet
/// by abandoning its tag, never by reusing it.
pub mod packet_tags {
    pub const HELLO: u32 = 1;
    pub const SUBMIT_ACTION: u32 = 2;
    pub const CLIENT_HEARTBEAT: u32 = 3;
    pub const CLIENT_BYE: u32 = 4;
    pub const GRANT: u32 = 5;
    pub const REFUSE: u32 = 6;
    pub const CONFIRM: u32 = 7;
    pub const REJECT: u32 = 8;
    pub const PUSHED: u32 = 9;
    pub const TICK_CHECKPOINT: u32 = 10;
    pub const SERVER_HEARTBEAT: u32 = 11;
    pub const SERVER_BYE: u32 = 12;
}

/// Everything a client sends
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket<A> {
    /// Opens a handshake
    Hello {
        protocol_version: ProtocolVersion,
        schema_version: SchemaVersion,
        entity: EntityId,
        /// Token of a lost session this connection replaces, if any
        resume: Option<SessionToken>,
    },
    /// Asks the authority to commit one action
    SubmitAction {
        client_seq: ClientSeq,
        action: A,
    },
    /// Keeps the session alive through idle stretches
    Heartbeat,
    /// Orderly goodbye
    Bye,
}

impl<A> Named for ClientPacket<A> {
    fn name(&self) -> &'static str {
        match self {
            ClientPacket::Hello { .. } => "Hello",
            ClientPacket::SubmitAction { .. } => "SubmitAction",
            ClientPacket::Heartbeat => "Heartbeat",
            ClientPacket::Bye => "Bye",
        }
    }
}

impl<A: Wire> Wire for ClientPacket<A> {
    fn kind() -> WireKind {
        WireKind::Tagged
    }

    fn ser(&self, writer: &mut ByteWriter) {
        match self {
            ClientPacket::Hello {
                protocol_version,
                schema_version,
                entity,
                resume,
            } => {
                writer.write_varint(packet_tags::HELLO as u64);
                write_member(writer, 1, protocol_version);
                write_member(writer, 2, schema_version);
                write_member(writer, 3, entity);
                write_opt_member(writer, 4, resume);
                writer.write_end();
            }
            ClientPacket::SubmitAction { client_seq, action } => {
                writer.write_varint(packet_tags::SUBMIT_ACTION as u64);
                write_member(writer, 1, client_seq);
                write_member(writer, 2, action);
                writer.write_end();
            }
            ClientPacket::Heartbeat => {
                writer.write_varint(packet_tags::CLIENT_HEARTBEAT as u64);
                writer.write_end();
            }
            ClientPacket::Bye => {
                writer.write_varint(packet_tags::CLIENT_BYE as u64);
                writer.write_end();
            }
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let raw = reader.read_varint()?;
        let tag = u32::try_from(raw).map_err(|_| WireError::UnknownTypeTag { tag: u32::MAX })?;
        match tag {
            packet_tags::HELLO => {
                let mut protocol_version = None;
                let mut schema_version = None;
                let mut entity = None;
                let mut resume = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => protocol_version = Some(read_member(r, kind)?),
                        2 => schema_version = Some(read_member(r, kind)?),
                        3 => entity = Some(read_member(r, kind)?),
                        4 => resume = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                Ok(ClientPacket::Hello {
                    protocol_version: protocol_version.unwrap_or_default(),
                    schema_version: schema_version.unwrap_or(SchemaVersion(0)),
                    entity: entity.unwrap_or(EntityId::new(crate::entity::EntityKind(0), 0)),
                    resume,
                })
            }
            packet_tags::SUBMIT_ACTION => {
                let offset = reader.offset();
                let mut client_seq = None;
                let mut action = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => client_seq = Some(read_member(r, kind)?),
                        2 => action = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                let Some(action) = action else {
                    // A submission without its action is meaningless
                    return Err(WireError::MissingMember { member: 2, offset });
                };
                Ok(ClientPacket::SubmitAction {
                    client_seq: client_seq.unwrap_or_default(),
                    action,
                })
            }
            packet_tags::CLIENT_HEARTBEAT => {
                read_members(reader, |r, _, kind| r.skip_kind(kind))?;
                Ok(ClientPacket::Heartbeat)
            }
            packet_tags::CLIENT_BYE => {
                read_members(reader, |r, _, kind| r.skip_kind(kind))?;
                Ok(ClientPacket::Bye)
            }
            tag => Err(WireError::UnknownTypeTag { tag }),
        }
    }
}

/// Everything a server sends
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket<A> {
    /// Handshake accepted: a session exists from this moment
    Grant {
        token: SessionToken,
        /// Serialized model the client adopts as its confirmed state
        snapshot: Blob,
        /// Seq the first op after the snapshot will carry
        op_seq_base: OpSeq,
        tick: Tick,
    },
    /// Handshake turned away, with the precise reason
    Refuse {
        reason: SessionLossReason,
    },
    /// A client-submitted action was committed
    Confirm {
        op_seq: OpSeq,
        client_seq: ClientSeq,
        digest: Option<Digest>,
    },
    /// A client-submitted action was not committed
    Reject {
        client_seq: ClientSeq,
        reason: RejectReason,
    },
    /// A server-originated action was committed
    Pushed {
        op_seq: OpSeq,
        action: A,
        digest: Option<Digest>,
    },
    /// A scheduled tick was committed
    TickCheckpoint {
        op_seq: OpSeq,
        tick: Tick,
        digest: Option<Digest>,
    },
    Heartbeat,
    /// The server is ending the session
    Bye {
        reason: SessionLossReason,
    },
}

impl<A> Named for ServerPacket<A> {
    fn name(&self) -> &'static str {
        match self {
            ServerPacket::Grant { .. } => "Grant",
            ServerPacket::Refuse { .. } => "Refuse",
            ServerPacket::Confirm { .. } => "Confirm",
            ServerPacket::Reject { .. } => "Reject",
            ServerPacket::Pushed { .. } => "Pushed",
            ServerPacket::TickCheckpoint { .. } => "TickCheckpoint",
            ServerPacket::Heartbeat => "Heartbeat",
            ServerPacket::Bye { .. } => "Bye",
        }
    }
}

impl<A: Wire> Wire for ServerPacket<A> {
    fn kind() -> WireKind {
        WireKind::Tagged
    }

    fn ser(&self, writer: &mut ByteWriter) {
        match self {
            ServerPacket::Grant {
                token,
                snapshot,
                op_seq_base,
                tick,
            } => {
                writer.write_varint(packet_tags::GRANT as u64);
                write_member(writer, 1, token);
                write_member(writer, 2, snapshot);
                write_member(writer, 3, op_seq_base);
                write_member(writer, 4, tick);
                writer.write_end();
            }
            ServerPacket::Refuse { reason } => {
                writer.write_varint(packet_tags::REFUSE as u64);
                write_member(writer, 1, reason);
                writer.write_end();
            }
            ServerPacket::Confirm {
                op_seq,
                client_seq,
                digest,
            } => {
                writer.write_varint(packet_tags::CONFIRM as u64);
                write_member(writer, 1, op_seq);
                write_member(writer, 2, client_seq);
                write_opt_member(writer, 3, digest);
                writer.write_end();
            }
            ServerPacket::Reject { client_seq, reason } => {
                writer.write_varint(packet_tags::REJECT as u64);
                write_member(writer, 1, client_seq);
                write_member(writer, 2, reason);
                writer.write_end();
            }
            ServerPacket::Pushed {
                op_seq,
                action,
                digest,
            } => {
                writer.write_varint(packet_tags::PUSHED as u64);
                write_member(writer, 1, op_seq);
                write_member(writer, 2, action);
                write_opt_member(writer, 3, digest);
                writer.write_end();
            }
            ServerPacket::TickCheckpoint {
                op_seq,
                tick,
                digest,
            } => {
                writer.write_varint(packet_tags::TICK_CHECKPOINT as u64);
                write_member(writer, 1, op_seq);
                write_member(writer, 2, tick);
                write_opt_member(writer, 3, digest);
                writer.write_end();
            }
            ServerPacket::Heartbeat => {
                writer.write_varint(packet_tags::SERVER_HEARTBEAT as u64);
                writer.write_end();
            }
            ServerPacket::Bye { reason } => {
                writer.write_varint(packet_tags::SERVER_BYE as u64);
                write_member(writer, 1, reason);
                writer.write_end();
            }
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let raw = reader.read_varint()?;
        let tag = u32::try_from(raw).map_err(|_| WireError::UnknownTypeTag { tag: u32::MAX })?;
        match tag {
            packet_tags::GRANT => {
                let mut token = None;
                let mut snapshot = None;
                let mut op_seq_base = None;
                let mut tick = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => token = Some(read_member(r, kind)?),
                        2 => snapshot = Some(read_member(r, kind)?),
                        3 => op_seq_base = Some(read_member(r, kind)?),
                        4 => tick = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                Ok(ServerPacket::Grant {
                    token: token.unwrap_or(SessionToken(0)),
                    snapshot: snapshot.unwrap_or_default(),
                    op_seq_base: op_seq_base.unwrap_or_default(),
                    tick: tick.unwrap_or_default(),
                })
            }
            packet_tags::REFUSE => {
                let offset = reader.offset();
                let mut reason = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => reason = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                let Some(reason) = reason else {
                    return Err(WireError::MissingMember { member: 1, offset });
                };
                Ok(ServerPacket::Refuse { reason })
            }
            packet_tags::CONFIRM => {
                let mut op_seq = None;
                let mut client_seq = None;
                let mut digest = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => op_seq = Some(read_member(r, kind)?),
                        2 => client_seq = Some(read_member(r, kind)?),
                        3 => digest = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                Ok(ServerPacket::Confirm {
                    op_seq: op_seq.unwrap_or_default(),
                    client_seq: client_seq.unwrap_or_default(),
                    digest,
                })
            }
            packet_tags::REJECT => {
                let offset = reader.offset();
                let mut client_seq = None;
                let mut reason = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => client_seq = Some(read_member(r, kind)?),
                        2 => reason = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                let Some(reason) = reason else {
                    return Err(WireError::MissingMember { member: 2, offset });
                };
                Ok(ServerPacket::Reject {
                    client_seq: client_seq.unwrap_or_default(),
                    reason,
                })
            }
            packet_tags::PUSHED => {
                let offset = reader.offset();
                let mut op_seq = None;
                let mut action = None;
                let mut digest = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => op_seq = Some(read_member(r, kind)?),
                        2 => action = Some(read_member(r, kind)?),
                        3 => digest = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                let Some(action) = action else {
                    return Err(WireError::MissingMember { member: 2, offset });
                };
                Ok(ServerPacket::Pushed {
                    op_seq: op_seq.unwrap_or_default(),
                    action,
                    digest,
                })
            }
            packet_tags::TICK_CHECKPOINT => {
                let mut op_seq = None;
                let mut tick = None;
                let mut digest = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => op_seq = Some(read_member(r, kind)?),
                        2 => tick = Some(read_member(r, kind)?),
                        3 => digest = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                Ok(ServerPacket::TickCheckpoint {
                    op_seq: op_seq.unwrap_or_default(),
                    tick: tick.unwrap_or_default(),
                    digest,
                })
            }
            packet_tags::SERVER_HEARTBEAT => {
                read_members(reader, |r, _, kind| r.skip_kind(kind))?;
                Ok(ServerPacket::Heartbeat)
            }
            packet_tags::SERVER_BYE => {
                let offset = reader.offset();
                let mut reason = None;
                read_members(reader, |r, member, kind| {
                    match member {
                        1 => reason = Some(read_member(r, kind)?),
                        _ => r.skip_kind(kind)?,
                    }
                    Ok(())
                })?;
                let Some(reason) = reason else {
                    return Err(WireError::MissingMember { member: 1, offset });
                };
                Ok(ServerPacket::Bye { reason })
            }
            tag => Err(WireError::UnknownTypeTag { tag }),
        }
    }
}

// Tests
