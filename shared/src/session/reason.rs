use std::fmt;

use tandem_wire::{
    read_member, read_members, write_member, write_opt_member, ByteReader, ByteWriter, Wire,
    WireError, WireKind,
};

/// Broad bucket a session loss falls into. This is the part a UI switches
/// on; everything finer-grained lives in the technical fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LossCategory {
    /// The server could not be reached at all
    CouldNotConnect,
    /// A probe says nothing beyond this machine is reachable
    NoInternet,
    /// An established session stopped responding
    ConnectionLost,
    /// The server is deliberately refusing sessions right now
    ServerMaintenance,
    /// This build is outside the server's supported version window
    ClientTooOld,
    /// The server could not load or save the persisted model
    LocalStorageFailure,
    /// This entity is not welcome
    PlayerBanned,
    /// Client and server computed different results for the same operation
    Desync,
    /// The caller asked for the session to end
    ExplicitStop,
    /// Anything that should not happen
    InternalError,
}

impl LossCategory {
    pub fn code(self) -> u16 {
        match self {
            LossCategory::CouldNotConnect => 1,
            LossCategory::NoInternet => 2,
            LossCategory::ConnectionLost => 3,
            LossCategory::ServerMaintenance => 4,
            LossCategory::ClientTooOld => 5,
            LossCategory::LocalStorageFailure => 6,
            LossCategory::PlayerBanned => 7,
            LossCategory::Desync => 8,
            LossCategory::ExplicitStop => 9,
            LossCategory::InternalError => 10,
        }
    }

    /// Categories added by newer peers degrade to `InternalError` instead
    /// of failing the decode; the technical code still carries the detail.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => LossCategory::CouldNotConnect,
            2 => LossCategory::NoInternet,
            3 => LossCategory::ConnectionLost,
            4 => LossCategory::ServerMaintenance,
            5 => LossCategory::ClientTooOld,
            6 => LossCategory::LocalStorageFailure,
            7 => LossCategory::PlayerBanned,
            8 => LossCategory::Desync,
            9 => LossCategory::ExplicitStop,
            _ => LossCategory::InternalError,
        }
    }

    /// Whether an automatic reconnect attempt is likely to help. Transient
    /// network trouble: yes. Desync: yes, a fresh snapshot resynchronizes.
    /// Bans, maintenance, version trouble: no.
    pub fn auto_reconnect(self) -> bool {
        matches!(
            self,
            LossCategory::CouldNotConnect
                | LossCategory::NoInternet
                | LossCategory::ConnectionLost
                | LossCategory::Desync
        )
    }
}

/// Technical codes carried inside [`SessionLossReason`]. Stable across
/// releases so log pipelines can correlate on them.
pub mod loss_codes {
    pub const TRANSPORT_SEND_FAILED: u16 = 1;
    pub const TRANSPORT_RECEIVE_FAILED: u16 = 2;
    pub const HANDSHAKE_TIMEOUT: u16 = 3;
    pub const SESSION_TIMEOUT: u16 = 4;
    pub const CONFIRM_TIMEOUT: u16 = 5;
    pub const SERVER_REFUSED: u16 = 6;
    pub const SERVER_BYE: u16 = 7;
    pub const DIGEST_MISMATCH: u16 = 8;
    pub const CONFIRMED_REPLAY_REJECTED: u16 = 9;
    pub const STOPPED_BY_CALLER: u16 = 10;
    pub const MALFORMED_PACKET: u16 = 11;
    pub const PROTOCOL_MISMATCH: u16 = 12;
    pub const SCHEMA_OUT_OF_WINDOW: u16 = 13;
    pub const MAINTENANCE: u16 = 14;
    pub const BANNED: u16 = 15;
    pub const STORAGE_LOAD_FAILED: u16 = 16;
    pub const STORAGE_SAVE_FAILED: u16 = 17;
    pub const SESSION_REPLACED: u16 = 18;
}

/// Why a session ended.
///
/// The category is the stable, UI-facing part. The technical code and
/// string pin down the exact cause for logs; the diagnostics carry whatever
/// a network probe gathered at the moment of loss.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLossReason {
    pub category: LossCategory,
    pub technical_code: u16,
    pub technical: String,
    pub diagnostics: Option<String>,
}

impl SessionLossReason {
    pub fn new(category: LossCategory, technical_code: u16, technical: impl Into<String>) -> Self {
        Self {
            category,
            technical_code,
            technical: technical.into(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = Some(diagnostics.into());
        self
    }

    pub fn auto_reconnect(&self) -> bool {
        self.category.auto_reconnect()
    }
}

impl fmt::Display for SessionLossReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} (code {}): {}",
            self.category, self.technical_code, self.technical
        )?;
        if let Some(diagnostics) = &self.diagnostics {
            write!(f, " [{diagnostics}]")?;
        }
        Ok(())
    }
}

impl Wire for SessionLossReason {
    fn kind() -> WireKind {
        WireKind::Struct
    }

    fn ser(&self, writer: &mut ByteWriter) {
        write_member(writer, 1, &self.category.code());
        write_member(writer, 2, &self.technical_code);
        write_member(writer, 3, &self.technical);
        write_opt_member(writer, 4, &self.diagnostics);
        writer.write_end();
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let mut category: Option<u16> = None;
        let mut technical_code = None;
        let mut technical = None;
        let mut diagnostics = None;
        read_members(reader, |r, tag, kind| {
            match tag {
                1 => category = Some(read_member(r, kind)?),
                2 => technical_code = Some(read_member(r, kind)?),
                3 => technical = Some(read_member(r, kind)?),
                4 => diagnostics = Some(read_member(r, kind)?),
                _ => r.skip_kind(kind)?,
            }
            Ok(())
        })?;
        Ok(Self {
            category: LossCategory::from_code(category.unwrap_or_default()),
            technical_code: technical_code.unwrap_or_default(),
            technical: technical.unwrap_or_default(),
            diagnostics,
        })
    }
}

// Tests
