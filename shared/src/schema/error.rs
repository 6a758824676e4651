use thiserror::Error;

/// Errors raised while assembling a schema. All of these are programming
/// mistakes that should surface at startup, never at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two types claimed the same tag
    #[error("Type tag {tag} registered twice: by '{existing}' and '{adding}'")]
    DuplicateTypeTag {
        tag: u32,
        existing: &'static str,
        adding: &'static str,
    },

    /// Two types claimed the same name
    #[error("Type name '{name}' registered twice")]
    DuplicateTypeName {
        name: &'static str,
    },

    /// A type declared two members with the same tag
    #[error("Type '{type_name}' declares member tag {member_tag} twice")]
    DuplicateMemberTag {
        type_name: &'static str,
        member_tag: u32,
    },

    /// Member tag 0 is the end-of-object marker and can never be declared
    #[error("Type '{type_name}' declares reserved member tag 0")]
    ReservedMemberTag {
        type_name: &'static str,
    },

    /// Type tag 0 is reserved as a sentinel
    #[error("Type '{name}' declares reserved type tag 0")]
    ReservedTypeTag {
        name: &'static str,
    },

    /// A variant referenced a family that was never registered
    #[error("Type '{type_name}' claims membership of unregistered family tag {family}")]
    UnknownFamily {
        type_name: &'static str,
        family: u32,
    },

    /// A variant referenced a type that is not an abstract family root
    #[error("Type '{type_name}' claims membership of '{family_name}', which is not an abstract family")]
    NotAFamily {
        type_name: &'static str,
        family_name: &'static str,
    },

    /// A member claimed to be added in a schema version newer than current
    #[error("Type '{type_name}' member '{member_name}' is marked added-in version {added_in}, beyond current version {current}")]
    MemberBeyondCurrentVersion {
        type_name: &'static str,
        member_name: &'static str,
        added_in: u16,
        current: u16,
    },

    /// The compatibility window was inverted
    #[error("Schema version window is inverted: min {min} > current {current}")]
    InvertedVersionWindow {
        min: u16,
        current: u16,
    },
}
