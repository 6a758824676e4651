// Explicit type registry for everything that crosses the wire or the store.
// Tags are assigned by hand and stay stable across releases; registration
// order carries no meaning.

use std::collections::HashMap;
use std::fmt;

use tandem_wire::{validate_with, ByteReader, ByteWriter, MemberTag, Wire, WireError, WireKind};

pub mod error;
pub use error::SchemaError;

/// Stable numeric identity of a registered type
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TypeTag(pub u32);

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for TypeTag {
    fn kind() -> WireKind {
        WireKind::Varint
    }

    fn ser(&self, writer: &mut ByteWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self(u32::de(reader)?))
    }
}

/// Revision of the model schema. Bumped whenever members or types are added.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SchemaVersion(pub u16);

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl Wire for SchemaVersion {
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

/// The window of schema revisions a host is willing to talk to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SchemaRange {
    pub min: SchemaVersion,
    pub current: SchemaVersion,
}

impl SchemaRange {
    pub fn new(min: SchemaVersion, current: SchemaVersion) -> Self {
        Self { min, current }
    }

    /// A window of exactly one revision
    pub fn exact(version: SchemaVersion) -> Self {
        Self {
            min: version,
            current: version,
        }
    }

    pub fn accepts(&self, version: SchemaVersion) -> bool {
        version >= self.min && version <= self.current
    }
}

/// Whether a registered type stands alone or names a family of variants
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Shape {
    Concrete,
    Abstract,
}

/// One declared member of a registered type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub tag: MemberTag,
    pub name: &'static str,
    pub kind: WireKind,
    /// Schema revision that introduced this member. Decoders built before
    /// it will skip the member; encoders built before it never write it.
    pub added_in: SchemaVersion,
}

/// One registered type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub tag: TypeTag,
    pub name: &'static str,
    pub shape: Shape,
    pub kind: WireKind,
    /// For a variant, the abstract family it belongs to
    pub family: Option<TypeTag>,
    pub members: Vec<MemberDescriptor>,
}

impl TypeDescriptor {
    /// Describes a concrete type, taking its framing kind from the impl
    pub fn of<T: Wire>(tag: TypeTag, name: &'static str) -> Self {
        Self {
            tag,
            name,
            shape: Shape::Concrete,
            kind: T::kind(),
            family: None,
            members: Vec::new(),
        }
    }

    /// Describes an abstract family root: the type whose tag never appears
    /// on the wire itself, only those of its variants
    pub fn family(tag: TypeTag, name: &'static str) -> Self {
        Self {
            tag,
            name,
            shape: Shape::Abstract,
            kind: WireKind::Tagged,
            family: None,
            members: Vec::new(),
        }
    }

    pub fn variant_of(mut self, family: TypeTag) -> Self {
        self.family = Some(family);
        self
    }

    pub fn member(
        mut self,
        tag: MemberTag,
        name: &'static str,
        kind: WireKind,
        added_in: SchemaVersion,
    ) -> Self {
        self.members.push(MemberDescriptor {
            tag,
            name,
            kind,
            added_in,
        });
        self
    }
}

/// Accumulates type registrations, rejecting collisions, then freezes into
/// a [`Schema`]
pub struct SchemaBuilder {
    range: SchemaRange,
    by_tag: HashMap<u32, TypeDescriptor>,
    by_name: HashMap<&'static str, TypeTag>,
}

impl SchemaBuilder {
    pub fn new(range: SchemaRange) -> Self {
        Self {
            range,
            by_tag: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registers a type, panicking on any collision. Registration happens
    /// once at startup, where failing loudly beats limping along with a
    /// protocol that cannot round-trip.
    pub fn add(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        if let Err(error) = self.try_add_inner(descriptor) {
            panic!("schema registration failed: {error}");
        }
        self
    }

    /// Non-panicking registration
    pub fn try_add(&mut self, descriptor: TypeDescriptor) -> Result<&mut Self, SchemaError> {
        self.try_add_inner(descriptor)?;
        Ok(self)
    }

    fn try_add_inner(&mut self, descriptor: TypeDescriptor) -> Result<(), SchemaError> {
        if descriptor.tag.0 == 0 {
            return Err(SchemaError::ReservedTypeTag {
                name: descriptor.name,
            });
        }
        if let Some(existing) = self.by_tag.get(&descriptor.tag.0) {
            return Err(SchemaError::DuplicateTypeTag {
                tag: descriptor.tag.0,
                existing: existing.name,
                adding: descriptor.name,
            });
        }
        if self.by_name.contains_key(descriptor.name) {
            return Err(SchemaError::DuplicateTypeName {
                name: descriptor.name,
            });
        }
        if let Some(family) = descriptor.family {
            let Some(root) = self.by_tag.get(&family.0) else {
                return Err(SchemaError::UnknownFamily {
                    type_name: descriptor.name,
                    family: family.0,
                });
            };
            if root.shape != Shape::Abstract {
                return Err(SchemaError::NotAFamily {
                    type_name: descriptor.name,
                    family_name: root.name,
                });
            }
        }
        let mut seen_members = HashMap::new();
        for member in &descriptor.members {
            if member.tag == 0 {
                return Err(SchemaError::ReservedMemberTag {
                    type_name: descriptor.name,
                });
            }
            if seen_members.insert(member.tag, member.name).is_some() {
                return Err(SchemaError::DuplicateMemberTag {
                    type_name: descriptor.name,
                    member_tag: member.tag,
                });
            }
            if member.added_in > self.range.current {
                return Err(SchemaError::MemberBeyondCurrentVersion {
                    type_name: descriptor.name,
                    member_name: member.name,
                    added_in: member.added_in.0,
                    current: self.range.current.0,
                });
            }
        }

        self.by_name.insert(descriptor.name, descriptor.tag);
        self.by_tag.insert(descriptor.tag.0, descriptor);
        Ok(())
    }

    /// Freezes the registrations. The resulting schema is immutable; there
    /// is deliberately no way to add a type after this point.
    pub fn build(&mut self) -> Schema {
        match self.try_build() {
            Ok(schema) => schema,
            Err(error) => panic!("schema build failed: {error}"),
        }
    }

    /// Non-panicking freeze
    pub fn try_build(&mut self) -> Result<Schema, SchemaError> {
        if self.range.min > self.range.current {
            return Err(SchemaError::InvertedVersionWindow {
                min: self.range.min.0,
                current: self.range.current.0,
            });
        }
        Ok(Schema {
            range: self.range,
            by_tag: std::mem::take(&mut self.by_tag),
            by_name: std::mem::take(&mut self.by_name),
        })
    }
}

/// Frozen type registry. Lookups are O(1) hash probes; this sits on the
/// decode path of every tagged value.
pub struct Schema {
    range: SchemaRange,
    by_tag: HashMap<u32, TypeDescriptor>,
    by_name: HashMap<&'static str, TypeTag>,
}

impl Schema {
    pub fn builder(range: SchemaRange) -> SchemaBuilder {
        SchemaBuilder::new(range)
    }

    pub fn range(&self) -> SchemaRange {
        self.range
    }

    pub fn resolve(&self, tag: TypeTag) -> Option<&TypeDescriptor> {
        self.by_tag.get(&tag.0)
    }

    pub fn tag_for(&self, name: &str) -> Option<TypeTag> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.by_tag.contains_key(&tag.0)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.by_tag.values()
    }

    /// Structurally validates a payload and resolves every type tag inside
    /// it against this registry, without constructing any values
    pub fn validate_payload(&self, bytes: &[u8], kind: WireKind) -> Result<(), WireError> {
        validate_with(bytes, kind, |raw| {
            match u32::try_from(raw) {
                Ok(tag) if self.by_tag.contains_key(&tag) => Ok(()),
                Ok(tag) => Err(WireError::UnknownTypeTag { tag }),
                // Tags wider than u32 cannot have been registered
                Err(_) => Err(WireError::UnknownTypeTag { tag: u32::MAX }),
            }
        })
    }
}

// Tests
