// The boundary to durable storage. The server hands over opaque snapshot
// bytes plus the schema revision that wrote them; which engine stores them,
// and how, is the host's business.

use std::collections::HashMap;

use thiserror::Error;

use crate::{entity::EntityId, schema::SchemaVersion};

/// Errors surfaced by a model store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("Storage load failed for entity {entity}: {detail}")]
    LoadFailed { entity: EntityId, detail: String },

    #[error("Storage save failed for entity {entity}: {detail}")]
    SaveFailed { entity: EntityId, detail: String },
}

/// A persisted model snapshot. The version lets a loader know which schema
/// revision encoded the bytes; additive revisions decode each other's
/// payloads, so the window check happens at a higher layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredModel {
    pub bytes: Vec<u8>,
    pub schema_version: SchemaVersion,
}

/// Where model snapshots go between sessions
pub trait ModelStore: Send {
    fn save(
        &mut self,
        entity: EntityId,
        bytes: &[u8],
        schema_version: SchemaVersion,
    ) -> Result<(), PersistError>;

    fn load(&mut self, entity: EntityId) -> Result<Option<StoredModel>, PersistError>;
}

/// Keeps snapshots in a map. The store for tests and single-process demos.
#[derive(Default)]
pub struct MemoryStore {
    models: HashMap<EntityId, StoredModel>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelStore for MemoryStore {
    fn save(
        &mut self,
        entity: EntityId,
        bytes: &[u8],
        schema_version: SchemaVersion,
    ) -> Result<(), PersistError> {
        self.models.insert(
            entity,
            StoredModel {
                bytes: bytes.to_vec(),
                schema_version,
            },
        );
        Ok(())
    }

    fn load(&mut self, entity: EntityId) -> Result<Option<StoredModel>, PersistError> {
        Ok(self.models.get(&entity).cloned())
    }
}

// Tests
