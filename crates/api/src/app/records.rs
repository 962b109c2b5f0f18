//! Unit-owned records served by the demo routes.
//!
//! The store is the authority for `owner_unit_id`: handlers read the owner from
//! here before deciding, and every mutation re-checks it under the write lock
//! so a concurrent transfer cannot slip between decision and write.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use unitgate_auth::{AuthzError, ResourceKind, ResourceReference, revalidate_ownership};
use unitgate_core::{RecordId, UnitId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    pub kind: ResourceKind,
    pub owner_unit_id: UnitId,
    pub data: serde_json::Value,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn reference(&self) -> ResourceReference {
        ResourceReference::owned(self.kind, self.owner_unit_id)
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error(transparent)]
    Ownership(#[from] AuthzError),

    #[error("record store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
pub struct RecordStore {
    inner: RwLock<HashMap<RecordId, Record>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of `kind` with `id`; a record of another kind is treated as absent.
    pub fn get(&self, kind: ResourceKind, id: RecordId) -> Option<Record> {
        let map = self.inner.read().ok()?;
        map.get(&id).filter(|r| r.kind == kind).cloned()
    }

    /// Authoritative reference for a stored record.
    pub fn reference(&self, kind: ResourceKind, id: RecordId) -> Option<ResourceReference> {
        self.get(kind, id).map(|r| r.reference())
    }

    pub fn insert(&self, kind: ResourceKind, owner_unit_id: UnitId, data: serde_json::Value) -> Result<Record, RecordError> {
        let record = Record {
            id: RecordId::new(),
            kind,
            owner_unit_id,
            data,
            version: 1,
            updated_at: Utc::now(),
        };
        let mut map = self.inner.write().map_err(|_| RecordError::Poisoned)?;
        map.insert(record.id, record.clone());
        Ok(record)
    }

    /// Replace the record's data, if it is still owned as `granted` says.
    pub fn update(&self, id: RecordId, granted: &ResourceReference, data: serde_json::Value) -> Result<Record, RecordError> {
        self.mutate(id, granted, |record| {
            record.data = data;
        })
    }

    /// Move the record to `to_unit`, if it is still owned as `granted` says.
    pub fn transfer(&self, id: RecordId, granted: &ResourceReference, to_unit: UnitId) -> Result<Record, RecordError> {
        self.mutate(id, granted, |record| {
            record.owner_unit_id = to_unit;
        })
    }

    pub fn delete(&self, id: RecordId, granted: &ResourceReference) -> Result<Record, RecordError> {
        let mut map = self.inner.write().map_err(|_| RecordError::Poisoned)?;
        let current = map.get(&id).filter(|r| r.kind == granted.kind).ok_or(RecordError::NotFound(id))?;
        revalidate_ownership(granted, Some(current.owner_unit_id))?;
        map.remove(&id).ok_or(RecordError::NotFound(id))
    }

    fn mutate(&self, id: RecordId, granted: &ResourceReference, f: impl FnOnce(&mut Record)) -> Result<Record, RecordError> {
        let mut map = self.inner.write().map_err(|_| RecordError::Poisoned)?;
        let record = map
            .get_mut(&id)
            .filter(|r| r.kind == granted.kind)
            .ok_or(RecordError::NotFound(id))?;
        revalidate_ownership(granted, Some(record.owner_unit_id))?;
        f(record);
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
