//! Ledger entries.
//!
//! A [`PoolEntry`] records one pooled entity: whether it is free, and for
//! actors that do not replicate their own movement, where it should appear.
//! The replicated part of an entry travels as a [`WireEntry`]; the
//! `first_activation` flag never leaves the process.

use serde::{Deserialize, Serialize};

use netpool_host::class::ClassId;
use netpool_host::entity::EntityId;
use netpool_host::transform::{Quat, Transform, Vec3};

// ---------------------------------------------------------------------------
// PoolEntry
// ---------------------------------------------------------------------------

/// One pooled entity as tracked by a [`Ledger`](crate::ledger::Ledger).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    /// Same id on the authority and on every observer.
    pub entity: EntityId,
    /// Runtime class of the entity. Fixed for the entity's lifetime.
    pub class: ClassId,
    /// Available for the next request of `class`.
    pub free: bool,
    /// Quantised to whole units.
    pub location: Vec3,
    /// Normalised.
    pub rotation: Quat,
    /// Quantised to whole units.
    pub scale: Vec3,
    /// Local only. Set until the entity has been activated once in this
    /// process; lets the first activation skip the restore sequence.
    pub first_activation: bool,
    /// Stable identity of the entry on the wire.
    pub replication_id: u32,
    /// Bumped every time the entry is marked dirty.
    pub replication_key: u32,
}

impl PoolEntry {
    pub(crate) fn new(entity: EntityId, class: ClassId, free: bool, replication_id: u32) -> Self {
        Self {
            entity,
            class,
            free,
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            first_activation: true,
            replication_id,
            replication_key: 0,
        }
    }

    /// Store a transform with the precision the wire format carries.
    pub fn set_transform(&mut self, transform: &Transform) {
        self.location = transform.location.quantized();
        self.scale = transform.scale.quantized();
        self.rotation = transform.rotation.normalized();
    }

    /// The stored transform.
    pub fn transform(&self) -> Transform {
        Transform::new(self.location, self.rotation, self.scale)
    }

    pub(crate) fn to_wire(&self) -> WireEntry {
        WireEntry {
            replication_id: self.replication_id,
            entity: self.entity,
            class: self.class,
            free: self.free,
            location: self.location,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    pub(crate) fn from_wire(wire: &WireEntry) -> Self {
        Self {
            entity: wire.entity,
            class: wire.class,
            free: wire.free,
            location: wire.location,
            rotation: wire.rotation,
            scale: wire.scale,
            first_activation: true,
            replication_id: wire.replication_id,
            replication_key: 0,
        }
    }

    /// Overwrite the replicated fields, keeping local-only state.
    pub(crate) fn apply_wire(&mut self, wire: &WireEntry) {
        self.entity = wire.entity;
        self.class = wire.class;
        self.free = wire.free;
        self.location = wire.location;
        self.rotation = wire.rotation;
        self.scale = wire.scale;
    }
}

// ---------------------------------------------------------------------------
// WireEntry
// ---------------------------------------------------------------------------

/// Replicated view of a [`PoolEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    pub replication_id: u32,
    pub entity: EntityId,
    pub class: ClassId,
    pub free: bool,
    pub location: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}
