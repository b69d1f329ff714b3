//! Netpool host -- the in-memory simulation host the pooling layer runs on.
//!
//! This crate models the parts of a networked real-time host that an entity
//! pool needs to talk to: generational entity ids, a single-inheritance class
//! hierarchy with reflected fields, actors with components, per-entity net
//! role and dormancy, and the optional lifecycle hooks an entity can carry.
//! The pooling layer only sees it through the [`HostWorld`](world::HostWorld)
//! trait.
//!
//! # Quick Start
//!
//! ```
//! use netpool_host::prelude::*;
//!
//! let mut world = World::new(NetRole::Authority);
//! let rocket = world
//!     .classes_mut()
//!     .register(ClassDef::new("Rocket", ClassId::ACTOR).component(Component::primitive("body")))
//!     .unwrap();
//!
//! let e = world.spawn_deferred(rocket, None).unwrap();
//! assert!(!world.entity(e).unwrap().initialized);
//!
//! world.finish_spawning(e, Transform::IDENTITY).unwrap();
//! assert!(world.entity(e).unwrap().initialized);
//! ```

#![deny(unsafe_code)]

pub mod class;
pub mod component;
pub mod entity;
pub mod fields;
pub mod hooks;
pub mod transform;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// A mirrored entity id is already taken locally.
    #[error("entity {entity:?} is already alive")]
    EntityInUse { entity: entity::EntityId },

    /// A class was referenced that has not been registered.
    #[error("class '{name}' not registered")]
    UnknownClass { name: String },

    /// A class with the same name is already registered.
    #[error("class '{name}' is already registered")]
    DuplicateClass { name: String },

    /// An actor was requested from an object class or vice versa.
    #[error("class '{class}' cannot be instantiated as an {expected}")]
    ClassKindMismatch {
        class: String,
        expected: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::class::{ClassDef, ClassId, ClassInfo, ClassRegistry};
    pub use crate::component::{
        AudioState, CollisionMode, Component, ComponentKind, ParticleState, PrimitiveState,
        ProjectileState, SceneState, Teleport,
    };
    pub use crate::entity::{EntityAllocator, EntityId, IdStatus};
    pub use crate::fields::{FieldDescriptor, FieldStore, FieldType, FieldValue};
    pub use crate::hooks::{CountingHooks, HookCounters, PoolHook, PoolableEntity};
    pub use crate::transform::{Quat, Transform, Vec3, TRANSFORM_TOLERANCE};
    pub use crate::world::{Dormancy, EntityRecord, HostWorld, NetRole, World};
    pub use crate::HostError;
}
