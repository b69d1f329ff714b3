//! Netpool -- networked entity pooling with a replicated free/used ledger.
//!
//! This crate builds on [`netpool_host`] (the runtime the pooled entities live
//! in) and [`netpool_ledger`] (the replicated record of which entity is free).
//! It recycles actors and plain objects instead of destroying and recreating
//! them, and keeps an observer's view of "which pooled entity is active"
//! consistent with the authority's.
//!
//! # Quick Start
//!
//! ```
//! use netpool::prelude::*;
//!
//! let mut world = World::new(NetRole::Authority);
//! let rocket = world
//!     .classes_mut()
//!     .register(ClassDef::new("Rocket", ClassId::ACTOR).component(Component::primitive("body")))
//!     .unwrap();
//!
//! let settings = PoolSettings::default();
//! let mut session = Session::new(world, settings, SessionConfig::default());
//! session.begin_play().unwrap();
//!
//! // No pool targets `Rocket`, so the generic actor pool services the request.
//! let e = session.request_pool_object(rocket, None, false).unwrap();
//! assert!(session.is_pooled_object_active(e));
//!
//! session.return_to_pool(e).unwrap();
//! assert!(!session.is_pooled_object_active(e));
//! ```

#![deny(unsafe_code)]

pub mod actor_pool;
pub mod defaults;
pub mod net;
pub mod object_pool;
pub mod pool;
pub mod registry;
pub mod replication;
pub mod reset;
pub mod session;
pub mod settings;
pub mod spawn_task;

use netpool_host::entity::EntityId;
use netpool_host::HostError;
use netpool_ledger::LedgerError;

use crate::pool::PoolNetId;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the host crate for convenience.
pub use netpool_host;

/// Re-export the ledger crate for convenience.
pub use netpool_ledger;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No registered pool handles the requested class.
    #[error("no pool handles class '{class}'")]
    NoPoolForClass { class: String },

    /// The entity is not tracked by any pool.
    #[error("entity {entity} does not belong to any pool")]
    Orphaned { entity: EntityId },

    /// An actor pool was handed something that is not an actor.
    #[error("pool '{pool}' expected an actor, but {entity} is not one")]
    NotAnActor { pool: String, entity: EntityId },

    /// A pool with the same network id is already registered.
    #[error("pool {net_id} is already registered")]
    DuplicatePool { net_id: PoolNetId },

    /// A replication update referenced a pool this process never heard of.
    #[error("no pool with network id {net_id}")]
    UnknownPool { net_id: PoolNetId },

    /// A pool spec in the settings cannot be honoured.
    #[error("pool spec '{pool}': {reason}")]
    InvalidSpec { pool: String, reason: String },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to encode replication update: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode replication update: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use netpool_host::prelude::*;
    pub use netpool_ledger::prelude::*;

    pub use crate::actor_pool::{ActorPool, PendingActivation};
    pub use crate::defaults::{ComponentDefaults, SavedDefaults};
    pub use crate::net::{LinkConfig, ReplicationLink};
    pub use crate::object_pool::ObjectPool;
    pub use crate::pool::{
        is_ready_to_finish, Activation, Pool, PoolCore, PoolDescriptor, PoolFlavor, PoolId,
        PoolNetId,
    };
    pub use crate::registry::PoolRegistry;
    pub use crate::replication::{ObserverBaselines, PoolReplicationUpdate};
    pub use crate::reset::{FieldReset, PackageClassifier};
    pub use crate::session::{Session, SessionConfig, TickDiagnostics};
    pub use crate::settings::{PoolSettings, PoolSpec, ResolvedPoolSpec};
    pub use crate::spawn_task::{SpawnPooledActorTask, SpawnResult, SpawnTaskState, TargetingData};
    pub use crate::PoolError;
}
