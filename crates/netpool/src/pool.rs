//! The pool abstraction shared by both pool flavors.
//!
//! A pool owns a target class, a subclass inclusion policy and a
//! [`Ledger`]. Flavor-specific behaviour (how an entity is acquired, prepared
//! and released) lives behind the [`Pool`] trait; the state every flavor has
//! lives in [`PoolCore`].

use std::fmt;

use serde::{Deserialize, Serialize};

use netpool_host::class::ClassId;
use netpool_host::entity::EntityId;
use netpool_host::hooks::PoolHook;
use netpool_host::transform::Transform;
use netpool_host::world::{Dormancy, HostWorld};
use netpool_ledger::ledger::Ledger;

use crate::actor_pool::ActorPool;
use crate::object_pool::ObjectPool;
use crate::reset::FieldReset;
use crate::PoolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Index of a pool in its registry's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub(crate) usize);

/// Network identity of a pool, shared by the authority's pool and every
/// observer's mirror of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolNetId(pub u32);

impl PoolNetId {
    /// Set on ids of pools an observer instantiates for itself. Those pools
    /// never replicate, so their ids must not collide with the authority's.
    pub const LOCAL_BIT: u32 = 1 << 31;

    pub fn is_local(self) -> bool {
        self.0 & Self::LOCAL_BIT != 0
    }
}

impl fmt::Display for PoolNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "pool#local{}", self.0 & !Self::LOCAL_BIT)
        } else {
            write!(f, "pool#{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolFlavor {
    /// Spatial entities with components and an activation state machine.
    #[default]
    Actor,
    /// Plain objects: only free / used.
    Object,
}

/// Everything an observer needs to build its mirror of a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub net_id: PoolNetId,
    /// Diagnostic name, as configured.
    pub name: String,
    pub flavor: PoolFlavor,
    /// Class the pool serves.
    pub target_class: ClassId,
    /// Whether subclasses of `target_class` are served too.
    pub include_child_classes: bool,
}

// ---------------------------------------------------------------------------
// PoolCore
// ---------------------------------------------------------------------------

/// State common to every pool flavor.
#[derive(Debug)]
pub struct PoolCore {
    descriptor: PoolDescriptor,
    /// Whether this process originates the ledger. Mirrors only receive it.
    has_authority: bool,
    ledger: Ledger,
}

impl PoolCore {
    pub fn new(descriptor: PoolDescriptor, has_authority: bool) -> Self {
        Self {
            descriptor,
            has_authority,
            ledger: Ledger::new(),
        }
    }

    pub fn descriptor(&self) -> &PoolDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn net_id(&self) -> PoolNetId {
        self.descriptor.net_id
    }

    pub fn flavor(&self) -> PoolFlavor {
        self.descriptor.flavor
    }

    pub fn target_class(&self) -> ClassId {
        self.descriptor.target_class
    }

    pub fn include_child_classes(&self) -> bool {
        self.descriptor.include_child_classes
    }

    pub fn has_authority(&self) -> bool {
        self.has_authority
    }

    /// The pool's free / used record.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Record `entity` as in use. Mirrors leave the ledger alone.
    pub(crate) fn mark_used(&mut self, entity: EntityId, class: ClassId) {
        if self.has_authority {
            self.ledger.add(entity, class, false);
        }
    }

    /// The part of a return every flavor shares: cancel timers, reset
    /// fields, mark the entry free, push the change.
    pub(crate) fn release(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        class: ClassId,
        reset: &FieldReset,
    ) {
        world.clear_timers(entity);
        reset.apply(world, entity);
        if self.has_authority {
            self.ledger.add(entity, class, true);
        }
        if let Some(record) = world.entity_mut(entity) {
            record.force_net_update();
        }
    }
}

// ---------------------------------------------------------------------------
// Pool trait
// ---------------------------------------------------------------------------

/// Outcome of finishing a spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The entity is active now.
    Activated,
    /// The entity is not ready yet and waits in the pending queue.
    Pending,
}

/// Flavor-specific pool behaviour.
pub trait Pool {
    fn core(&self) -> &PoolCore;

    fn core_mut(&mut self) -> &mut PoolCore;

    /// Hand out an entity of `class`: a free one from the ledger, or a brand
    /// new one. Actors come back disabled.
    fn pre_spawn(
        &mut self,
        world: &mut dyn HostWorld,
        class: ClassId,
        owner: Option<EntityId>,
    ) -> Result<EntityId, PoolError>;

    /// Bring a pre-spawned (or returned) entity to life at `transform`.
    fn finish_spawning(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        transform: Transform,
    ) -> Result<Activation, PoolError>;

    fn return_to_pool(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        reset: &FieldReset,
    ) -> Result<(), PoolError>;

    /// Observer-side reaction to the replicated entry at `index` having been
    /// added or changed.
    fn react_to_replication(
        &mut self,
        world: &mut dyn HostWorld,
        index: usize,
        reset: &FieldReset,
    ) -> Result<(), PoolError>;

    /// Promote pending entities that became ready. Returns the promoted ones.
    fn tick(&mut self, _world: &mut dyn HostWorld) -> Vec<EntityId> {
        Vec::new()
    }

    fn pending_count(&self) -> usize {
        0
    }

    /// Drop any local state about `entity` after its entry disappeared.
    fn forget(&mut self, _entity: EntityId) {}

    /// Release everything at session end.
    fn teardown(&mut self) {
        self.core_mut().ledger_mut().clear();
    }

    fn is_object_free(&self, entity: EntityId) -> bool {
        self.core().ledger().is_free(entity)
    }

    fn belongs(&self, entity: EntityId) -> bool {
        self.core().ledger().contains(entity)
    }
}

impl fmt::Debug for dyn Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("net_id", &self.core().net_id())
            .field("name", &self.core().name())
            .field("has_authority", &self.core().has_authority())
            .field("entries", &self.core().ledger().len())
            .finish()
    }
}

/// Instantiate a pool of the descriptor's flavor.
pub fn make_pool(descriptor: PoolDescriptor, has_authority: bool) -> Box<dyn Pool> {
    match descriptor.flavor {
        PoolFlavor::Actor => Box::new(ActorPool::new(descriptor, has_authority)),
        PoolFlavor::Object => Box::new(ObjectPool::new(descriptor, has_authority)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether an observer may finish spawning `entity`.
///
/// Two unrelated signals are coupled here: construction must have completed
/// locally, and the entity's replicated state must be awake. Together they
/// stand in for "the authoritative fields of this entity have landed", which
/// the host does not report directly.
pub fn is_ready_to_finish(world: &dyn HostWorld, entity: EntityId) -> bool {
    world
        .entity(entity)
        .is_some_and(|r| r.initialized && r.dormancy() == Dormancy::Awake)
}

/// Deliver a lifecycle hook. Returns whether the entity carried hooks.
pub(crate) fn notify(world: &mut dyn HostWorld, entity: EntityId, hook: PoolHook) -> bool {
    world
        .entity_mut(entity)
        .is_some_and(|record| record.notify(hook))
}
