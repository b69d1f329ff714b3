//! Actor-flavored pool.
//!
//! Actors are spawned into the world, carry components and physics, and walk
//! a small state machine:
//!
//! ```text
//! UNINITIALIZED --pre_spawn (new)--------------------> SPAWNING
//! SPAWNING      --return_to_pool---------------------> DISABLED
//! SPAWNING, DISABLED --finish_spawning (authority)---> ACTIVE
//! DISABLED      --finish_spawning (observer, early)--> PENDING
//! PENDING       --tick, once ready-------------------> ACTIVE
//! ACTIVE        --return_to_pool---------------------> DISABLED
//! ```
//!
//! The authority drives the ledger. Observers hold a mirror of it and run the
//! same preparation and teardown in reaction to replicated entries, parking
//! entities in a pending queue until [`is_ready_to_finish`] holds.
//!
//! A freshly spawned actor has no ledger entry until it is finished or
//! returned; the pool still owns it while it is spawning.

use std::collections::{HashMap, HashSet};

use netpool_host::class::ClassId;
use netpool_host::component::Teleport;
use netpool_host::entity::EntityId;
use netpool_host::hooks::PoolHook;
use netpool_host::transform::Transform;
use netpool_host::world::{Dormancy, EntityRecord, HostWorld};

use crate::defaults::{self, SavedDefaults};
use crate::pool::{
    is_ready_to_finish, notify, Activation, Pool, PoolCore, PoolDescriptor,
};
use crate::reset::FieldReset;
use crate::PoolError;

/// An observer activation waiting for its entity to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingActivation {
    pub entity: EntityId,
    /// Where the entity appears once promoted. Refreshed by later entries.
    pub transform: Transform,
    /// Whether the construct hook already ran for this activation.
    pub constructed: bool,
}

// ---------------------------------------------------------------------------
// Actor enable / disable
// ---------------------------------------------------------------------------

/// Toggle the world presence of an actor.
pub fn set_enabled(record: &mut EntityRecord, enabled: bool) {
    record.hidden = !enabled;
    record.tick_enabled = enabled && record.start_with_tick_enabled;
    record.collision_enabled = enabled;
    record.set_net_dormancy(if enabled {
        Dormancy::Awake
    } else {
        Dormancy::DormantAll
    });
    record.force_net_update();
}

/// Strip an actor of everything that ties it to its last use.
pub fn disable_actor(record: &mut EntityRecord) {
    record.owner = None;
    record.instigator = None;
    record.set_transform(Transform::IDENTITY, Teleport::None);
    set_enabled(record, false);
    defaults::deactivate_components(record);
}

fn restore(record: &mut EntityRecord, saved: &SavedDefaults, transform: Transform) {
    defaults::reset_component_transforms(record, saved);
    defaults::activate_components(record, saved);
    record.set_transform(transform, Teleport::ResetPhysics);
    defaults::activate_movement(record, saved);
}

// ---------------------------------------------------------------------------
// ActorPool
// ---------------------------------------------------------------------------

/// Pool of spatial entities.
#[derive(Debug)]
pub struct ActorPool {
    core: PoolCore,
    /// Captured the first time the pool sees each actor.
    defaults: HashMap<EntityId, SavedDefaults>,
    pending: Vec<PendingActivation>,
    /// Spawned by this pool, not finished or returned yet.
    spawning: HashSet<EntityId>,
}

impl ActorPool {
    /// An empty actor pool. Only a pool with authority writes its ledger.
    pub fn new(descriptor: PoolDescriptor, has_authority: bool) -> Self {
        Self {
            core: PoolCore::new(descriptor, has_authority),
            defaults: HashMap::new(),
            pending: Vec::new(),
            spawning: HashSet::new(),
        }
    }

    /// Observer activations waiting for readiness, oldest first.
    pub fn pending(&self) -> &[PendingActivation] {
        &self.pending
    }

    /// Whether `entity` was spawned by this pool and is still being set up.
    pub fn is_spawning(&self, entity: EntityId) -> bool {
        self.spawning.contains(&entity)
    }

    /// Component state captured the first time the pool saw `entity`.
    pub fn saved_defaults(&self, entity: EntityId) -> Option<&SavedDefaults> {
        self.defaults.get(&entity)
    }

    fn actor<'w>(
        &self,
        world: &'w mut dyn HostWorld,
        entity: EntityId,
    ) -> Result<&'w mut EntityRecord, PoolError> {
        let record = world
            .entity_mut(entity)
            .ok_or(netpool_host::HostError::StaleEntity { entity })?;
        if !record.actor {
            tracing::error!(pool = %self.core.name(), entity = %entity, "pooled object is not an actor");
            return Err(PoolError::NotAnActor {
                pool: self.core.name().to_owned(),
                entity,
            });
        }
        Ok(record)
    }

    fn store_defaults(&mut self, world: &dyn HostWorld, entity: EntityId) {
        if self.defaults.contains_key(&entity) {
            return;
        }
        if let Some(record) = world.entity(entity) {
            self.defaults.insert(entity, defaults::capture(record));
        }
    }

    fn forget_pending(&mut self, entity: EntityId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.entity != entity);
        before != self.pending.len()
    }

    fn finish_as_authority(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        transform: Transform,
    ) -> Result<Activation, PoolError> {
        let (class, initialized) = {
            let record = self.actor(world, entity)?;
            (record.class, record.initialized)
        };
        self.core.mark_used(entity, class);
        self.spawning.remove(&entity);
        self.core
            .ledger_mut()
            .set_transform(entity, &transform, true);
        self.store_defaults(world, entity);

        if !initialized {
            world.finish_spawning(entity, transform)?;
        }
        let record = self.actor(world, entity)?;
        match self.defaults.get(&entity) {
            Some(saved) => restore(record, saved, transform),
            None => record.set_transform(transform, Teleport::ResetPhysics),
        }
        set_enabled(record, true);
        self.core.ledger_mut().mark_activated(entity);
        tracing::trace!(pool = %self.core.name(), entity = %entity, "activated actor");
        Ok(Activation::Activated)
    }

    fn finish_as_observer(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        transform: Transform,
    ) -> Result<Activation, PoolError> {
        if !is_ready_to_finish(world, entity) {
            self.enqueue(entity, transform, false);
            return Ok(Activation::Pending);
        }
        let class = self.actor(world, entity)?.class;
        self.core.mark_used(entity, class);
        self.spawning.remove(&entity);
        self.store_defaults(world, entity);

        let first_activation = self.core.ledger().is_first_activation(entity);
        let record = self.actor(world, entity)?;
        record.force_net_update();
        match self.defaults.get(&entity) {
            Some(saved) if !first_activation => restore(record, saved, transform),
            _ => record.set_transform(transform, Teleport::ResetPhysics),
        }
        set_enabled(record, true);
        self.core.ledger_mut().mark_activated(entity);
        tracing::trace!(pool = %self.core.name(), entity = %entity, first_activation, "activated mirrored actor");
        Ok(Activation::Activated)
    }

    fn enqueue(&mut self, entity: EntityId, transform: Transform, constructed: bool) {
        if let Some(pending) = self.pending.iter_mut().find(|p| p.entity == entity) {
            pending.transform = transform;
            pending.constructed |= constructed;
            tracing::trace!(pool = %self.core.name(), entity = %entity, "refreshed pending activation");
            return;
        }
        tracing::debug!(pool = %self.core.name(), entity = %entity, "entity not ready, queued for activation");
        self.pending.push(PendingActivation {
            entity,
            transform,
            constructed,
        });
    }
}

impl Pool for ActorPool {
    fn core(&self) -> &PoolCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PoolCore {
        &mut self.core
    }

    fn pre_spawn(
        &mut self,
        world: &mut dyn HostWorld,
        class: ClassId,
        owner: Option<EntityId>,
    ) -> Result<EntityId, PoolError> {
        if self.core.has_authority() {
            while let Some(entity) = self.core.ledger_mut().take_free_of_class(class) {
                if let Some(record) = world.entity_mut(entity) {
                    record.owner = owner;
                    tracing::trace!(pool = %self.core.name(), entity = %entity, "reusing pooled actor");
                    return Ok(entity);
                }
                tracing::warn!(pool = %self.core.name(), entity = %entity, "free ledger entry refers to a destroyed actor, dropping it");
                self.core.ledger_mut().remove(entity);
                self.defaults.remove(&entity);
            }
        }

        let entity = world.spawn_deferred(class, owner)?;
        self.store_defaults(world, entity);
        let record = self.actor(world, entity)?;
        disable_actor(record);
        record.owner = owner;
        self.spawning.insert(entity);
        tracing::trace!(pool = %self.core.name(), entity = %entity, class = world.classes().name(class), "spawned new pooled actor");
        Ok(entity)
    }

    fn finish_spawning(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        transform: Transform,
    ) -> Result<Activation, PoolError> {
        if self.core.has_authority() {
            self.finish_as_authority(world, entity, transform)
        } else {
            self.finish_as_observer(world, entity, transform)
        }
    }

    fn return_to_pool(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        reset: &FieldReset,
    ) -> Result<(), PoolError> {
        let class = self.actor(world, entity)?.class;
        if self.forget_pending(entity) {
            tracing::debug!(pool = %self.core.name(), entity = %entity, "dropped pending activation");
        }
        if self.spawning.remove(&entity) {
            tracing::debug!(pool = %self.core.name(), entity = %entity, "returned actor before it finished spawning");
        }
        self.core.release(world, entity, class, reset);
        let record = self.actor(world, entity)?;
        disable_actor(record);
        tracing::trace!(pool = %self.core.name(), entity = %entity, "returned actor to pool");
        Ok(())
    }

    fn react_to_replication(
        &mut self,
        world: &mut dyn HostWorld,
        index: usize,
        reset: &FieldReset,
    ) -> Result<(), PoolError> {
        let Some(entry) = self.core.ledger().get(index) else {
            return Ok(());
        };
        let (entity, free, transform) = (entry.entity, entry.free, entry.transform());
        self.store_defaults(world, entity);

        if free {
            self.forget_pending(entity);
            if world.entity(entity).is_none() {
                tracing::trace!(pool = %self.core.name(), entity = %entity, "free entry for an actor not mirrored yet");
                return Ok(());
            }
            notify(world, entity, PoolHook::Deactivate);
            return self.return_to_pool(world, entity, reset);
        }

        if self.pending.iter().any(|p| p.entity == entity) {
            self.enqueue(entity, transform, false);
            return Ok(());
        }
        let constructed = notify(world, entity, PoolHook::Construct);
        if !is_ready_to_finish(world, entity) {
            self.enqueue(entity, transform, constructed);
            return Ok(());
        }
        if self.finish_spawning(world, entity, transform)? == Activation::Activated {
            notify(world, entity, PoolHook::Activate);
        }
        Ok(())
    }

    fn tick(&mut self, world: &mut dyn HostWorld) -> Vec<EntityId> {
        let mut promoted = Vec::new();
        for i in (0..self.pending.len()).rev() {
            if !is_ready_to_finish(world, self.pending[i].entity) {
                continue;
            }
            let pending = self.pending.remove(i);
            let entity = pending.entity;
            if !pending.constructed {
                notify(world, entity, PoolHook::Construct);
            }
            match self.finish_spawning(world, entity, pending.transform) {
                Ok(Activation::Activated) => {
                    notify(world, entity, PoolHook::Activate);
                    promoted.push(entity);
                }
                Ok(Activation::Pending) => {}
                Err(err) => {
                    tracing::error!(pool = %self.core.name(), entity = %entity, error = %err, "failed to finish pending activation");
                }
            }
        }
        promoted
    }

    fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn forget(&mut self, entity: EntityId) {
        self.forget_pending(entity);
        self.spawning.remove(&entity);
        self.defaults.remove(&entity);
    }

    fn teardown(&mut self) {
        self.pending.clear();
        self.spawning.clear();
        self.defaults.clear();
        self.core.ledger_mut().clear();
    }

    fn is_object_free(&self, entity: EntityId) -> bool {
        !self.spawning.contains(&entity) && self.core.ledger().is_free(entity)
    }

    fn belongs(&self, entity: EntityId) -> bool {
        self.spawning.contains(&entity) || self.core.ledger().contains(entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
