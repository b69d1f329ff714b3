//! The [`World`] is the in-memory host runtime: it owns the entity allocator,
//! the class registry and every live [`EntityRecord`].
//!
//! Pools never depend on `World` directly. They talk to the host through the
//! [`HostWorld`] trait, which is the narrow set of primitives a pooling layer
//! needs: deferred spawning, plain object construction, finishing a spawn,
//! entity access and timer cleanup. `World` additionally models what the
//! host's own entity replication does on an observer (mirroring entities with
//! the authority's ids, completing their construction, copying dormancy) so
//! replication races can be reproduced deterministically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::class::{ClassId, ClassRegistry};
use crate::component::{Component, Teleport};
use crate::entity::{EntityAllocator, EntityId, IdStatus};
use crate::fields::FieldStore;
use crate::hooks::{PoolHook, PoolableEntity};
use crate::transform::Transform;
use crate::HostError;

// ---------------------------------------------------------------------------
// Roles and flags
// ---------------------------------------------------------------------------

/// Network role of a process, or of a single entity within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetRole {
    /// Decides canonical state.
    Authority,
    /// Mirrors state received from the authority.
    Observer,
}

/// Whether an entity's replicated fields are currently being synchronised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dormancy {
    Awake,
    DormantAll,
}

/// A pending timer owned by an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub name: String,
    pub remaining: f32,
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Everything the host knows about one live entity.
pub struct EntityRecord {
    pub id: EntityId,
    pub class: ClassId,
    /// Spatial entity (actor) rather than a plain object.
    pub actor: bool,
    /// Local role: `Authority` for entities spawned by this process,
    /// `Observer` for mirrors of a remote entity.
    pub role: NetRole,
    /// Construction has completed locally.
    pub initialized: bool,
    pub hidden: bool,
    pub tick_enabled: bool,
    /// Whether instances of the class start with ticking enabled.
    pub start_with_tick_enabled: bool,
    pub collision_enabled: bool,
    dormancy: Dormancy,
    pub owner: Option<EntityId>,
    pub instigator: Option<EntityId>,
    pub transform: Transform,
    pub components: Vec<Component>,
    pub fields: FieldStore,
    hooks: Option<Box<dyn PoolableEntity>>,
    pub timers: Vec<Timer>,
    /// Latent actions (multi-frame gameplay operations) still in flight.
    pub latent_actions: Vec<String>,
    /// Number of forced net updates requested for this entity.
    pub net_update_count: u32,
}

impl std::fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRecord")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("role", &self.role)
            .field("initialized", &self.initialized)
            .field("hidden", &self.hidden)
            .field("dormancy", &self.dormancy)
            .field("components", &self.components.len())
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl EntityRecord {
    pub fn dormancy(&self) -> Dormancy {
        self.dormancy
    }

    /// Gameplay-side dormancy change. Only entities this process has
    /// authority over can change their dormancy; on a mirror the call is
    /// ignored and `false` is returned.
    pub fn set_net_dormancy(&mut self, dormancy: Dormancy) -> bool {
        if self.role != NetRole::Authority {
            return false;
        }
        self.dormancy = dormancy;
        true
    }

    pub fn force_net_update(&mut self) {
        self.net_update_count += 1;
    }

    pub fn has_hooks(&self) -> bool {
        self.hooks.is_some()
    }

    /// Invoke a lifecycle hook if the entity carries hooks. Returns whether a
    /// hook ran.
    pub fn notify(&mut self, hook: PoolHook) -> bool {
        let Some(hooks) = self.hooks.as_deref_mut() else {
            return false;
        };
        match hook {
            PoolHook::Construct => hooks.on_pool_construct(self.id, &mut self.fields),
            PoolHook::Activate => hooks.on_pool_activate(self.id, &mut self.fields),
            PoolHook::Deactivate => hooks.on_pool_deactivate(self.id, &mut self.fields),
        }
        true
    }

    /// Field names the entity asked the automatic reset to skip.
    pub fn reset_exclude_list(&self) -> Vec<String> {
        self.hooks
            .as_deref()
            .map(|h| h.reset_exclude_list())
            .unwrap_or_default()
    }

    /// Move the entity. `ResetPhysics` also zeroes the velocity of every
    /// physical component.
    pub fn set_transform(&mut self, transform: Transform, teleport: Teleport) {
        self.transform = transform;
        if teleport == Teleport::ResetPhysics {
            for c in &mut self.components {
                if let Some(p) = &mut c.primitive {
                    p.linear_velocity = crate::transform::Vec3::ZERO;
                }
            }
        }
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.name == name)
    }

    fn activate_auto_components(&mut self) {
        for c in &mut self.components {
            if c.auto_activate && !c.active {
                c.activate();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HostWorld
// ---------------------------------------------------------------------------

/// The host primitives a pooling layer consumes.
pub trait HostWorld {
    /// Role of this process.
    fn net_role(&self) -> NetRole;

    fn classes(&self) -> &ClassRegistry;

    /// Spawn an actor without completing its construction. The actor sits at
    /// the identity transform until [`finish_spawning`](Self::finish_spawning).
    fn spawn_deferred(
        &mut self,
        class: ClassId,
        owner: Option<EntityId>,
    ) -> Result<EntityId, HostError>;

    /// Construct a plain (non-spatial) object.
    fn construct_object(&mut self, class: ClassId) -> Result<EntityId, HostError>;

    /// Complete a deferred spawn at `transform`.
    fn finish_spawning(&mut self, entity: EntityId, transform: Transform)
        -> Result<(), HostError>;

    fn entity(&self, entity: EntityId) -> Option<&EntityRecord>;

    fn entity_mut(&mut self, entity: EntityId) -> Option<&mut EntityRecord>;

    /// Cancel every timer and latent action owned by `entity`.
    fn clear_timers(&mut self, entity: EntityId);
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// In-memory host runtime.
#[derive(Debug)]
pub struct World {
    role: NetRole,
    allocator: EntityAllocator,
    classes: ClassRegistry,
    records: HashMap<EntityId, EntityRecord>,
}

impl World {
    pub fn new(role: NetRole) -> Self {
        Self::with_classes(role, ClassRegistry::new())
    }

    pub fn with_classes(role: NetRole, classes: ClassRegistry) -> Self {
        Self {
            role,
            allocator: EntityAllocator::new(),
            classes,
            records: HashMap::new(),
        }
    }

    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    /// Change the process role, e.g. after a host migration.
    pub fn set_net_role(&mut self, role: NetRole) {
        self.role = role;
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Whether `entity` is live, was destroyed, or was never seen here.
    pub fn id_status(&self, entity: EntityId) -> IdStatus {
        self.allocator.status(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.records.len()
    }

    /// Ids of every live entity, sorted.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.records.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn destroy(&mut self, entity: EntityId) -> Result<(), HostError> {
        self.allocator.release(entity)?;
        self.records.remove(&entity);
        tracing::trace!(entity = %entity, "destroyed entity");
        Ok(())
    }

    pub fn schedule_timer(&mut self, entity: EntityId, name: &str, seconds: f32) -> Result<(), HostError> {
        let record = self.record_mut(entity)?;
        record.timers.push(Timer {
            name: name.to_owned(),
            remaining: seconds,
        });
        Ok(())
    }

    pub fn start_latent_action(&mut self, entity: EntityId, name: &str) -> Result<(), HostError> {
        self.record_mut(entity)?.latent_actions.push(name.to_owned());
        Ok(())
    }

    /// Advance ticking entities and their components by `dt` seconds.
    /// Returns the `(entity, timer)` pairs that fired.
    pub fn advance(&mut self, dt: f32) -> Vec<(EntityId, String)> {
        let mut fired = Vec::new();
        for record in self.records.values_mut() {
            for c in &mut record.components {
                c.tick(dt);
            }
            if !record.tick_enabled {
                continue;
            }
            let id = record.id;
            record.timers.retain_mut(|t| {
                t.remaining -= dt;
                if t.remaining <= 0.0 {
                    fired.push((id, t.name.clone()));
                    false
                } else {
                    true
                }
            });
        }
        fired.sort();
        fired
    }

    // -- observer-side entity replication ----------------------------------

    /// Create the local mirror of a remote entity, keeping its id.
    ///
    /// The mirror is not yet constructed and is dormant until the host's
    /// replication reports otherwise.
    pub fn spawn_replicated(&mut self, entity: EntityId, class: ClassId) -> Result<(), HostError> {
        self.allocator.allocate_specific(entity)?;
        let mut record = match self.instantiate(entity, class) {
            Ok(record) => record,
            Err(e) => {
                self.rollback(entity);
                return Err(e);
            }
        };
        record.role = NetRole::Observer;
        record.dormancy = Dormancy::DormantAll;
        self.records.insert(entity, record);
        tracing::trace!(entity = %entity, "mirrored remote entity");
        Ok(())
    }

    /// Local construction of a mirrored entity completed.
    pub fn complete_replication(&mut self, entity: EntityId) -> Result<(), HostError> {
        let record = self.record_mut(entity)?;
        if !record.initialized {
            record.initialized = true;
            record.activate_auto_components();
        }
        Ok(())
    }

    /// Dormancy received from the authority.
    pub fn set_replicated_dormancy(&mut self, entity: EntityId, dormancy: Dormancy) -> Result<(), HostError> {
        self.record_mut(entity)?.dormancy = dormancy;
        Ok(())
    }

    /// Mirror this world's actors into `observer`: missing actors are spawned
    /// and completed, and dormancy is copied for every mirrored actor.
    /// Returns the newly mirrored ids.
    pub fn mirror_actors_into(&self, observer: &mut World) -> Vec<EntityId> {
        let mut spawned = Vec::new();
        for id in self.entity_ids() {
            let Some(record) = self.records.get(&id) else {
                continue;
            };
            if !record.actor || !record.initialized {
                continue;
            }
            if !observer.records.contains_key(&id) {
                if let Err(e) = observer.spawn_replicated(id, record.class) {
                    tracing::warn!(entity = %id, error = %e, "could not mirror actor");
                    continue;
                }
                if let Err(e) = observer.complete_replication(id) {
                    tracing::warn!(entity = %id, error = %e, "could not complete mirrored actor");
                    continue;
                }
                spawned.push(id);
            }
            if let Some(mirror) = observer.records.get_mut(&id) {
                if mirror.role == NetRole::Observer {
                    mirror.dormancy = record.dormancy;
                }
            }
        }
        spawned
    }

    // -- internals -----------------------------------------------------------

    /// Give back an id whose record could not be built.
    fn rollback(&mut self, id: EntityId) {
        if let Err(e) = self.allocator.release(id) {
            tracing::warn!(entity = %id, error = %e, "could not release id after failed spawn");
        }
    }

    fn record_mut(&mut self, entity: EntityId) -> Result<&mut EntityRecord, HostError> {
        self.records
            .get_mut(&entity)
            .ok_or(HostError::StaleEntity { entity })
    }

    fn instantiate(&self, id: EntityId, class: ClassId) -> Result<EntityRecord, HostError> {
        let info = self.classes.get(class).ok_or_else(|| HostError::UnknownClass {
            name: format!("{class:?}"),
        })?;
        let mut fields = FieldStore::new();
        for (_, field) in self.classes.fields_of(class) {
            fields.set(&field.name, field.default.clone());
        }
        Ok(EntityRecord {
            id,
            class,
            actor: self.classes.is_actor(class),
            role: NetRole::Authority,
            initialized: false,
            hidden: false,
            tick_enabled: false,
            start_with_tick_enabled: info.start_with_tick_enabled,
            collision_enabled: true,
            dormancy: Dormancy::Awake,
            owner: None,
            instigator: None,
            transform: Transform::IDENTITY,
            components: info.components.clone(),
            fields,
            hooks: info.hooks.as_ref().map(|factory| factory()),
            timers: Vec::new(),
            latent_actions: Vec::new(),
            net_update_count: 0,
        })
    }
}

impl HostWorld for World {
    fn net_role(&self) -> NetRole {
        self.role
    }

    fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    fn spawn_deferred(
        &mut self,
        class: ClassId,
        owner: Option<EntityId>,
    ) -> Result<EntityId, HostError> {
        if !self.classes.is_actor(class) {
            return Err(HostError::ClassKindMismatch {
                class: self.classes.name(class).to_owned(),
                expected: "actor",
            });
        }
        let id = self.allocator.allocate();
        let mut record = match self.instantiate(id, class) {
            Ok(record) => record,
            Err(e) => {
                self.rollback(id);
                return Err(e);
            }
        };
        record.owner = owner;
        self.records.insert(id, record);
        tracing::trace!(entity = %id, class = self.classes.name(class), "deferred spawn");
        Ok(id)
    }

    fn construct_object(&mut self, class: ClassId) -> Result<EntityId, HostError> {
        if self.classes.get(class).is_none() || self.classes.is_actor(class) {
            return Err(HostError::ClassKindMismatch {
                class: self.classes.name(class).to_owned(),
                expected: "object",
            });
        }
        let id = self.allocator.allocate();
        let mut record = match self.instantiate(id, class) {
            Ok(record) => record,
            Err(e) => {
                self.rollback(id);
                return Err(e);
            }
        };
        record.initialized = true;
        self.records.insert(id, record);
        Ok(id)
    }

    fn finish_spawning(
        &mut self,
        entity: EntityId,
        transform: Transform,
    ) -> Result<(), HostError> {
        let record = self.record_mut(entity)?;
        record.set_transform(transform, Teleport::ResetPhysics);
        if !record.initialized {
            record.initialized = true;
            record.activate_auto_components();
        }
        Ok(())
    }

    fn entity(&self, entity: EntityId) -> Option<&EntityRecord> {
        self.records.get(&entity)
    }

    fn entity_mut(&mut self, entity: EntityId) -> Option<&mut EntityRecord> {
        self.records.get_mut(&entity)
    }

    fn clear_timers(&mut self, entity: EntityId) {
        if let Some(record) = self.records.get_mut(&entity) {
            record.timers.clear();
            record.latent_actions.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
