//! The pool registry.
//!
//! [`PoolRegistry`] owns every pool of one world session and answers "which
//! pool handles class X" and "which pool owns entity E". It keeps two
//! collections: pools the authority drives (on an observer, these are the
//! mirrors of the authority's pools) and pools an observer instantiated for
//! itself. Both are kept sorted most-derived target class first, so the first
//! exact match wins and otherwise the most specific ancestor pool that
//! accepts subclasses does.

use std::cmp::Reverse;
use std::collections::HashMap;

use netpool_host::class::ClassId;
use netpool_host::component::Teleport;
use netpool_host::entity::EntityId;
use netpool_host::hooks::PoolHook;
use netpool_host::transform::Transform;
use netpool_host::world::{HostWorld, NetRole};
use netpool_ledger::delta::AppliedDelta;

use crate::pool::{make_pool, notify, Activation, Pool, PoolDescriptor, PoolFlavor, PoolId, PoolNetId};
use crate::replication::{ObserverBaselines, PoolReplicationUpdate};
use crate::reset::FieldReset;
use crate::settings::{PoolSettings, ResolvedPoolSpec};
use crate::PoolError;

/// Name of the fallback pool for actors no configured pool handles.
pub const DEFAULT_ACTOR_POOL: &str = "DefaultActorPool";
/// Name of the fallback pool for objects no configured pool handles.
pub const DEFAULT_OBJECT_POOL: &str = "DefaultObjectPool";

/// Every pool of one world session.
pub struct PoolRegistry {
    /// Arena. Slots are never reused within a session.
    pools: Vec<Box<dyn Pool>>,
    authority_pools: Vec<PoolId>,
    observer_pools: Vec<PoolId>,
    by_net_id: HashMap<PoolNetId, PoolId>,
    reset: FieldReset,
    next_net_id: u32,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools)
            .field("authority_pools", &self.authority_pools)
            .field("observer_pools", &self.observer_pools)
            .finish()
    }
}

impl PoolRegistry {
    /// An empty registry. Call [`initialize`](Self::initialize) at session
    /// start.
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            authority_pools: Vec::new(),
            observer_pools: Vec::new(),
            by_net_id: HashMap::new(),
            reset: FieldReset::default(),
            next_net_id: 1,
        }
    }

    /// Number of pools, both collections.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Look up a pool by arena id.
    pub fn pool(&self, id: PoolId) -> Option<&dyn Pool> {
        self.pools.get(id.0).map(|p| &**p)
    }

    /// Look up a pool by the id it replicates under.
    pub fn pool_by_net_id(&self, net_id: PoolNetId) -> Option<&dyn Pool> {
        self.by_net_id.get(&net_id).and_then(|&id| self.pool(id))
    }

    /// Pools this process owns, most specific target class first.
    pub fn authority_pools(&self) -> &[PoolId] {
        &self.authority_pools
    }

    /// Mirrors of remote pools, plus local pools built on observers, most
    /// specific target class first.
    pub fn observer_pools(&self) -> &[PoolId] {
        &self.observer_pools
    }

    /// Reset policy applied on every return.
    pub fn field_reset(&self) -> &FieldReset {
        &self.reset
    }

    pub fn set_field_reset(&mut self, reset: FieldReset) {
        self.reset = reset;
    }

    /// Entities waiting for readiness, across every pool.
    pub fn pending_count(&self) -> usize {
        self.pools.iter().map(|p| p.pending_count()).sum()
    }

    // -- registration ---------------------------------------------------------

    /// A network id for a pool instantiated by this process.
    pub fn allocate_net_id(&mut self, role: NetRole) -> PoolNetId {
        let id = self.next_net_id;
        self.next_net_id += 1;
        match role {
            NetRole::Authority => PoolNetId(id),
            NetRole::Observer => PoolNetId(id | PoolNetId::LOCAL_BIT),
        }
    }

    /// Add a pool and return its id.
    ///
    /// On the authority every pool is an authority pool. On an observer,
    /// mirrors of the authority's pools join the authority collection and the
    /// observer's own pools join the observer collection.
    pub fn register_pool(
        &mut self,
        world: &dyn HostWorld,
        pool: Box<dyn Pool>,
    ) -> Result<PoolId, PoolError> {
        let net_id = pool.core().net_id();
        if self.by_net_id.contains_key(&net_id) {
            return Err(PoolError::DuplicatePool { net_id });
        }
        let authority_side =
            world.net_role() == NetRole::Authority || !pool.core().has_authority();

        let id = PoolId(self.pools.len());
        self.pools.push(pool);
        self.by_net_id.insert(net_id, id);

        let pools = &self.pools;
        let classes = world.classes();
        let collection = if authority_side {
            &mut self.authority_pools
        } else {
            &mut self.observer_pools
        };
        collection.push(id);
        collection.sort_by_key(|pid| Reverse(classes.depth(pools[pid.0].core().target_class())));
        Ok(id)
    }

    /// Instantiate and register a pool this process owns.
    pub fn create_pool(
        &mut self,
        world: &dyn HostWorld,
        name: &str,
        flavor: PoolFlavor,
        target_class: ClassId,
        include_child_classes: bool,
    ) -> Result<PoolId, PoolError> {
        let descriptor = PoolDescriptor {
            net_id: self.allocate_net_id(world.net_role()),
            name: name.to_owned(),
            flavor,
            target_class,
            include_child_classes,
        };
        self.register_pool(world, make_pool(descriptor, true))
    }

    // -- lookup ---------------------------------------------------------------

    fn lookup_collection(&self, world: &dyn HostWorld) -> &[PoolId] {
        match world.net_role() {
            NetRole::Authority => &self.authority_pools,
            NetRole::Observer => &self.observer_pools,
        }
    }

    /// Pool that handles `class`: an exact target match if there is one,
    /// otherwise the first (most derived) ancestor pool that accepts
    /// subclasses.
    pub fn find_pool(&self, world: &dyn HostWorld, class: ClassId) -> Option<PoolId> {
        let classes = world.classes();
        let mut candidate = None;
        for &id in self.lookup_collection(world) {
            let core = self.pools[id.0].core();
            if core.target_class() == class {
                return Some(id);
            }
            if candidate.is_none()
                && core.include_child_classes()
                && classes.is_child_of(class, core.target_class())
            {
                candidate = Some(id);
            }
        }
        candidate
    }

    /// Pool that owns `entity`. Actors are found by ledger membership,
    /// authority collection first; plain objects fall back to their class.
    pub fn find_pool_for_entity(&self, world: &dyn HostWorld, entity: EntityId) -> Option<PoolId> {
        let record = world.entity(entity)?;
        if record.actor {
            return self
                .authority_pools
                .iter()
                .chain(&self.observer_pools)
                .copied()
                .find(|id| self.pools[id.0].belongs(entity));
        }
        self.find_pool(world, record.class)
    }

    // -- requests -------------------------------------------------------------

    /// Request an entity of `class`, reporting failures as errors.
    pub fn try_request_pool_object(
        &mut self,
        world: &mut dyn HostWorld,
        class: ClassId,
        owner: Option<EntityId>,
        deferred: bool,
    ) -> Result<EntityId, PoolError> {
        let id = self
            .find_pool(&*world, class)
            .ok_or_else(|| PoolError::NoPoolForClass {
                class: world.classes().name(class).to_owned(),
            })?;
        let pool = &mut self.pools[id.0];
        let entity = pool.pre_spawn(world, class, owner)?;
        notify(world, entity, PoolHook::Construct);
        if !deferred && pool.finish_spawning(world, entity, Transform::IDENTITY)? == Activation::Activated {
            notify(world, entity, PoolHook::Activate);
        }
        tracing::debug!(pool = %pool.core().name(), entity = %entity, deferred, "handed out pooled entity");
        Ok(entity)
    }

    /// Request an entity of `class`. Unless `deferred`, the entity comes back
    /// active at the identity transform; otherwise it comes back disabled and
    /// must be completed with
    /// [`finish_spawning_pool_object`](Self::finish_spawning_pool_object).
    ///
    /// Returns `None` (and logs) when no pool handles the class.
    pub fn request_pool_object(
        &mut self,
        world: &mut dyn HostWorld,
        class: ClassId,
        owner: Option<EntityId>,
        deferred: bool,
    ) -> Option<EntityId> {
        match self.try_request_pool_object(world, class, owner, deferred) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::error!(class = world.classes().name(class), error = %err, "failed to get pool object");
                None
            }
        }
    }

    /// First half of a deferred actor spawn: a disabled actor already placed
    /// at `transform`, ready for gameplay setup.
    pub fn begin_spawning_pool_actor(
        &mut self,
        world: &mut dyn HostWorld,
        class: ClassId,
        transform: Transform,
        owner: Option<EntityId>,
    ) -> Option<EntityId> {
        let entity = self.request_pool_object(world, class, owner, true)?;
        if let Some(record) = world.entity_mut(entity) {
            record.set_transform(transform, Teleport::ResetPhysics);
        }
        Some(entity)
    }

    /// Second half of a deferred spawn: activate `entity` at `transform` and
    /// run its activate hook.
    pub fn finish_spawning_pool_object(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        transform: Transform,
    ) -> Result<Activation, PoolError> {
        let class = world
            .entity(entity)
            .map(|r| r.class)
            .ok_or(netpool_host::HostError::StaleEntity { entity })?;
        let id = self
            .find_pool(&*world, class)
            .ok_or_else(|| PoolError::NoPoolForClass {
                class: world.classes().name(class).to_owned(),
            })?;
        let activation = self.pools[id.0].finish_spawning(world, entity, transform)?;
        if activation == Activation::Activated {
            notify(world, entity, PoolHook::Activate);
        }
        Ok(activation)
    }

    /// Give `entity` back to its pool. An entity no pool owns is an orphan:
    /// logged, reported, and left untouched.
    pub fn return_to_pool(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
    ) -> Result<(), PoolError> {
        let Some(id) = self.find_pool_for_entity(&*world, entity) else {
            tracing::error!(entity = %entity, "tried to return an object to its pool, but no pool owns it");
            return Err(PoolError::Orphaned { entity });
        };
        notify(world, entity, PoolHook::Deactivate);
        self.pools[id.0].return_to_pool(world, entity, &self.reset)
    }

    /// Whether `entity` is currently handed out by its pool.
    pub fn is_pooled_object_active(&self, world: &dyn HostWorld, entity: EntityId) -> bool {
        self.find_pool_for_entity(world, entity)
            .is_some_and(|id| !self.pools[id.0].is_object_free(entity))
    }

    // -- session --------------------------------------------------------------

    /// Build the configured pools plus the two fallbacks, and warm them up.
    ///
    /// Authority-only specs are skipped on observers; they receive those
    /// pools from the authority instead.
    pub fn initialize(
        &mut self,
        world: &mut dyn HostWorld,
        settings: &PoolSettings,
    ) -> Result<(), PoolError> {
        let specs = settings.resolve(world.classes())?;
        self.reset = FieldReset::from_settings(settings);
        let role = world.net_role();
        tracing::info!(?role, pools = specs.len(), "initializing pools");

        for spec in &specs {
            if spec.authority_only && role == NetRole::Observer {
                tracing::debug!(pool = %spec.name, "skipping authority-only pool on observer");
                continue;
            }
            self.initialize_pool(world, spec)?;
        }

        self.create_pool(&*world, DEFAULT_ACTOR_POOL, PoolFlavor::Actor, ClassId::ACTOR, true)?;
        self.create_pool(&*world, DEFAULT_OBJECT_POOL, PoolFlavor::Object, ClassId::OBJECT, true)?;
        tracing::info!(pools = self.pools.len(), "pools initialized");
        Ok(())
    }

    fn initialize_pool(
        &mut self,
        world: &mut dyn HostWorld,
        spec: &ResolvedPoolSpec,
    ) -> Result<PoolId, PoolError> {
        let id = self.create_pool(
            &*world,
            &spec.name,
            spec.flavor,
            spec.target_class,
            spec.include_child_classes,
        )?;
        tracing::info!(pool = %spec.name, "spawned pool");
        self.pre_allocate(world, id, &spec.preallocate_classes, spec.preallocate_count);
        Ok(id)
    }

    /// Warm `pool` up with `count` entities per class. Only the authority
    /// preallocates. An empty class list means the pool's target class.
    pub fn pre_allocate(
        &mut self,
        world: &mut dyn HostWorld,
        pool: PoolId,
        classes: &[ClassId],
        count: u32,
    ) {
        if count == 0 || world.net_role() != NetRole::Authority {
            return;
        }
        let Some(core) = self.pool(pool).map(|p| p.core()) else {
            return;
        };
        let name = core.name().to_owned();
        let classes = if classes.is_empty() {
            vec![core.target_class()]
        } else {
            classes.to_vec()
        };
        tracing::info!(pool = %name, count, classes = classes.len(), "preallocating pooled entities");

        for class in classes {
            let mut spawned = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match self.request_pool_object(world, class, None, false) {
                    Some(entity) => spawned.push(entity),
                    None => break,
                }
            }
            for entity in spawned {
                if let Err(err) = self.return_to_pool(world, entity) {
                    tracing::warn!(pool = %name, entity = %entity, error = %err, "failed to return preallocated entity");
                }
            }
        }
    }

    /// Promote pending activations in every pool. Returns the promoted
    /// entities.
    pub fn tick(&mut self, world: &mut dyn HostWorld) -> Vec<EntityId> {
        let mut promoted = Vec::new();
        for pool in &mut self.pools {
            promoted.extend(pool.tick(world));
        }
        promoted
    }

    // -- replication ----------------------------------------------------------

    /// Updates for one observer: one per authority-owned pool whose ledger
    /// changed since `baselines`, plus a descriptor-only update the first
    /// time a pool is seen.
    pub fn collect_replication(
        &self,
        baselines: &mut ObserverBaselines,
    ) -> Vec<PoolReplicationUpdate> {
        let mut updates = Vec::new();
        for &id in &self.authority_pools {
            let core = self.pools[id.0].core();
            if !core.has_authority() {
                continue;
            }
            let baseline = baselines.baseline_mut(core.net_id());
            let fresh = baseline.is_fresh();
            let delta = core.ledger().diff(baseline);
            if !fresh && delta.is_none() {
                continue;
            }
            updates.push(PoolReplicationUpdate {
                net_id: core.net_id(),
                descriptor: fresh.then(|| core.descriptor().clone()),
                delta: delta.unwrap_or_default(),
            });
        }
        updates
    }

    /// Apply one update from the authority: build the mirror pool on first
    /// contact, apply the ledger delta and run the pool's reactions in
    /// delivery order.
    pub fn apply_replication(
        &mut self,
        world: &mut dyn HostWorld,
        update: &PoolReplicationUpdate,
    ) -> Result<AppliedDelta, PoolError> {
        let id = match self.by_net_id.get(&update.net_id) {
            Some(&id) => id,
            None => {
                let Some(descriptor) = &update.descriptor else {
                    tracing::warn!(pool = %update.net_id, "update for a pool this process never heard of");
                    return Err(PoolError::UnknownPool {
                        net_id: update.net_id,
                    });
                };
                tracing::info!(pool = %descriptor.name, net_id = %descriptor.net_id, "mirroring pool");
                self.register_pool(&*world, make_pool(descriptor.clone(), false))?
            }
        };

        let pool = &mut self.pools[id.0];
        let applied = pool.core_mut().ledger_mut().apply_delta(&update.delta);
        for &entity in &applied.removed {
            pool.forget(entity);
        }
        for index in applied.touched() {
            if let Err(err) = pool.react_to_replication(world, index, &self.reset) {
                tracing::error!(pool = %pool.core().name(), index, error = %err, "replication reaction failed");
            }
        }
        Ok(applied)
    }

    /// Drop every pool. Ends the session.
    pub fn teardown(&mut self) {
        for pool in &mut self.pools {
            pool.teardown();
        }
        tracing::info!(pools = self.pools.len(), "pools torn down");
        self.pools.clear();
        self.authority_pools.clear();
        self.observer_pools.clear();
        self.by_net_id.clear();
    }

    /// BLAKE3 digest over every replicated pool's ledger, ordered by network
    /// id. Pools an observer made for itself are left out, so an authority
    /// and an observer that have converged hash equal.
    pub fn ledger_hash(&self) -> String {
        let mut replicated: Vec<(PoolNetId, String)> = self
            .pools
            .iter()
            .map(|p| p.core())
            .filter(|core| !core.net_id().is_local())
            .map(|core| (core.net_id(), core.ledger().state_hash()))
            .collect();
        replicated.sort();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&(replicated.len() as u64).to_le_bytes());
        for (net_id, hash) in &replicated {
            hasher.update(&net_id.0.to_le_bytes());
            hasher.update(hash.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
