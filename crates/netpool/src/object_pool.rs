//! Object-flavored pool: plain objects with no spatial or component state.
//! Preparation is only "find a free object of exactly this class, or
//! construct a new one".

use netpool_host::class::ClassId;
use netpool_host::entity::EntityId;
use netpool_host::hooks::PoolHook;
use netpool_host::transform::Transform;
use netpool_host::world::HostWorld;

use crate::pool::{notify, Activation, Pool, PoolCore, PoolDescriptor};
use crate::reset::FieldReset;
use crate::PoolError;

/// Pool of plain objects: no components, no activation states.
#[derive(Debug)]
pub struct ObjectPool {
    core: PoolCore,
}

impl ObjectPool {
    /// An empty object pool. Only a pool with authority writes its ledger.
    pub fn new(descriptor: PoolDescriptor, has_authority: bool) -> Self {
        Self {
            core: PoolCore::new(descriptor, has_authority),
        }
    }
}

impl Pool for ObjectPool {
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
        _owner: Option<EntityId>,
    ) -> Result<EntityId, PoolError> {
        if self.core.has_authority() {
            if let Some(entity) = self.core.ledger_mut().take_free_of_class(class) {
                tracing::trace!(pool = %self.core.name(), entity = %entity, "reusing pooled object");
                return Ok(entity);
            }
        }
        let entity = world.construct_object(class)?;
        self.core.mark_used(entity, class);
        if let Some(record) = world.entity_mut(entity) {
            record.force_net_update();
        }
        tracing::trace!(pool = %self.core.name(), entity = %entity, "constructed new pooled object");
        Ok(entity)
    }

    fn finish_spawning(
        &mut self,
        _world: &mut dyn HostWorld,
        _entity: EntityId,
        _transform: Transform,
    ) -> Result<Activation, PoolError> {
        Ok(Activation::Activated)
    }

    fn return_to_pool(
        &mut self,
        world: &mut dyn HostWorld,
        entity: EntityId,
        reset: &FieldReset,
    ) -> Result<(), PoolError> {
        let class = match world.entity(entity) {
            Some(record) => record.class,
            None => return Err(netpool_host::HostError::StaleEntity { entity }.into()),
        };
        self.core.release(world, entity, class, reset);
        tracing::trace!(pool = %self.core.name(), entity = %entity, "returned object to pool");
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
        let (entity, free) = (entry.entity, entry.free);
        // Plain objects are not replicated as entities; only objects that
        // also exist on this side take part.
        if world.entity(entity).is_none() {
            tracing::trace!(pool = %self.core.name(), entity = %entity, "replicated entry for an object not present locally");
            return Ok(());
        }
        if free {
            notify(world, entity, PoolHook::Deactivate);
            return self.return_to_pool(world, entity, reset);
        }
        notify(world, entity, PoolHook::Construct);
        if self.finish_spawning(world, entity, Transform::IDENTITY)? == Activation::Activated {
            notify(world, entity, PoolHook::Activate);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolFlavor, PoolNetId};
    use netpool_host::prelude::*;

    fn setup() -> (World, ClassId, ObjectPool) {
        let mut world = World::new(NetRole::Authority);
        let event = world
            .classes_mut()
            .register(
                ClassDef::new("DamageEvent", ClassId::OBJECT)
                    .field(FieldDescriptor::new("amount", FieldType::Float, FieldValue::Float(0.0))),
            )
            .unwrap();
        let pool = ObjectPool::new(
            PoolDescriptor {
                net_id: PoolNetId(2),
                name: "events".into(),
                flavor: PoolFlavor::Object,
                target_class: event,
                include_child_classes: true,
            },
            true,
        );
        (world, event, pool)
    }

    #[test]
    fn construct_then_reuse_exact_class() {
        let (mut world, event, mut pool) = setup();
        let first = pool.pre_spawn(&mut world, event, None).unwrap();
        assert!(!pool.is_object_free(first));

        world
            .entity_mut(first)
            .unwrap()
            .fields
            .set("amount", FieldValue::Float(25.0));
        pool.return_to_pool(&mut world, first, &FieldReset::default())
            .unwrap();
        assert!(pool.is_object_free(first));
        assert_eq!(
            world.entity(first).unwrap().fields.get("amount"),
            Some(&FieldValue::Float(0.0))
        );

        let second = pool.pre_spawn(&mut world, event, None).unwrap();
        assert_eq!(second, first);
        assert_eq!(pool.core().ledger().len(), 1);
    }

    #[test]
    fn actor_class_is_rejected() {
        let (mut world, _, mut pool) = setup();
        let err = pool.pre_spawn(&mut world, ClassId::ACTOR, None).unwrap_err();
        assert!(matches!(err, PoolError::Host(HostError::ClassKindMismatch { .. })));
    }
}
