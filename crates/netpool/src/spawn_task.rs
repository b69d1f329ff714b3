//! Deferred spawn of a pooled actor on behalf of a gameplay ability.
//!
//! Spawning straddles two points: [`SpawnPooledActorTask::begin`] hands back
//! the inert actor, already placed, so gameplay can configure it;
//! [`SpawnPooledActorTask::finish`] gives it an owner and instigator and
//! brings it to life. Only the authority spawns; everywhere else the task
//! finishes at once with [`SpawnResult::DidNotSpawn`].

use netpool_host::class::ClassId;
use netpool_host::entity::EntityId;
use netpool_host::transform::{Transform, Vec3};
use netpool_host::world::{HostWorld, NetRole};

use crate::registry::PoolRegistry;

/// Targeting information the ability gathered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetingData {
    /// A trace hit. Only the location is used.
    Hit { location: Vec3 },
    /// An explicit end point.
    EndPoint { transform: Transform },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnResult {
    Success(EntityId),
    DidNotSpawn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnTaskState {
    Idle,
    /// The actor exists but is still inert.
    Spawning { entity: EntityId },
    Finished(SpawnResult),
}

/// A single-shot deferred spawn.
#[derive(Debug, Clone)]
pub struct SpawnPooledActorTask {
    class: ClassId,
    targeting: Option<TargetingData>,
    /// The entity the ability acts through. Becomes owner and instigator.
    avatar: Option<EntityId>,
    state: SpawnTaskState,
}

impl SpawnPooledActorTask {
    pub fn new(class: ClassId, targeting: Option<TargetingData>, avatar: Option<EntityId>) -> Self {
        Self {
            class,
            targeting,
            avatar,
            state: SpawnTaskState::Idle,
        }
    }

    pub fn state(&self) -> SpawnTaskState {
        self.state
    }

    /// The outcome, once finished.
    pub fn result(&self) -> Option<SpawnResult> {
        match self.state {
            SpawnTaskState::Finished(result) => Some(result),
            _ => None,
        }
    }

    /// Hit location, else end point, else the avatar's own transform.
    pub fn spawn_transform(&self, world: &dyn HostWorld) -> Transform {
        match self.targeting {
            Some(TargetingData::Hit { location }) => Transform::from_location(location),
            Some(TargetingData::EndPoint { transform }) => transform,
            None => self
                .avatar
                .and_then(|avatar| world.entity(avatar))
                .map_or(Transform::IDENTITY, |record| record.transform),
        }
    }

    /// Request the inert actor. Returns it so the caller can configure it
    /// before [`finish`](Self::finish).
    pub fn begin(
        &mut self,
        registry: &mut PoolRegistry,
        world: &mut dyn HostWorld,
    ) -> Option<EntityId> {
        if self.state != SpawnTaskState::Idle {
            return None;
        }
        if world.net_role() != NetRole::Authority {
            self.state = SpawnTaskState::Finished(SpawnResult::DidNotSpawn);
            return None;
        }
        let transform = self.spawn_transform(&*world);
        match registry.begin_spawning_pool_actor(world, self.class, transform, self.avatar) {
            Some(entity) => {
                self.state = SpawnTaskState::Spawning { entity };
                Some(entity)
            }
            None => {
                tracing::warn!(class = world.classes().name(self.class), "pooled actor did not spawn");
                self.state = SpawnTaskState::Finished(SpawnResult::DidNotSpawn);
                None
            }
        }
    }

    /// Complete the spawn started by [`begin`](Self::begin).
    pub fn finish(&mut self, registry: &mut PoolRegistry, world: &mut dyn HostWorld) -> SpawnResult {
        let entity = match self.state {
            SpawnTaskState::Spawning { entity } => entity,
            SpawnTaskState::Finished(result) => return result,
            SpawnTaskState::Idle => {
                self.state = SpawnTaskState::Finished(SpawnResult::DidNotSpawn);
                return SpawnResult::DidNotSpawn;
            }
        };

        let transform = self.spawn_transform(&*world);
        if let Some(record) = world.entity_mut(entity) {
            record.instigator = self.avatar;
            record.owner = self.avatar;
        }
        let result = match registry.finish_spawning_pool_object(world, entity, transform) {
            Ok(_) => SpawnResult::Success(entity),
            Err(err) => {
                tracing::error!(entity = %entity, error = %err, "failed to finish pooled actor spawn");
                SpawnResult::DidNotSpawn
            }
        };
        self.state = SpawnTaskState::Finished(result);
        result
    }

    /// `begin` then `finish`, with no setup in between.
    pub fn run(&mut self, registry: &mut PoolRegistry, world: &mut dyn HostWorld) -> SpawnResult {
        self.begin(registry, world);
        self.finish(registry, world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PoolSettings;
    use netpool_host::prelude::*;

    fn setup(role: NetRole) -> (World, PoolRegistry, ClassId, EntityId) {
        let mut world = World::new(role);
        let grenade = world
            .classes_mut()
            .register(ClassDef::new("Grenade", ClassId::ACTOR).component(Component::primitive("body")))
            .unwrap();
        let hero = world
            .classes_mut()
            .register(ClassDef::new("Hero", ClassId::ACTOR))
            .unwrap();
        let avatar = world.spawn_deferred(hero, None).unwrap();
        world
            .finish_spawning(avatar, Transform::from_location(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        let mut registry = PoolRegistry::new();
        registry
            .initialize(&mut world, &PoolSettings::default())
            .unwrap();
        (world, registry, grenade, avatar)
    }

    #[test]
    fn spawn_transform_priority() {
        let (world, _, grenade, avatar) = setup(NetRole::Authority);
        let end = Transform::from_location(Vec3::new(9.0, 9.0, 9.0));

        let hit = SpawnPooledActorTask::new(
            grenade,
            Some(TargetingData::Hit {
                location: Vec3::new(4.0, 5.0, 6.0),
            }),
            Some(avatar),
        );
        assert_eq!(hit.spawn_transform(&world).location, Vec3::new(4.0, 5.0, 6.0));

        let end_point =
            SpawnPooledActorTask::new(grenade, Some(TargetingData::EndPoint { transform: end }), Some(avatar));
        assert_eq!(end_point.spawn_transform(&world), end);

        let fallback = SpawnPooledActorTask::new(grenade, None, Some(avatar));
        assert_eq!(fallback.spawn_transform(&world).location, Vec3::new(1.0, 2.0, 3.0));

        let nothing = SpawnPooledActorTask::new(grenade, None, None);
        assert_eq!(nothing.spawn_transform(&world), Transform::IDENTITY);
    }

    #[test]
    fn begin_then_finish_activates_with_owner() {
        let (mut world, mut registry, grenade, avatar) = setup(NetRole::Authority);
        let target = Vec3::new(100.0, 0.0, 0.0);
        let mut task = SpawnPooledActorTask::new(
            grenade,
            Some(TargetingData::Hit { location: target }),
            Some(avatar),
        );

        let e = task.begin(&mut registry, &mut world).unwrap();
        assert_eq!(task.state(), SpawnTaskState::Spawning { entity: e });
        let record = world.entity(e).unwrap();
        assert!(record.hidden);
        assert_eq!(record.transform.location, target);

        assert_eq!(task.finish(&mut registry, &mut world), SpawnResult::Success(e));
        let record = world.entity(e).unwrap();
        assert!(!record.hidden);
        assert_eq!(record.owner, Some(avatar));
        assert_eq!(record.instigator, Some(avatar));
        assert_eq!(record.transform.location, target);
        assert!(registry.is_pooled_object_active(&world, e));

        // Finishing again reports the recorded outcome.
        assert_eq!(task.finish(&mut registry, &mut world), SpawnResult::Success(e));
    }

    #[test]
    fn observers_never_spawn() {
        let (mut world, mut registry, grenade, avatar) = setup(NetRole::Observer);
        let mut task = SpawnPooledActorTask::new(grenade, None, Some(avatar));
        assert_eq!(task.run(&mut registry, &mut world), SpawnResult::DidNotSpawn);
        assert_eq!(task.result(), Some(SpawnResult::DidNotSpawn));
    }

    #[test]
    fn unhandled_class_does_not_spawn() {
        let (mut world, _, grenade, avatar) = setup(NetRole::Authority);
        let mut empty = PoolRegistry::new();
        let mut task = SpawnPooledActorTask::new(grenade, None, Some(avatar));
        assert_eq!(task.begin(&mut empty, &mut world), None);
        assert_eq!(task.result(), Some(SpawnResult::DidNotSpawn));
    }
}
