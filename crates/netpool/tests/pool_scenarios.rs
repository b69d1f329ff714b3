//! End-to-end pooling scenarios: warm pools, fallback pools, class
//! resolution, returns, and an authority/observer pair kept in sync over a
//! [`ReplicationLink`].

use netpool::prelude::*;

// -- Fixtures ----------------------------------------------------------------

struct Classes {
    registry: ClassRegistry,
    projectile: ClassId,
    rocket: ClassId,
    mini_rocket: ClassId,
    grenade: ClassId,
    note: ClassId,
}

fn classes() -> Classes {
    let mut registry = ClassRegistry::new();
    let projectile = registry
        .register(
            ClassDef::new("Projectile", ClassId::ACTOR)
                .field(FieldDescriptor::new("damage", FieldType::Int, FieldValue::Int(10)))
                .component(Component::primitive("body"))
                .component(Component::particle("trail", true))
                .hooks(|| Box::new(CountingHooks::default())),
        )
        .unwrap();
    let rocket = registry
        .register(ClassDef::new("Rocket", projectile).hooks(|| Box::new(CountingHooks::default())))
        .unwrap();
    let mini_rocket = registry
        .register(ClassDef::new("MiniRocket", rocket))
        .unwrap();
    let grenade = registry
        .register(ClassDef::new("Grenade", ClassId::ACTOR).component(Component::primitive("body")))
        .unwrap();
    let note = registry
        .register(ClassDef::new("Note", ClassId::OBJECT))
        .unwrap();
    Classes {
        registry,
        projectile,
        rocket,
        mini_rocket,
        grenade,
        note,
    }
}

fn session(role: NetRole, classes: &Classes, settings: PoolSettings) -> Session<World> {
    let world = World::with_classes(role, classes.registry.clone());
    let mut session = Session::new(world, settings, SessionConfig::default());
    session.begin_play().unwrap();
    session
}

fn pool_name(session: &Session<World>, entity: EntityId) -> String {
    let id = session
        .registry()
        .find_pool_for_entity(session.world(), entity)
        .expect("entity has a pool");
    session
        .registry()
        .pool(id)
        .unwrap()
        .core()
        .name()
        .to_owned()
}

fn ledger_of<'a>(session: &'a Session<World>, name: &str) -> &'a Ledger {
    let registry = session.registry();
    registry
        .authority_pools()
        .iter()
        .chain(registry.observer_pools())
        .filter_map(|&id| registry.pool(id))
        .find(|pool| pool.core().name() == name)
        .map(|pool| pool.core().ledger())
        .expect("pool exists")
}

fn int_field(world: &World, entity: EntityId, name: &str) -> Option<i64> {
    match world.entity(entity)?.fields.get(name)? {
        FieldValue::Int(v) => Some(*v),
        _ => None,
    }
}

// -- 1. Authority scenarios --------------------------------------------------

#[test]
fn preallocated_pool_serves_request_without_growing() {
    let c = classes();
    let settings =
        PoolSettings::default().with_pool(PoolSpec::actor("rockets", "Rocket").preallocate(3));
    let mut s = session(NetRole::Authority, &c, settings);
    assert_eq!(ledger_of(&s, "rockets").len(), 3);

    let e = s.request_pool_object(c.rocket, None, false).unwrap();

    let ledger = ledger_of(&s, "rockets");
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.entries().iter().filter(|entry| !entry.free).count(), 1);
    assert!(!ledger.is_free(e));

    let record = s.world().entity(e).unwrap();
    assert!(record.initialized);
    assert!(!record.hidden);
    assert!(record.collision_enabled);
    assert!(s.is_pooled_object_active(e));
}

#[test]
fn unconfigured_classes_fall_back_to_generic_pools() {
    let c = classes();
    let mut s = session(NetRole::Authority, &c, PoolSettings::default());

    let actor = s.request_pool_object(c.grenade, None, false).unwrap();
    assert_eq!(pool_name(&s, actor), netpool::registry::DEFAULT_ACTOR_POOL);
    assert!(s.is_pooled_object_active(actor));

    let object = s.request_pool_object(c.note, None, false).unwrap();
    assert_eq!(pool_name(&s, object), netpool::registry::DEFAULT_OBJECT_POOL);
    assert!(s.is_pooled_object_active(object));
}

#[test]
fn requests_resolve_to_the_most_specific_pool() {
    let c = classes();
    let settings = PoolSettings::default()
        .with_pool(PoolSpec::actor("projectiles", "Projectile"))
        .with_pool(PoolSpec::actor("rockets", "Rocket").include_child_classes(false));
    let mut s = session(NetRole::Authority, &c, settings);

    let rocket = s.request_pool_object(c.rocket, None, false).unwrap();
    assert_eq!(pool_name(&s, rocket), "rockets");

    // The rocket pool refuses subclasses, so the projectile pool takes them.
    let mini = s.request_pool_object(c.mini_rocket, None, false).unwrap();
    assert_eq!(pool_name(&s, mini), "projectiles");

    let projectile = s.request_pool_object(c.projectile, None, false).unwrap();
    assert_eq!(pool_name(&s, projectile), "projectiles");
}

#[test]
fn returning_twice_keeps_one_free_entry() {
    let c = classes();
    let mut s = session(NetRole::Authority, &c, PoolSettings::default());
    let e = s.request_pool_object(c.grenade, None, false).unwrap();

    s.return_to_pool(e).unwrap();
    s.return_to_pool(e).unwrap();

    let ledger = ledger_of(&s, netpool::registry::DEFAULT_ACTOR_POOL);
    assert_eq!(ledger.entries().iter().filter(|entry| entry.entity == e).count(), 1);
    assert!(ledger.is_free(e));
    assert!(!s.is_pooled_object_active(e));
    assert!(s.world().entity(e).unwrap().hidden);
}

#[test]
fn deferred_request_can_be_abandoned() {
    let c = classes();
    let settings = PoolSettings::default().with_pool(PoolSpec::actor("rockets", "Rocket"));
    let mut s = session(NetRole::Authority, &c, settings);
    let e = s.request_pool_object(c.rocket, None, true).unwrap();
    assert!(!s.world().entity(e).unwrap().initialized);

    s.return_to_pool(e).unwrap();
    assert_eq!(pool_name(&s, e), "rockets");
    assert!(ledger_of(&s, "rockets").is_free(e));
    assert!(!s.is_pooled_object_active(e));

    let again = s.request_pool_object(c.rocket, None, false).unwrap();
    assert_eq!(again, e);
    assert!(s.is_pooled_object_active(e));
    assert!(!s.world().entity(e).unwrap().hidden);
}

#[test]
fn orphans_are_rejected_and_left_alone() {
    let c = classes();
    let mut s = session(NetRole::Authority, &c, PoolSettings::default());
    let stray = {
        let world = s.world_mut();
        let e = world.spawn_deferred(c.grenade, None).unwrap();
        world.finish_spawning(e, Transform::IDENTITY).unwrap();
        e
    };

    assert!(matches!(s.return_to_pool(stray), Err(PoolError::Orphaned { .. })));
    assert!(!s.world().entity(stray).unwrap().hidden);
    assert!(!s.is_pooled_object_active(stray));
}

#[test]
fn returned_actors_get_their_fields_and_components_back() {
    let c = classes();
    let settings =
        PoolSettings::default().with_pool(PoolSpec::actor("rockets", "Rocket").preallocate(1));
    let mut s = session(NetRole::Authority, &c, settings);

    let e = s.request_pool_object(c.rocket, None, false).unwrap();
    {
        let record = s.world_mut().entity_mut(e).unwrap();
        record.fields.set("damage", FieldValue::Int(999));
        record.component_mut("body").unwrap().set_visibility(false);
    }
    s.world_mut().schedule_timer(e, "explode", 3.0).unwrap();
    s.return_to_pool(e).unwrap();

    let record = s.world().entity(e).unwrap();
    assert_eq!(record.fields.get("damage"), Some(&FieldValue::Int(10)));
    assert!(record.timers.is_empty());

    let again = s.request_pool_object(c.rocket, None, false).unwrap();
    assert_eq!(again, e);
    let body = s.world().entity(e).unwrap().component("body").unwrap();
    assert!(body.scene.as_ref().is_some_and(|scene| scene.visible));
}

// -- 2. Authority / observer -------------------------------------------------

struct Pair {
    authority: Session<World>,
    observer: Session<World>,
    link: ReplicationLink,
}

impl Pair {
    fn new(c: &Classes, preallocate: u32, link: LinkConfig) -> Self {
        let settings = PoolSettings::default()
            .with_pool(PoolSpec::actor("rockets", "Rocket").preallocate(preallocate));
        Self {
            authority: session(NetRole::Authority, c, settings.clone()),
            observer: session(NetRole::Observer, c, settings),
            link: ReplicationLink::new(link),
        }
    }

    /// Authority tick, ship updates, deliver whatever arrived.
    fn replicate(&mut self) {
        let updates = self.authority.tick();
        self.link.send_all(&updates).unwrap();
        for update in self.link.advance().unwrap() {
            self.observer.apply_replication(&update).unwrap();
        }
    }

    /// Host-level actor replication: spawn mirrors and copy dormancy.
    fn mirror_actors(&mut self) -> Vec<EntityId> {
        self.authority
            .world()
            .mirror_actors_into(self.observer.world_mut())
    }

    fn settle(&mut self) {
        for _ in 0..16 {
            self.mirror_actors();
            self.replicate();
            self.observer.tick();
        }
    }
}

#[test]
fn observer_mirrors_authority_pools() {
    let c = classes();
    let mut pair = Pair::new(&c, 2, LinkConfig::default());
    pair.mirror_actors();
    pair.replicate();

    let mirror = ledger_of(&pair.observer, "rockets");
    assert_eq!(mirror.len(), 2);
    assert!(mirror.entries().iter().all(|entry| entry.free));
    // Authority-only pools are not instantiated locally on the observer.
    assert!(pair
        .observer
        .registry()
        .observer_pools()
        .iter()
        .all(|&id| pair.observer.registry().pool(id).unwrap().core().name() != "rockets"));
    assert_eq!(
        pair.authority.registry().ledger_hash(),
        pair.observer.registry().ledger_hash()
    );
}

#[test]
fn observer_activation_waits_for_readiness_then_fires_once() {
    let c = classes();
    let mut pair = Pair::new(&c, 1, LinkConfig::default());
    pair.settle();

    let at = Transform::from_location(Vec3::new(250.0, 0.0, 40.0));
    let e = {
        let (registry, world) = pair.authority.parts_mut();
        let e = registry
            .begin_spawning_pool_actor(world, c.rocket, at, None)
            .unwrap();
        registry.finish_spawning_pool_object(world, e, at).unwrap();
        e
    };

    // The ledger change lands before the mirror wakes up.
    pair.replicate();
    let mirror = pair.observer.world().entity(e).unwrap();
    assert_eq!(mirror.dormancy(), Dormancy::DormantAll);
    assert!(mirror.hidden);
    assert_eq!(pair.observer.registry().pending_count(), 1);
    let activations_before = int_field(pair.observer.world(), e, "pool_activations");

    pair.observer.tick();
    assert!(pair.observer.last_diagnostics().promoted.is_empty());

    // Readiness arrives with the host's dormancy replication.
    pair.mirror_actors();
    pair.observer.tick();
    assert_eq!(pair.observer.last_diagnostics().promoted, vec![e]);
    assert_eq!(pair.observer.registry().pending_count(), 0);

    let mirror = pair.observer.world().entity(e).unwrap();
    assert!(!mirror.hidden);
    assert!((mirror.transform.location.x - 250.0).abs() < 0.1);
    assert_eq!(
        int_field(pair.observer.world(), e, "pool_activations"),
        Some(activations_before.unwrap_or(0) + 1)
    );

    // Nothing left to promote.
    pair.observer.tick();
    assert!(pair.observer.last_diagnostics().promoted.is_empty());
    assert_eq!(
        int_field(pair.observer.world(), e, "pool_activations"),
        Some(activations_before.unwrap_or(0) + 1)
    );
}

#[test]
fn observer_drops_pending_activation_when_returned_first() {
    let c = classes();
    let mut pair = Pair::new(&c, 1, LinkConfig::default());
    pair.settle();

    let e = pair.authority.request_pool_object(c.rocket, None, false).unwrap();
    pair.replicate();
    assert_eq!(pair.observer.registry().pending_count(), 1);

    pair.authority.return_to_pool(e).unwrap();
    pair.replicate();
    assert_eq!(pair.observer.registry().pending_count(), 0);

    pair.mirror_actors();
    pair.observer.tick();
    assert!(pair.observer.last_diagnostics().promoted.is_empty());
    assert!(pair.observer.world().entity(e).unwrap().hidden);
}

#[test]
fn authority_and_observer_converge_over_a_jittery_link() {
    let c = classes();
    let mut pair = Pair::new(
        &c,
        4,
        LinkConfig {
            latency_ticks: 2,
            jitter_ticks: 3,
            seed: 11,
        },
    );

    let mut live = Vec::new();
    for tick in 0..60u32 {
        if tick % 3 == 0 {
            if let Some(e) = pair.authority.request_pool_object(c.rocket, None, false) {
                live.push(e);
            }
        }
        if tick % 5 == 4 && !live.is_empty() {
            let e = live.remove(0);
            pair.authority.return_to_pool(e).unwrap();
        }
        pair.mirror_actors();
        pair.replicate();
        pair.observer.tick();
    }
    while pair.link.in_flight() > 0 {
        pair.mirror_actors();
        pair.replicate();
        pair.observer.tick();
    }
    pair.settle();

    assert_eq!(
        pair.authority.registry().ledger_hash(),
        pair.observer.registry().ledger_hash()
    );
    assert_eq!(pair.observer.registry().pending_count(), 0);
    for &e in &live {
        assert!(pair.authority.is_pooled_object_active(e));
        assert!(!pair.observer.world().entity(e).unwrap().hidden);
    }
}

// -- 3. Deferred spawn task --------------------------------------------------

#[test]
fn spawn_task_hands_out_configured_actor() {
    let c = classes();
    let mut s = session(NetRole::Authority, &c, PoolSettings::default());
    let avatar = {
        let world = s.world_mut();
        let e = world.spawn_deferred(c.grenade, None).unwrap();
        world
            .finish_spawning(e, Transform::from_location(Vec3::new(0.0, 0.0, 90.0)))
            .unwrap();
        e
    };

    let mut task = SpawnPooledActorTask::new(c.rocket, None, Some(avatar));
    let (registry, world) = s.parts_mut();
    let e = task.begin(registry, world).unwrap();
    world
        .entity_mut(e)
        .unwrap()
        .fields
        .set("damage", FieldValue::Int(75));
    assert_eq!(task.finish(registry, world), SpawnResult::Success(e));

    let record = s.world().entity(e).unwrap();
    assert_eq!(record.fields.get("damage"), Some(&FieldValue::Int(75)));
    assert_eq!(record.instigator, Some(avatar));
    assert_eq!(record.transform.location, Vec3::new(0.0, 0.0, 90.0));
}
