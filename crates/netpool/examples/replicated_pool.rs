//! Headless replication demo -- an authority fires and recycles rockets while
//! an observer follows over a lossy-latency link.
//!
//! Run with:
//!   cargo run --example replicated_pool -p netpool
//!
//! Set `RUST_LOG=netpool=debug` to watch pending activations on the observer.

use netpool::prelude::*;

const TICKS: u64 = 120;
const FIRE_EVERY: u64 = 10;
const ROCKET_LIFETIME: u64 = 25;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn classes() -> Result<(ClassRegistry, ClassId), anyhow::Error> {
    let mut classes = ClassRegistry::new();
    let rocket = classes.register(
        ClassDef::new("Rocket", ClassId::ACTOR)
            .field(FieldDescriptor::new("damage", FieldType::Int, FieldValue::Int(40)))
            .component(Component::primitive("body"))
            .component(Component::particle("trail", true))
            .component(Component::projectile_movement(
                "movement",
                ProjectileState {
                    velocity: Vec3::new(1.0, 0.0, 0.0),
                    initial_speed: 2000.0,
                    velocity_in_local_space: true,
                    rotation_follows_velocity: true,
                    ..ProjectileState::default()
                },
            ))
            .hooks(|| Box::new(CountingHooks::excluding(&["damage"]))),
    )?;
    Ok((classes, rocket))
}

fn settings() -> PoolSettings {
    PoolSettings {
        project_name: "Netpool".into(),
        ..PoolSettings::default()
    }
    .with_pool(
        PoolSpec::actor("rockets", "Rocket")
            .preallocate(4)
            .authority_only(true),
    )
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let (classes, rocket) = classes()?;
    let mut authority = Session::new(
        World::with_classes(NetRole::Authority, classes.clone()),
        settings(),
        SessionConfig::default(),
    );
    let mut observer = Session::new(
        World::with_classes(NetRole::Observer, classes),
        settings(),
        SessionConfig::default(),
    );
    authority.begin_play()?;
    observer.begin_play()?;

    let mut link = ReplicationLink::new(LinkConfig {
        latency_ticks: 2,
        jitter_ticks: 3,
        seed: 0x5eed,
    });

    let mut live: Vec<(EntityId, u64)> = Vec::new();
    let mut fired = 0usize;

    for tick in 0..TICKS {
        // Gameplay on the authority.
        if tick % FIRE_EVERY == 0 {
            let (registry, world) = authority.parts_mut();
            let yaw = tick as f32 * 0.1;
            let launcher = Transform {
                rotation: Quat::from_yaw_pitch(yaw, 0.0),
                ..Transform::from_location(Vec3::new(0.0, 0.0, 100.0))
            };
            if let Some(e) = registry.begin_spawning_pool_actor(world, rocket, launcher, None) {
                registry.finish_spawning_pool_object(world, e, launcher)?;
                live.push((e, tick + ROCKET_LIFETIME));
                fired += 1;
            }
        }
        let (expired, still_live): (Vec<_>, Vec<_>) =
            live.into_iter().partition(|&(_, until)| until <= tick);
        live = still_live;
        for (e, _) in expired {
            authority.return_to_pool(e)?;
        }

        // Replication.
        let updates = authority.tick();
        link.send_all(&updates)?;
        authority
            .world()
            .mirror_actors_into(observer.world_mut());
        for update in link.advance()? {
            observer.apply_replication(&update)?;
        }
        observer.tick();
    }

    // Drain the link.
    while link.in_flight() > 0 {
        authority
            .world()
            .mirror_actors_into(observer.world_mut());
        for update in link.advance()? {
            observer.apply_replication(&update)?;
        }
        observer.tick();
    }

    let rockets = authority
        .registry()
        .pool_by_net_id(PoolNetId(1))
        .map(|pool| pool.core().ledger().len())
        .unwrap_or_default();

    println!("fired {fired} rockets from a pool of {rockets} actors");
    println!("wire bytes:      {}", link.bytes_sent());
    println!("authority hash:  {}", authority.registry().ledger_hash());
    println!("observer hash:   {}", observer.registry().ledger_hash());
    println!("observer pending: {}", observer.last_diagnostics().pending);

    authority.end_play();
    observer.end_play();
    Ok(())
}
