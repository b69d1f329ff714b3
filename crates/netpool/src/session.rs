//! Fixed-timestep session driver.
//!
//! A [`Session`] owns one world and the [`PoolRegistry`] for that world's
//! lifetime. Each tick:
//!
//! 1. Every pool's pending queue is drained once; entities that became ready
//!    are activated.
//! 2. On the authority, one replication update is collected per pool whose
//!    ledger changed since the last tick.
//! 3. The tick counter advances.
//!
//! Replication updates produced by an authority session are handed to an
//! observer session through [`Session::apply_replication`], typically via a
//! [`ReplicationLink`](crate::net::ReplicationLink).
//!
//! # Example
//!
//! ```
//! use netpool::prelude::*;
//!
//! let world = World::new(NetRole::Authority);
//! let config = SessionConfig { fixed_dt: 1.0 / 30.0 };
//! let mut session = Session::new(world, PoolSettings::default(), config);
//! session.begin_play().unwrap();
//!
//! // The first tick announces both fallback pools to the observer.
//! let updates = session.tick();
//! assert_eq!(updates.len(), 2);
//! assert_eq!(session.tick_count(), 1);
//!
//! // Nothing changed since.
//! assert!(session.tick().is_empty());
//! session.end_play();
//! ```

use std::time::{Duration, Instant};

use netpool_host::class::ClassId;
use netpool_host::entity::EntityId;
use netpool_host::transform::Transform;
use netpool_host::world::{HostWorld, NetRole};
use netpool_ledger::delta::AppliedDelta;

use crate::pool::Activation;
use crate::registry::PoolRegistry;
use crate::replication::{ObserverBaselines, PoolReplicationUpdate};
use crate::settings::PoolSettings;
use crate::PoolError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for the session tick.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
}

impl Default for SessionConfig {
    /// Defaults to 60 Hz.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// What happened during the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Entities promoted out of pending queues.
    pub promoted: Vec<EntityId>,
    /// Replication updates collected.
    pub updates: usize,
    /// Entities still waiting for readiness after the tick.
    pub pending: usize,
    /// Wall-clock time spent draining pending queues.
    pub drain_time: Duration,
    /// Total time for the tick.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One world session: the world, its pools, and the replication baseline of
/// the observer it feeds.
pub struct Session<W: HostWorld> {
    world: W,
    registry: PoolRegistry,
    settings: PoolSettings,
    baselines: ObserverBaselines,
    tick_counter: u64,
    fixed_dt: f64,
    playing: bool,
    last_diagnostics: TickDiagnostics,
}

impl<W: HostWorld> Session<W> {
    /// Create a session. Pools are not built until
    /// [`begin_play`](Self::begin_play).
    pub fn new(world: W, settings: PoolSettings, config: SessionConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            registry: PoolRegistry::new(),
            settings,
            baselines: ObserverBaselines::new(),
            tick_counter: 0,
            fixed_dt: config.fixed_dt,
            playing: false,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Build the pools. Calling it twice is a no-op.
    pub fn begin_play(&mut self) -> Result<(), PoolError> {
        if self.playing {
            return Ok(());
        }
        self.registry.initialize(&mut self.world, &self.settings)?;
        self.playing = true;
        Ok(())
    }

    /// Run one tick. Returns the replication updates for the observer; empty
    /// on observers and before [`begin_play`](Self::begin_play).
    pub fn tick(&mut self) -> Vec<PoolReplicationUpdate> {
        let tick_start = Instant::now();

        let drain_start = Instant::now();
        let promoted = self.registry.tick(&mut self.world);
        let drain_time = drain_start.elapsed();

        let updates = if self.playing && self.world.net_role() == NetRole::Authority {
            self.registry.collect_replication(&mut self.baselines)
        } else {
            Vec::new()
        };

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            promoted,
            updates: updates.len(),
            pending: self.registry.pending_count(),
            drain_time,
            total_time: tick_start.elapsed(),
        };
        updates
    }

    /// Run `count` ticks and return every update they produced, in order.
    pub fn run_ticks(&mut self, count: u64) -> Vec<PoolReplicationUpdate> {
        let mut updates = Vec::new();
        for _ in 0..count {
            updates.extend(self.tick());
        }
        updates
    }

    /// Apply one update received from the authority.
    pub fn apply_replication(
        &mut self,
        update: &PoolReplicationUpdate,
    ) -> Result<AppliedDelta, PoolError> {
        self.registry.apply_replication(&mut self.world, update)
    }

    /// Tear every pool down. The session can begin play again afterwards.
    pub fn end_play(&mut self) {
        self.registry.teardown();
        self.baselines.reset();
        self.playing = false;
    }

    // -- pooling calls ----------------------------------------------------------

    /// Request an entity of `class` from its pool. With `deferred` the
    /// entity comes back disabled and waits for
    /// [`finish_spawning_pool_object`](Self::finish_spawning_pool_object).
    /// Failures are logged and reported as `None`.
    pub fn request_pool_object(
        &mut self,
        class: ClassId,
        owner: Option<EntityId>,
        deferred: bool,
    ) -> Option<EntityId> {
        self.registry
            .request_pool_object(&mut self.world, class, owner, deferred)
    }

    /// Activate a deferred entity at `transform`. On observers the entity may
    /// land in the pending queue instead.
    pub fn finish_spawning_pool_object(
        &mut self,
        entity: EntityId,
        transform: Transform,
    ) -> Result<Activation, PoolError> {
        self.registry
            .finish_spawning_pool_object(&mut self.world, entity, transform)
    }

    /// Give `entity` back to the pool that owns it.
    pub fn return_to_pool(&mut self, entity: EntityId) -> Result<(), PoolError> {
        self.registry.return_to_pool(&mut self.world, entity)
    }

    /// Whether `entity` is handed out by its pool.
    pub fn is_pooled_object_active(&self, entity: EntityId) -> bool {
        self.registry.is_pooled_object_active(&self.world, entity)
    }

    // -- accessors --------------------------------------------------------------

    /// Ticks run since the session was created.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulation time in seconds (`tick_count * fixed_dt`).
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// The registry and the world together, for calls that need both.
    pub fn parts_mut(&mut self) -> (&mut PoolRegistry, &mut W) {
        (&mut self.registry, &mut self.world)
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Counters and timings of the most recent tick.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PoolSpec;
    use netpool_host::prelude::*;

    fn authority() -> (Session<World>, ClassId) {
        let mut world = World::new(NetRole::Authority);
        let rocket = world
            .classes_mut()
            .register(ClassDef::new("Rocket", ClassId::ACTOR))
            .unwrap();
        let settings =
            PoolSettings::default().with_pool(PoolSpec::actor("rockets", "Rocket").preallocate(2));
        (Session::new(world, settings, SessionConfig::default()), rocket)
    }

    // -- 1. Basic tick tests ---------------------------------------------------

    #[test]
    fn tick_advances_counter_and_time() {
        let (mut session, _) = authority();
        session.begin_play().unwrap();
        session.run_ticks(60);
        assert_eq!(session.tick_count(), 60);
        assert!((session.sim_time() - 1.0).abs() < 1e-10);
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn zero_dt_panics() {
        let world = World::new(NetRole::Authority);
        let _ = Session::new(
            world,
            PoolSettings::default(),
            SessionConfig { fixed_dt: 0.0 },
        );
    }

    // -- 2. Replication collection --------------------------------------------

    #[test]
    fn first_tick_sends_descriptors_and_ledgers() {
        let (mut session, _) = authority();
        session.begin_play().unwrap();
        let updates = session.tick();
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.descriptor.is_some()));
        let rockets = updates
            .iter()
            .find(|u| u.descriptor.as_ref().map(|d| d.name.as_str()) == Some("rockets"))
            .unwrap();
        assert_eq!(rockets.delta.added.len(), 2);
        assert_eq!(session.last_diagnostics().updates, 3);

        assert!(session.tick().is_empty());
    }

    #[test]
    fn request_and_return_produce_one_update_each() {
        let (mut session, rocket) = authority();
        session.begin_play().unwrap();
        session.tick();

        let e = session.request_pool_object(rocket, None, false).unwrap();
        let updates = session.tick();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].delta.changed.len(), 1);
        assert!(!updates[0].delta.changed[0].free);

        session.return_to_pool(e).unwrap();
        let updates = session.tick();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].delta.changed[0].free);
    }

    #[test]
    fn no_updates_before_begin_play_or_after_end_play() {
        let (mut session, _) = authority();
        assert!(session.tick().is_empty());
        session.begin_play().unwrap();
        assert!(!session.tick().is_empty());
        session.end_play();
        assert!(session.tick().is_empty());
        assert!(session.registry().is_empty());
    }
}
