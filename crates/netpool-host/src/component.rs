//! Actor components.
//!
//! An actor owns an ordered list of [`Component`]s instantiated from its
//! class template at spawn time. A component is always activatable; it may
//! additionally be spatial ([`SceneState`]), physical ([`PrimitiveState`]) and
//! of a specialised [`ComponentKind`] (particle effect, audio, projectile
//! movement) that needs bespoke handling when the actor is recycled.

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::transform::{Transform, Vec3};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which collision queries and responses a primitive takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionMode {
    NoCollision,
    QueryOnly,
    PhysicsOnly,
    QueryAndPhysics,
}

/// How a transform change treats physics state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Teleport {
    /// Keep velocities.
    None,
    /// Teleport without sweeping and zero out physics velocity.
    ResetPhysics,
}

// ---------------------------------------------------------------------------
// Component state blocks
// ---------------------------------------------------------------------------

/// State of a component that has a place in the actor's transform hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub relative: Transform,
    pub visible: bool,
    pub hidden_in_game: bool,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            relative: Transform::IDENTITY,
            visible: true,
            hidden_in_game: false,
        }
    }
}

/// State of a component with collision or physics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveState {
    pub simulate_physics: bool,
    pub gravity_enabled: bool,
    pub collision: CollisionMode,
    /// Entities this primitive currently overlaps.
    pub overlaps: Vec<EntityId>,
    pub linear_velocity: Vec3,
}

impl Default for PrimitiveState {
    fn default() -> Self {
        Self {
            simulate_physics: false,
            gravity_enabled: true,
            collision: CollisionMode::QueryAndPhysics,
            overlaps: Vec::new(),
            linear_velocity: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    /// Simulated time since the effect started.
    pub elapsed: f32,
    pub playing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioState {
    /// Sound loops indefinitely.
    pub looping: bool,
    pub playing: bool,
    pub volume: f32,
    /// Fade-out in progress: seconds remaining until silence.
    pub fade_out: Option<f32>,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            looping: false,
            playing: false,
            volume: 1.0,
            fade_out: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub velocity: Vec3,
    /// When positive, overrides the magnitude of `velocity` on activation.
    pub initial_speed: f32,
    pub velocity_in_local_space: bool,
    pub rotation_follows_velocity: bool,
    pub rotation_remains_vertical: bool,
}

/// Specialised behaviour of a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ComponentKind {
    #[default]
    Plain,
    Particle(ParticleState),
    Audio(AudioState),
    ProjectileMovement(ProjectileState),
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A single actor component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub active: bool,
    /// Activate automatically when the owning actor comes alive.
    pub auto_activate: bool,
    /// How many times the component has been (re)activated. Useful to spot
    /// spurious replays of one-shot effects.
    pub activation_count: u32,
    pub scene: Option<SceneState>,
    pub primitive: Option<PrimitiveState>,
    pub kind: ComponentKind,
}

impl Component {
    /// A non-spatial component.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            active: false,
            auto_activate: true,
            activation_count: 0,
            scene: None,
            primitive: None,
            kind: ComponentKind::Plain,
        }
    }

    /// A spatial component without collision.
    pub fn scene(name: &str) -> Self {
        Self {
            scene: Some(SceneState::default()),
            ..Self::plain(name)
        }
    }

    /// A spatial component with collision.
    pub fn primitive(name: &str) -> Self {
        Self {
            primitive: Some(PrimitiveState::default()),
            ..Self::scene(name)
        }
    }

    pub fn particle(name: &str, auto_activate: bool) -> Self {
        Self {
            auto_activate,
            kind: ComponentKind::Particle(ParticleState::default()),
            ..Self::scene(name)
        }
    }

    pub fn audio(name: &str, looping: bool, auto_activate: bool) -> Self {
        Self {
            auto_activate,
            kind: ComponentKind::Audio(AudioState {
                looping,
                ..AudioState::default()
            }),
            ..Self::scene(name)
        }
    }

    pub fn projectile_movement(name: &str, state: ProjectileState) -> Self {
        Self {
            kind: ComponentKind::ProjectileMovement(state),
            ..Self::plain(name)
        }
    }

    /// Particle effects and audio only replay when explicitly flagged.
    pub fn is_fx_or_audio(&self) -> bool {
        matches!(
            self.kind,
            ComponentKind::Particle(_) | ComponentKind::Audio(_)
        )
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.activation_count += 1;
        match &mut self.kind {
            ComponentKind::Particle(p) => {
                p.elapsed = 0.0;
                p.playing = true;
            }
            ComponentKind::Audio(a) => {
                a.playing = true;
                a.fade_out = None;
            }
            ComponentKind::Plain | ComponentKind::ProjectileMovement(_) => {}
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        match &mut self.kind {
            ComponentKind::Particle(p) => p.playing = false,
            ComponentKind::Audio(a) if a.fade_out.is_none() => a.playing = false,
            _ => {}
        }
    }

    /// Advance the component's own simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        match &mut self.kind {
            ComponentKind::Particle(p) if p.playing => p.elapsed += dt,
            ComponentKind::Audio(a) => {
                if let Some(remaining) = a.fade_out {
                    let remaining = remaining - dt;
                    if remaining <= 0.0 {
                        a.fade_out = None;
                        a.playing = false;
                        a.volume = 0.0;
                    } else {
                        a.fade_out = Some(remaining);
                    }
                }
            }
            _ => {}
        }
    }

    /// Start fading audio out over `duration` seconds instead of cutting it.
    pub fn fade_out(&mut self, duration: f32) {
        if let ComponentKind::Audio(a) = &mut self.kind {
            if a.playing {
                a.fade_out = Some(duration);
            }
        }
    }

    pub fn set_relative_transform(&mut self, relative: Transform, teleport: Teleport) {
        if let Some(scene) = &mut self.scene {
            scene.relative = relative;
        }
        if teleport == Teleport::ResetPhysics {
            if let Some(primitive) = &mut self.primitive {
                primitive.linear_velocity = Vec3::ZERO;
            }
        }
    }

    pub fn set_visibility(&mut self, visible: bool) {
        if let Some(scene) = &mut self.scene {
            scene.visible = visible;
        }
    }

    pub fn set_hidden_in_game(&mut self, hidden: bool) {
        if let Some(scene) = &mut self.scene {
            scene.hidden_in_game = hidden;
        }
    }

    pub fn set_simulate_physics(&mut self, simulate: bool) {
        if let Some(primitive) = &mut self.primitive {
            primitive.simulate_physics = simulate;
        }
    }

    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        if let Some(primitive) = &mut self.primitive {
            primitive.gravity_enabled = enabled;
        }
    }

    pub fn set_collision(&mut self, collision: CollisionMode) {
        if let Some(primitive) = &mut self.primitive {
            primitive.collision = collision;
        }
    }

    /// End every current overlap. Returns the entities that stopped
    /// overlapping.
    pub fn end_overlaps(&mut self) -> Vec<EntityId> {
        match &mut self.primitive {
            Some(primitive) => std::mem::take(&mut primitive.overlaps),
            None => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_physics_teleport_zeroes_velocity() {
        let mut c = Component::primitive("mesh");
        c.primitive.as_mut().unwrap().linear_velocity = Vec3::new(3.0, 0.0, 0.0);
        let moved = Transform::from_location(Vec3::new(0.0, 0.0, 5.0));

        c.set_relative_transform(moved, Teleport::None);
        assert_eq!(c.primitive.as_ref().unwrap().linear_velocity.x, 3.0);

        c.set_relative_transform(moved, Teleport::ResetPhysics);
        assert_eq!(c.primitive.as_ref().unwrap().linear_velocity, Vec3::ZERO);
        assert_eq!(c.scene.as_ref().unwrap().relative, moved);
    }

    #[test]
    fn audio_fade_out_stops_after_duration() {
        let mut c = Component::audio("loop", true, true);
        c.activate();
        c.fade_out(0.2);
        c.deactivate();
        c.tick(0.1);
        assert!(matches!(&c.kind, ComponentKind::Audio(a) if a.playing));
        c.tick(0.15);
        assert!(matches!(&c.kind, ComponentKind::Audio(a) if !a.playing && a.fade_out.is_none()));
    }

    #[test]
    fn setters_ignore_missing_state_blocks() {
        let mut c = Component::plain("logic");
        c.set_visibility(false);
        c.set_collision(CollisionMode::NoCollision);
        assert!(c.scene.is_none());
        assert!(c.primitive.is_none());
        assert!(c.end_overlaps().is_empty());
    }

    #[test]
    fn activation_counts_replays() {
        let mut c = Component::particle("sparks", false);
        c.activate();
        c.tick(0.5);
        c.activate();
        assert_eq!(c.activation_count, 2);
        assert!(matches!(&c.kind, ComponentKind::Particle(p) if p.elapsed == 0.0 && p.playing));
    }
}
