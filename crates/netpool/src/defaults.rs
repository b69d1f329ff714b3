//! Component default capture, restore and teardown for pooled actors.
//!
//! A recycled actor must look exactly like a freshly spawned one. The first
//! time an actor pool sees an actor it records a [`SavedDefaults`] snapshot of
//! every component; each later activation restores from that snapshot before
//! the request-specific transform is applied, and each return tears the
//! components down.

use netpool_host::component::{CollisionMode, Component, ComponentKind, Teleport};
use netpool_host::transform::{Quat, Transform, Vec3};
use netpool_host::world::EntityRecord;

/// Fade applied to looping audio when its actor goes back to the pool.
pub const AUDIO_FADE_OUT_SECONDS: f32 = 0.2;

// ---------------------------------------------------------------------------
// SavedDefaults
// ---------------------------------------------------------------------------

/// Snapshot of one component's resettable state.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDefaults {
    pub name: String,
    /// Spatial components other than effects and audio always come back on;
    /// effects and audio only when they auto-activated originally.
    pub auto_activate: bool,
    pub visible: bool,
    pub hidden_in_game: bool,
    pub relative: Option<Transform>,
    pub gravity_enabled: bool,
    pub simulate_physics: bool,
    pub collision: Option<CollisionMode>,
    /// Launch velocity of a projectile movement component.
    pub initial_velocity: Option<Vec3>,
}

/// Snapshot of every component of one actor, in component order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedDefaults {
    pub components: Vec<ComponentDefaults>,
}

impl SavedDefaults {
    pub fn get(&self, name: &str) -> Option<&ComponentDefaults> {
        self.components.iter().find(|d| d.name == name)
    }
}

/// Record the current component state of `record`.
pub fn capture(record: &EntityRecord) -> SavedDefaults {
    let components = record
        .components
        .iter()
        .map(|c| {
            let scene = c.scene.as_ref();
            let primitive = c.primitive.as_ref();
            ComponentDefaults {
                name: c.name.clone(),
                auto_activate: if scene.is_some() && !c.is_fx_or_audio() {
                    true
                } else {
                    c.auto_activate
                },
                visible: scene.map_or(true, |s| s.visible),
                hidden_in_game: scene.map_or(false, |s| s.hidden_in_game),
                relative: scene.map(|s| s.relative),
                gravity_enabled: primitive.map_or(false, |p| p.gravity_enabled),
                simulate_physics: primitive.map_or(false, |p| p.simulate_physics),
                collision: primitive.map(|p| p.collision),
                initial_velocity: match &c.kind {
                    ComponentKind::ProjectileMovement(m) => Some(m.velocity),
                    _ => None,
                },
            }
        })
        .collect();
    SavedDefaults { components }
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

fn matching<'a>(
    record: &'a mut EntityRecord,
    defaults: &'a SavedDefaults,
) -> impl Iterator<Item = (&'a mut Component, &'a ComponentDefaults)> {
    record.components.iter_mut().filter_map(move |c| {
        let saved = defaults.get(&c.name)?;
        Some((c, saved))
    })
}

/// Put every spatial component back at its captured relative transform,
/// resetting physics instead of sweeping.
pub fn reset_component_transforms(record: &mut EntityRecord, defaults: &SavedDefaults) {
    for (c, saved) in matching(record, defaults) {
        if let Some(relative) = saved.relative {
            c.set_relative_transform(relative, Teleport::ResetPhysics);
        }
    }
}

/// Restore physics, collision and visibility flags, then re-trigger
/// auto-activation.
pub fn activate_components(record: &mut EntityRecord, defaults: &SavedDefaults) {
    for (c, saved) in matching(record, defaults) {
        if let ComponentKind::Particle(p) = &mut c.kind {
            p.elapsed = 0.0;
        }
        if c.primitive.is_some() {
            c.set_gravity_enabled(saved.gravity_enabled);
            if let Some(collision) = saved.collision {
                c.set_collision(collision);
            }
            c.set_simulate_physics(saved.simulate_physics);
        }
        if c.scene.is_some() {
            c.set_hidden_in_game(saved.hidden_in_game);
            c.set_visibility(saved.visible);
        }
        if saved.auto_activate && !c.active {
            c.activate();
        }
    }
}

/// Re-launch projectile movement from its captured velocity.
///
/// The launch speed is rescaled to the component's initial speed, rotated
/// into world space when the velocity is authored in local space, and the
/// actor is turned to face along it when rotation follows velocity.
pub fn activate_movement(record: &mut EntityRecord, defaults: &SavedDefaults) {
    let actor_rotation = record.transform.rotation;
    let mut facing: Option<Quat> = None;
    let mut launch: Option<Vec3> = None;

    for (c, saved) in matching(record, defaults) {
        let ComponentKind::ProjectileMovement(movement) = &mut c.kind else {
            continue;
        };
        let Some(mut velocity) = saved.initial_velocity else {
            continue;
        };
        if velocity.length_squared() <= 0.0 {
            continue;
        }
        if movement.initial_speed > 0.0 {
            velocity = velocity.normalized_or_zero() * movement.initial_speed;
        }
        if movement.velocity_in_local_space {
            velocity = actor_rotation.rotate(velocity);
        }
        movement.velocity = velocity;
        if movement.rotation_follows_velocity {
            facing = Some(Quat::looking_along(
                velocity,
                movement.rotation_remains_vertical,
            ));
        }
        launch = Some(velocity);
        break;
    }

    let Some(velocity) = launch else {
        return;
    };
    if let Some(rotation) = facing {
        record.transform.rotation = rotation;
    }
    if let Some(body) = record
        .components
        .iter_mut()
        .filter_map(|c| c.primitive.as_mut())
        .find(|p| p.simulate_physics)
    {
        body.linear_velocity = velocity;
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Stop every component of an actor that is going back to its pool.
pub fn deactivate_components(record: &mut EntityRecord) {
    let owner = record.id;
    for c in &mut record.components {
        let looping_audio = match &c.kind {
            ComponentKind::Particle(_) => {
                c.tick(0.0);
                c.deactivate();
                continue;
            }
            ComponentKind::Audio(audio) => Some(audio.looping && audio.playing),
            _ => None,
        };
        if let Some(looping) = looping_audio {
            if looping {
                c.fade_out(AUDIO_FADE_OUT_SECONDS);
            }
            c.deactivate();
            continue;
        }
        if c.primitive.is_some() {
            let ended = c.end_overlaps();
            if !ended.is_empty() {
                tracing::trace!(entity = %owner, component = %c.name, overlaps = ended.len(), "ended overlaps");
            }
            c.set_simulate_physics(false);
            c.set_collision(CollisionMode::NoCollision);
            c.set_gravity_enabled(false);
        }
        if c.scene.is_some() {
            c.set_hidden_in_game(true);
            c.set_visibility(false);
        }
        c.deactivate();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
