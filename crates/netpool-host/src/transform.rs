//! Spatial math used by actors and the pool ledger.
//!
//! Only what pooling needs: vectors, unit quaternions, and a
//! location/rotation/scale [`Transform`]. Replicated vectors are quantised to
//! whole units (see [`Vec3::quantized`]), so anything compared after a trip
//! through the ledger should use whole-unit positions.

use serde::{Deserialize, Serialize};

/// Tolerance used by the approximate comparisons in this module.
pub const TRANSFORM_TOLERANCE: f32 = 1.0e-4;

// ---------------------------------------------------------------------------
// Vec3
// ---------------------------------------------------------------------------

/// A 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const ONE: Vec3 = Vec3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    pub fn normalized_or_zero(self) -> Vec3 {
        let len_sq = self.length_squared();
        if len_sq <= f32::EPSILON {
            return Vec3::ZERO;
        }
        self * len_sq.sqrt().recip()
    }

    /// Round every component to the nearest whole unit, the precision the
    /// ledger replicates positions and scales with.
    pub fn quantized(self) -> Vec3 {
        Vec3::new(self.x.round(), self.y.round(), self.z.round())
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn approx_eq(self, other: Vec3, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

// ---------------------------------------------------------------------------
// Quat
// ---------------------------------------------------------------------------

/// A rotation quaternion. Kept normalised by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Build a rotation from yaw (about Z) and pitch (about Y), in radians.
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Quat {
        let (sy, cy) = (yaw * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        Quat {
            x: sp * sy,
            y: sp * cy * -1.0,
            z: cp * sy,
            w: cp * cy,
        }
        .normalized()
    }

    /// Rotation that points the forward (+X) axis along `direction`.
    ///
    /// With `remain_vertical` set, pitch is dropped so the result only yaws.
    pub fn looking_along(direction: Vec3, remain_vertical: bool) -> Quat {
        let dir = direction.normalized_or_zero();
        if dir == Vec3::ZERO {
            return Quat::IDENTITY;
        }
        let yaw = dir.y.atan2(dir.x);
        let pitch = if remain_vertical {
            0.0
        } else {
            dir.z.atan2((dir.x * dir.x + dir.y * dir.y).sqrt())
        };
        Quat::from_yaw_pitch(yaw, pitch)
    }

    pub fn normalized(self) -> Quat {
        let len_sq = self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w;
        if len_sq <= f32::EPSILON {
            return Quat::IDENTITY;
        }
        let inv = len_sq.sqrt().recip();
        Quat {
            x: self.x * inv,
            y: self.y * inv,
            z: self.z * inv,
            w: self.w * inv,
        }
    }

    /// Rotate `v` by this (unit) quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let axis = Vec3::new(self.x, self.y, self.z);
        let t = axis.cross(v) * 2.0;
        v + t * self.w + axis.cross(t)
    }

    /// Compares rotations, treating `q` and `-q` as the same rotation.
    pub fn approx_eq(self, other: Quat, tolerance: f32) -> bool {
        let dot = self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w;
        (dot.abs() - 1.0).abs() <= tolerance
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Location, rotation and scale of an actor or of a component relative to
/// its owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        location: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(location: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            location,
            rotation,
            scale,
        }
    }

    /// Identity rotation and scale at `location`.
    pub fn from_location(location: Vec3) -> Self {
        Self {
            location,
            ..Transform::IDENTITY
        }
    }

    pub fn approx_eq(&self, other: &Transform, tolerance: f32) -> bool {
        self.location.approx_eq(other.location, tolerance)
            && self.rotation.approx_eq(other.rotation, tolerance)
            && self.scale.approx_eq(other.scale, tolerance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_rounds_to_whole_units() {
        let v = Vec3::new(1.4, -2.6, 10.5).quantized();
        assert_eq!(v, Vec3::new(1.0, -3.0, 11.0));
    }

    #[test]
    fn normalized_zero_vector_stays_zero() {
        assert_eq!(Vec3::ZERO.normalized_or_zero(), Vec3::ZERO);
        let unit = Vec3::new(3.0, 0.0, 4.0).normalized_or_zero();
        assert!((unit.length_squared() - 1.0).abs() < TRANSFORM_TOLERANCE);
    }

    #[test]
    fn negated_quaternion_is_same_rotation() {
        let q = Quat::from_yaw_pitch(0.7, 0.2);
        let neg = Quat {
            x: -q.x,
            y: -q.y,
            z: -q.z,
            w: -q.w,
        };
        assert!(q.approx_eq(neg, TRANSFORM_TOLERANCE));
        assert!(!q.approx_eq(Quat::IDENTITY, TRANSFORM_TOLERANCE));
    }

    #[test]
    fn looking_along_forward_is_identity() {
        let q = Quat::looking_along(Vec3::new(5.0, 0.0, 0.0), false);
        assert!(q.approx_eq(Quat::IDENTITY, TRANSFORM_TOLERANCE));
    }

    #[test]
    fn rotate_by_yaw_turns_forward_axis() {
        let quarter = Quat::from_yaw_pitch(std::f32::consts::FRAC_PI_2, 0.0);
        let v = quarter.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(v.approx_eq(Vec3::new(0.0, 1.0, 0.0), 1.0e-5));
        assert_eq!(Quat::IDENTITY.rotate(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn remain_vertical_drops_pitch() {
        let upward = Vec3::new(1.0, 0.0, 1.0);
        let pitched = Quat::looking_along(upward, false);
        let flat = Quat::looking_along(upward, true);
        assert!(!pitched.approx_eq(Quat::IDENTITY, TRANSFORM_TOLERANCE));
        assert!(flat.approx_eq(Quat::IDENTITY, TRANSFORM_TOLERANCE));
    }

    #[test]
    fn transform_json_uses_field_names() {
        let t = Transform::from_location(Vec3::new(1.0, 2.0, 3.0));
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json["location"]["z"], 3.0);
        assert_eq!(json["rotation"]["w"], 1.0);
        let back: Transform = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
