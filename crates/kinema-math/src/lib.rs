#![warn(missing_docs)]

//! Math types for the kinema assembly solver.
//!
//! Thin wrappers around nalgebra providing the rigid frames used throughout
//! the assembly pipeline: placements (position + orientation), direction
//! helpers, and tolerance constants.

use std::ops::Mul;

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// An orientation in 3D space.
pub type Rotation = UnitQuaternion<f64>;

/// Geometric confusion tolerance shared by every comparison in the solver.
pub const CONFUSION: f64 = 1e-7;

/// A rigid frame: position plus orientation.
///
/// Composition follows the usual frame convention: `a * b` expresses a frame
/// given relative to `b`'s parent in `a`'s parent, i.e. `b` is applied first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlacementRepr", into = "PlacementRepr")]
pub struct Placement {
    iso: Isometry3<f64>,
}

/// Serialized form: position vector plus `[x, y, z, w]` quaternion.
#[derive(Serialize, Deserialize)]
struct PlacementRepr {
    #[serde(default)]
    position: [f64; 3],
    #[serde(default = "identity_quaternion")]
    rotation: [f64; 4],
}

fn identity_quaternion() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl From<PlacementRepr> for Placement {
    fn from(repr: PlacementRepr) -> Self {
        let [x, y, z, w] = repr.rotation;
        let q = nalgebra::Quaternion::new(w, x, y, z);
        let rotation = if q.norm() > 0.0 {
            UnitQuaternion::from_quaternion(q)
        } else {
            UnitQuaternion::identity()
        };
        Self::new(Vec3::from(repr.position), rotation)
    }
}

impl From<Placement> for PlacementRepr {
    fn from(plc: Placement) -> Self {
        let t = plc.iso.translation.vector;
        let q = plc.iso.rotation.quaternion();
        Self {
            position: [t.x, t.y, t.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }
}

impl Placement {
    /// The identity frame.
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    /// Frame from a position and an orientation.
    pub fn new(position: Vec3, rotation: Rotation) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::from(position), rotation),
        }
    }

    /// Pure translation by `(x, y, z)`.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vec3::new(x, y, z), Rotation::identity())
    }

    /// Frame at `position` rotated by `angle` radians about `axis`.
    ///
    /// A zero axis yields no rotation.
    pub fn from_axis_angle(position: Vec3, axis: Vec3, angle: f64) -> Self {
        let rotation = Unit::try_new(axis, f64::EPSILON)
            .map(|a| Rotation::from_axis_angle(&a, angle))
            .unwrap_or_else(Rotation::identity);
        Self::new(position, rotation)
    }

    /// Frame from a position and the three rows of a rotation matrix.
    pub fn from_rotation_rows(position: Vec3, rows: [[f64; 3]; 3]) -> Self {
        let m = Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], //
            rows[1][0], rows[1][1], rows[1][2], //
            rows[2][0], rows[2][1], rows[2][2],
        ]);
        let rotation = Rotation::from_rotation_matrix(&Rotation3::from_matrix(&m));
        Self::new(position, rotation)
    }

    /// Wrap a nalgebra isometry.
    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self { iso }
    }

    /// The underlying isometry.
    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.iso
    }

    /// Position of the frame origin.
    pub fn position(&self) -> Vec3 {
        self.iso.translation.vector
    }

    /// Orientation of the frame.
    pub fn rotation(&self) -> Rotation {
        self.iso.rotation
    }

    /// Replace the position, keeping the orientation.
    pub fn set_position(&mut self, position: Vec3) {
        self.iso.translation = Translation3::from(position);
    }

    /// Replace the orientation, keeping the position.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.iso.rotation = rotation;
    }

    /// Inverse frame.
    pub fn inverse(&self) -> Self {
        Self {
            iso: self.iso.inverse(),
        }
    }

    /// Rotation matrix as three rows.
    pub fn rotation_rows(&self) -> [[f64; 3]; 3] {
        let m = self.iso.rotation.to_rotation_matrix();
        let m = m.matrix();
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Yaw, pitch and roll in radians (Z-Y-X intrinsic order).
    pub fn yaw_pitch_roll(&self) -> (f64, f64, f64) {
        let (roll, pitch, yaw) = self.iso.rotation.euler_angles();
        (yaw, pitch, roll)
    }

    /// Map a point from this frame into its parent.
    pub fn transform_point(&self, p: &Point3) -> Point3 {
        self.iso.transform_point(p)
    }

    /// Rotate a vector from this frame into its parent.
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.iso.transform_vector(v)
    }

    /// True when the frame is the identity within [`CONFUSION`].
    pub fn is_identity(&self) -> bool {
        self.is_same(&Self::identity(), CONFUSION)
    }

    /// True when both frames coincide within `tol` (position distance and
    /// rotation angle).
    pub fn is_same(&self, other: &Placement, tol: f64) -> bool {
        let dp = (self.position() - other.position()).norm();
        let da = self.iso.rotation.angle_to(&other.iso.rotation);
        dp <= tol && da <= tol
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Placement {
    type Output = Placement;

    fn mul(self, rhs: Placement) -> Placement {
        Placement {
            iso: self.iso * rhs.iso,
        }
    }
}

impl Mul<&Placement> for &Placement {
    type Output = Placement;

    fn mul(self, rhs: &Placement) -> Placement {
        Placement {
            iso: self.iso * rhs.iso,
        }
    }
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Solver tolerances ([`CONFUSION`] for both distances and angles).
    pub const DEFAULT: Self = Self {
        linear: CONFUSION,
        angular: CONFUSION,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }

    /// Check if two angles are effectively equal (in radians).
    pub fn angles_equal(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.angular
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
