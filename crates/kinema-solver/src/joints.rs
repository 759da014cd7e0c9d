//! Joint conversion from solver primitives to Rapier.
//!
//! Solver markers use Z as the joint axis; Rapier's generic joints use the
//! local X axis. Marker frames are rotated so their Z lands on Rapier's X
//! before they become joint frames.

use std::f64::consts::FRAC_PI_2;

use kinema_math::{Placement, Vec3};
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use rapier3d::dynamics::{GenericJoint, GenericJointBuilder, JointAxesMask, JointAxis};

use crate::error::SolverError;
use crate::model::JointKind;

/// Convert a placement to Rapier's single-precision isometry.
pub(crate) fn to_rapier(plc: &Placement) -> Isometry3<f32> {
    let p = plc.position();
    let q = plc.rotation();
    Isometry3::from_parts(
        Translation3::new(p.x as f32, p.y as f32, p.z as f32),
        UnitQuaternion::new_normalize(Quaternion::new(
            q.w as f32, q.i as f32, q.j as f32, q.k as f32,
        )),
    )
}

/// Convert a Rapier isometry back to a placement.
pub(crate) fn from_rapier(iso: &Isometry3<f32>) -> Placement {
    let t = iso.translation.vector;
    let q = iso.rotation;
    Placement::new(
        Vec3::new(t.x as f64, t.y as f64, t.z as f64),
        UnitQuaternion::new_normalize(Quaternion::new(
            q.w as f64, q.i as f64, q.j as f64, q.k as f64,
        )),
    )
}

/// Joint frame for a marker: Z of the marker becomes X of the frame, and
/// the origin is pushed `offset` along the marker's Z.
pub(crate) fn joint_frame(marker: &Placement, offset: f64) -> Isometry3<f32> {
    let shifted = *marker * Placement::from_translation(0.0, 0.0, offset);
    let z_to_x = Placement::from_axis_angle(Vec3::zeros(), Vec3::y(), -FRAC_PI_2);
    to_rapier(&(shifted * z_to_x))
}

/// Offset applied to marker I for plane-type primitives.
pub(crate) fn frame_offset(kind: &JointKind) -> f64 {
    match *kind {
        JointKind::Planar { offset } | JointKind::PointInPlane { offset } => offset,
        _ => 0.0,
    }
}

/// Free angular and linear axis a limit or motion on this primitive acts on.
pub(crate) fn free_axes(kind: &JointKind) -> (Option<JointAxis>, Option<JointAxis>) {
    match kind {
        JointKind::Revolute => (Some(JointAxis::AngX), None),
        JointKind::Translational => (None, Some(JointAxis::LinX)),
        JointKind::Cylindrical => (Some(JointAxis::AngX), Some(JointAxis::LinX)),
        _ => (None, None),
    }
}

fn locked_axes(name: &str, kind: &JointKind) -> Result<JointAxesMask, SolverError> {
    let mask = match kind {
        JointKind::Fixed => JointAxesMask::LOCKED_FIXED_AXES,
        JointKind::Revolute => JointAxesMask::LOCKED_REVOLUTE_AXES,
        JointKind::Translational => JointAxesMask::LOCKED_PRISMATIC_AXES,
        JointKind::Spherical => JointAxesMask::LOCKED_SPHERICAL_AXES,
        // Cylindrical = rotation + translation along axis
        JointKind::Cylindrical => {
            JointAxesMask::LIN_Y | JointAxesMask::LIN_Z | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z
        }
        JointKind::ParallelAxes => JointAxesMask::ANG_Y | JointAxesMask::ANG_Z,
        JointKind::Planar { .. } => JointAxesMask::LIN_X | JointAxesMask::ANG_Y | JointAxesMask::ANG_Z,
        JointKind::PointInPlane { .. } => JointAxesMask::LIN_X,
        other => {
            return Err(SolverError::UnsupportedJoint {
                name: name.to_string(),
                kind: other.keyword(),
            })
        }
    };
    Ok(mask)
}

/// Build a Rapier joint for a solver primitive.
///
/// # Arguments
///
/// * `name` - Joint name, for error reporting
/// * `kind` - The primitive
/// * `marker_i` - Marker I frame relative to its body
/// * `marker_j` - Marker J frame relative to its body
/// * `limits` - Bounds per free axis, already in Rapier units
pub(crate) fn rapier_joint(
    name: &str,
    kind: &JointKind,
    marker_i: &Placement,
    marker_j: &Placement,
    limits: &[(JointAxis, [f32; 2])],
) -> Result<GenericJoint, SolverError> {
    let mut builder = GenericJointBuilder::new(locked_axes(name, kind)?)
        .local_frame1(joint_frame(marker_i, frame_offset(kind)))
        .local_frame2(joint_frame(marker_j, 0.0));

    for (axis, bounds) in limits {
        builder = builder.limits(*axis, *bounds);
    }

    Ok(builder.build())
}
