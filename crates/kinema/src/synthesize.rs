//! Joint synthesis: document joints to solver primitives, markers, limits
//! and motions.

use std::collections::HashMap;
use std::f64::consts::TAU;

use kinema_geom::ShapeQuery;
use kinema_ir::{Document, JointDef, JointType, MotionDef, MotionType, ObjectId, Reference};
use kinema_math::{Placement, Rotation, Vec3};
use kinema_solver::{
    JointKind, LimitDirection, LimitKind, Marker, MotionKind, SolverJoint, SolverLimit,
    SolverModel, SolverMotion,
};
use nalgebra::Unit;
use tracing::{debug, warn};

use crate::bundle::{ArenaEntry, PartArena, PartRegistrar};
use crate::classify::{canonicalize, DistanceType};
use crate::connectivity::{JointEdge, Side};
use crate::resolve::Resolver;

/// Tolerance expression attached to every limit.
pub const LIMIT_TOLERANCE: &str = "1.0e-9";

/// Radii of the canonical endpoints of a Distance joint. Zero where the
/// element is not circular.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Radii {
    /// Circular edge radius of endpoint 1.
    pub edge1: f64,
    /// Circular edge radius of endpoint 2.
    pub edge2: f64,
    /// Cylinder or sphere radius of endpoint 1.
    pub face1: f64,
    /// Cylinder or sphere radius of endpoint 2.
    pub face2: f64,
}

/// Primitive chosen for a Distance joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistancePrimitive {
    /// The primitive.
    pub kind: JointKind,
    /// The category has no dedicated primitive; a planar joint stands in.
    pub fallback: bool,
}

/// Map a classified Distance joint to its primitive.
pub fn distance_primitive(
    distance_type: DistanceType,
    distance: f64,
    radii: Radii,
    tolerance: f64,
) -> DistancePrimitive {
    use DistanceType::*;
    let Radii {
        edge1,
        edge2,
        face1,
        face2,
    } = radii;
    let kind = match distance_type {
        PointPoint if distance < tolerance => JointKind::Spherical,
        PointPoint => JointKind::SphSph { distance },
        LineLine => JointKind::RevCyl { distance },
        LineCircle => JointKind::RevCyl {
            distance: distance + edge2,
        },
        CircleCircle => JointKind::RevCyl {
            distance: distance + edge1 + edge2,
        },
        PlanePlane | PlaneTorus | TorusTorus => JointKind::Planar { offset: distance },
        PlaneCylinder => JointKind::LineInPlane {
            offset: distance + face2,
        },
        PlaneSphere => JointKind::PointInPlane {
            offset: distance + face2,
        },
        CylinderCylinder | CylinderTorus => JointKind::RevCyl {
            distance: distance + face1 + face2,
        },
        CylinderSphere | TorusSphere => JointKind::CylSph {
            distance: distance + face1 + face2,
        },
        SphereSphere => JointKind::SphSph {
            distance: distance + face1 + face2,
        },
        PointPlane => JointKind::PointInPlane { offset: distance },
        PointCylinder => JointKind::CylSph {
            distance: distance + face1,
        },
        PointSphere => JointKind::SphSph {
            distance: distance + face1,
        },
        LinePlane => JointKind::LineInPlane { offset: distance },
        PointLine => JointKind::CylSph { distance },
        PointCurve => JointKind::PointInPlane { offset: distance },
        _ => {
            return DistancePrimitive {
                kind: JointKind::Planar { offset: distance },
                fallback: true,
            }
        }
    };
    DistancePrimitive {
        kind,
        fallback: false,
    }
}

/// Primitive for an Angle joint of `degrees`: parallel axes when the angle is
/// a whole number of turns, otherwise a fixed angle. Only the magnitude of
/// the angle counts.
pub fn angle_primitive(degrees: f64, tolerance: f64) -> JointKind {
    let theta = degrees.to_radians().abs();
    let rest = theta % TAU;
    if rest < tolerance || TAU - rest < tolerance {
        JointKind::ParallelAxes
    } else {
        JointKind::Angle { theta }
    }
}

/// Rack frame of a rack-pinion joint, in the rack object's coordinates.
///
/// Takes the pinion frame's rotation and turns it about its own Z until its
/// X axis lies along the rack's sliding axis (the Z axis of `rack_local`).
/// The position of `rack_local` is kept.
pub fn rack_frame(rack_local: &Placement, pinion_in_rack: &Placement) -> Placement {
    let rot = pinion_in_rack.rotation();
    let z = rot * Vec3::z();
    let x = rot * Vec3::x();
    let target = rack_local.rotation() * Vec3::z();

    let mut yaw = x.angle(&target);
    if z.dot(&x.cross(&target)) < 0.0 {
        yaw = -yaw;
    }
    let yaw_rotation = Rotation::from_axis_angle(&Unit::new_normalize(z), yaw);

    let mut frame = *rack_local;
    frame.set_rotation(yaw_rotation * rot);
    frame
}

fn limit(
    name: String,
    kind: LimitKind,
    markers: (&str, &str),
    direction: LimitDirection,
    value: f64,
    expression: String,
) -> SolverLimit {
    SolverLimit {
        name,
        kind,
        marker_i: markers.0.to_string(),
        marker_j: markers.1.to_string(),
        direction,
        value,
        limit: expression,
        tol: LIMIT_TOLERANCE.to_string(),
    }
}

/// Translation and rotation limits of `joint`, normalizing reversed bounds
/// in place first.
pub fn joint_limits(joint: &mut JointDef, marker_i: &str, marker_j: &str) -> Vec<SolverLimit> {
    let mut out = Vec::new();
    let name = joint.name.clone();
    let markers = (marker_i, marker_j);

    if joint.joint_type.has_length_limits() {
        if joint.limits.normalize_length() {
            debug!("{name}: swapped reversed length limits");
        }
        let l = joint.limits;
        if l.enable_length_min {
            out.push(limit(
                format!("{name}-LimitLenMin"),
                LimitKind::Translation,
                markers,
                LimitDirection::AtLeast,
                l.length_min,
                format!("{:.6}", l.length_min),
            ));
        }
        if l.enable_length_max {
            out.push(limit(
                format!("{name}-LimitLenMax"),
                LimitKind::Translation,
                markers,
                LimitDirection::AtMost,
                l.length_max,
                format!("{:.6}", l.length_max),
            ));
        }
    }

    if joint.joint_type.has_angle_limits() {
        if joint.limits.normalize_angle() {
            debug!("{name}: swapped reversed angle limits");
        }
        let l = joint.limits;
        if l.enable_angle_min {
            out.push(limit(
                format!("{name}-LimitRotMin"),
                LimitKind::Rotation,
                markers,
                LimitDirection::AtLeast,
                l.angle_min.to_radians(),
                format!("{:.6}*pi/180.0", l.angle_min),
            ));
        }
        if l.enable_angle_max {
            out.push(limit(
                format!("{name}-LimitRotMax"),
                LimitKind::Rotation,
                markers,
                LimitDirection::AtMost,
                l.angle_max.to_radians(),
                format!("{:.6}*pi/180.0", l.angle_max),
            ));
        }
    }
    out
}

/// Motions driving joint `joint_name`. One angular plus one linear motion
/// merge into a single screw motion; the rest stay separate.
pub fn joint_motions(
    joint_name: &str,
    motions: &[MotionDef],
    marker_i: &str,
    marker_j: &str,
) -> Vec<SolverMotion> {
    let bound: Vec<&MotionDef> = motions
        .iter()
        .filter(|m| m.joint == joint_name && !m.formula.is_empty())
        .collect();
    let mut done = vec![false; bound.len()];
    let mut out = Vec::new();

    for i in 0..bound.len() {
        if done[i] {
            continue;
        }
        done[i] = true;
        let motion = bound[i];
        let partner = (i + 1..bound.len())
            .find(|&j| !done[j] && bound[j].motion_type != motion.motion_type);

        let (suffix, kind) = match partner {
            Some(j) => {
                done[j] = true;
                let (angular, linear) = match motion.motion_type {
                    MotionType::Angular => (motion, bound[j]),
                    MotionType::Linear => (bound[j], motion),
                };
                let zero = || "0".to_string();
                (
                    "ScrewMotion",
                    MotionKind::General {
                        r_iji: [zero(), zero(), linear.formula.clone()],
                        ang_ijj: [zero(), zero(), angular.formula.clone()],
                    },
                )
            }
            None => match motion.motion_type {
                MotionType::Angular => (
                    "AngularMotion",
                    MotionKind::Rotational {
                        rotation_z: motion.formula.clone(),
                    },
                ),
                MotionType::Linear => (
                    "LinearMotion",
                    MotionKind::Translational {
                        translation_z: motion.formula.clone(),
                    },
                ),
            },
        };
        out.push(SolverMotion {
            name: format!("{joint_name}-{suffix}"),
            marker_i: marker_i.to_string(),
            marker_j: marker_j.to_string(),
            kind,
        });
    }
    out
}

/// Builds the solver model for one run out of a document.
///
/// Canonicalization and limit normalization write back into the document's
/// joints.
pub struct Synthesizer<'a> {
    /// The document being solved.
    pub doc: &'a mut Document,
    /// The model under construction.
    pub model: &'a mut SolverModel,
    /// Object → solver part associations.
    pub arena: &'a mut PartArena,
    /// Caller-provided masses.
    pub masses: &'a HashMap<ObjectId, f64>,
    /// Active joints of the run.
    pub joints: &'a [JointEdge],
    /// Motions to drive, empty for static solves.
    pub motions: &'a [MotionDef],
    /// Elide Fixed joints and weld their parts.
    pub bundle_fixed: bool,
    /// Geometric tolerance.
    pub tolerance: f64,
}

impl Synthesizer<'_> {
    fn part_entry(&mut self, obj: &str) -> Option<ArenaEntry> {
        let registrar = PartRegistrar {
            doc: &*self.doc,
            masses: self.masses,
            joints: self.joints,
            bundle_fixed: self.bundle_fixed,
        };
        registrar.register(self.arena, self.model, obj)
    }

    /// Pin every grounded object to the model root. Returns the objects that
    /// were grounded.
    pub fn ground_parts(&mut self) -> Vec<ObjectId> {
        let grounds = self.doc.grounds.clone();
        let mut grounded = Vec::new();
        for record in grounds {
            let Some(entry) = self.part_entry(&record.object) else {
                warn!("{}: grounded object {} not found", record.name, record.object);
                continue;
            };
            let root = self.model.add_root_marker(Marker {
                name: format!("marker-{}", record.object),
                placement: record.placement,
            });
            let taken = self.model.parts[entry.part].marker("FixingMarker").is_some();
            let fixing_name = if taken {
                format!("FixingMarker-{}", record.object)
            } else {
                "FixingMarker".to_string()
            };
            let Some(fixing) = self.model.add_marker(
                entry.part,
                Marker {
                    name: fixing_name,
                    placement: entry.offset,
                },
            ) else {
                continue;
            };
            self.model.add_joint(SolverJoint {
                name: record.name.clone(),
                kind: JointKind::Fixed,
                marker_i: root,
                marker_j: fixing,
            });
            grounded.push(record.object);
        }
        grounded
    }

    /// Synthesize joint `index` of the document. Returns false when the joint
    /// produced nothing.
    pub fn synthesize(&mut self, index: usize) -> bool {
        let Some(joint_type) = self.doc.joints.get(index).map(|j| j.joint_type) else {
            return false;
        };
        let Some(kind) = self.primitive(index) else {
            return false;
        };
        if !self.is_valid_for_bundles(index) {
            return false;
        }

        let frames = if joint_type == JointType::RackPinion {
            self.rack_pinion_frames(index)
        } else {
            let first = self.side_frame(index, Side::First);
            let second = self.side_frame(index, Side::Second);
            first.zip(second)
        };
        let Some(((part_i, frame_i), (part_j, frame_j))) = frames else {
            return false;
        };
        let (Some(marker_i), Some(marker_j)) = (
            self.model.add_marker(part_i, frame_i),
            self.model.add_marker(part_j, frame_j),
        ) else {
            return false;
        };

        let joint = &mut self.doc.joints[index];
        let name = joint.name.clone();
        for limit in joint_limits(joint, &marker_i, &marker_j) {
            self.model.add_limit(limit);
        }
        for motion in joint_motions(&name, self.motions, &marker_i, &marker_j) {
            self.model.add_motion(motion);
        }
        self.model.add_joint(SolverJoint {
            name,
            kind,
            marker_i,
            marker_j,
        });
        true
    }

    /// Primitive for joint `index`; `None` when the joint is skipped.
    fn primitive(&mut self, index: usize) -> Option<JointKind> {
        let joint = &self.doc.joints[index];
        let (joint_type, d, d2) = (joint.joint_type, joint.distance, joint.distance2);
        let kind = match joint_type {
            JointType::Fixed if self.bundle_fixed => return None,
            JointType::Fixed => JointKind::Fixed,
            JointType::Revolute => JointKind::Revolute,
            JointType::Cylindrical => JointKind::Cylindrical,
            JointType::Slider => JointKind::Translational,
            JointType::Ball => JointKind::Spherical,
            JointType::Distance => self.distance_kind(index),
            JointType::Parallel => JointKind::ParallelAxes,
            JointType::Perpendicular => JointKind::Perpendicular,
            JointType::Angle => angle_primitive(d, self.tolerance),
            JointType::RackPinion => JointKind::RackPinion { pitch_radius: d },
            JointType::Screw => {
                self.orient_sliding_side(index)?;
                JointKind::Screw { pitch: d }
            }
            JointType::Gears => JointKind::Gear {
                radius_i: d,
                radius_j: d2,
            },
            JointType::Belt => JointKind::Gear {
                radius_i: d,
                radius_j: -d2,
            },
        };
        Some(kind)
    }

    fn distance_kind(&mut self, index: usize) -> JointKind {
        let mut joint = self.doc.joints[index].clone();
        let resolver = Resolver::new(&*self.doc);
        let distance_type = canonicalize(&resolver, &self.doc.shapes, &mut joint);

        let owner = |reference: &Reference| {
            resolver
                .object(reference)
                .and_then(|o| resolver.linked_object(&o))
                .unwrap_or_default()
        };
        let (o1, o2) = (owner(&joint.reference1), owner(&joint.reference2));
        let (e1, e2) = (joint.reference1.element_name(), joint.reference2.element_name());
        let shapes = &self.doc.shapes;
        let radii = Radii {
            edge1: shapes.edge_radius(&o1, e1),
            edge2: shapes.edge_radius(&o2, e2),
            face1: shapes.face_radius(&o1, e1),
            face2: shapes.face_radius(&o2, e2),
        };
        let primitive = distance_primitive(distance_type, joint.distance, radii, self.tolerance);
        if primitive.fallback {
            warn!(
                "{}: no dedicated primitive for {:?}, using a planar joint",
                joint.name, distance_type
            );
        }
        self.doc.joints[index] = joint;
        primitive.kind
    }

    /// Bundling can put both ends of a joint on the same solver part; such a
    /// joint is redundant and would be self-referencing.
    fn is_valid_for_bundles(&mut self, index: usize) -> bool {
        let joint = &self.doc.joints[index];
        let resolver = Resolver::new(&*self.doc);
        let (Some(p1), Some(p2)) = (
            resolver.moving_part(&joint.reference1),
            resolver.moving_part(&joint.reference2),
        ) else {
            return false;
        };
        let name = joint.name.clone();
        let (Some(e1), Some(e2)) = (self.part_entry(&p1), self.part_entry(&p2)) else {
            return false;
        };
        if e1.part == e2.part {
            warn!("ignoring joint {name}: its parts are welded into one bundle");
            return false;
        }
        true
    }

    /// Which endpoint slides: the side whose frame matches the frame of an
    /// active Slider joint on the same part in pitch and roll.
    pub fn sliding_side(&self, index: usize) -> Option<Side> {
        let joint = &self.doc.joints[index];
        let resolver = Resolver::new(&*self.doc);
        let part1 = resolver.moving_part(&joint.reference1)?;
        let part2 = resolver.moving_part(&joint.reference2)?;

        let mut found = None;
        let sliders = self
            .joints
            .iter()
            .filter(|e| e.joint_type == JointType::Slider)
            .filter(|e| e.touches(&part1) || e.touches(&part2));
        for edge in sliders {
            let Some(slider) = self.doc.joints.get(edge.joint) else {
                continue;
            };
            let (slider_side, side) = if edge.part1 == part1 || edge.part1 == part2 {
                (Side::First, if edge.part1 == part1 { Side::First } else { Side::Second })
            } else {
                (Side::Second, if edge.part2 == part1 { Side::First } else { Side::Second })
            };
            let (_, p1, r1) = slider.placement(slider_side.number()).yaw_pitch_roll();
            let (_, p2, r2) = joint.placement(side.number()).yaw_pitch_roll();
            if (p1 - p2).abs() < self.tolerance && (r1 - r2).abs() < self.tolerance {
                found = Some(side);
            }
        }
        found
    }

    /// Put the sliding side on endpoint 1. `None` drops the joint.
    fn orient_sliding_side(&mut self, index: usize) -> Option<()> {
        match self.sliding_side(index) {
            None => {
                warn!(
                    "{}: no sliding part found, the joint is ignored",
                    self.doc.joints[index].name
                );
                None
            }
            Some(Side::Second) => {
                self.doc.joints[index].swap_endpoints();
                Some(())
            }
            Some(Side::First) => Some(()),
        }
    }

    /// Marker frame of one endpoint, expressed in its solver part. Returns
    /// the part index with the marker; nothing is added to the model.
    fn side_frame(&mut self, index: usize, side: Side) -> Option<(usize, Marker)> {
        let joint = &self.doc.joints[index];
        let name = joint.name.clone();
        let reference = joint.reference(side.number()).clone();
        let mut plc = joint.placement(side.number());

        let resolver = Resolver::new(&*self.doc);
        let (Some(part), Some(obj)) = (resolver.moving_part(&reference), resolver.object(&reference))
        else {
            warn!("reference {} of joint {name} is bad", side.number());
            return None;
        };
        if obj != part {
            let obj_global = resolver.global_placement(&obj, &reference);
            let part_global = resolver.global_placement(&part, &reference);
            plc = part_global.inverse() * obj_global * plc;
        }

        let entry = self.part_entry(&part)?;
        if !entry.is_main() {
            plc = entry.offset * plc;
        }
        Some((
            entry.part,
            Marker {
                name,
                placement: plc,
            },
        ))
    }

    /// Marker frames of a rack-pinion joint: the rack (sliding side) on I
    /// with its X axis along the slide, the pinion on J.
    fn rack_pinion_frames(&mut self, index: usize) -> Option<((usize, Marker), (usize, Marker))> {
        self.orient_sliding_side(index)?;

        let joint = self.doc.joints[index].clone();
        let resolver = Resolver::new(&*self.doc);
        let (Some(part1), Some(obj1), Some(obj2)) = (
            resolver.moving_part(&joint.reference1),
            resolver.object(&joint.reference1),
            resolver.object(&joint.reference2),
        ) else {
            warn!("references of joint {} are bad", joint.name);
            return None;
        };
        let rack_global = resolver.global_placement(&obj1, &joint.reference1);
        let pinion_global = resolver.global_placement(&obj2, &joint.reference2);
        let part_global = resolver.global_placement(&part1, &joint.reference1);

        let pinion = self.side_frame(index, Side::Second)?;

        let pinion_in_rack = rack_global.inverse() * pinion_global * joint.placement2;
        let mut plc = rack_frame(&joint.placement1, &pinion_in_rack);
        if obj1 != part1 {
            plc = part_global.inverse() * rack_global * plc;
        }
        let entry = self.part_entry(&part1)?;
        if !entry.is_main() {
            plc = entry.offset * plc;
        }
        let rack = (
            entry.part,
            Marker {
                name: joint.name,
                placement: plc,
            },
        );
        Some((rack, pinion))
    }
}
