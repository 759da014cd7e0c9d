//! The solver model: parts, markers, joints, limits, motions and simulation
//! parameters handed to a multibody engine.

use kinema_math::Placement;
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Name of the model root; every marker path starts with it.
pub const MODEL_NAME: &str = "KinemaAssembly";

/// Largest number of output frames a simulation may request.
pub const MAX_OUTPUT_FRAMES: usize = 1_000_000;

/// A named local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Marker name, unique within its owner.
    pub name: String,
    /// Frame relative to the owner (part or model root).
    pub placement: Placement,
}

/// A rigid body of the solver model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverPart {
    /// Part name, unique within the model.
    pub name: String,
    /// Initial world frame.
    pub placement: Placement,
    /// Mass of the principal mass marker.
    pub mass: f64,
    /// Density of the principal mass marker.
    pub density: f64,
    /// Principal moments of inertia.
    pub inertia: [f64; 3],
    /// Markers attached to the part.
    pub markers: Vec<Marker>,
}

impl SolverPart {
    /// Part at `placement` with unit density and unit principal inertias.
    pub fn new(name: impl Into<String>, placement: Placement, mass: f64) -> Self {
        Self {
            name: name.into(),
            placement,
            mass,
            density: 1.0,
            inertia: [1.0, 1.0, 1.0],
            markers: Vec::new(),
        }
    }

    /// Marker by name.
    pub fn marker(&self, name: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.name == name)
    }
}

/// Mechanical joint primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JointKind {
    /// Rigid weld.
    Fixed,
    /// Hinge about the common Z axis.
    Revolute,
    /// Hinge plus slide along the common Z axis.
    Cylindrical,
    /// Slide along the common Z axis.
    Translational,
    /// Coincident origins, free rotation.
    Spherical,
    /// Parallel Z axes.
    ParallelAxes,
    /// Perpendicular Z axes.
    Perpendicular,
    /// Fixed angle between Z axes.
    Angle {
        /// Angle in radians.
        theta: f64,
    },
    /// Rack and pinion coupling.
    RackPinion {
        /// Pinion pitch radius.
        pitch_radius: f64,
    },
    /// Screw coupling.
    Screw {
        /// Advance per turn.
        pitch: f64,
    },
    /// Gear coupling. A negative `radius_j` reverses the sense (belt).
    Gear {
        /// Radius on the I side.
        radius_i: f64,
        /// Radius on the J side.
        radius_j: f64,
    },
    /// Origins at a fixed distance.
    SphSph {
        /// Distance between origins.
        distance: f64,
    },
    /// Z axes at a fixed distance.
    RevCyl {
        /// Distance between axes.
        distance: f64,
    },
    /// Origin of J at a fixed distance from the Z axis of I.
    CylSph {
        /// Distance from the axis.
        distance: f64,
    },
    /// XY planes parallel at an offset.
    Planar {
        /// Offset along Z of I.
        offset: f64,
    },
    /// Z axis of J lies in the XY plane of I, shifted by an offset.
    LineInPlane {
        /// Offset along Z of I.
        offset: f64,
    },
    /// Origin of J lies in the XY plane of I, shifted by an offset.
    PointInPlane {
        /// Offset along Z of I.
        offset: f64,
    },
}

impl JointKind {
    /// Keyword used in the ASMT text format.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Fixed => "FixedJoint",
            Self::Revolute => "RevoluteJoint",
            Self::Cylindrical => "CylindricalJoint",
            Self::Translational => "TranslationalJoint",
            Self::Spherical => "SphericalJoint",
            Self::ParallelAxes => "ParallelAxesJoint",
            Self::Perpendicular => "PerpendicularJoint",
            Self::Angle { .. } => "AngleJoint",
            Self::RackPinion { .. } => "RackPinionJoint",
            Self::Screw { .. } => "ScrewJoint",
            Self::Gear { .. } => "GearJoint",
            Self::SphSph { .. } => "SphSphJoint",
            Self::RevCyl { .. } => "RevCylJoint",
            Self::CylSph { .. } => "CylSphJoint",
            Self::Planar { .. } => "PlanarJoint",
            Self::LineInPlane { .. } => "LineInPlaneJoint",
            Self::PointInPlane { .. } => "PointInPlaneJoint",
        }
    }
}

/// A joint between two marker paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverJoint {
    /// Joint name.
    pub name: String,
    /// Primitive and its parameters.
    pub kind: JointKind,
    /// Full path of marker I.
    pub marker_i: String,
    /// Full path of marker J.
    pub marker_j: String,
}

/// Degree of freedom a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    /// Translation along marker Z.
    Translation,
    /// Rotation about marker Z.
    Rotation,
}

/// Direction of a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitDirection {
    /// Value stays at or above the threshold (`=>`).
    AtLeast,
    /// Value stays at or below the threshold (`=<`).
    AtMost,
}

impl LimitDirection {
    /// Operator used in the ASMT text format.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::AtLeast => "=>",
            Self::AtMost => "=<",
        }
    }
}

/// A one-sided limit between two markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverLimit {
    /// Limit name.
    pub name: String,
    /// Limited degree of freedom.
    pub kind: LimitKind,
    /// Full path of marker I.
    pub marker_i: String,
    /// Full path of marker J.
    pub marker_j: String,
    /// Direction.
    pub direction: LimitDirection,
    /// Threshold in model units (length, or radians for rotations).
    pub value: f64,
    /// Threshold expression as written to the engine.
    pub limit: String,
    /// Tolerance expression.
    pub tol: String,
}

/// What a motion drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MotionKind {
    /// Rotation about marker Z.
    Rotational {
        /// Angle formula in terms of `time`.
        rotation_z: String,
    },
    /// Translation along marker Z.
    Translational {
        /// Displacement formula in terms of `time`.
        translation_z: String,
    },
    /// Combined translation and rotation.
    General {
        /// Translation formulas of J relative to I, in I.
        r_iji: [String; 3],
        /// Rotation formulas of J relative to I, in J.
        ang_ijj: [String; 3],
    },
}

/// A driver between two markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverMotion {
    /// Motion name.
    pub name: String,
    /// Full path of marker I.
    pub marker_i: String,
    /// Full path of marker J.
    pub marker_j: String,
    /// Driven degrees of freedom.
    pub kind: MotionKind,
}

/// Time range and step controls of a kinematic run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Start time.
    pub tstart: f64,
    /// End time.
    pub tend: f64,
    /// Output step.
    pub hout: f64,
    /// Minimum integration step.
    pub hmin: f64,
    /// Maximum integration step.
    pub hmax: f64,
    /// Global error tolerance.
    pub error_tol: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            tstart: 0.0,
            tend: 1.0,
            hout: 0.1,
            hmin: 1.0e-9,
            hmax: 1.0,
            error_tol: 1.0e-6,
        }
    }
}

impl SimulationParameters {
    /// Output times `tstart, tstart + hout, ...` up to `tend` inclusive.
    ///
    /// Fails when the range would need more than [`MAX_OUTPUT_FRAMES`] frames.
    pub fn output_times(&self) -> Result<Vec<f64>, SolverError> {
        if self.hout <= 0.0 || self.tend <= self.tstart {
            return Ok(vec![self.tstart]);
        }
        let steps = ((self.tend - self.tstart) / self.hout + 1e-9).floor();
        if !steps.is_finite() || steps >= MAX_OUTPUT_FRAMES as f64 {
            return Err(SolverError::InvalidSimulation(format!(
                "output step {} over [{}, {}] exceeds {MAX_OUTPUT_FRAMES} frames",
                self.hout, self.tstart, self.tend
            )));
        }
        let steps = steps as usize;
        Ok((0..=steps)
            .map(|i| self.tstart + i as f64 * self.hout)
            .collect())
    }
}

/// Where a marker path points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerLocation<'a> {
    /// Owning part, `None` for root markers.
    pub part: Option<&'a SolverPart>,
    /// The marker.
    pub marker: &'a Marker,
}

/// A complete solver model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverModel {
    /// Model name, the first component of every marker path.
    pub name: String,
    /// Registered parts.
    pub parts: Vec<SolverPart>,
    /// Markers on the model root.
    pub root_markers: Vec<Marker>,
    /// Joints.
    pub joints: Vec<SolverJoint>,
    /// Limits.
    pub limits: Vec<SolverLimit>,
    /// Motions.
    pub motions: Vec<SolverMotion>,
    /// Run controls.
    pub simulation: SimulationParameters,
    /// Emit engine debug output.
    pub debug: bool,
}

impl Default for SolverModel {
    fn default() -> Self {
        Self {
            name: MODEL_NAME.to_string(),
            parts: Vec::new(),
            root_markers: Vec::new(),
            joints: Vec::new(),
            limits: Vec::new(),
            motions: Vec::new(),
            simulation: SimulationParameters::default(),
            debug: false,
        }
    }
}

impl SolverModel {
    /// Create an empty model named [`MODEL_NAME`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a part, returning its index.
    pub fn add_part(&mut self, part: SolverPart) -> usize {
        self.parts.push(part);
        self.parts.len() - 1
    }

    /// Part by name.
    pub fn part(&self, name: &str) -> Option<&SolverPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// Attach a marker to part `index`, returning its full path.
    ///
    /// Returns `None` if the index is out of range.
    pub fn add_marker(&mut self, index: usize, marker: Marker) -> Option<String> {
        let part = self.parts.get_mut(index)?;
        let path = format!("/{}/{}/{}", self.name, part.name, marker.name);
        part.markers.push(marker);
        Some(path)
    }

    /// Attach a marker to the model root, returning its full path.
    pub fn add_root_marker(&mut self, marker: Marker) -> String {
        let path = format!("/{}/{}", self.name, marker.name);
        self.root_markers.push(marker);
        path
    }

    /// Add a joint.
    pub fn add_joint(&mut self, joint: SolverJoint) {
        self.joints.push(joint);
    }

    /// Add a limit.
    pub fn add_limit(&mut self, limit: SolverLimit) {
        self.limits.push(limit);
    }

    /// Add a motion.
    pub fn add_motion(&mut self, motion: SolverMotion) {
        self.motions.push(motion);
    }

    /// Joint by name.
    pub fn joint(&self, name: &str) -> Option<&SolverJoint> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// Resolve a full marker path.
    pub fn resolve_marker(&self, path: &str) -> Option<MarkerLocation<'_>> {
        let rest = path.strip_prefix('/')?.strip_prefix(self.name.as_str())?;
        let rest = rest.strip_prefix('/')?;
        match rest.split_once('/') {
            None => {
                let marker = self.root_markers.iter().find(|m| m.name == rest)?;
                Some(MarkerLocation { part: None, marker })
            }
            Some((part_name, marker_name)) => {
                let part = self.part(part_name)?;
                let marker = part.marker(marker_name)?;
                Some(MarkerLocation {
                    part: Some(part),
                    marker,
                })
            }
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
