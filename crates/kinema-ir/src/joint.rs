//! Joints, grounding records, motions and simulations.

use kinema_geom::{element_type, ElementKind};
use kinema_math::Placement;
use serde::{Deserialize, Serialize};

use crate::ObjectId;

/// User-facing joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    /// Rigid weld.
    Fixed,
    /// Hinge about the common Z axis.
    Revolute,
    /// Hinge plus slide along the common Z axis.
    Cylindrical,
    /// Slide along the common Z axis.
    Slider,
    /// Spherical joint.
    Ball,
    /// Geometric distance, realized according to the referenced features.
    Distance,
    /// Z axes kept parallel.
    Parallel,
    /// Z axes kept perpendicular.
    Perpendicular,
    /// Fixed angle between Z axes.
    Angle,
    /// Rack and pinion coupling.
    RackPinion,
    /// Screw coupling.
    Screw,
    /// Gear coupling.
    Gears,
    /// Belt coupling (gear with reversed second radius).
    Belt,
}

impl JointType {
    /// Every joint type, in declaration order.
    pub const ALL: [JointType; 13] = [
        JointType::Fixed,
        JointType::Revolute,
        JointType::Cylindrical,
        JointType::Slider,
        JointType::Ball,
        JointType::Distance,
        JointType::Parallel,
        JointType::Perpendicular,
        JointType::Angle,
        JointType::RackPinion,
        JointType::Screw,
        JointType::Gears,
        JointType::Belt,
    ];

    /// Slider and cylindrical joints carry length limits.
    pub fn has_length_limits(self) -> bool {
        matches!(self, JointType::Slider | JointType::Cylindrical)
    }

    /// Revolute and cylindrical joints carry angle limits.
    pub fn has_angle_limits(self) -> bool {
        matches!(self, JointType::Revolute | JointType::Cylindrical)
    }
}

/// A reference to a sub-element: a root object plus a dotted path through
/// containers down to an element (`"Part.Body.Face6"`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reference {
    /// Object the path starts from (usually the assembly).
    pub object: ObjectId,
    /// Dotted sub-element path.
    #[serde(default)]
    pub sub: String,
}

impl Reference {
    /// Create a reference.
    pub fn new(object: impl Into<ObjectId>, sub: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            sub: sub.into(),
        }
    }

    /// Path components of `sub`.
    pub fn names(&self) -> Vec<&str> {
        if self.sub.is_empty() {
            return Vec::new();
        }
        self.sub.split('.').collect()
    }

    /// Last path component, the element name (`"Face6"`).
    pub fn element_name(&self) -> &str {
        self.sub.rsplit('.').next().unwrap_or("")
    }

    /// Alphabetic prefix of the element name (`"Face"`).
    pub fn element_type(&self) -> &str {
        element_type(self.element_name())
    }

    /// Topological kind of the element, if recognized.
    pub fn element_kind(&self) -> Option<ElementKind> {
        self.element_name().parse().ok()
    }
}

/// Length and angle limits with their enable flags. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointLimits {
    /// Lower length bound.
    pub length_min: f64,
    /// Upper length bound.
    pub length_max: f64,
    /// Whether `length_min` applies.
    pub enable_length_min: bool,
    /// Whether `length_max` applies.
    pub enable_length_max: bool,
    /// Lower angle bound (degrees).
    pub angle_min: f64,
    /// Upper angle bound (degrees).
    pub angle_max: f64,
    /// Whether `angle_min` applies.
    pub enable_angle_min: bool,
    /// Whether `angle_max` applies.
    pub enable_angle_max: bool,
}

impl JointLimits {
    /// Swap reversed length bounds, together with their enable flags.
    ///
    /// Returns true if anything changed.
    pub fn normalize_length(&mut self) -> bool {
        if self.enable_length_min && self.enable_length_max && self.length_min > self.length_max {
            std::mem::swap(&mut self.length_min, &mut self.length_max);
            std::mem::swap(&mut self.enable_length_min, &mut self.enable_length_max);
            return true;
        }
        false
    }

    /// Swap reversed angle bounds, together with their enable flags.
    ///
    /// Returns true if anything changed.
    pub fn normalize_angle(&mut self) -> bool {
        if self.enable_angle_min && self.enable_angle_max && self.angle_min > self.angle_max {
            std::mem::swap(&mut self.angle_min, &mut self.angle_max);
            std::mem::swap(&mut self.enable_angle_min, &mut self.enable_angle_max);
            return true;
        }
        false
    }
}

fn default_true() -> bool {
    true
}

/// A user-authored joint between two references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    /// Unique joint name.
    pub name: String,
    /// Inactive joints are ignored by every solve.
    #[serde(default = "default_true")]
    pub activated: bool,
    /// Display flag; drag steps only refresh visible joints.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Joint type.
    pub joint_type: JointType,
    /// First endpoint.
    pub reference1: Reference,
    /// Second endpoint.
    pub reference2: Reference,
    /// Local frame of the first endpoint, relative to its element's object.
    #[serde(default)]
    pub placement1: Placement,
    /// Local frame of the second endpoint, relative to its element's object.
    #[serde(default)]
    pub placement2: Placement,
    /// Distance, pitch, radius or angle (degrees) depending on the type.
    #[serde(default)]
    pub distance: f64,
    /// Second radius for gears and belts.
    #[serde(default)]
    pub distance2: f64,
    /// Length and angle limits.
    #[serde(default)]
    pub limits: JointLimits,
}

impl JointDef {
    /// Create an active, visible joint with identity frames.
    pub fn new(
        name: impl Into<String>,
        joint_type: JointType,
        reference1: Reference,
        reference2: Reference,
    ) -> Self {
        Self {
            name: name.into(),
            activated: true,
            visible: true,
            joint_type,
            reference1,
            reference2,
            placement1: Placement::identity(),
            placement2: Placement::identity(),
            distance: 0.0,
            distance2: 0.0,
            limits: JointLimits::default(),
        }
    }

    /// Builder-style frame assignment.
    pub fn with_placements(mut self, placement1: Placement, placement2: Placement) -> Self {
        self.placement1 = placement1;
        self.placement2 = placement2;
        self
    }

    /// Builder-style distance assignment.
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    /// Exchange the two endpoints: references and local frames together.
    pub fn swap_endpoints(&mut self) {
        std::mem::swap(&mut self.reference1, &mut self.reference2);
        std::mem::swap(&mut self.placement1, &mut self.placement2);
    }

    /// Reference of endpoint `side` (1 or 2).
    pub fn reference(&self, side: usize) -> &Reference {
        if side == 1 {
            &self.reference1
        } else {
            &self.reference2
        }
    }

    /// Local frame of endpoint `side` (1 or 2).
    pub fn placement(&self, side: usize) -> Placement {
        if side == 1 {
            self.placement1
        } else {
            self.placement2
        }
    }
}

/// Grounds one object at a fixed world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundRecord {
    /// Record name, reused as the solver joint name.
    pub name: String,
    /// The grounded object.
    pub object: ObjectId,
    /// World frame the object is held at.
    #[serde(default)]
    pub placement: Placement,
}

/// Kind of motion driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionType {
    /// Rotation about the joint's Z axis.
    Angular,
    /// Translation along the joint's Z axis.
    Linear,
}

/// A formula-driven motion bound to a joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionDef {
    /// Motion name.
    pub name: String,
    /// Name of the driven joint.
    pub joint: String,
    /// Angular or linear.
    pub motion_type: MotionType,
    /// Formula in the solver's expression language, in terms of `time`.
    #[serde(default)]
    pub formula: String,
}

/// Time range and tolerances of a kinematic simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationDef {
    /// Simulation name.
    pub name: String,
    /// Start time.
    #[serde(default)]
    pub time_start: f64,
    /// End time.
    #[serde(default = "default_time_end")]
    pub time_end: f64,
    /// Output step.
    #[serde(default = "default_time_step")]
    pub time_step_output: f64,
    /// Global error tolerance.
    #[serde(default = "default_error_tolerance")]
    pub global_error_tolerance: f64,
    /// Names of the motions this simulation drives.
    #[serde(default)]
    pub motions: Vec<String>,
}

fn default_time_end() -> f64 {
    10.0
}

fn default_time_step() -> f64 {
    0.01
}

fn default_error_tolerance() -> f64 {
    1e-6
}

impl SimulationDef {
    /// Simulation over `[0, time_end]` with default step and tolerance.
    pub fn new(name: impl Into<String>, time_end: f64) -> Self {
        Self {
            name: name.into(),
            time_start: 0.0,
            time_end,
            time_step_output: default_time_step(),
            global_error_tolerance: default_error_tolerance(),
            motions: Vec::new(),
        }
    }
}
