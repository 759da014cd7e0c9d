//! Multibody engine backed by Rapier3d.

use std::collections::HashMap;

use kinema_math::Placement;
use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::dynamics::{
    CCDSolver, ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager,
    JointAxis, MotorModel, MultibodyJointSet, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
    RigidBodyType,
};
use rapier3d::geometry::{BroadPhaseMultiSap, ColliderSet, NarrowPhase};
use rapier3d::pipeline::{PhysicsPipeline, QueryPipeline};
use rapier3d::prelude::MassProperties;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::{DraggedPart, MultibodyEngine};
use crate::error::SolverError;
use crate::formula::Formula;
use crate::joints::{free_axes, from_rapier, rapier_joint, to_rapier};
use crate::model::{JointKind, LimitDirection, LimitKind, MotionKind, SolverJoint, SolverModel};

/// Tuning of the Rapier backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapierSettings {
    /// Physics steps taken per recorded frame or drag step.
    pub settle_steps: usize,
    /// Physics step length in seconds.
    pub time_step: f32,
    /// Stiffness of motion drivers.
    pub motor_stiffness: f32,
    /// Damping of motion drivers.
    pub motor_damping: f32,
}

impl Default for RapierSettings {
    fn default() -> Self {
        Self {
            settle_steps: 120,
            time_step: 1.0 / 60.0,
            motor_stiffness: 1.0e4,
            motor_damping: 1.0e2,
        }
    }
}

/// Bound used for the open side of a one-sided limit.
const OPEN_LIMIT: f32 = 1.0e9;

/// Drift below which a body counts as unmoved.
const REST_EPSILON: f32 = 1.0e-6;

/// Per-part bookkeeping for exact readback.
struct Anchor {
    handle: RigidBodyHandle,
    initial: Isometry3<f32>,
    placement: Placement,
    fixed: bool,
}

/// A motion formula driving one joint axis.
struct Driver {
    joint: ImpulseJointHandle,
    axis: JointAxis,
    formula: Formula,
}

/// One assembled Rapier world.
struct World {
    pipeline: PhysicsPipeline,
    gravity: Vector3<f32>,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    anchors: HashMap<String, Anchor>,
    ground: Option<RigidBodyHandle>,
    drivers: Vec<Driver>,
    settings: RapierSettings,
}

/// Where a joint endpoint lives in the Rapier world.
enum Endpoint {
    Part(String, Placement),
    Root(Placement),
}

fn endpoint(model: &SolverModel, path: &str) -> Result<Endpoint, SolverError> {
    let loc = model
        .resolve_marker(path)
        .ok_or_else(|| SolverError::MissingMarker(path.to_string()))?;
    Ok(match loc.part {
        Some(part) => Endpoint::Part(part.name.clone(), loc.marker.placement),
        None => Endpoint::Root(loc.marker.placement),
    })
}

/// A Fixed joint from a root marker to a part marker pins that part.
fn grounding_target(model: &SolverModel, joint: &SolverJoint) -> Option<(String, Placement)> {
    if joint.kind != JointKind::Fixed {
        return None;
    }
    match (endpoint(model, &joint.marker_i).ok()?, endpoint(model, &joint.marker_j).ok()?) {
        (Endpoint::Root(root), Endpoint::Part(part, marker))
        | (Endpoint::Part(part, marker), Endpoint::Root(root)) => {
            Some((part, root * marker.inverse()))
        }
        _ => None,
    }
}

fn same_markers(a_i: &str, a_j: &str, b_i: &str, b_j: &str) -> bool {
    a_i == b_i && a_j == b_j
}

impl World {
    fn new(settings: RapierSettings) -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.dt = settings.time_step;
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: Vector3::zeros(),
            integration_params,
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            anchors: HashMap::new(),
            ground: None,
            drivers: Vec::new(),
            settings,
        }
    }

    /// Assemble a world from a solver model.
    fn from_model(model: &SolverModel, settings: RapierSettings) -> Result<Self, SolverError> {
        let mut world = Self::new(settings);

        let mut pinned: HashMap<String, Placement> = HashMap::new();
        for joint in &model.joints {
            if let Some((part, target)) = grounding_target(model, joint) {
                pinned.insert(part, target);
            }
        }

        // Create rigid bodies for each part
        for part in &model.parts {
            let target = pinned.get(&part.name).copied();
            let placement = target.unwrap_or(part.placement);
            let body_type = if target.is_some() {
                RigidBodyType::Fixed
            } else {
                RigidBodyType::Dynamic
            };
            let mass = MassProperties::new(
                Point3::origin(),
                part.mass as f32,
                Vector3::new(
                    part.inertia[0] as f32,
                    part.inertia[1] as f32,
                    part.inertia[2] as f32,
                ),
            );
            let initial = to_rapier(&placement);
            let body = RigidBodyBuilder::new(body_type)
                .position(initial)
                .additional_mass_properties(mass)
                .build();
            let handle = world.bodies.insert(body);
            world.anchors.insert(
                part.name.clone(),
                Anchor {
                    handle,
                    initial,
                    placement,
                    fixed: target.is_some(),
                },
            );
        }

        // Create joints
        for joint in &model.joints {
            if grounding_target(model, joint).is_some() {
                continue;
            }
            let handle = world.insert_joint(model, joint)?;
            world.attach_motions(model, joint, handle)?;
        }

        Ok(world)
    }

    fn body_of(&mut self, end: &Endpoint) -> Result<(RigidBodyHandle, Placement), SolverError> {
        match end {
            Endpoint::Part(name, marker) => {
                let anchor = self
                    .anchors
                    .get(name)
                    .ok_or_else(|| SolverError::MissingPart(name.clone()))?;
                Ok((anchor.handle, *marker))
            }
            Endpoint::Root(marker) => {
                let ground = match self.ground {
                    Some(handle) => handle,
                    None => {
                        let handle = self.bodies.insert(
                            RigidBodyBuilder::fixed()
                                .position(Isometry3::identity())
                                .build(),
                        );
                        self.ground = Some(handle);
                        handle
                    }
                };
                Ok((ground, *marker))
            }
        }
    }

    fn insert_joint(
        &mut self,
        model: &SolverModel,
        joint: &SolverJoint,
    ) -> Result<ImpulseJointHandle, SolverError> {
        let (body_i, marker_i) = self.body_of(&endpoint(model, &joint.marker_i)?)?;
        let (body_j, marker_j) = self.body_of(&endpoint(model, &joint.marker_j)?)?;

        let (angular, linear) = free_axes(&joint.kind);
        let mut limits: Vec<(JointAxis, [f32; 2])> = Vec::new();
        for limit in &model.limits {
            if !same_markers(&limit.marker_i, &limit.marker_j, &joint.marker_i, &joint.marker_j) {
                continue;
            }
            let axis = match limit.kind {
                LimitKind::Rotation => angular,
                LimitKind::Translation => linear,
            };
            let Some(axis) = axis else {
                warn!("{} does not apply to {}, ignored", limit.name, joint.name);
                continue;
            };
            let slot = match limits.iter().position(|(a, _)| *a as usize == axis as usize) {
                Some(i) => i,
                None => {
                    limits.push((axis, [-OPEN_LIMIT, OPEN_LIMIT]));
                    limits.len() - 1
                }
            };
            match limit.direction {
                LimitDirection::AtLeast => limits[slot].1[0] = limit.value as f32,
                LimitDirection::AtMost => limits[slot].1[1] = limit.value as f32,
            }
        }

        let data = rapier_joint(&joint.name, &joint.kind, &marker_i, &marker_j, &limits)?;
        Ok(self.impulse_joints.insert(body_i, body_j, data, true))
    }

    fn attach_motions(
        &mut self,
        model: &SolverModel,
        joint: &SolverJoint,
        handle: ImpulseJointHandle,
    ) -> Result<(), SolverError> {
        let (angular, linear) = free_axes(&joint.kind);
        for motion in &model.motions {
            if !same_markers(&motion.marker_i, &motion.marker_j, &joint.marker_i, &joint.marker_j) {
                continue;
            }
            let mut wanted: Vec<(Option<JointAxis>, &str)> = Vec::new();
            match &motion.kind {
                MotionKind::Rotational { rotation_z } => wanted.push((angular, rotation_z)),
                MotionKind::Translational { translation_z } => wanted.push((linear, translation_z)),
                MotionKind::General { r_iji, ang_ijj } => {
                    wanted.push((linear, &r_iji[2]));
                    wanted.push((angular, &ang_ijj[2]));
                }
            }
            for (axis, source) in wanted {
                let Some(axis) = axis else {
                    warn!("{} cannot drive {}, ignored", motion.name, joint.name);
                    continue;
                };
                self.drivers.push(Driver {
                    joint: handle,
                    axis,
                    formula: Formula::parse(source)?,
                });
            }
        }
        Ok(())
    }

    /// Set every driver to its target at `time`.
    fn drive(&mut self, time: f64) {
        let (stiffness, damping) = (self.settings.motor_stiffness, self.settings.motor_damping);
        for driver in &self.drivers {
            if let Some(joint) = self.impulse_joints.get_mut(driver.joint, true) {
                let target = driver.formula.eval(time) as f32;
                joint
                    .data
                    .set_motor_model(driver.axis, MotorModel::AccelerationBased)
                    .set_motor_position(driver.axis, target, stiffness, damping);
            }
        }
    }

    /// Step the physics simulation once.
    fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    fn settle(&mut self) {
        for _ in 0..self.settings.settle_steps {
            self.step();
        }
    }

    /// Current placement of every part.
    fn snapshot(&self) -> Result<HashMap<String, Placement>, SolverError> {
        let mut frame = HashMap::with_capacity(self.anchors.len());
        for (name, anchor) in &self.anchors {
            let body = self
                .bodies
                .get(anchor.handle)
                .ok_or_else(|| SolverError::MissingPart(name.clone()))?;
            let pos = body.position();
            if !pos.translation.vector.iter().all(|v| v.is_finite()) {
                return Err(SolverError::Numeric(format!("{name} diverged")));
            }
            let moved = (pos.translation.vector - anchor.initial.translation.vector).norm()
                > REST_EPSILON * (1.0 + anchor.initial.translation.vector.norm())
                || pos.rotation.angle_to(&anchor.initial.rotation) > REST_EPSILON;
            let placement = if anchor.fixed || !moved {
                anchor.placement
            } else {
                from_rapier(pos)
            };
            frame.insert(name.clone(), placement);
        }
        Ok(frame)
    }
}

/// Multibody engine running solver models in a Rapier world.
///
/// Grounded parts become fixed bodies held exactly at their grounding frame;
/// everything else is dynamic under zero gravity, so the joint solver pulls
/// parts into a configuration that satisfies the constraints. Motions drive
/// joint motors; each output time is recorded as one frame.
pub struct RapierEngine {
    settings: RapierSettings,
    frames: Vec<HashMap<String, Placement>>,
    current: usize,
    drag: Option<World>,
}

impl RapierEngine {
    /// Create an engine with default settings.
    pub fn new() -> Self {
        Self::with_settings(RapierSettings::default())
    }

    /// Create an engine with explicit settings.
    pub fn with_settings(settings: RapierSettings) -> Self {
        Self {
            settings,
            frames: Vec::new(),
            current: 0,
            drag: None,
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &RapierSettings {
        &self.settings
    }
}

impl Default for RapierEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MultibodyEngine for RapierEngine {
    fn run_kinematic(&mut self, model: &SolverModel) -> Result<(), SolverError> {
        let mut world = World::from_model(model, self.settings)?;
        let times = if model.motions.is_empty() {
            vec![model.simulation.tstart]
        } else {
            model.simulation.output_times()?
        };

        let mut frames = Vec::with_capacity(times.len());
        for time in times {
            world.drive(time);
            world.settle();
            frames.push(world.snapshot()?);
        }
        debug!("recorded {} frames for {}", frames.len(), model.name);

        self.current = frames.len().saturating_sub(1);
        self.frames = frames;
        Ok(())
    }

    fn number_of_frames(&self) -> usize {
        self.frames.len()
    }

    fn update_for_frame(&mut self, index: usize) -> Result<(), SolverError> {
        if index >= self.frames.len() {
            return Err(SolverError::FrameOutOfRange {
                index,
                count: self.frames.len(),
            });
        }
        self.current = index;
        Ok(())
    }

    fn part_placement(&self, part: &str) -> Option<Placement> {
        self.frames.get(self.current)?.get(part).copied()
    }

    fn pre_drag(&mut self, model: &SolverModel) -> Result<(), SolverError> {
        let world = World::from_model(model, self.settings)?;
        self.frames = vec![world.snapshot()?];
        self.current = 0;
        self.drag = Some(world);
        Ok(())
    }

    fn drag_step(&mut self, parts: &[DraggedPart]) -> Result<(), SolverError> {
        let world = self.drag.as_mut().ok_or(SolverError::NoDragSession)?;
        let mut targets = Vec::with_capacity(parts.len());
        for part in parts {
            let anchor = world
                .anchors
                .get(&part.name)
                .ok_or_else(|| SolverError::MissingPart(part.name.clone()))?;
            if !anchor.fixed {
                targets.push((anchor.handle, to_rapier(&part.placement())));
            }
        }
        for (handle, target) in targets {
            if let Some(body) = world.bodies.get_mut(handle) {
                body.set_body_type(RigidBodyType::KinematicPositionBased, true);
                body.set_next_kinematic_position(target);
            }
        }
        world.settle();
        self.frames = vec![world.snapshot()?];
        self.current = 0;
        Ok(())
    }

    fn post_drag(&mut self) -> Result<(), SolverError> {
        self.drag = None;
        Ok(())
    }
}
