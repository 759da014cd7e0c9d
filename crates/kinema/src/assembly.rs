//! The solve orchestrator.
//!
//! [`AssemblySolver`] owns a document and a [`MultibodyEngine`]. Every run
//! rebuilds the solver model from scratch: ground parts, collect the active
//! joints, prune those not reachable from ground, synthesize the rest, run
//! the engine and write the resulting placements back.

use std::collections::HashMap;
use std::path::Path;

use kinema_ir::{Document, JointDef, ObjectId, ObjectKind};
use kinema_math::Placement;
use kinema_solver::{
    DraggedPart, MultibodyEngine, RapierEngine, SimulationParameters, SolverModel,
};
use tracing::{debug, error, info, warn};

use crate::bundle::PartArena;
use crate::connectivity::{self, ActiveJoints, Connectivity, Side};
use crate::error::AssemblyError;
use crate::settings::{AssemblySettings, Settings};
use crate::synthesize::Synthesizer;

/// Callback refreshing a joint's display frames after placements changed.
pub type RedrawHook = Box<dyn FnMut(&JointDef)>;

/// Options of a full solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveOptions {
    /// Snapshot placements so the solve can be undone.
    pub enable_undo: bool,
    /// Call the redraw hook for the solved joints.
    pub redraw: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            enable_undo: false,
            redraw: true,
        }
    }
}

/// Outcome of one drag step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragStep {
    /// Placements were written back.
    Applied,
    /// The engine moved a grounded part; nothing was written.
    Rejected,
    /// The engine failed; nothing was written.
    Failed,
    /// No drag session is active.
    Idle,
}

/// Solves the assembly of a document with a multibody engine.
pub struct AssemblySolver<E = RapierEngine> {
    doc: Document,
    engine: E,
    settings: AssemblySettings,
    model: Option<SolverModel>,
    arena: PartArena,
    masses: HashMap<ObjectId, f64>,
    motions: Vec<kinema_ir::MotionDef>,
    bundle_fixed: bool,
    undo: Vec<(ObjectId, Placement)>,
    drag: Option<Vec<ObjectId>>,
    redraw: Option<RedrawHook>,
}

impl AssemblySolver<RapierEngine> {
    /// Solver over `doc` with the Rapier backend configured from `settings`.
    pub fn from_settings(doc: Document, settings: &Settings) -> Self {
        Self::with_settings(
            doc,
            RapierEngine::with_settings(settings.engine),
            settings.assembly.clone(),
        )
    }
}

impl<E: MultibodyEngine> AssemblySolver<E> {
    /// Solver over `doc` with default settings.
    pub fn new(doc: Document, engine: E) -> Self {
        Self::with_settings(doc, engine, AssemblySettings::default())
    }

    /// Solver over `doc` with explicit settings.
    pub fn with_settings(doc: Document, engine: E, settings: AssemblySettings) -> Self {
        Self {
            doc,
            engine,
            settings,
            model: None,
            arena: PartArena::new(),
            masses: HashMap::new(),
            motions: Vec::new(),
            bundle_fixed: false,
            undo: Vec::new(),
            drag: None,
            redraw: None,
        }
    }

    /// The document.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Mutable document access, e.g. to move a dragged part.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Give the document back.
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The solver model of the last run.
    pub fn model(&self) -> Option<&SolverModel> {
        self.model.as_ref()
    }

    /// Object → solver part associations of the last run.
    pub fn arena(&self) -> &PartArena {
        &self.arena
    }

    /// Active settings.
    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    /// Install the callback run for each joint whose parts moved.
    pub fn set_redraw_hook(&mut self, hook: impl FnMut(&JointDef) + 'static) {
        self.redraw = Some(Box::new(hook));
    }

    /// Replace the caller-provided mass table.
    pub fn set_obj_masses(&mut self, masses: impl IntoIterator<Item = (ObjectId, f64)>) {
        self.masses = masses.into_iter().collect();
    }

    /// Solve if solving on recompute is enabled.
    pub fn recompute(&mut self) -> Result<(), AssemblyError> {
        if self.settings.solve_on_recompute {
            self.solve()
        } else {
            Ok(())
        }
    }

    /// Full solve with default options.
    pub fn solve(&mut self) -> Result<(), AssemblyError> {
        self.solve_with(SolveOptions::default())
    }

    /// Full solve: rebuild the model, run it, write placements back.
    pub fn solve_with(&mut self, options: SolveOptions) -> Result<(), AssemblyError> {
        self.ensure_identity_placements();
        self.motions.clear();

        let joints = self.build_model(true, true)?;
        if options.enable_undo {
            self.save_placements_for_undo();
        }
        let model = self.model.as_ref().ok_or(AssemblyError::NoModel)?;
        if let Err(e) = self.engine.run_kinematic(model) {
            error!("solve failed: {e}");
            return Err(AssemblyError::SolveFailed(e));
        }
        self.set_new_placements();
        if options.redraw {
            self.redraw(&joints);
        }
        Ok(())
    }

    /// Build the model and run simulation `name` over its time range. Frames
    /// are browsed afterwards with [`update_for_frame`](Self::update_for_frame).
    pub fn generate_simulation(&mut self, name: &str) -> Result<(), AssemblyError> {
        let sim = self
            .doc
            .simulation(name)
            .cloned()
            .ok_or_else(|| AssemblyError::UnknownSimulation(name.to_string()))?;
        self.motions = sim
            .motions
            .iter()
            .filter_map(|m| {
                let motion = self.doc.motion(m).cloned();
                if motion.is_none() {
                    warn!("simulation {name}: motion {m} not found");
                }
                motion
            })
            .collect();

        let built = self.build_model(true, true);
        self.motions.clear();
        built?;

        let model = self.model.as_mut().ok_or(AssemblyError::NoModel)?;
        model.simulation = SimulationParameters {
            tstart: sim.time_start,
            tend: sim.time_end,
            hout: sim.time_step_output,
            hmin: 1.0e-9,
            hmax: 1.0,
            error_tol: sim.global_error_tolerance,
        };
        if let Err(e) = self.engine.run_kinematic(model) {
            error!("simulation {name} failed: {e}");
            return Err(AssemblyError::SolveFailed(e));
        }
        info!("simulation {name}: {} frames", self.engine.number_of_frames());
        Ok(())
    }

    /// Build the solver model without running it, snapshotting placements
    /// for undo.
    pub fn create_asmt(&mut self) -> Result<(), AssemblyError> {
        self.motions.clear();
        self.build_model(true, true)?;
        self.save_placements_for_undo();
        Ok(())
    }

    /// Run the model built by [`create_asmt`](Self::create_asmt).
    pub fn run_asmt_kinematic(&mut self) -> Result<(), AssemblyError> {
        let model = self.model.as_ref().ok_or(AssemblyError::NoModel)?;
        if let Err(e) = self.engine.run_kinematic(model) {
            error!("kinematic run failed: {e}");
            return Err(AssemblyError::SolveFailed(e));
        }
        info!("kinematic run: {} frames", self.engine.number_of_frames());
        Ok(())
    }

    /// Number of frames recorded by the last run.
    pub fn number_of_frames(&self) -> usize {
        self.engine.number_of_frames()
    }

    /// Apply the placements of frame `index`.
    pub fn update_for_frame(&mut self, index: usize) -> Result<(), AssemblyError> {
        if self.model.is_none() {
            return Err(AssemblyError::NoModel);
        }
        let count = self.engine.number_of_frames();
        if index >= count {
            return Err(AssemblyError::FrameOutOfRange { index, count });
        }
        self.engine.update_for_frame(index)?;
        self.set_new_placements();
        let names = self.active_joint_names(false);
        self.redraw(&names);
        Ok(())
    }

    /// Start an interactive drag of `parts`.
    ///
    /// Solves once with Fixed-joined parts welded into bundles, then keeps
    /// the engine live for [`drag_step`](Self::drag_step). Parts that are not
    /// in the model, duplicates, and bundle members other than the bundle's
    /// main object are not dragged.
    pub fn begin_drag(&mut self, parts: &[ObjectId]) -> Result<(), AssemblyError> {
        self.end_drag();

        self.bundle_fixed = true;
        let solved = self.solve();
        self.bundle_fixed = false;
        solved?;

        let mut dragged: Vec<ObjectId> = Vec::new();
        for part in parts {
            if dragged.contains(part) {
                continue;
            }
            match self.arena.get(part) {
                None => warn!("{part} is not in the solved assembly and cannot be dragged"),
                Some(entry) if !entry.is_main() => continue,
                Some(_) => dragged.push(part.clone()),
            }
        }

        let model = self.model.as_ref().ok_or(AssemblyError::NoModel)?;
        self.engine.pre_drag(model)?;
        self.drag = Some(dragged);
        Ok(())
    }

    /// Push the dragged parts' document placements into the engine and take
    /// one step. Placements are written back only when the step is valid.
    pub fn drag_step(&mut self) -> DragStep {
        let Some(parts) = &self.drag else {
            return DragStep::Idle;
        };
        let mut pushed = Vec::with_capacity(parts.len());
        for part in parts {
            let (Some(entry), Some(plc)) = (self.arena.get(part), self.doc.placement(part)) else {
                continue;
            };
            pushed.push(DraggedPart::new(entry.name.clone(), &plc));
        }

        if let Err(e) = self.engine.drag_step(&pushed) {
            debug!("drag step failed: {e}");
            return DragStep::Failed;
        }
        if !self.validate_new_placements() {
            return DragStep::Rejected;
        }
        self.set_new_placements();
        let visible = self.active_joint_names(true);
        self.redraw(&visible);
        DragStep::Applied
    }

    /// End the drag session, if any.
    pub fn end_drag(&mut self) {
        if self.drag.take().is_some() {
            if let Err(e) = self.engine.post_drag() {
                debug!("post drag failed: {e}");
            }
        }
    }

    /// Whether a drag session is active.
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Parts moved by the current drag session.
    pub fn dragged_parts(&self) -> &[ObjectId] {
        self.drag.as_deref().unwrap_or(&[])
    }

    /// Build the model without pruning or running it and write it to `path`
    /// in ASMT text form.
    pub fn export_as_asmt(&mut self, path: impl AsRef<Path>) -> Result<(), AssemblyError> {
        self.motions.clear();
        self.build_model(false, false)?;
        let model = self.model.as_ref().ok_or(AssemblyError::NoModel)?;
        std::fs::write(path, model.to_asmt())?;
        Ok(())
    }

    /// Snapshot the placements of every object in the model.
    pub fn save_placements_for_undo(&mut self) {
        self.undo = self
            .arena
            .iter()
            .filter_map(|(obj, _)| self.doc.placement(obj).map(|p| (obj.clone(), p)))
            .collect();
    }

    /// Restore the last snapshot and drop it. Does nothing without one.
    pub fn undo_solve(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        for (obj, plc) in std::mem::take(&mut self.undo) {
            if let Err(e) = self.doc.set_placement(&obj, plc) {
                warn!("undo: {e}");
            }
        }
        let names = self.active_joint_names(false);
        self.redraw(&names);
    }

    /// Drop the undo snapshot.
    pub fn clear_undo(&mut self) {
        self.undo.clear();
    }

    /// Whether an undo snapshot is held.
    pub fn has_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Move the placement of every link group in the assembly onto its
    /// elements, leaving the group itself at identity.
    pub fn ensure_identity_placements(&mut self) {
        let children = self.doc.assembly_children().to_vec();
        for child in children {
            let Some(obj) = self.doc.object(&child) else {
                continue;
            };
            if obj.kind != ObjectKind::LinkGroup || obj.placement.is_identity() {
                continue;
            }
            let plc = obj.placement;
            let elements = obj.children.clone();
            if let Some(obj) = self.doc.object_mut(&child) {
                obj.placement = Placement::identity();
            }
            for element in elements {
                if let Some(e) = self.doc.object_mut(&element) {
                    e.placement = plc * e.placement;
                }
            }
        }
    }

    /// Copy each grounded object's current placement into its grounding
    /// record.
    pub fn update_grounded_joints_placements(&mut self) {
        for i in 0..self.doc.grounds.len() {
            if let Some(plc) = self.doc.placement(&self.doc.grounds[i].object) {
                self.doc.grounds[i].placement = plc;
            }
        }
    }

    // =========================================================================
    // Connectivity queries
    // =========================================================================

    /// Activated joints with two distinct, resolvable moving parts.
    pub fn active_joints(&self) -> ActiveJoints {
        connectivity::active_joints(&self.doc)
    }

    /// Objects held by grounding records.
    pub fn grounded_parts(&self) -> Vec<ObjectId> {
        self.doc.grounded_objects()
    }

    fn with_connectivity<R>(&self, f: impl FnOnce(&Connectivity<'_>) -> R) -> R {
        let grounded = self.doc.grounded_objects();
        let active = connectivity::active_joints(&self.doc);
        f(&Connectivity::new(&grounded, &active.edges))
    }

    fn joint_index(&self, name: &str) -> Option<usize> {
        self.doc.joints.iter().position(|j| j.name == name)
    }

    fn joint_name(&self, index: usize) -> String {
        self.doc.joints.get(index).map(|j| j.name.clone()).unwrap_or_default()
    }

    /// Whether `part` is grounded.
    pub fn is_part_grounded(&self, part: &str) -> bool {
        self.doc.is_grounded(part)
    }

    /// Whether `part` is grounded or reachable from ground.
    pub fn is_part_connected(&self, part: &str) -> bool {
        self.with_connectivity(|c| c.is_part_connected(part))
    }

    /// Names of the active joints with `part` at an endpoint.
    pub fn joints_of_part(&self, part: &str) -> Vec<String> {
        self.with_connectivity(|c| {
            c.joints_of_part(part)
                .into_iter()
                .map(|e| e.name.clone())
                .collect()
        })
    }

    /// Names of the active joints whose endpoint element belongs to `obj`.
    pub fn joints_of_obj(&self, obj: &str) -> Vec<String> {
        let resolver = crate::resolve::Resolver::new(&self.doc);
        self.active_joints()
            .edges
            .iter()
            .filter_map(|e| self.doc.joints.get(e.joint))
            .filter(|j| {
                resolver.object(&j.reference1).as_deref() == Some(obj)
                    || resolver.object(&j.reference2).as_deref() == Some(obj)
            })
            .map(|j| j.name.clone())
            .collect()
    }

    /// Whether joint `joint` alone connects the part at `side` to ground.
    pub fn is_joint_connecting_part_to_ground(&self, joint: &str, side: Side) -> bool {
        let Some(index) = self.joint_index(joint) else {
            return false;
        };
        self.with_connectivity(|c| c.is_joint_connecting_part_to_ground(index, side))
    }

    /// Joint (and endpoint) through which `part` hangs from ground.
    pub fn joint_of_part_connecting_to_ground(&self, part: &str) -> Option<(String, Side)> {
        let endpoint = self.with_connectivity(|c| c.joint_of_part_connecting_to_ground(part))?;
        Some((self.joint_name(endpoint.joint), endpoint.side))
    }

    /// Parts from ground down to `part`.
    pub fn upstream_parts(&self, part: &str) -> Vec<ObjectId> {
        self.with_connectivity(|c| c.upstream_parts(part))
    }

    /// First part upstream of `part` attached by a non-Fixed joint, with that
    /// joint's name and the part's side.
    pub fn upstream_moving_part(&self, part: &str) -> Option<(ObjectId, String, Side)> {
        let (moving, endpoint) = self.with_connectivity(|c| c.upstream_moving_part(part))?;
        Some((moving, self.joint_name(endpoint.joint), endpoint.side))
    }

    /// Parts that would lose their ground connection without `joint`.
    pub fn downstream_parts(&self, part: &str, joint: &str) -> Vec<ObjectId> {
        let Some(index) = self.joint_index(joint) else {
            return Vec::new();
        };
        self.with_connectivity(|c| {
            c.downstream_parts(part, index)
                .into_iter()
                .map(|r| r.part)
                .collect()
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Rebuild the solver model. Returns the names of the joints handed to
    /// synthesis.
    fn build_model(&mut self, prune: bool, require_ground: bool) -> Result<Vec<String>, AssemblyError> {
        self.model = None;
        self.arena.clear();

        let groundable = self
            .doc
            .grounds
            .iter()
            .any(|g| self.doc.placement(&g.object).is_some());
        if require_ground && !groundable {
            warn!("no grounded part, nothing to solve");
            return Err(AssemblyError::NoGroundedPart);
        }

        let mut active = connectivity::active_joints(&self.doc);
        if !active.rejected.is_empty() {
            if self.settings.delete_bad_joints {
                for name in &active.rejected {
                    warn!("deleting joint {name}: bad or self-referencing endpoints");
                    self.doc.remove_joint(name)?;
                }
                active = connectivity::active_joints(&self.doc);
            } else {
                for name in &active.rejected {
                    warn!("ignoring joint {name}: bad or self-referencing endpoints");
                }
            }
        }

        let mut model = SolverModel::new();
        model.debug = self.settings.log_solver_debug;
        let mut synth = Synthesizer {
            doc: &mut self.doc,
            model: &mut model,
            arena: &mut self.arena,
            masses: &self.masses,
            joints: &active.edges,
            motions: &self.motions,
            bundle_fixed: self.bundle_fixed,
            tolerance: self.settings.tolerance,
        };

        let grounded = synth.ground_parts();
        if grounded.is_empty() && require_ground {
            warn!("no grounded part, nothing to solve");
            return Err(AssemblyError::NoGroundedPart);
        }
        let joints = if prune {
            Connectivity::new(&grounded, &active.edges)
                .prune_unconnected()
                .kept
        } else {
            active.edges.clone()
        };
        for edge in &joints {
            synth.synthesize(edge.joint);
        }

        self.model = Some(model);
        Ok(joints.into_iter().map(|e| e.name).collect())
    }

    /// Write engine placements into the document.
    fn set_new_placements(&mut self) {
        for (obj, entry) in self.arena.iter() {
            let Some(mut plc) = self.engine.part_placement(&entry.name) else {
                continue;
            };
            if !entry.is_main() {
                plc = plc * entry.offset;
            }
            if let Some(o) = self.doc.object_mut(obj) {
                o.placement = plc;
            }
        }
    }

    /// A step is valid when no grounded object moved.
    fn validate_new_placements(&self) -> bool {
        for record in &self.doc.grounds {
            let Some(entry) = self.arena.get(&record.object) else {
                continue;
            };
            let Some(mut new) = self.engine.part_placement(&entry.name) else {
                continue;
            };
            if !entry.is_main() {
                new = new * entry.offset;
            }
            let Some(old) = self.doc.placement(&record.object) else {
                continue;
            };
            if !old.is_same(&new, self.settings.tolerance) {
                warn!("ignoring bad solve, grounded object {} moved", record.object);
                return false;
            }
        }
        true
    }

    fn active_joint_names(&self, visible_only: bool) -> Vec<String> {
        self.active_joints()
            .edges
            .iter()
            .filter(|e| !visible_only || self.doc.joints.get(e.joint).is_some_and(|j| j.visible))
            .map(|e| e.name.clone())
            .collect()
    }

    fn redraw(&mut self, names: &[String]) {
        let Some(hook) = self.redraw.as_mut() else {
            return;
        };
        for name in names {
            if let Some(joint) = self.doc.joint(name) {
                hook(joint);
            }
        }
    }
}
