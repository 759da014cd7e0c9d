//! End-to-end tests of the solve orchestrator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use kinema::{status_code, AssemblyError, AssemblySettings, AssemblySolver, DragStep, SolveOptions};
use kinema_ir::{
    DocObject, Document, GroundRecord, JointDef, JointType, MotionDef, MotionType, ObjectKind,
    Reference, SimulationDef,
};
use kinema_math::{Placement, Vec3};
use kinema_solver::{DraggedPart, MultibodyEngine, RapierEngine, SolverError, SolverModel};

/// Engine replaying the model's own placements, with scripted overrides and
/// failures.
#[derive(Default)]
struct ScriptedEngine {
    frames: Vec<HashMap<String, Placement>>,
    current: usize,
    live: bool,
    /// Placements forced after every run.
    overrides: HashMap<String, Placement>,
    /// Placements forced after every drag step.
    drag_overrides: HashMap<String, Placement>,
    fail_run: bool,
    fail_drag: bool,
    runs: usize,
}

impl ScriptedEngine {
    fn frame(model: &SolverModel) -> HashMap<String, Placement> {
        model
            .parts
            .iter()
            .map(|p| (p.name.clone(), p.placement))
            .collect()
    }

    fn apply(&mut self, overrides: &HashMap<String, Placement>) {
        if let Some(frame) = self.frames.get_mut(self.current) {
            for (name, plc) in overrides {
                frame.insert(name.clone(), *plc);
            }
        }
    }
}

impl MultibodyEngine for ScriptedEngine {
    fn run_kinematic(&mut self, model: &SolverModel) -> Result<(), SolverError> {
        self.runs += 1;
        if self.fail_run {
            return Err(SolverError::Numeric("scripted failure".into()));
        }
        let count = if model.motions.is_empty() {
            1
        } else {
            model.simulation.output_times()?.len()
        };
        self.frames = vec![Self::frame(model); count];
        self.current = count - 1;
        let overrides = std::mem::take(&mut self.overrides);
        self.apply(&overrides);
        self.overrides = overrides;
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
        self.frames = vec![Self::frame(model)];
        self.current = 0;
        self.live = true;
        Ok(())
    }

    fn drag_step(&mut self, parts: &[DraggedPart]) -> Result<(), SolverError> {
        if !self.live {
            return Err(SolverError::NoDragSession);
        }
        if self.fail_drag {
            return Err(SolverError::Numeric("scripted drag failure".into()));
        }
        for part in parts {
            self.frames[0].insert(part.name.clone(), part.placement());
        }
        let overrides = std::mem::take(&mut self.drag_overrides);
        self.apply(&overrides);
        self.drag_overrides = overrides;
        Ok(())
    }

    fn post_drag(&mut self) -> Result<(), SolverError> {
        self.live = false;
        Ok(())
    }
}

fn r(sub: &str) -> Reference {
    Reference::new("Assembly", sub)
}

fn ground(doc: &mut Document, obj: &str) {
    let placement = doc.placement(obj).unwrap();
    doc.grounds.push(GroundRecord {
        name: format!("Ground{obj}"),
        object: obj.into(),
        placement,
    });
}

/// A grounded, B hinged on A, C hinged on B.
fn chain() -> Document {
    let mut doc = Document::new();
    doc.add_object(
        "Assembly",
        DocObject::new(ObjectKind::Assembly).with_children(["A", "B", "C"]),
    );
    doc.add_object("A", DocObject::new(ObjectKind::Part));
    doc.add_object(
        "B",
        DocObject::new(ObjectKind::Part).at(Placement::from_translation(0.0, 0.0, 10.0)),
    );
    doc.add_object(
        "C",
        DocObject::new(ObjectKind::Part).at(Placement::from_translation(0.0, 0.0, 20.0)),
    );
    let up = Placement::from_translation(0.0, 0.0, 5.0);
    let down = Placement::from_translation(0.0, 0.0, -5.0);
    doc.joints.push(
        JointDef::new("Hinge1", JointType::Revolute, r("A.Face1"), r("B.Face1"))
            .with_placements(up, down),
    );
    doc.joints.push(
        JointDef::new("Hinge2", JointType::Revolute, r("B.Face2"), r("C.Face1"))
            .with_placements(up, down),
    );
    ground(&mut doc, "A");
    doc
}

fn scripted(doc: Document) -> AssemblySolver<ScriptedEngine> {
    AssemblySolver::new(doc, ScriptedEngine::default())
}

#[test]
fn test_no_grounded_part() {
    let mut doc = chain();
    doc.grounds.clear();
    let mut solver = scripted(doc);

    let result = solver.solve();
    assert!(matches!(result, Err(AssemblyError::NoGroundedPart)));
    assert_eq!(status_code(&result), -6);
    assert!(solver.model().is_none());
    assert_eq!(solver.engine().runs, 0);
}

#[test]
fn test_solve_writes_placements_back() {
    let moved = Placement::from_axis_angle(Vec3::new(0.0, 0.0, 10.0), Vec3::z(), 0.4);
    let mut engine = ScriptedEngine::default();
    engine.overrides.insert("B".into(), moved);
    let mut solver = AssemblySolver::new(chain(), engine);
    solver.set_obj_masses([("B".to_string(), 3.0)]);

    let result = solver.solve();
    assert_eq!(status_code(&result), 0);
    assert!(solver.document().placement("B").unwrap().is_same(&moved, 1e-12));
    assert!(solver.document().placement("A").unwrap().is_identity());

    let model = solver.model().unwrap();
    assert_eq!(model.parts.len(), 3);
    let b = solver.arena().get("B").unwrap();
    assert_eq!(model.parts[b.part].mass, 3.0);
    assert!(model.joint("GroundA").is_some());
    assert!(model.joint("Hinge1").is_some());
    assert!(model.joint("Hinge2").is_some());
}

#[test]
fn test_solve_failure_leaves_document() {
    let before = chain();
    let mut engine = ScriptedEngine::default();
    engine.fail_run = true;
    let mut solver = AssemblySolver::new(before.clone(), engine);

    let result = solver.solve();
    assert!(matches!(result, Err(AssemblyError::SolveFailed(_))));
    assert_eq!(status_code(&result), -1);
    assert_eq!(solver.document(), &before);
}

#[test]
fn test_unconnected_part_is_pruned() {
    let mut doc = chain();
    doc.add_object("Loose", DocObject::new(ObjectKind::Part));
    doc.add_object("Other", DocObject::new(ObjectKind::Part));
    doc.joints.push(JointDef::new(
        "Floating",
        JointType::Fixed,
        r("Loose.Face1"),
        r("Other.Face1"),
    ));
    let mut solver = scripted(doc);
    solver.solve().unwrap();

    let model = solver.model().unwrap();
    assert!(model.joint("Floating").is_none());
    assert!(!solver.arena().contains("Loose"));
    assert!(!solver.is_part_connected("Loose"));
    assert!(solver.is_part_connected("C"));
}

#[test]
fn test_undo_restores_placements() {
    let mut engine = ScriptedEngine::default();
    engine
        .overrides
        .insert("C".into(), Placement::from_translation(3.0, 0.0, 20.0));
    let mut solver = AssemblySolver::new(chain(), engine);

    solver
        .solve_with(SolveOptions {
            enable_undo: true,
            ..SolveOptions::default()
        })
        .unwrap();
    assert!(solver.has_undo());
    assert_abs_diff_eq!(solver.document().placement("C").unwrap().position().x, 3.0, epsilon = 1e-12);

    solver.undo_solve();
    assert!(!solver.has_undo());
    let c = solver.document().placement("C").unwrap();
    assert!(c.is_same(&Placement::from_translation(0.0, 0.0, 20.0), 1e-12));

    // nothing left to undo
    solver.document_mut().set_placement("C", Placement::identity()).unwrap();
    solver.undo_solve();
    assert!(solver.document().placement("C").unwrap().is_identity());
}

#[test]
fn test_redraw_hook_sees_solved_joints() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut solver = scripted(chain());
    let sink = Rc::clone(&seen);
    solver.set_redraw_hook(move |joint| sink.borrow_mut().push(joint.name.clone()));

    solver.solve().unwrap();
    assert_eq!(*seen.borrow(), vec!["Hinge1".to_string(), "Hinge2".to_string()]);

    seen.borrow_mut().clear();
    solver
        .solve_with(SolveOptions {
            redraw: false,
            ..SolveOptions::default()
        })
        .unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_drag_applies_valid_steps() {
    let mut solver = scripted(chain());
    assert_eq!(solver.drag_step(), DragStep::Idle);

    solver
        .begin_drag(&["C".to_string(), "C".to_string(), "Nope".to_string()])
        .unwrap();
    assert!(solver.is_dragging());
    assert_eq!(solver.dragged_parts(), &["C".to_string()]);

    let target = Placement::from_translation(1.0, 2.0, 20.0);
    solver.document_mut().set_placement("C", target).unwrap();
    assert_eq!(solver.drag_step(), DragStep::Applied);
    assert!(solver.document().placement("C").unwrap().is_same(&target, 1e-12));

    solver.end_drag();
    assert!(!solver.is_dragging());
    assert_eq!(solver.drag_step(), DragStep::Idle);
}

#[test]
fn test_drag_rejects_moving_ground() {
    let mut engine = ScriptedEngine::default();
    engine
        .drag_overrides
        .insert("A".into(), Placement::from_translation(0.5, 0.0, 0.0));
    let mut solver = AssemblySolver::new(chain(), engine);
    solver.begin_drag(&["B".to_string()]).unwrap();

    solver
        .document_mut()
        .set_placement("B", Placement::from_translation(4.0, 0.0, 10.0))
        .unwrap();
    let requested = solver.document().clone();
    assert_eq!(solver.drag_step(), DragStep::Rejected);
    assert_eq!(solver.document(), &requested);
    assert!(solver.document().placement("A").unwrap().is_identity());
}

#[test]
fn test_drag_engine_failure() {
    let mut engine = ScriptedEngine::default();
    engine.fail_drag = true;
    let mut solver = AssemblySolver::new(chain(), engine);
    solver.begin_drag(&["B".to_string()]).unwrap();

    let before = solver.document().clone();
    assert_eq!(solver.drag_step(), DragStep::Failed);
    assert_eq!(solver.document(), &before);
}

#[test]
fn test_simulation_frames() {
    let mut doc = chain();
    doc.motions.push(MotionDef {
        name: "Spin".into(),
        joint: "Hinge1".into(),
        motion_type: MotionType::Angular,
        formula: "time".into(),
    });
    let mut sim = SimulationDef::new("Run", 1.0);
    sim.time_step_output = 0.1;
    sim.motions = vec!["Spin".into(), "Missing".into()];
    doc.simulations.push(sim);
    let mut solver = scripted(doc);

    assert!(matches!(solver.update_for_frame(0), Err(AssemblyError::NoModel)));
    assert!(matches!(
        solver.generate_simulation("Nope"),
        Err(AssemblyError::UnknownSimulation(_))
    ));

    solver.generate_simulation("Run").unwrap();
    assert_eq!(solver.number_of_frames(), 11);
    let model = solver.model().unwrap();
    assert_eq!(model.motions.len(), 1);
    assert_abs_diff_eq!(model.simulation.hout, 0.1);
    assert_abs_diff_eq!(model.simulation.hmin, 1e-9);
    assert_abs_diff_eq!(model.simulation.hmax, 1.0);

    solver.update_for_frame(10).unwrap();
    assert!(matches!(
        solver.update_for_frame(11),
        Err(AssemblyError::FrameOutOfRange { index: 11, count: 11 })
    ));

    // a plain solve carries no motions
    solver.solve().unwrap();
    assert!(solver.model().unwrap().motions.is_empty());
}

#[test]
fn test_create_and_run_asmt() {
    let mut solver = scripted(chain());
    assert!(matches!(solver.run_asmt_kinematic(), Err(AssemblyError::NoModel)));
    solver.create_asmt().unwrap();
    assert!(solver.has_undo());
    assert_eq!(solver.engine().runs, 0);
    solver.run_asmt_kinematic().unwrap();
    assert_eq!(solver.number_of_frames(), 1);
}

#[test]
fn test_export_without_ground() {
    let mut doc = chain();
    doc.grounds.clear();
    let mut solver = scripted(doc);
    let path = std::env::temp_dir().join(format!("kinema-export-{}.asmt", std::process::id()));

    solver.export_as_asmt(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert!(text.starts_with("OndselSolver\nAssembly\n\tName\n\t\tKinemaAssembly\n"));
    assert!(text.contains("Hinge1"));
}

#[test]
fn test_bad_joints_are_deleted_when_asked() {
    let mut doc = chain();
    doc.joints.push(JointDef::new(
        "SelfLoop",
        JointType::Fixed,
        r("B.Face1"),
        r("B.Face2"),
    ));
    doc.joints.push(JointDef::new(
        "Dangling",
        JointType::Fixed,
        r("Ghost.Face1"),
        r("B.Face2"),
    ));

    let mut solver = scripted(doc.clone());
    solver.solve().unwrap();
    assert_eq!(solver.document().joints.len(), 4);
    assert_eq!(solver.active_joints().rejected, vec!["SelfLoop", "Dangling"]);

    let settings = AssemblySettings {
        delete_bad_joints: true,
        ..AssemblySettings::default()
    };
    let mut solver = AssemblySolver::with_settings(doc, ScriptedEngine::default(), settings);
    solver.solve().unwrap();
    let names: Vec<_> = solver.document().joints.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, ["Hinge1", "Hinge2"]);
}

#[test]
fn test_ungrounded_solve_keeps_bad_joints() {
    let mut doc = chain();
    doc.grounds.clear();
    doc.joints.push(JointDef::new(
        "SelfLoop",
        JointType::Fixed,
        r("B.Face1"),
        r("B.Face2"),
    ));
    let settings = AssemblySettings {
        delete_bad_joints: true,
        ..AssemblySettings::default()
    };
    let mut solver = AssemblySolver::with_settings(doc.clone(), ScriptedEngine::default(), settings);

    let result = solver.solve();
    assert!(matches!(result, Err(AssemblyError::NoGroundedPart)));
    assert_eq!(solver.document(), &doc);
    assert_eq!(solver.document().joints.len(), 3);
}

#[test]
fn test_link_group_placement_moves_to_elements() {
    let mut doc = chain();
    doc.add_object(
        "Assembly",
        DocObject::new(ObjectKind::Assembly).with_children(["A", "B", "C", "Array"]),
    );
    let shift = Placement::from_translation(0.0, 5.0, 0.0);
    doc.add_object(
        "Array",
        DocObject::new(ObjectKind::LinkGroup)
            .at(shift)
            .with_children(["E0", "E1"]),
    );
    doc.add_object("E0", DocObject::new(ObjectKind::Part));
    doc.add_object(
        "E1",
        DocObject::new(ObjectKind::Part).at(Placement::from_translation(1.0, 0.0, 0.0)),
    );
    let mut solver = scripted(doc);
    solver.ensure_identity_placements();

    let doc = solver.document();
    assert!(doc.placement("Array").unwrap().is_identity());
    assert!(doc.placement("E0").unwrap().is_same(&shift, 1e-12));
    assert!(doc
        .placement("E1")
        .unwrap()
        .is_same(&Placement::from_translation(1.0, 5.0, 0.0), 1e-12));
}

#[test]
fn test_nested_frames_survive_a_solve() {
    let mut doc = Document::new();
    doc.add_object(
        "Assembly",
        DocObject::new(ObjectKind::Assembly).with_children(["Frame", "Sub"]),
    );
    doc.add_object("Frame", DocObject::new(ObjectKind::Part));
    let sub_plc = Placement::from_axis_angle(Vec3::new(3.0, -2.0, 7.0), Vec3::new(1.0, 1.0, 0.0), 0.7);
    doc.add_object(
        "Sub",
        DocObject::new(ObjectKind::SubAssembly { rigid: true })
            .at(sub_plc)
            .with_children(["Inner"]),
    );
    doc.add_object(
        "Inner",
        DocObject::new(ObjectKind::Part).at(Placement::from_axis_angle(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::z(),
            1.1,
        )),
    );
    let jcs = Placement::from_axis_angle(Vec3::new(0.5, 0.5, 0.0), Vec3::y(), 0.3);
    doc.joints.push(
        JointDef::new("Pin", JointType::Fixed, r("Frame.Face1"), r("Sub.Inner.Face1"))
            .with_placements(jcs, jcs),
    );
    ground(&mut doc, "Frame");
    let before = doc.clone();

    let mut solver = scripted(doc);
    solver.solve().unwrap();
    assert!(solver.arena().contains("Sub"));
    assert!(!solver.arena().contains("Inner"));
    for id in ["Frame", "Sub", "Inner"] {
        let old = before.placement(id).unwrap();
        let new = solver.document().placement(id).unwrap();
        assert!(old.is_same(&new, 1e-9), "{id} drifted");
    }
}

#[test]
fn test_connectivity_queries() {
    let solver = scripted(chain());
    assert!(solver.is_part_grounded("A"));
    assert!(!solver.is_part_grounded("B"));
    assert_eq!(solver.grounded_parts(), vec!["A".to_string()]);
    assert_eq!(solver.joints_of_part("B"), vec!["Hinge1", "Hinge2"]);
    assert_eq!(solver.upstream_parts("C"), vec!["A", "B", "C"]);
    assert_eq!(solver.downstream_parts("B", "Hinge1"), vec!["C"]);
    assert!(solver.downstream_parts("B", "Nope").is_empty());
    assert!(solver.is_joint_connecting_part_to_ground("Hinge1", kinema::Side::Second));
    assert!(!solver.is_joint_connecting_part_to_ground("Nope", kinema::Side::Second));
    let (joint, side) = solver.joint_of_part_connecting_to_ground("C").unwrap();
    assert_eq!(joint, "Hinge2");
    assert_eq!(side, kinema::Side::Second);
    let (moving, joint, _) = solver.upstream_moving_part("C").unwrap();
    assert_eq!(moving, "C");
    assert_eq!(joint, "Hinge2");
}

#[test]
fn test_rapier_chain_closes_joints() {
    let mut doc = chain();
    // C starts off its hinge; the solve pulls it back in line.
    doc.set_placement("C", Placement::from_translation(0.5, 0.0, 20.0))
        .unwrap();
    let mut solver = AssemblySolver::new(doc, RapierEngine::new());
    solver.solve().unwrap();
    assert!(solver.number_of_frames() >= 1);
    solver.update_for_frame(0).unwrap();

    let doc = solver.document();
    assert!(doc.placement("A").unwrap().is_identity());
    let b = doc.placement("B").unwrap();
    let c = doc.placement("C").unwrap();
    let up = Placement::from_translation(0.0, 0.0, 5.0);
    let down = Placement::from_translation(0.0, 0.0, -5.0);
    let hinge1 = (Placement::identity() * up).position() - (b * down).position();
    let hinge2 = (b * up).position() - (c * down).position();
    assert_abs_diff_eq!(hinge1.norm(), 0.0, epsilon = 1e-2);
    assert_abs_diff_eq!(hinge2.norm(), 0.0, epsilon = 1e-2);
}

#[test]
fn test_recompute_respects_setting() {
    let settings = AssemblySettings {
        solve_on_recompute: false,
        ..AssemblySettings::default()
    };
    let mut solver = AssemblySolver::with_settings(chain(), ScriptedEngine::default(), settings);
    solver.recompute().unwrap();
    assert_eq!(solver.engine().runs, 0);

    let mut solver = scripted(chain());
    solver.recompute().unwrap();
    assert_eq!(solver.engine().runs, 1);
}

#[test]
fn test_grounded_records_follow_objects() {
    let mut solver = scripted(chain());
    let moved = Placement::from_translation(0.0, 1.0, 0.0);
    solver.document_mut().set_placement("A", moved).unwrap();
    solver.update_grounded_joints_placements();
    assert!(solver.document().grounds[0].placement.is_same(&moved, 1e-12));
}
