//! ASMT text export.
//!
//! ASMT is the tab-indented keyword format multibody engines read
//! assemblies from. Every block is a keyword line followed by its values one
//! indentation level deeper:
//!
//! ```text
//! Assembly
//! 	Name
//! 		KinemaAssembly
//! 	Parts
//! 		Part
//! 			Name
//! 				Base
//! 			Position3D
//! 				0 0 0
//! ...
//! ```

use std::fmt::{self, Write};

use kinema_math::Placement;

use crate::model::{JointKind, Marker, MotionKind, SolverModel};

struct AsmtWriter<'a, W: Write> {
    out: &'a mut W,
    depth: usize,
}

impl<'a, W: Write> AsmtWriter<'a, W> {
    fn line(&mut self, text: &str) -> fmt::Result {
        for _ in 0..self.depth {
            self.out.write_char('\t')?;
        }
        writeln!(self.out, "{text}")
    }

    fn block(&mut self, keyword: &str, body: impl FnOnce(&mut Self) -> fmt::Result) -> fmt::Result {
        self.line(keyword)?;
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    fn value(&mut self, keyword: &str, value: &str) -> fmt::Result {
        self.block(keyword, |w| w.line(value))
    }

    fn number(&mut self, keyword: &str, value: f64) -> fmt::Result {
        self.value(keyword, &value.to_string())
    }

    fn placement(&mut self, plc: &Placement) -> fmt::Result {
        let p = plc.position();
        self.value("Position3D", &format!("{} {} {}", p.x, p.y, p.z))?;
        self.block("RotationMatrix", |w| {
            for row in plc.rotation_rows() {
                w.line(&format!("{} {} {}", row[0], row[1], row[2]))?;
            }
            Ok(())
        })
    }

    fn marker(&mut self, marker: &Marker) -> fmt::Result {
        self.block("Marker", |w| {
            w.value("Name", &marker.name)?;
            w.placement(&marker.placement)
        })
    }
}

fn joint_parameters(kind: &JointKind) -> Vec<(&'static str, f64)> {
    match *kind {
        JointKind::Angle { theta } => vec![("theIzJz", theta)],
        JointKind::RackPinion { pitch_radius } => vec![("pitchRadius", pitch_radius)],
        JointKind::Screw { pitch } => vec![("pitch", pitch)],
        JointKind::Gear { radius_i, radius_j } => vec![("radiusI", radius_i), ("radiusJ", radius_j)],
        JointKind::SphSph { distance }
        | JointKind::RevCyl { distance }
        | JointKind::CylSph { distance } => vec![("distanceIJ", distance)],
        JointKind::Planar { offset }
        | JointKind::LineInPlane { offset }
        | JointKind::PointInPlane { offset } => vec![("offset", offset)],
        _ => Vec::new(),
    }
}

/// Write `model` in ASMT text form.
pub fn write_asmt<W: Write>(model: &SolverModel, out: &mut W) -> fmt::Result {
    let mut w = AsmtWriter { out, depth: 0 };
    w.line("OndselSolver")?;
    w.block("Assembly", |w| {
        w.value("Name", &model.name)?;
        w.placement(&Placement::identity())?;
        w.block("RefPoints", |w| {
            w.block("RefPoint", |w| {
                w.placement(&Placement::identity())?;
                w.block("Markers", |w| {
                    for marker in &model.root_markers {
                        w.marker(marker)?;
                    }
                    Ok(())
                })
            })
        })?;
        w.block("Parts", |w| {
            for part in &model.parts {
                w.block("Part", |w| {
                    w.value("Name", &part.name)?;
                    w.placement(&part.placement)?;
                    w.block("PrincipalMassMarker", |w| {
                        w.number("Mass", part.mass)?;
                        w.value(
                            "MomentOfInertias",
                            &format!("{} {} {}", part.inertia[0], part.inertia[1], part.inertia[2]),
                        )?;
                        w.number("Density", part.density)
                    })?;
                    w.block("Markers", |w| {
                        for marker in &part.markers {
                            w.marker(marker)?;
                        }
                        Ok(())
                    })
                })?;
            }
            Ok(())
        })?;
        w.block("KinematicIJs", |w| {
            for joint in &model.joints {
                w.block(joint.kind.keyword(), |w| {
                    w.value("Name", &joint.name)?;
                    w.value("MarkerI", &joint.marker_i)?;
                    w.value("MarkerJ", &joint.marker_j)?;
                    for (key, value) in joint_parameters(&joint.kind) {
                        w.number(key, value)?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        w.block("Limits", |w| {
            for limit in &model.limits {
                let keyword = match limit.kind {
                    crate::model::LimitKind::Translation => "TranslationLimit",
                    crate::model::LimitKind::Rotation => "RotationLimit",
                };
                w.block(keyword, |w| {
                    w.value("Name", &limit.name)?;
                    w.value("MarkerI", &limit.marker_i)?;
                    w.value("MarkerJ", &limit.marker_j)?;
                    w.value("Type", limit.direction.symbol())?;
                    w.value("Limit", &limit.limit)?;
                    w.value("Tol", &limit.tol)
                })?;
            }
            Ok(())
        })?;
        w.block("Motions", |w| {
            for motion in &model.motions {
                let keyword = match motion.kind {
                    MotionKind::Rotational { .. } => "RotationalMotion",
                    MotionKind::Translational { .. } => "TranslationalMotion",
                    MotionKind::General { .. } => "GeneralMotion",
                };
                w.block(keyword, |w| {
                    w.value("Name", &motion.name)?;
                    w.value("MarkerI", &motion.marker_i)?;
                    w.value("MarkerJ", &motion.marker_j)?;
                    match &motion.kind {
                        MotionKind::Rotational { rotation_z } => w.value("MotionJoint", rotation_z),
                        MotionKind::Translational { translation_z } => {
                            w.value("TranslationZ", translation_z)
                        }
                        MotionKind::General { r_iji, ang_ijj } => {
                            w.block("rIJI", |w| r_iji.iter().try_for_each(|f| w.line(f)))?;
                            w.block("angIJJ", |w| ang_ijj.iter().try_for_each(|f| w.line(f)))
                        }
                    }
                })?;
            }
            Ok(())
        })?;
        let sim = &model.simulation;
        w.block("SimulationParameters", |w| {
            w.number("tstart", sim.tstart)?;
            w.number("tend", sim.tend)?;
            w.number("hmin", sim.hmin)?;
            w.number("hmax", sim.hmax)?;
            w.number("hout", sim.hout)?;
            w.number("errorTol", sim.error_tol)
        })
    })
}

impl SolverModel {
    /// Render the model in ASMT text form.
    pub fn to_asmt(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_asmt(self, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LimitDirection, LimitKind, SolverJoint, SolverLimit, SolverPart};

    fn model() -> SolverModel {
        let mut model = SolverModel::new();
        let a = model.add_part(SolverPart::new("A", Placement::identity(), 1.0));
        let b = model.add_part(SolverPart::new("B", Placement::from_translation(0.0, 0.0, 5.0), 2.0));
        let mi = model
            .add_marker(a, Marker { name: "J".into(), placement: Placement::identity() })
            .unwrap();
        let mj = model
            .add_marker(b, Marker { name: "J".into(), placement: Placement::identity() })
            .unwrap();
        model.add_joint(SolverJoint {
            name: "J".into(),
            kind: JointKind::Gear { radius_i: 2.0, radius_j: -3.0 },
            marker_i: mi.clone(),
            marker_j: mj.clone(),
        });
        model.add_limit(SolverLimit {
            name: "J-LimitRotMin".into(),
            kind: LimitKind::Rotation,
            marker_i: mi,
            marker_j: mj,
            direction: LimitDirection::AtLeast,
            value: 0.0,
            limit: "0.000000*pi/180.0".into(),
            tol: "1.0e-9".into(),
        });
        model
    }

    #[test]
    fn test_asmt_structure() {
        let text = model().to_asmt();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "OndselSolver");
        assert_eq!(lines[1], "Assembly");
        assert_eq!(lines[2], "\tName");
        assert_eq!(lines[3], "\t\tKinemaAssembly");
        assert!(text.contains("\t\tGearJoint\n"));
        assert!(text.contains("radiusJ\n\t\t\t\t-3\n"));
        assert!(text.contains("\t\t\t\t/KinemaAssembly/A/J\n"));
        assert!(text.contains("RotationLimit"));
        assert!(text.contains("=>"));
        assert!(text.contains("errorTol"));
    }

    #[test]
    fn test_parts_blocks_nested() {
        let text = model().to_asmt();
        assert!(text.contains("\t\tPart\n\t\t\tName\n\t\t\t\tB\n"));
        assert!(text.contains("\t\t\t\tMass\n\t\t\t\t\t2\n"));
    }
}
