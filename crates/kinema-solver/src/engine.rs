//! The multibody engine seam.

use kinema_math::{Placement, Vec3};

use crate::error::SolverError;
use crate::model::SolverModel;

/// A part pushed into the engine during an interactive drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DraggedPart {
    /// Solver part name.
    pub name: String,
    /// Requested world position.
    pub position: [f64; 3],
    /// Requested orientation as rotation matrix rows.
    pub rotation_rows: [[f64; 3]; 3],
}

impl DraggedPart {
    /// Capture `placement` for part `name`.
    pub fn new(name: impl Into<String>, placement: &Placement) -> Self {
        let p = placement.position();
        Self {
            name: name.into(),
            position: [p.x, p.y, p.z],
            rotation_rows: placement.rotation_rows(),
        }
    }

    /// The requested placement.
    pub fn placement(&self) -> Placement {
        Placement::from_rotation_rows(Vec3::from(self.position), self.rotation_rows)
    }
}

/// A multibody dynamics engine that can run a [`SolverModel`].
///
/// Full solves call [`run_kinematic`](Self::run_kinematic) then read
/// placements back; interactive drags bracket any number of
/// [`drag_step`](Self::drag_step) calls with [`pre_drag`](Self::pre_drag) and
/// [`post_drag`](Self::post_drag).
pub trait MultibodyEngine {
    /// Assemble the model and run it over its simulation range, recording
    /// one frame per output step. The current frame is the last one.
    fn run_kinematic(&mut self, model: &SolverModel) -> Result<(), SolverError>;

    /// Number of frames recorded by the last run.
    fn number_of_frames(&self) -> usize;

    /// Make frame `index` current.
    fn update_for_frame(&mut self, index: usize) -> Result<(), SolverError>;

    /// World placement of a part in the current frame.
    fn part_placement(&self, part: &str) -> Option<Placement>;

    /// Assemble the model and keep it live for incremental drag steps.
    fn pre_drag(&mut self, model: &SolverModel) -> Result<(), SolverError>;

    /// Move the dragged parts to their requested placements and re-solve.
    fn drag_step(&mut self, parts: &[DraggedPart]) -> Result<(), SolverError>;

    /// Release the incremental state.
    fn post_drag(&mut self) -> Result<(), SolverError>;
}
