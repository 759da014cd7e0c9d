#![warn(missing_docs)]

//! Solver model and multibody engines for kinema assemblies.
//!
//! The assembly core lowers a document into a [`SolverModel`]: parts with
//! markers, joint primitives between marker paths, limits, motions and
//! simulation parameters. Any [`MultibodyEngine`] can run it; the model can
//! also be written out as ASMT text for external engines.
//!
//! # Features
//!
//! - Serializable solver model (JSON and ASMT text)
//! - Engine seam with kinematic runs, frame playback and interactive drag
//! - Rapier3d backend for the joint primitives it can express
//! - Motion formulas in terms of `time`
//!
//! # Example
//!
//! ```ignore
//! use kinema_solver::{MultibodyEngine, RapierEngine, SolverModel};
//!
//! let model: SolverModel = build_model();
//! let mut engine = RapierEngine::new();
//! engine.run_kinematic(&model)?;
//! let arm = engine.part_placement("Arm");
//! ```

mod asmt;
mod engine;
mod error;
mod formula;
mod joints;
mod model;
mod world;

pub use asmt::write_asmt;
pub use engine::{DraggedPart, MultibodyEngine};
pub use error::SolverError;
pub use formula::Formula;
pub use model::{
    JointKind, LimitDirection, LimitKind, Marker, MarkerLocation, MotionKind,
    SimulationParameters, SolverJoint, SolverLimit, SolverModel, SolverMotion, SolverPart,
    MAX_OUTPUT_FRAMES, MODEL_NAME,
};
pub use world::{RapierEngine, RapierSettings};
