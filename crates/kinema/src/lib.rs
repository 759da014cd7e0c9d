#![warn(missing_docs)]

//! Assembly solver core.
//!
//! Turns an assembly document (parts, grounding records, joints between
//! geometric elements, motions and simulations) into a multibody model, runs
//! it through a [`MultibodyEngine`](kinema_solver::MultibodyEngine) and writes
//! the solved placements back into the document.
//!
//! # Pipeline
//!
//! - [`Resolver`] maps joint references through sub-assemblies and links to
//!   the moving part and the owning element
//! - [`classify_joint`] picks the distance primitive for a pair of elements
//! - [`Connectivity`] answers reachability questions over the active joints
//! - [`Synthesizer`] emits markers, joints, limits and motions
//! - [`AssemblySolver`] orchestrates solves, simulations, drags and undo
//!
//! # Example
//!
//! ```ignore
//! use kinema::AssemblySolver;
//! use kinema_solver::RapierEngine;
//!
//! let mut solver = AssemblySolver::new(doc, RapierEngine::new());
//! solver.solve()?;
//! let doc = solver.into_document();
//! ```

mod assembly;
mod bundle;
mod classify;
mod connectivity;
mod error;
mod resolve;
mod settings;
mod synthesize;

pub use assembly::{AssemblySolver, DragStep, RedrawHook, SolveOptions};
pub use bundle::{ArenaEntry, PartArena, PartRegistrar};
pub use classify::{
    canonicalize, classify_features, classify_joint, feature_of, Classification, DistanceType,
    Feature,
};
pub use connectivity::{
    active_joints, is_connecting, ActiveJoints, Connectivity, Endpoint, JointEdge, ObjRef, Pruned,
    Side,
};
pub use error::{status_code, AssemblyError};
pub use resolve::Resolver;
pub use settings::{AssemblySettings, Settings};
pub use synthesize::{
    angle_primitive, distance_primitive, joint_limits, joint_motions, rack_frame,
    DistancePrimitive, Radii, Synthesizer, LIMIT_TOLERANCE,
};
