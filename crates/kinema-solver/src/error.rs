//! Error types for solver model execution.

use thiserror::Error;

/// Errors that can occur while running a solver model.
#[derive(Error, Debug)]
pub enum SolverError {
    /// A marker path does not resolve in the model.
    #[error("Marker not found: {0}")]
    MissingMarker(String),

    /// A part name does not resolve in the model.
    #[error("Part not found: {0}")]
    MissingPart(String),

    /// The backend cannot realize this joint primitive.
    #[error("Unsupported joint {name}: {kind} is not available in this backend")]
    UnsupportedJoint {
        /// Joint name.
        name: String,
        /// Primitive keyword.
        kind: &'static str,
    },

    /// A motion formula could not be parsed.
    #[error("Invalid motion formula: {0}")]
    Formula(String),

    /// Simulation parameters the engine cannot run.
    #[error("Invalid simulation: {0}")]
    InvalidSimulation(String),

    /// No model has been run yet.
    #[error("No model has been loaded into the engine")]
    NotLoaded,

    /// Frame index beyond the recorded range.
    #[error("Frame {index} out of range ({count} frames)")]
    FrameOutOfRange {
        /// Requested frame.
        index: usize,
        /// Number of recorded frames.
        count: usize,
    },

    /// Drag step requested outside a drag session.
    #[error("No drag session is active")]
    NoDragSession,

    /// The engine failed numerically.
    #[error("Solver failed: {0}")]
    Numeric(String),
}
