//! Error types for assembly solving.

use kinema_ir::IrError;
use kinema_solver::SolverError;
use thiserror::Error;

/// Errors surfaced by [`AssemblySolver`](crate::AssemblySolver).
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// The assembly has no grounding record, nothing anchors the model.
    #[error("no grounded part in the assembly")]
    NoGroundedPart,

    /// The engine failed during a full solve or simulation run.
    #[error("solve failed: {0}")]
    SolveFailed(#[source] SolverError),

    /// An engine call outside a full solve failed.
    #[error(transparent)]
    Engine(#[from] SolverError),

    /// No solver model has been built yet.
    #[error("no solver model, create or solve the assembly first")]
    NoModel,

    /// Frame index beyond the recorded range.
    #[error("frame {index} out of range ({count} frames)")]
    FrameOutOfRange {
        /// Requested frame.
        index: usize,
        /// Number of recorded frames.
        count: usize,
    },

    /// No simulation with this name.
    #[error("simulation not found: {0}")]
    UnknownSimulation(String),

    /// Document access failed.
    #[error(transparent)]
    Document(#[from] IrError),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid TOML for [`Settings`](crate::Settings).
    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),
}

impl AssemblyError {
    /// Integer status for callers that speak status codes: `-6` when nothing
    /// is grounded, `-1` for everything else.
    pub fn status_code(&self) -> i32 {
        match self {
            AssemblyError::NoGroundedPart => -6,
            _ => -1,
        }
    }
}

/// Status code of a result: `0` on success, else [`AssemblyError::status_code`].
pub fn status_code<T>(result: &Result<T, AssemblyError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.status_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(&Ok::<(), AssemblyError>(())), 0);
        assert_eq!(AssemblyError::NoGroundedPart.status_code(), -6);
        assert_eq!(
            AssemblyError::SolveFailed(SolverError::Numeric("singular".into())).status_code(),
            -1
        );
        assert_eq!(
            AssemblyError::FrameOutOfRange { index: 3, count: 1 }.status_code(),
            -1
        );
    }
}
