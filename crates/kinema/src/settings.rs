//! Solver settings loaded from TOML.

use std::path::Path;

use kinema_math::CONFUSION;
use kinema_solver::RapierSettings;
use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;

/// Assembly-level switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    /// Run a full solve whenever the assembly is recomputed.
    pub solve_on_recompute: bool,
    /// Ask the engine for verbose diagnostics.
    pub log_solver_debug: bool,
    /// Geometric tolerance for frame comparisons.
    pub tolerance: f64,
    /// Delete joints with unresolved or self-referencing endpoints from the
    /// document instead of only skipping them.
    pub delete_bad_joints: bool,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            solve_on_recompute: true,
            log_solver_debug: false,
            tolerance: CONFUSION,
            delete_bad_joints: false,
        }
    }
}

/// All settings.
///
/// ```toml
/// [assembly]
/// solve_on_recompute = true
/// tolerance = 1e-7
///
/// [engine]
/// settle_steps = 240
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Assembly behaviour.
    pub assembly: AssemblySettings,
    /// Rapier backend tuning.
    pub engine: RapierSettings,
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, AssemblyError> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssemblyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.assembly.solve_on_recompute);
        assert!(!s.assembly.log_solver_debug);
        assert_eq!(s.assembly.tolerance, 1e-7);
    }

    #[test]
    fn test_partial_toml() {
        let s = Settings::from_toml_str(
            "[assembly]\nsolve_on_recompute = false\n\n[engine]\nsettle_steps = 10\n",
        )
        .unwrap();
        assert!(!s.assembly.solve_on_recompute);
        assert_eq!(s.assembly.tolerance, 1e-7);
        assert_eq!(s.engine.settle_steps, 10);
    }

    #[test]
    fn test_empty_and_invalid() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
        assert!(matches!(
            Settings::from_toml_str("[assembly]\ntolerance = \"x\""),
            Err(AssemblyError::Settings(_))
        ));
    }
}
