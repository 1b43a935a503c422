//! Solver constants for drag posing.

use serde::{Deserialize, Serialize};

/// Constants used by [`DragSession`](crate::DragSession) and
/// [`RagdollWorld`](crate::RagdollWorld).
///
/// Damping is per second and deliberately far past critical so that a
/// released chain settles instead of swinging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    /// Fixed sub-steps per rendered frame.
    pub substeps: usize,
    /// Joint constraint passes per sub-step.
    pub solver_iterations: usize,
    /// Added on both sides of every authored angular limit.
    pub limit_tolerance_deg: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Time constant (seconds) of the smoothed pull toward the pointer target.
    pub pull_time_constant: f32,
    /// Roll applied per pixel of pointer travel in rotate mode.
    pub rotate_sensitivity_deg_per_px: f32,
    /// kg/m³, used when a body has no authored mass.
    pub density: f32,
    /// Inverse stiffness of the motor pulling the dragged body toward its goal.
    pub drag_compliance: f32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            substeps: 10,
            solver_iterations: 4,
            limit_tolerance_deg: 30.0,
            linear_damping: 12.0,
            angular_damping: 12.0,
            pull_time_constant: 0.1,
            rotate_sensitivity_deg_per_px: 0.5,
            density: 1000.0,
            drag_compliance: 1e-4,
        }
    }
}

impl DragConfig {
    #[inline]
    pub fn limit_tolerance_rad(&self) -> f32 {
        self.limit_tolerance_deg.to_radians()
    }

    /// At least one sub-step, whatever was configured.
    #[inline]
    pub fn substep_count(&self) -> usize {
        self.substeps.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: DragConfig = serde_json::from_str(r#"{ "substeps": 4 }"#).unwrap();
        assert_eq!(cfg.substeps, 4);
        assert_eq!(cfg.solver_iterations, 4);
        assert_eq!(cfg.limit_tolerance_deg, 30.0);
    }

    #[test]
    fn zero_substeps_still_step_once() {
        let cfg = DragConfig {
            substeps: 0,
            ..DragConfig::default()
        };
        assert_eq!(cfg.substep_count(), 1);
    }
}
