//! Step-pipeline configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tunables for one simulation scene.
///
/// Defaults follow common rigid-body engine conventions: a body must stay
/// below its sleep threshold for 0.4 s of simulated time before its island
/// may sleep, and per-body batches of 128 bound the work of one parallel
/// task in the before-solver and after-integration phases.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Seconds a body's wake counter is re-armed to when it wakes.
    pub wake_counter_reset_time: f64,
    /// Normalized kinetic energy below which a body is sleep-eligible.
    pub sleep_threshold: f64,
    /// Normalized kinetic energy below which a body counts as frozen
    /// (only used when [`Self::enable_stabilization`] is set).
    pub freeze_threshold: f64,
    /// Enables the frozen-body optimization: frozen bodies skip the
    /// changed-shape bitmap.
    pub enable_stabilization: bool,
    /// Maximum number of continuous-collision passes per step.
    pub ccd_max_passes: u32,
    /// Bodies per parallel task in the batched phases.
    pub bodies_per_task: usize,
    /// Minimum positive wake-counter value used when clamping island
    /// members that must not sleep ahead of their island-mates.
    pub wake_counter_floor: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            wake_counter_reset_time: 0.4,
            sleep_threshold: 5.0e-3,
            freeze_threshold: 2.5e-3,
            enable_stabilization: false,
            ccd_max_passes: 1,
            bodies_per_task: 128,
            wake_counter_floor: 1.0e-3,
        }
    }
}

impl SimulationConfig {
    /// Extract the per-body sleep parameters.
    #[must_use]
    pub fn sleep_params(&self) -> SleepParams {
        SleepParams {
            reset_time: self.wake_counter_reset_time,
            sleep_threshold: self.sleep_threshold,
            freeze_threshold: self.freeze_threshold,
            enable_stabilization: self.enable_stabilization,
            floor: self.wake_counter_floor,
        }
    }
}

/// Sleep-policy inputs threaded into every wake-counter update.
///
/// Carried by value into body and articulation sleep checks so the policy
/// is explicit state, never read from a global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepParams {
    /// Seconds the wake counter is re-armed to on wake.
    pub reset_time: f64,
    /// Normalized kinetic energy below which a body is sleep-eligible.
    pub sleep_threshold: f64,
    /// Normalized kinetic energy below which a body counts as frozen.
    pub freeze_threshold: f64,
    /// Whether the frozen-body path is active.
    pub enable_stabilization: bool,
    /// Minimum positive wake-counter clamp value.
    pub floor: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.wake_counter_reset_time, 0.4);
        assert_eq!(config.bodies_per_task, 128);
        assert!(config.wake_counter_floor > 0.0);

        let params = config.sleep_params();
        assert_eq!(params.reset_time, config.wake_counter_reset_time);
        assert_eq!(params.floor, config.wake_counter_floor);
    }
}
