//! Error types for pipeline operations.

use thiserror::Error;

/// Errors that can occur while mutating or stepping a scene.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// An articulation reached its maximum link count.
    #[error("articulation is full: {links} links (maximum {max})")]
    ArticulationFull {
        /// Current link count.
        links: usize,
        /// Hard capacity of the link masks.
        max: usize,
    },

    /// The articulation failed low-level resource setup at creation and
    /// must not be mutated.
    #[error("articulation is inert: creation-time allocation failed")]
    ArticulationInert,

    /// A task-graph failure bubbled out of a step.
    #[error(transparent)]
    Task(#[from] sim_task::TaskError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, SimError>;
