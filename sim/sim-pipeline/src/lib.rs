//! Rigid-body simulation pipeline: step scheduling, island-based
//! activity management, touch tracking, and reduced-coordinate
//! articulations.
//!
//! This crate owns the *orchestration* of a physics step. The geometric
//! and numeric heavy lifting — broad-phase, contact generation, the
//! constraint-solver kernel, CCD sweeps — plugs in through collaborator
//! traits on [`Scene`], and the pipeline decides when each runs, what it
//! may touch, and how its results feed the sleep/wake bookkeeping.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Step Pipeline                            │
//! │  collide: broad phase → lost-touch fixup → narrow phase     │
//! │  solve:   islands → solver → integrate → CCD → sleep checks │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!           ┌───────────────┼───────────────────┐
//!           ▼               ▼                   ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐
//! │ IslandLedger │  │ TouchTracker │  │    Articulations      │
//! │ connectivity │  │ touch events │  │ links, drive caches,  │
//! │ sleep/wake   │  │ deferred     │  │ impulse propagation   │
//! │ transitions  │  │ wake-ups     │  │                       │
//! └──────────────┘  └──────────────┘  └──────────────────────┘
//! ```
//!
//! Phases run as a dependency graph on a [`rayon`] worker pool via
//! [`sim_task::TaskGraph`]; the batched phases additionally split the
//! body store into chunks solved in parallel.
//!
//! # Quick Start
//!
//! ```
//! use sim_pipeline::{Body, BodyId, Scene, SimulationConfig};
//! use nalgebra::{Isometry3, Vector3};
//!
//! let mut scene = Scene::new(SimulationConfig::default());
//!
//! // A unit-mass body one meter up, drifting sideways.
//! let mut body = Body::new(
//!     BodyId::new(0),
//!     Isometry3::translation(0.0, 0.0, 1.0),
//!     1.0,
//!     Vector3::new(1.0, 1.0, 1.0),
//! );
//! body.velocity.linear.x = 0.5;
//! let id = scene.add_body(body);
//!
//! let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
//! for _ in 0..10 {
//!     scene.simulate(1.0 / 60.0, &pool).unwrap();
//! }
//!
//! // With the null solver the body integrates ballistically.
//! let moved = scene.bodies().get(id).unwrap();
//! assert!(moved.pose.translation.vector.x > 0.0);
//! ```
//!
//! # Sleeping
//!
//! Bodies carry a wake counter that decays while they stay below the
//! sleep energy threshold and re-arms when they move. A body with a zero
//! counter is *ready*; islands sleep only when every member is ready, and
//! wake entirely when any member is disturbed. The second island pass
//! exists to re-check islands that were woken speculatively by stale
//! touches — it may put bodies back to sleep but never wakes anything.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,
    clippy::missing_errors_doc
)]

pub mod articulation;
pub mod body;
pub mod config;
pub mod contact;
mod error;
pub mod island;
mod pipeline;
pub mod scene;

pub use articulation::{
    Articulation, ArticulationId, DriveCache, LinkHandle, SpatialVector, SphericalJoint, MAX_LINKS,
};
pub use body::{Body, BodyId, BodyStore, PairId, Velocity};
pub use config::{SimulationConfig, SleepParams};
pub use error::{Result, SimError};
pub use island::{
    BodyRef, EdgeHandle, EdgeKind, IslandLedger, NodeHandle, NodeKind, SleepWakeLists,
};
pub use scene::{
    BroadPhase, BroadPhaseResult, CcdSweep, NarrowPhase, NarrowPhaseResult, NullBroadPhase,
    NullCcd, NullNarrowPhase, NullSolver, Scene, SolverKernel, SolverReport,
};

// The task-graph layer, re-exported so pipeline extensions can splice in
// their own phases without a separate dependency.
pub use sim_task::{TaskError, TaskGraph, TaskHandle};
