//! Rigid bodies and their sleep state.
//!
//! A [`Body`] carries the pose/velocity pair the solver integrates plus the
//! bookkeeping the activity machinery needs: a decaying wake counter, the
//! sleep-filter velocity accumulators, and the handle of the body's node in
//! the island ledger.
//!
//! The wake counter is a timer in seconds. While a body moves it stays
//! re-armed near the reset time; once the body quiets down it decays by `dt`
//! every frame, and a body whose counter reaches zero is *sleep-eligible* —
//! whether it actually sleeps is an island-level decision, never a per-body
//! one.

use hashbrown::HashMap;
use nalgebra::{Isometry3, Vector3};

use crate::articulation::ArticulationId;
use crate::config::SleepParams;
use crate::island::NodeHandle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Seconds a body must stay below its freeze threshold before freezing.
const FREEZE_INTERVAL: f64 = 1.0;
/// Per-second velocity damping applied to settling bodies.
const SLEEP_DAMPING: f64 = 0.5;
/// Acceleration-scale re-arm value for settling bodies, in units of `1/dt`.
const FREEZE_SCALE: f64 = 0.9;

/// Unique identifier for a rigid body in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Identifier for a broad-phase overlap pair (contact manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairId(pub u64);

impl PairId {
    /// Create a new pair ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pair({})", self.0)
    }
}

/// Linear and angular velocity of a body, world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Velocity {
    /// Linear velocity in m/s.
    pub linear: Vector3<f64>,
    /// Angular velocity in rad/s.
    pub angular: Vector3<f64>,
}

impl Velocity {
    /// A velocity of zero.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Component-wise sum.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self {
            linear: self.linear + other.linear,
            angular: self.angular + other.angular,
        }
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Self::zero()
    }
}

/// One simulated rigid body.
#[derive(Debug, Clone)]
pub struct Body {
    /// Stable identifier.
    pub id: BodyId,
    /// World pose.
    pub pose: Isometry3<f64>,
    /// World-frame velocity.
    pub velocity: Velocity,
    /// Inverse mass; zero pins the body translationally.
    pub inv_mass: f64,
    /// Inverse principal inertia in the body frame; zero locks that axis.
    pub inv_inertia: Vector3<f64>,
    /// Seconds left before this body is sleep-eligible.
    pub wake_counter: f64,
    /// Whether the body takes part in simulation this frame.
    pub active: bool,
    /// Kinematic bodies wake what they touch but never sleep through the
    /// energy path; their velocity is prescribed by the caller.
    pub kinematic: bool,
    /// Set by the stabilization path when the body is barely moving;
    /// frozen bodies skip the changed-shape bitmap.
    pub frozen: bool,
    /// Seconds of sub-threshold motion still required before the body may
    /// freeze. Only advanced when stabilization is enabled.
    pub freeze_count: f64,
    /// Acceleration damping factor for settling bodies, consumed by the
    /// solver kernel. Zero while the body is in full motion.
    pub accel_scale: f64,
    /// Number of touching partners, used to scale the sleep threshold so
    /// heavily-clustered bodies do not flicker asleep.
    pub num_touching: u32,
    /// Sleep-filter accumulator, linear part (world frame).
    pub sleep_lin_acc: Vector3<f64>,
    /// Sleep-filter accumulator, angular part (body frame).
    pub sleep_ang_acc: Vector3<f64>,
    /// This body's node in the island ledger.
    pub node: Option<NodeHandle>,
    /// The articulation this body is a link of, if any. Link bodies share
    /// the articulation's island node and advance their wake counters
    /// through its sleep check, not the per-body batch.
    pub link_of: Option<ArticulationId>,
}

impl Body {
    /// Create a dynamic body at a pose, awake with a full wake counter.
    #[must_use]
    pub fn new(id: BodyId, pose: Isometry3<f64>, inv_mass: f64, inv_inertia: Vector3<f64>) -> Self {
        Self {
            id,
            pose,
            velocity: Velocity::zero(),
            inv_mass,
            inv_inertia,
            wake_counter: 0.4,
            active: true,
            kinematic: false,
            frozen: false,
            freeze_count: FREEZE_INTERVAL,
            accel_scale: 0.0,
            num_touching: 0,
            sleep_lin_acc: Vector3::zeros(),
            sleep_ang_acc: Vector3::zeros(),
            node: None,
            link_of: None,
        }
    }

    /// Create a kinematic body. Kinematics carry infinite mass and are
    /// driven by the caller.
    #[must_use]
    pub fn new_kinematic(id: BodyId, pose: Isometry3<f64>) -> Self {
        let mut body = Self::new(id, pose, 0.0, Vector3::zeros());
        body.kinematic = true;
        body
    }

    /// Whether the wake counter has fully decayed.
    #[must_use]
    pub fn is_sleep_ready(&self) -> bool {
        self.wake_counter == 0.0
    }

    /// Re-arm the wake counter and reset the sleep filter.
    pub fn wake(&mut self, reset_time: f64) {
        self.wake_counter = self.wake_counter.max(reset_time);
        self.active = true;
        self.frozen = false;
        self.freeze_count = FREEZE_INTERVAL;
        self.accel_scale = 0.0;
        self.reset_sleep_filter();
    }

    /// Clear the sleep-filter accumulators.
    pub fn reset_sleep_filter(&mut self) {
        self.sleep_lin_acc = Vector3::zeros();
        self.sleep_ang_acc = Vector3::zeros();
    }

    /// Advance the wake counter by one frame and return its new value.
    ///
    /// While the counter is high the body is clearly in motion and only
    /// decays. Once it has fallen below half the reset time (or below `dt`)
    /// the frame velocity is folded into the sleep filter and the filtered
    /// kinetic energy, normalized by mass, decides between re-arming and
    /// further decay against a threshold scaled by the touching-cluster
    /// factor. A body re-armed from exactly zero was revived by the system
    /// mid-frame; `not_ready` is raised so the island pass sees it before
    /// deciding sleep.
    ///
    /// With stabilization enabled the frame additionally drives the freeze
    /// state: settling bodies have their velocity damped, and a body that
    /// stays below the freeze threshold for a full interval is marked
    /// frozen.
    pub fn update_wake_counter(
        &mut self,
        dt: f64,
        inv_dt: f64,
        params: &SleepParams,
        not_ready: &mut bool,
    ) -> f64 {
        let wc = self.wake_counter;
        // Angular velocity is filtered in the body frame so a tumbling
        // body with anisotropic inertia is judged consistently.
        let ang_body = self
            .pose
            .rotation
            .inverse_transform_vector(&self.velocity.angular);
        let lin = self.velocity.linear;
        let frame_energy = self.normalized_energy(&lin, &ang_body);

        if params.enable_stabilization {
            self.update_freeze_state(dt, inv_dt, frame_energy, params);
        }

        if wc < params.reset_time * 0.5 || wc < dt {
            // Accumulate the pre-damping frame velocity.
            self.sleep_lin_acc += lin;
            self.sleep_ang_acc += ang_body;

            let lin_acc = self.sleep_lin_acc;
            let ang_acc = self.sleep_ang_acc;
            let normalized_energy = self.normalized_energy(&lin_acc, &ang_acc);

            let cluster = 1.0 + f64::from(self.num_touching);
            let threshold = cluster * params.sleep_threshold;

            // With stabilization the current frame must itself be
            // energetic; a stale accumulator alone does not re-arm.
            let frame_gate =
                !params.enable_stabilization || frame_energy >= params.sleep_threshold;

            if frame_gate && normalized_energy >= threshold {
                self.reset_sleep_filter();
                let factor = if threshold == 0.0 {
                    2.0
                } else {
                    (normalized_energy / threshold).min(2.0)
                };
                self.wake_counter = factor * 0.5 * params.reset_time + dt * (cluster - 1.0);
                if wc == 0.0 {
                    *not_ready = true;
                }
                return self.wake_counter;
            }
        }
        self.wake_counter = (wc - dt).max(0.0);
        self.wake_counter
    }

    /// Kinetic energy of the given velocity pair, normalized by mass.
    fn normalized_energy(&self, linear: &Vector3<f64>, angular_body: &Vector3<f64>) -> f64 {
        let inv_mass = if self.inv_mass == 0.0 { 1.0 } else { self.inv_mass };
        let inertia = Vector3::new(
            inertia_or_unit(self.inv_inertia.x),
            inertia_or_unit(self.inv_inertia.y),
            inertia_or_unit(self.inv_inertia.z),
        );
        let rotational = angular_body.component_mul(angular_body).dot(&inertia) * inv_mass;
        0.5 * (rotational + linear.norm_squared())
    }

    /// The stabilization path: freeze-interval bookkeeping and velocity
    /// damping for bodies settling toward sleep.
    ///
    /// Freezing needs a real contact cluster; an isolated or singly
    /// touching body never freezes, it just sleeps.
    fn update_freeze_state(
        &mut self,
        dt: f64,
        inv_dt: f64,
        frame_energy: f64,
        params: &SleepParams,
    ) {
        let cf = if self.num_touching > 1 {
            f64::from(self.num_touching)
        } else {
            0.0
        };
        let freeze_threshold = cf * params.freeze_threshold;

        self.freeze_count = (self.freeze_count - dt).max(0.0);
        let mut settled = true;
        if frame_energy >= freeze_threshold {
            settled = false;
            self.freeze_count = FREEZE_INTERVAL;
            if frame_energy >= freeze_threshold * cf {
                self.accel_scale = 0.0;
            }
        }

        let mut frozen = false;
        if settled || self.accel_scale > 0.0 {
            // Nearly-settled bodies are damped toward rest.
            let d = 1.0 - SLEEP_DAMPING * dt;
            self.velocity.linear *= d;
            self.velocity.angular *= d;
            self.accel_scale = inv_dt * FREEZE_SCALE;
            frozen = self.freeze_count == 0.0 && frame_energy < params.freeze_threshold;
        }
        self.frozen = frozen;
    }
}

/// Locked axes (zero inverse inertia) contribute as unit inertia so they
/// neither dominate nor vanish from the energy estimate.
fn inertia_or_unit(inv: f64) -> f64 {
    if inv == 0.0 {
        1.0
    } else {
        1.0 / inv
    }
}

/// Slot-based body storage.
///
/// Bodies live in a slot vector so the batched pipeline phases can split
/// them into disjoint `&mut` chunks; the ID map gives stable lookup across
/// removals.
#[derive(Debug, Default)]
pub struct BodyStore {
    slots: Vec<Option<Body>>,
    index: HashMap<BodyId, usize>,
    free: Vec<usize>,
}

impl BodyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the store holds no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Insert a body, keyed by its own ID. Replaces any body with the
    /// same ID.
    pub fn insert(&mut self, body: Body) {
        let id = body.id;
        if let Some(&slot) = self.index.get(&id) {
            self.slots[slot] = Some(body);
            return;
        }
        let slot = if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(body);
            slot
        } else {
            self.slots.push(Some(body));
            self.slots.len() - 1
        };
        self.index.insert(id, slot);
    }

    /// Remove a body, returning it if present.
    pub fn remove(&mut self, id: BodyId) -> Option<Body> {
        let slot = self.index.remove(&id)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    /// Look up a body.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.index.get(&id).and_then(|&slot| self.slots[slot].as_ref())
    }

    /// Look up a body mutably.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    /// Whether a body with this ID exists.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        self.index.contains_key(&id)
    }

    /// Iterate over live bodies.
    pub fn iter(&self) -> impl Iterator<Item = &Body> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate over live bodies mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// IDs of all live bodies, in slot order.
    #[must_use]
    pub fn ids(&self) -> Vec<BodyId> {
        self.iter().map(|b| b.id).collect()
    }

    /// Raw slot access for the batched phases; empty slots interleave
    /// with live bodies.
    pub fn slots_mut(&mut self) -> &mut [Option<Body>] {
        &mut self.slots
    }

    /// Slot index a body occupies; stable until the body is removed.
    /// Used to index per-body bitmaps.
    #[must_use]
    pub fn slot_of(&self, id: BodyId) -> Option<usize> {
        self.index.get(&id).copied()
    }
}
