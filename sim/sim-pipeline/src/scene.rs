//! Scene state and collaborator seams.
//!
//! The [`Scene`] owns everything a step mutates: bodies, articulations,
//! the island ledger, the touch tracker, the frame's scratch buffers, and
//! boxed collaborators for the geometric and numeric work this crate
//! treats as external — broad-phase, narrow-phase, the constraint-solver
//! kernel, and the CCD sweep. Null implementations of the collaborators
//! are provided so a scene is steppable out of the box.
//!
//! Structural rule: bodies are never removed mid-step. [`Scene::remove_body`]
//! during a step only enqueues; the queue drains in step finalization, so
//! no phase can observe a half-deleted body.

use hashbrown::HashMap;
use tracing::debug;

use crate::articulation::{Articulation, ArticulationId, LinkHandle, SphericalJoint};
use crate::body::{Body, BodyId, BodyStore, PairId};
use crate::config::SimulationConfig;
use crate::contact::{TouchEvent, TouchTracker};
use crate::error::Result;
use crate::island::{BodyRef, EdgeHandle, EdgeKind, IslandLedger, NodeKind, SleepWakeLists};

/// Overlap-pair deltas from one broad-phase update.
#[derive(Debug, Default)]
pub struct BroadPhaseResult {
    /// Pairs that started overlapping.
    pub created_pairs: Vec<(PairId, BodyId, BodyId)>,
    /// Pairs that stopped overlapping.
    pub destroyed_pairs: Vec<PairId>,
    /// Bodies that left every broad-phase region.
    pub out_of_bounds: Vec<BodyId>,
}

/// Touch transitions from one narrow-phase run, keyed by pair.
#[derive(Debug, Default)]
pub struct NarrowPhaseResult {
    /// Pairs that gained touch this run.
    pub new_touches: Vec<PairId>,
    /// Pairs that lost touch this run.
    pub lost_touches: Vec<PairId>,
}

/// Impulse magnitudes the solver observed, for breakage checks.
#[derive(Debug, Default)]
pub struct SolverReport {
    /// Largest applied impulse per joint edge.
    pub joint_impulses: Vec<(EdgeHandle, f64)>,
}

/// Broad-phase collaborator: an opaque sweep producing pair deltas.
pub trait BroadPhase: Send {
    /// Run one update. `ccd_pass` distinguishes the post-integration
    /// sweeps from the frame's main one.
    fn update(&mut self, ccd_pass: bool, bodies: &BodyStore) -> BroadPhaseResult;
}

/// Narrow-phase collaborator: contact generation over overlap pairs.
pub trait NarrowPhase: Send {
    /// Evaluate touch for every active pair.
    fn generate(&mut self, bodies: &BodyStore) -> NarrowPhaseResult;
    /// Re-evaluate exactly the given pairs (second island pass scope).
    fn reevaluate(&mut self, pairs: &[PairId], bodies: &BodyStore) -> NarrowPhaseResult;
}

/// Constraint-solver kernel: opaque numeric routine over the island's
/// bodies and articulations.
pub trait SolverKernel: Send {
    /// Solve velocities for one step.
    fn solve(
        &mut self,
        dt: f64,
        bodies: &mut BodyStore,
        articulations: &mut [Articulation],
    ) -> SolverReport;
}

/// Continuous-collision collaborator.
pub trait CcdSweep: Send {
    /// Sweep for tunneling candidates; returns the number of hits.
    fn sweep(&mut self, pass: u32, bodies: &BodyStore) -> usize;
    /// Resolve the hits found by the matching sweep.
    fn resolve(&mut self, pass: u32, dt: f64, bodies: &mut BodyStore);
}

/// No-op broad-phase.
#[derive(Debug, Default)]
pub struct NullBroadPhase;

impl BroadPhase for NullBroadPhase {
    fn update(&mut self, _ccd_pass: bool, _bodies: &BodyStore) -> BroadPhaseResult {
        BroadPhaseResult::default()
    }
}

/// No-op narrow-phase.
#[derive(Debug, Default)]
pub struct NullNarrowPhase;

impl NarrowPhase for NullNarrowPhase {
    fn generate(&mut self, _bodies: &BodyStore) -> NarrowPhaseResult {
        NarrowPhaseResult::default()
    }

    fn reevaluate(&mut self, _pairs: &[PairId], _bodies: &BodyStore) -> NarrowPhaseResult {
        NarrowPhaseResult::default()
    }
}

/// No-op solver kernel; bodies keep their incoming velocities.
#[derive(Debug, Default)]
pub struct NullSolver;

impl SolverKernel for NullSolver {
    fn solve(
        &mut self,
        _dt: f64,
        _bodies: &mut BodyStore,
        _articulations: &mut [Articulation],
    ) -> SolverReport {
        SolverReport::default()
    }
}

/// No-op CCD sweep; never reports hits, so the chain terminates after
/// pass zero.
#[derive(Debug, Default)]
pub struct NullCcd;

impl CcdSweep for NullCcd {
    fn sweep(&mut self, _pass: u32, _bodies: &BodyStore) -> usize {
        0
    }

    fn resolve(&mut self, _pass: u32, _dt: f64, _bodies: &mut BodyStore) {}
}

/// Grow-on-set bitmap indexed by body slot.
#[derive(Debug, Default, Clone)]
pub struct BitMap {
    words: Vec<u64>,
}

impl BitMap {
    /// Set one bit.
    pub fn set(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    /// Test one bit.
    #[must_use]
    pub fn test(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|w| w & (1 << (index % 64)) != 0)
    }

    /// OR another bitmap into this one. This is the once-per-batch merge
    /// point of the parallel phases.
    pub fn union(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst |= src;
        }
    }

    /// Clear all bits, keeping capacity.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PairRecord {
    pub edge: EdgeHandle,
    pub a: BodyId,
    pub b: BodyId,
    pub response_disabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct JointRecord {
    pub a: BodyId,
    pub b: BodyId,
    pub break_impulse: Option<f64>,
}

/// Per-pass CCD scratch. Two slots, indexed by pass parity, so pass N+1's
/// sweep may overlap pass N's post-processing.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CcdPassState {
    pub hits: usize,
}

/// The simulation scene: all state one step reads and writes.
pub struct Scene {
    pub(crate) config: SimulationConfig,
    pub(crate) bodies: BodyStore,
    pub(crate) articulations: Vec<Articulation>,
    articulation_index: HashMap<ArticulationId, usize>,
    pub(crate) ledger: IslandLedger,
    pub(crate) tracker: TouchTracker,
    pub(crate) pairs: HashMap<PairId, PairRecord>,
    pub(crate) joints: HashMap<EdgeHandle, JointRecord>,

    pub(crate) broad_phase: Box<dyn BroadPhase>,
    pub(crate) narrow_phase: Box<dyn NarrowPhase>,
    pub(crate) solver: Box<dyn SolverKernel>,
    pub(crate) ccd: Box<dyn CcdSweep>,

    pub(crate) dt: f64,
    pub(crate) inv_dt: f64,
    pub(crate) stepping: bool,
    pub(crate) deferred_removals: Vec<BodyId>,
    pub(crate) broken_constraints: Vec<EdgeHandle>,
    pub(crate) changed_shapes: BitMap,
    pub(crate) ccd_states: [CcdPassState; 2],
    pub(crate) ccd_done: bool,
    report_timestamp: u32,
    sleep_events: Vec<BodyId>,
    wake_events: Vec<BodyId>,

    // Handoffs between phases of the per-frame task graph.
    pub(crate) pending_touches: Option<NarrowPhaseResult>,
    pub(crate) pending_sleep_wake: Option<SleepWakeLists>,
    pub(crate) pending_second_pass: Vec<PairId>,
    pub(crate) pending_second_lists: Option<SleepWakeLists>,
    pub(crate) solver_set: Vec<BodyId>,
    pub(crate) solver_report: Option<SolverReport>,
}

impl Scene {
    /// Create a scene with null collaborators.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            bodies: BodyStore::new(),
            articulations: Vec::new(),
            articulation_index: HashMap::new(),
            ledger: IslandLedger::new(),
            tracker: TouchTracker::new(),
            pairs: HashMap::new(),
            joints: HashMap::new(),
            broad_phase: Box::new(NullBroadPhase),
            narrow_phase: Box::new(NullNarrowPhase),
            solver: Box::new(NullSolver),
            ccd: Box::new(NullCcd),
            dt: 0.0,
            inv_dt: 0.0,
            stepping: false,
            deferred_removals: Vec::new(),
            broken_constraints: Vec::new(),
            changed_shapes: BitMap::default(),
            ccd_states: [CcdPassState::default(); 2],
            ccd_done: false,
            report_timestamp: 0,
            sleep_events: Vec::new(),
            wake_events: Vec::new(),
            pending_touches: None,
            pending_sleep_wake: None,
            pending_second_pass: Vec::new(),
            pending_second_lists: None,
            solver_set: Vec::new(),
            solver_report: None,
        }
    }

    /// Install a broad-phase collaborator.
    pub fn set_broad_phase(&mut self, broad_phase: Box<dyn BroadPhase>) {
        self.broad_phase = broad_phase;
    }

    /// Install a narrow-phase collaborator.
    pub fn set_narrow_phase(&mut self, narrow_phase: Box<dyn NarrowPhase>) {
        self.narrow_phase = narrow_phase;
    }

    /// Install a solver kernel.
    pub fn set_solver(&mut self, solver: Box<dyn SolverKernel>) {
        self.solver = solver;
    }

    /// Install a CCD collaborator.
    pub fn set_ccd(&mut self, ccd: Box<dyn CcdSweep>) {
        self.ccd = ccd;
    }

    /// Scene configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Body storage.
    #[must_use]
    pub fn bodies(&self) -> &BodyStore {
        &self.bodies
    }

    /// Mutable body storage.
    pub fn bodies_mut(&mut self) -> &mut BodyStore {
        &mut self.bodies
    }

    /// Island ledger.
    #[must_use]
    pub fn ledger(&self) -> &IslandLedger {
        &self.ledger
    }

    /// Report-pair timestamp; bumped on collide, each CCD pass, and
    /// finalization, so deleted actors get fresh report-pair identities.
    #[must_use]
    pub fn report_timestamp(&self) -> u32 {
        self.report_timestamp
    }

    pub(crate) fn bump_report_timestamp(&mut self) {
        self.report_timestamp = self.report_timestamp.wrapping_add(1);
    }

    /// Insert a body, registering it in the island ledger.
    pub fn add_body(&mut self, mut body: Body) -> BodyId {
        let id = body.id;
        let kind = if body.kinematic {
            NodeKind::Kinematic
        } else {
            NodeKind::Dynamic
        };
        let node = self.ledger.add_node(BodyRef::Body(id), kind);
        body.node = Some(node);
        self.bodies.insert(body);
        id
    }

    /// Remove a body.
    ///
    /// Mid-step this only enqueues; the removal happens in finalization.
    /// Outside a step the body is removed immediately and every partner
    /// pair takes the lost-touch path, resolved on the next frame or an
    /// explicit [`Scene::flush`].
    pub fn remove_body(&mut self, id: BodyId) {
        if self.stepping {
            self.tracker.note_body_deleted(id);
            self.deferred_removals.push(id);
        } else {
            self.remove_body_now(id);
        }
    }

    pub(crate) fn remove_body_now(&mut self, id: BodyId) {
        self.tracker.note_body_deleted(id);

        // Partner pairs separate; synthesize the lost-touch batch.
        let affected: Vec<(PairId, PairRecord)> = self
            .pairs
            .iter()
            .filter(|(_, r)| r.a == id || r.b == id)
            .map(|(&p, &r)| (p, r))
            .collect();
        let lost: Vec<TouchEvent> = affected
            .iter()
            .map(|(pair, r)| TouchEvent {
                pair: *pair,
                edge: r.edge,
                a: r.a,
                b: r.b,
                response_disabled: r.response_disabled,
            })
            .collect();
        self.tracker
            .process_touch_events(&[], &lost, &mut self.bodies, &mut self.ledger);
        for (pair, record) in affected {
            self.pairs.remove(&pair);
            self.ledger.remove_edge(record.edge);
        }

        let node = self.bodies.get(id).and_then(|b| b.node);
        if let Some(body) = self.bodies.remove(id) {
            debug!(body = %body.id, "removed");
        }
        if let Some(node) = node {
            // Joints to the removed body must be gone by now; contact
            // edges were just dropped above.
            self.ledger.remove_node(node);
        }
    }

    /// Register an articulation, giving it one ledger node; the whole
    /// link set sleeps and wakes through that node.
    pub fn add_articulation(&mut self, id: ArticulationId) -> &mut Articulation {
        let node = self
            .ledger
            .add_node(BodyRef::Articulation(id), NodeKind::Articulation);
        let mut articulation = Articulation::new(id);
        articulation.node = Some(node);
        self.articulations.push(articulation);
        let index = self.articulations.len() - 1;
        self.articulation_index.insert(id, index);
        &mut self.articulations[index]
    }

    /// Insert `body` into the store and attach it as a link of an existing
    /// articulation. The body shares the articulation's island node and
    /// sleeps through its sleep check, so the whole link set transitions
    /// together.
    ///
    /// # Errors
    ///
    /// Propagates [`Articulation::add_link`] errors.
    ///
    /// # Panics
    ///
    /// An unknown articulation ID is a caller bug and asserts.
    pub fn add_articulation_link(
        &mut self,
        id: ArticulationId,
        mut body: Body,
        parent: Option<LinkHandle>,
        joint: Option<SphericalJoint>,
    ) -> Result<LinkHandle> {
        let index = *self
            .articulation_index
            .get(&id)
            .unwrap_or_else(|| panic!("unknown articulation {id}"));
        let articulation = &mut self.articulations[index];
        body.node = articulation.node;
        body.link_of = Some(id);
        let body_id = body.id;
        self.bodies.insert(body);
        articulation.add_link(&mut self.bodies, body_id, parent, joint)
    }

    /// Look up an articulation.
    #[must_use]
    pub fn articulation(&self, id: ArticulationId) -> Option<&Articulation> {
        self.articulation_index
            .get(&id)
            .map(|&i| &self.articulations[i])
    }

    /// Look up an articulation mutably.
    pub fn articulation_mut(&mut self, id: ArticulationId) -> Option<&mut Articulation> {
        self.articulation_index
            .get(&id)
            .map(|&i| &mut self.articulations[i])
    }

    /// Connect two bodies with a joint edge. A `break_impulse` arms the
    /// constraint-breakage check in finalization.
    pub fn add_joint(
        &mut self,
        a: BodyId,
        b: BodyId,
        break_impulse: Option<f64>,
    ) -> Option<EdgeHandle> {
        let na = self.bodies.get(a).and_then(|body| body.node)?;
        let nb = self.bodies.get(b).and_then(|body| body.node)?;
        let edge = self.ledger.add_edge(na, nb, EdgeKind::Joint);
        self.joints.insert(edge, JointRecord { a, b, break_impulse });
        Some(edge)
    }

    /// Remove a joint edge.
    pub fn remove_joint(&mut self, edge: EdgeHandle) {
        if self.joints.remove(&edge).is_some() {
            self.ledger.remove_edge(edge);
        }
    }

    /// Wake a body externally: re-arm its counter and flag its island.
    pub fn wake_body(&mut self, id: BodyId) {
        let reset = self.config.wake_counter_reset_time;
        if let Some(body) = self.bodies.get_mut(id) {
            let was_asleep = !body.active;
            body.wake(reset);
            if let Some(node) = body.node {
                self.ledger.set_node_active(node, true);
                self.ledger.notify_not_ready_for_sleeping(node);
            }
            if was_asleep {
                self.wake_events.push(id);
            }
        }
    }

    /// Apply one island pass's transitions to bodies and articulations.
    pub(crate) fn apply_sleep_wake_lists(&mut self, lists: &SleepWakeLists) {
        let reset = self.config.wake_counter_reset_time;
        let floor = self.config.wake_counter_floor;

        // Sleep first, wake second, mirroring the pass order.
        for target in &lists.to_sleep {
            match *target {
                BodyRef::Body(id) => {
                    if let Some(body) = self.bodies.get_mut(id) {
                        body.active = false;
                        body.wake_counter = 0.0;
                        body.velocity = crate::body::Velocity::zero();
                        self.sleep_events.push(id);
                    }
                }
                BodyRef::Articulation(aid) => {
                    if let Some(&i) = self.articulation_index.get(&aid) {
                        self.articulations[i].set_active(false, &mut self.bodies);
                    }
                }
            }
        }
        for target in &lists.to_wake {
            match *target {
                BodyRef::Body(id) => {
                    if let Some(body) = self.bodies.get_mut(id) {
                        body.wake(reset);
                        self.wake_events.push(id);
                    }
                }
                BodyRef::Articulation(aid) => {
                    if let Some(&i) = self.articulation_index.get(&aid) {
                        let articulation = &mut self.articulations[i];
                        articulation.set_wake_counter(reset, &mut self.bodies);
                        articulation.set_active(true, &mut self.bodies);
                    }
                }
            }
        }
        for target in &lists.to_clamp {
            match *target {
                BodyRef::Body(id) => {
                    if let Some(body) = self.bodies.get_mut(id) {
                        if body.wake_counter == 0.0 {
                            body.wake_counter = floor;
                        }
                    }
                }
                BodyRef::Articulation(aid) => {
                    if let Some(&i) = self.articulation_index.get(&aid) {
                        let articulation = &mut self.articulations[i];
                        if articulation.wake_counter() == 0.0 {
                            articulation.set_wake_counter(floor, &mut self.bodies);
                        }
                    }
                }
            }
        }
    }

    /// Take the frame's sleep/wake notification lists.
    ///
    /// A body that both slept and woke within the frame is transient noise
    /// for the notification layer and is dropped from both lists, so no
    /// body ever appears in both.
    pub fn take_sleep_wake_events(&mut self) -> (Vec<BodyId>, Vec<BodyId>) {
        let mut slept = std::mem::take(&mut self.sleep_events);
        let mut woke = std::mem::take(&mut self.wake_events);
        let in_both: hashbrown::HashSet<BodyId> = slept
            .iter()
            .filter(|id| woke.contains(id))
            .copied()
            .collect();
        slept.retain(|id| !in_both.contains(id));
        woke.retain(|id| !in_both.contains(id));
        (slept, woke)
    }

    /// Active dynamic bodies gathered for the solver this frame.
    #[must_use]
    pub fn solver_set(&self) -> &[BodyId] {
        &self.solver_set
    }

    /// Bodies (by store slot) whose shapes moved this frame.
    #[must_use]
    pub fn changed_shapes(&self) -> &BitMap {
        &self.changed_shapes
    }

    /// Take the frame's broken-constraint list.
    pub fn take_broken_constraints(&mut self) -> Vec<EdgeHandle> {
        std::mem::take(&mut self.broken_constraints)
    }

    /// Take the out-of-bounds report list.
    pub fn take_out_of_bounds(&mut self) -> Vec<BodyId> {
        self.tracker.drain_out_of_bounds()
    }

    /// Deliver pending lost-touch work outside a step.
    ///
    /// # Panics
    ///
    /// Calling this mid-step is a caller bug and asserts.
    pub fn flush(&mut self) {
        assert!(!self.stepping, "flush during a step");
        self.tracker.process_lost_touch_pairs(
            &mut self.bodies,
            &mut self.ledger,
            self.config.wake_counter_reset_time,
        );
        self.tracker.end_of_frame();
        debug_assert!(!self.tracker.has_deferred(), "flush left deferred pairs");
    }

    /// Register a broad-phase pair delta batch: new pairs get contact
    /// edges, destroyed pairs drop them.
    pub(crate) fn apply_broad_phase_result(&mut self, result: &BroadPhaseResult) {
        for &(pair, a, b) in &result.created_pairs {
            let (Some(na), Some(nb)) = (
                self.bodies.get(a).and_then(|body| body.node),
                self.bodies.get(b).and_then(|body| body.node),
            ) else {
                continue;
            };
            let edge = self.ledger.add_edge(na, nb, EdgeKind::Contact);
            self.ledger.set_edge_pair(edge, pair);
            self.pairs.insert(
                pair,
                PairRecord {
                    edge,
                    a,
                    b,
                    response_disabled: false,
                },
            );
        }
        for pair in &result.destroyed_pairs {
            if let Some(record) = self.pairs.remove(pair) {
                self.ledger.remove_edge(record.edge);
            }
        }
        for &body in &result.out_of_bounds {
            self.tracker.note_out_of_bounds(body);
        }
    }

    /// Translate pair-level narrow-phase output into touch events.
    pub(crate) fn touch_events_for(&self, result: &NarrowPhaseResult) -> (Vec<TouchEvent>, Vec<TouchEvent>) {
        let to_event = |pair: &PairId| {
            self.pairs.get(pair).map(|record| TouchEvent {
                pair: *pair,
                edge: record.edge,
                a: record.a,
                b: record.b,
                response_disabled: record.response_disabled,
            })
        };
        (
            result.new_touches.iter().filter_map(to_event).collect(),
            result.lost_touches.iter().filter_map(to_event).collect(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Vector3};

    fn body(id: u64) -> Body {
        Body::new(
            BodyId::new(id),
            Isometry3::identity(),
            1.0,
            Vector3::new(1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn test_bitmap_set_union() {
        let mut a = BitMap::default();
        let mut b = BitMap::default();
        a.set(3);
        b.set(200);
        a.union(&b);
        assert!(a.test(3));
        assert!(a.test(200));
        assert!(!a.test(4));
        a.clear();
        assert!(!a.test(3));
    }

    #[test]
    fn test_add_remove_body_maintains_ledger() {
        let mut scene = Scene::new(SimulationConfig::default());
        let id = scene.add_body(body(0));
        assert!(scene.bodies().get(id).unwrap().node.is_some());
        scene.remove_body(id);
        assert!(scene.bodies().get(id).is_none());
    }

    #[test]
    fn test_removal_outside_step_wakes_surviving_partner() {
        let mut scene = Scene::new(SimulationConfig::default());
        let a = scene.add_body(body(0));
        let b = scene.add_body(body(1));
        scene.apply_broad_phase_result(&BroadPhaseResult {
            created_pairs: vec![(PairId::new(0), a, b)],
            ..BroadPhaseResult::default()
        });

        // b is asleep while a (awake) disappears: survivor must wake.
        {
            let body = scene.bodies_mut().get_mut(b).unwrap();
            body.active = false;
            body.wake_counter = 0.0;
        }
        let node = scene.bodies().get(b).unwrap().node.unwrap();
        scene.ledger.set_node_active(node, false);

        scene.remove_body(a);
        scene.flush();
        assert!(scene.bodies().get(b).unwrap().active);
    }

    #[test]
    fn test_sleep_wake_lists_never_overlap() {
        let mut scene = Scene::new(SimulationConfig::default());
        let a = scene.add_body(body(0));
        let lists = SleepWakeLists {
            to_sleep: vec![BodyRef::Body(a)],
            ..SleepWakeLists::default()
        };
        scene.apply_sleep_wake_lists(&lists);
        scene.wake_body(a);
        let (slept, woke) = scene.take_sleep_wake_events();
        assert!(slept.is_empty());
        assert!(woke.is_empty());
    }

    #[test]
    fn test_articulation_link_shares_island_node() {
        let mut scene = Scene::new(SimulationConfig::default());
        let aid = ArticulationId::new(7);
        scene.add_articulation(aid);
        scene
            .add_articulation_link(aid, body(0), None, None)
            .unwrap();

        let articulation_node = scene.articulation(aid).unwrap().node;
        let link = scene.bodies().get(BodyId::new(0)).unwrap();
        assert_eq!(link.node, articulation_node);
        assert_eq!(link.link_of, Some(aid));
    }

    #[test]
    fn test_joint_edges_connect_islands() {
        let mut scene = Scene::new(SimulationConfig::default());
        let a = scene.add_body(body(0));
        let b = scene.add_body(body(1));
        let edge = scene.add_joint(a, b, Some(10.0)).unwrap();

        // Jointed bodies share an island: neither sleeps alone.
        let na = scene.bodies().get(a).unwrap().node.unwrap();
        scene.ledger.notify_ready_for_sleeping(na);
        let lists = scene.ledger.update_islands();
        assert!(lists.to_sleep.is_empty());

        scene.remove_joint(edge);
        let na = scene.bodies().get(a).unwrap().node.unwrap();
        scene.ledger.notify_ready_for_sleeping(na);
        let lists = scene.ledger.update_islands();
        assert_eq!(lists.to_sleep.len(), 1);
    }
}
