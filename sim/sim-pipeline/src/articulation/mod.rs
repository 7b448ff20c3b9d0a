//! Articulated multi-body chains.
//!
//! An articulation is one rooted tree of rigid links connected by spherical
//! joints. Links are stored densely with the structural invariant that a
//! parent always precedes its children, which lets every solver sweep run
//! as a single forward or backward scan. Two 64-bit masks encode the tree
//! per link:
//!
//! ```text
//!   index:        0      1      2
//!   tree:       root ── child ── grandchild
//!   path_to_root: 001    011    111    (own bit | parent's path)
//!   children:     010    100    000
//! ```
//!
//! Link identity is an opaque [`LinkHandle`] backed by a stable slot; the
//! dense index a link occupies is a compaction detail that changes on
//! removal. Removing a link is only legal for leaves and shifts every
//! later link down one slot, rewriting both masks with a below/above split
//! mask. O(n) per removal, which is fine at a hard capacity of
//! [`MAX_LINKS`].
//!
//! Solver scratch is resized through an explicit two-phase API:
//! [`Articulation::capacity_for`] is a pure size query and
//! [`Articulation::ensure_capacity`] performs the (idempotent)
//! reallocation. The pipeline calls the latter before every solve and
//! drive-cache operation.

mod drive_cache;

pub use drive_cache::{DriveCache, SpatialVector};

use nalgebra::{Isometry3, Matrix6, Point3, Vector6};
use tracing::debug;

use crate::body::{BodyId, BodyStore};
use crate::config::SleepParams;
use crate::error::{Result, SimError};
use crate::island::NodeHandle;

/// Hard capacity of one articulation, set by the width of the link masks.
pub const MAX_LINKS: usize = 64;

const SPATIAL_MATRIX_BYTES: usize = 6 * 6 * std::mem::size_of::<f64>();
const SPATIAL_VECTOR_BYTES: usize = 6 * std::mem::size_of::<f64>();

/// Unique identifier for an articulation in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArticulationId(pub u64);

impl ArticulationId {
    /// Create a new articulation ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ArticulationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Articulation({})", self.0)
    }
}

/// Stable handle to one link. Valid until the link is removed, regardless
/// of how dense indices shift underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(u32);

/// Inbound spherical joint of a non-root link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalJoint {
    /// Joint anchor in the parent link's local frame.
    pub anchor_in_parent: Point3<f64>,
    /// Joint anchor in the child link's local frame.
    pub anchor_in_child: Point3<f64>,
}

/// One rigid link of an articulation.
#[derive(Debug, Clone)]
pub struct Link {
    slot: u32,
    /// The rigid body this link animates.
    pub body: BodyId,
    /// Dense index of the parent; `None` only for the root.
    pub parent: Option<usize>,
    /// Inbound joint; `None` only for the root.
    pub joint: Option<SphericalJoint>,
    /// Union of the parent's path and this link's own bit.
    pub path_to_root: u64,
    /// Bits of this link's direct children.
    pub children: u64,
}

/// Per-link solver buffers, sized to the live link count.
#[derive(Debug, Default)]
struct Buffers {
    link_count: usize,
    poses: Vec<Isometry3<f64>>,
    motion_velocities: Vec<Vector6<f64>>,
    internal_loads: Vec<Matrix6<f64>>,
    external_loads: Vec<Matrix6<f64>>,
    scratch: Vec<u8>,
}

/// A rooted tree of rigid links.
#[derive(Debug)]
pub struct Articulation {
    id: ArticulationId,
    links: Vec<Link>,
    /// Slot to dense index; freed slots are recycled.
    slots: Vec<Option<usize>>,
    free_slots: Vec<u32>,
    wake_counter: f64,
    active: bool,
    /// Bumped on every topology change; drive caches carry the stamp they
    /// were built against.
    revision: u64,
    dirty: bool,
    buffers: Buffers,
    /// Low-level resource setup failed at creation; all mutation is
    /// rejected.
    inert: bool,
    /// This articulation's node in the island ledger.
    pub node: Option<NodeHandle>,
}

impl Articulation {
    /// Create an empty articulation.
    #[must_use]
    pub fn new(id: ArticulationId) -> Self {
        Self {
            id,
            links: Vec::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            wake_counter: 0.0,
            active: true,
            revision: 0,
            dirty: false,
            buffers: Buffers::default(),
            inert: false,
            node: None,
        }
    }

    /// Create an articulation whose low-level setup failed. It accepts no
    /// links; the error was already reported at creation time.
    #[must_use]
    pub fn new_inert(id: ArticulationId) -> Self {
        let mut articulation = Self::new(id);
        articulation.inert = true;
        articulation
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> ArticulationId {
        self.id
    }

    /// Number of live links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Whether the articulation holds no links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Whether the articulation takes part in simulation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Articulation-level wake counter: the maximum over all links.
    #[must_use]
    pub fn wake_counter(&self) -> f64 {
        self.wake_counter
    }

    /// Current topology revision. Bumped by every add/remove.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Look up a link by handle.
    #[must_use]
    pub fn link(&self, handle: LinkHandle) -> Option<&Link> {
        let idx = self.slot_index(handle)?;
        self.links.get(idx)
    }

    /// Dense index a handle currently occupies.
    #[must_use]
    pub fn link_index(&self, handle: LinkHandle) -> Option<usize> {
        self.slot_index(handle)
    }

    /// Links in dense order (parent strictly before child).
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    fn slot_index(&self, handle: LinkHandle) -> Option<usize> {
        self.slots.get(handle.0 as usize).copied().flatten()
    }

    /// Append a link.
    ///
    /// A `None` parent makes the link the root, which is only legal while
    /// the articulation is empty; the root carries no inbound joint. Every
    /// other link needs a parent handle belonging to this articulation and
    /// a joint. If the articulation was asleep and the incoming body is
    /// not itself sleep-ready, every existing link is force-woken — an
    /// articulation never mixes sleep-ready and moving links.
    ///
    /// # Errors
    ///
    /// [`SimError::ArticulationInert`] if creation-time setup failed,
    /// [`SimError::ArticulationFull`] at [`MAX_LINKS`] links,
    /// [`SimError::InvalidBodyId`] if the body is not in the store.
    ///
    /// # Panics
    ///
    /// Adding a root to a non-empty articulation, a non-root link without
    /// a joint, or a link under a stale parent handle is a caller bug and
    /// asserts.
    pub fn add_link(
        &mut self,
        bodies: &mut BodyStore,
        body: BodyId,
        parent: Option<LinkHandle>,
        joint: Option<SphericalJoint>,
    ) -> Result<LinkHandle> {
        if self.inert {
            return Err(SimError::ArticulationInert);
        }
        if self.links.len() == MAX_LINKS {
            return Err(SimError::ArticulationFull {
                links: self.links.len(),
                max: MAX_LINKS,
            });
        }
        let incoming_wake = bodies
            .get(body)
            .map(|b| b.wake_counter)
            .ok_or(SimError::InvalidBodyId(body.raw()))?;

        let idx = self.links.len();
        let (parent_idx, path_to_root) = match parent {
            None => {
                assert!(self.links.is_empty(), "root link added to a non-empty articulation");
                assert!(joint.is_none(), "root link carries no inbound joint");
                (None, 1u64)
            }
            Some(handle) => {
                let parent_idx = self
                    .slot_index(handle)
                    .unwrap_or_else(|| panic!("parent handle does not belong to {}", self.id));
                assert!(joint.is_some(), "non-root link needs an inbound joint");
                let path = self.links[parent_idx].path_to_root | (1u64 << idx);
                self.links[parent_idx].children |= 1u64 << idx;
                (Some(parent_idx), path)
            }
        };

        let slot = if let Some(slot) = self.free_slots.pop() {
            self.slots[slot as usize] = Some(idx);
            slot
        } else {
            self.slots.push(Some(idx));
            u32::try_from(self.slots.len() - 1).unwrap_or(u32::MAX)
        };

        self.links.push(Link {
            slot,
            body,
            parent: parent_idx,
            joint,
            path_to_root,
            children: 0,
        });
        self.revision += 1;
        self.dirty = true;

        // Sleep rule on insertion: an asleep articulation receiving a body
        // that is not sleep-ready wakes as a whole, to the incoming
        // counter.
        if !self.active && incoming_wake > 0.0 {
            self.wake_counter = self.wake_counter.max(incoming_wake);
            self.active = true;
            for link in &self.links {
                if let Some(b) = bodies.get_mut(link.body) {
                    b.active = true;
                    b.wake_counter = b.wake_counter.max(incoming_wake);
                    b.reset_sleep_filter();
                }
            }
            debug!(articulation = %self.id, "force-woken by inserted link");
        }

        Ok(LinkHandle(slot))
    }

    /// Remove a leaf link.
    ///
    /// Every later link shifts down one dense slot; parent indices and
    /// both masks are rewritten with a split mask separating bits below
    /// the removed index from bits above it. Handles of surviving links
    /// stay valid.
    ///
    /// # Panics
    ///
    /// Removing a link that still has children, or through a stale handle,
    /// is a caller bug and asserts. Detach the subtree leaf-by-leaf first.
    pub fn remove_link(&mut self, handle: LinkHandle) {
        let idx = self
            .slot_index(handle)
            .unwrap_or_else(|| panic!("stale link handle for {}", self.id));
        assert_eq!(
            self.links[idx].children, 0,
            "only leaf links may be removed"
        );

        let removed = self.links.remove(idx);
        self.slots[removed.slot as usize] = None;
        self.free_slots.push(removed.slot);

        let below = (1u64 << idx) - 1;
        for (new_idx, link) in self.links.iter_mut().enumerate() {
            link.path_to_root = shift_mask(link.path_to_root, below);
            link.children = shift_mask(link.children, below);
            if let Some(p) = link.parent {
                if p > idx {
                    link.parent = Some(p - 1);
                }
            }
            if new_idx >= idx {
                self.slots[link.slot as usize] = Some(new_idx);
            }
        }

        self.revision += 1;
        self.dirty = true;
    }

    /// Scratch bytes the tree-solver factorization needs for `links`
    /// links. Pure query; 16-byte aligned.
    #[must_use]
    pub const fn capacity_for(links: usize) -> usize {
        // One articulated-inertia matrix per link plus the root composite,
        // and one bias vector per link.
        align16(SPATIAL_MATRIX_BYTES * (links + 1) + SPATIAL_VECTOR_BYTES * links)
    }

    /// Resize the per-link solver buffers to the live link count.
    ///
    /// Cheap when nothing changed; a real resize zeroes the load matrices,
    /// which hold accumulated warm-start state that must not survive a
    /// topology change.
    pub fn ensure_capacity(&mut self) {
        let n = self.links.len();
        if !self.dirty && self.buffers.link_count == n {
            return;
        }
        self.buffers.poses.resize(n, Isometry3::identity());
        self.buffers.motion_velocities.resize(n, Vector6::zeros());
        self.buffers.internal_loads.clear();
        self.buffers.internal_loads.resize(n, Matrix6::zeros());
        self.buffers.external_loads.clear();
        self.buffers.external_loads.resize(n, Matrix6::zeros());
        self.buffers.scratch.clear();
        self.buffers.scratch.resize(Self::capacity_for(n), 0);
        self.buffers.link_count = n;
        self.dirty = false;
    }

    /// Whether a resize is pending. Used by tests and the pipeline's
    /// pre-solve check.
    #[must_use]
    pub fn needs_resize(&self) -> bool {
        self.dirty || self.buffers.link_count != self.links.len()
    }

    /// Copy link body state into the solver buffers.
    ///
    /// Called after [`Self::ensure_capacity`], before the solver kernel
    /// runs over this articulation's island.
    pub fn stage_link_state(&mut self, bodies: &BodyStore) {
        debug_assert!(!self.needs_resize(), "stage_link_state before ensure_capacity");
        for (i, link) in self.links.iter().enumerate() {
            if let Some(body) = bodies.get(link.body) {
                self.buffers.poses[i] = body.pose;
                let mut mv = Vector6::zeros();
                mv.fixed_rows_mut::<3>(0).copy_from(&body.velocity.angular);
                mv.fixed_rows_mut::<3>(3).copy_from(&body.velocity.linear);
                self.buffers.motion_velocities[i] = mv;
            }
        }
    }

    /// Staged world pose of the link at dense `index`.
    #[must_use]
    pub fn staged_pose(&self, index: usize) -> Option<&Isometry3<f64>> {
        self.buffers.poses.get(index)
    }

    /// Staged spatial velocity (`[angular; linear]`) of the link at dense
    /// `index`.
    #[must_use]
    pub fn staged_velocity(&self, index: usize) -> Option<Vector6<f64>> {
        self.buffers.motion_velocities.get(index).copied()
    }

    /// Warm-start load matrices for a solver kernel, internal joint loads
    /// first. Zeroed whenever the topology changes.
    pub fn load_matrices_mut(&mut self) -> (&mut [Matrix6<f64>], &mut [Matrix6<f64>]) {
        (
            &mut self.buffers.internal_loads,
            &mut self.buffers.external_loads,
        )
    }

    /// Factorization scratch for a solver kernel, sized by
    /// [`Self::capacity_for`].
    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.buffers.scratch
    }

    /// Advance every link's wake counter and re-derive the articulation
    /// counter as the maximum over links.
    ///
    /// The whole structure stays awake as long as any link would; links
    /// whose counter reached zero while a sibling is still awake are
    /// clamped to the floor. Returns the articulation counter and whether
    /// any link was revived mid-frame.
    pub fn sleep_check(
        &mut self,
        dt: f64,
        inv_dt: f64,
        params: &SleepParams,
        bodies: &mut BodyStore,
    ) -> (f64, bool) {
        let mut max_wc = 0.0f64;
        let mut not_ready = false;
        for link in &self.links {
            if let Some(body) = bodies.get_mut(link.body) {
                let wc = body.update_wake_counter(dt, inv_dt, params, &mut not_ready);
                max_wc = max_wc.max(wc);
            }
        }
        if max_wc > 0.0 {
            for link in &self.links {
                if let Some(body) = bodies.get_mut(link.body) {
                    if body.wake_counter == 0.0 {
                        body.wake_counter = params.floor;
                    }
                }
            }
        }
        self.wake_counter = max_wc;
        (max_wc, not_ready)
    }

    /// Flip the whole link set's activity at once.
    ///
    /// Sleeping zeroes every link body's velocity and counter; waking
    /// re-arms each body to at least the articulation counter.
    pub fn set_active(&mut self, active: bool, bodies: &mut BodyStore) {
        self.active = active;
        for link in &self.links {
            if let Some(body) = bodies.get_mut(link.body) {
                body.active = active;
                if active {
                    body.wake_counter = body.wake_counter.max(self.wake_counter);
                    body.reset_sleep_filter();
                } else {
                    body.wake_counter = 0.0;
                    body.velocity = crate::body::Velocity::zero();
                }
            }
        }
        if !active {
            self.wake_counter = 0.0;
        }
    }

    /// Set the articulation-level wake counter directly (external wakes).
    pub fn set_wake_counter(&mut self, wake_counter: f64, bodies: &mut BodyStore) {
        self.wake_counter = wake_counter;
        for link in &self.links {
            if let Some(body) = bodies.get_mut(link.body) {
                body.wake_counter = body.wake_counter.max(wake_counter);
            }
        }
    }
}

const fn align16(bytes: usize) -> usize {
    (bytes + 15) & !15
}

/// Drop bit `idx` and shift all higher bits down one, where `below` is
/// `(1 << idx) - 1`.
fn shift_mask(mask: u64, below: u64) -> u64 {
    (mask & below) | ((mask >> 1) & !below)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::body::Body;
    use nalgebra::{Isometry3, Vector3};

    fn store_with_bodies(n: u64) -> BodyStore {
        let mut bodies = BodyStore::new();
        for i in 0..n {
            bodies.insert(Body::new(
                BodyId::new(i),
                Isometry3::identity(),
                1.0,
                Vector3::new(1.0, 1.0, 1.0),
            ));
        }
        bodies
    }

    fn joint() -> SphericalJoint {
        SphericalJoint {
            anchor_in_parent: Point3::origin(),
            anchor_in_child: Point3::origin(),
        }
    }

    fn chain_of_three() -> (Articulation, BodyStore, [LinkHandle; 3]) {
        let mut bodies = store_with_bodies(3);
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let child = art
            .add_link(&mut bodies, BodyId::new(1), Some(root), Some(joint()))
            .unwrap();
        let grandchild = art
            .add_link(&mut bodies, BodyId::new(2), Some(child), Some(joint()))
            .unwrap();
        (art, bodies, [root, child, grandchild])
    }

    #[test]
    fn test_masks_after_chain_insertion() {
        let (art, _, _) = chain_of_three();
        let paths: Vec<u64> = art.links().map(|l| l.path_to_root).collect();
        let children: Vec<u64> = art.links().map(|l| l.children).collect();
        assert_eq!(paths, vec![0b001, 0b011, 0b111]);
        assert_eq!(children, vec![0b010, 0b100, 0b000]);
    }

    #[test]
    #[should_panic(expected = "only leaf links may be removed")]
    fn test_removing_interior_link_asserts() {
        let (mut art, _, [_, child, _]) = chain_of_three();
        art.remove_link(child);
    }

    #[test]
    fn test_leaf_then_parent_removal_renumbers() {
        let (mut art, _, [root, child, grandchild]) = chain_of_three();
        art.remove_link(grandchild);
        art.remove_link(child);

        assert_eq!(art.link_count(), 1);
        let paths: Vec<u64> = art.links().map(|l| l.path_to_root).collect();
        assert_eq!(paths, vec![0b1]);
        // The root's handle survived both removals.
        assert_eq!(art.link_index(root), Some(0));
    }

    #[test]
    fn test_removal_of_middle_sibling_shifts_masks() {
        // root with two children; removing the first child renumbers the
        // second from index 2 to index 1.
        let mut bodies = store_with_bodies(3);
        let mut art = Articulation::new(ArticulationId::new(0));
        let root = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        let first = art
            .add_link(&mut bodies, BodyId::new(1), Some(root), Some(joint()))
            .unwrap();
        let second = art
            .add_link(&mut bodies, BodyId::new(2), Some(root), Some(joint()))
            .unwrap();

        art.remove_link(first);

        assert_eq!(art.link_index(second), Some(1));
        let paths: Vec<u64> = art.links().map(|l| l.path_to_root).collect();
        let children: Vec<u64> = art.links().map(|l| l.children).collect();
        assert_eq!(paths, vec![0b01, 0b11]);
        assert_eq!(children, vec![0b10, 0b00]);
    }

    #[test]
    fn test_capacity_is_full_error() {
        let mut bodies = store_with_bodies(MAX_LINKS as u64 + 1);
        let mut art = Articulation::new(ArticulationId::new(0));
        let mut parent = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap();
        for i in 1..MAX_LINKS as u64 {
            parent = art
                .add_link(&mut bodies, BodyId::new(i), Some(parent), Some(joint()))
                .unwrap();
        }
        let err = art
            .add_link(
                &mut bodies,
                BodyId::new(MAX_LINKS as u64),
                Some(parent),
                Some(joint()),
            )
            .unwrap_err();
        assert!(matches!(err, SimError::ArticulationFull { .. }));
    }

    #[test]
    fn test_inert_articulation_rejects_links() {
        let mut bodies = store_with_bodies(1);
        let mut art = Articulation::new_inert(ArticulationId::new(0));
        let err = art
            .add_link(&mut bodies, BodyId::new(0), None, None)
            .unwrap_err();
        assert_eq!(err, SimError::ArticulationInert);
    }

    #[test]
    fn test_resize_is_idempotent() {
        let (mut art, _, _) = chain_of_three();
        assert!(art.needs_resize());
        art.ensure_capacity();
        assert!(!art.needs_resize());

        // Plant a sentinel; a second call must not touch the buffers.
        art.buffers.external_loads[1][(0, 0)] = 42.0;
        let scratch_len = art.buffers.scratch.len();
        art.ensure_capacity();
        assert_eq!(art.buffers.external_loads[1][(0, 0)], 42.0);
        assert_eq!(art.buffers.scratch.len(), scratch_len);

        // A topology change zeroes the warm-start loads on the next call.
        let handles: Vec<LinkHandle> =
            art.links().map(|l| LinkHandle(l.slot)).collect();
        art.remove_link(handles[2]);
        art.ensure_capacity();
        assert_eq!(art.buffers.external_loads[1][(0, 0)], 0.0);
    }

    #[test]
    fn test_stage_link_state_copies_bodies() {
        let (mut art, mut bodies, _) = chain_of_three();
        {
            let body = bodies.get_mut(BodyId::new(1)).unwrap();
            body.pose = Isometry3::translation(0.0, 5.0, 0.0);
            body.velocity.angular = Vector3::new(0.0, 2.0, 0.0);
        }
        art.ensure_capacity();
        art.stage_link_state(&bodies);

        assert_eq!(art.staged_pose(1).unwrap().translation.vector.y, 5.0);
        // Angular block precedes linear in the spatial convention.
        let mv = art.staged_velocity(1).unwrap();
        assert_eq!(mv[1], 2.0);
        assert_eq!(mv.fixed_rows::<3>(3).norm(), 0.0);
        assert!(art.staged_velocity(3).is_none());
    }

    #[test]
    fn test_scratch_sizes_are_aligned() {
        for n in 0..MAX_LINKS {
            assert_eq!(Articulation::capacity_for(n) % 16, 0);
        }
        assert!(Articulation::capacity_for(2) > Articulation::capacity_for(1));
    }

    #[test]
    fn test_sleep_check_clamps_links_to_floor() {
        let (mut art, mut bodies, _) = chain_of_three();
        // Link 1 keeps moving; links 0 and 2 are at rest with zero
        // counters.
        for id in [0u64, 2] {
            let body = bodies.get_mut(BodyId::new(id)).unwrap();
            body.wake_counter = 0.0;
        }
        let mover = bodies.get_mut(BodyId::new(1)).unwrap();
        mover.wake_counter = 0.1;
        mover.velocity.linear = Vector3::new(1.0, 0.0, 0.0);

        let params = crate::config::SimulationConfig::default().sleep_params();
        let (wc, _) = art.sleep_check(1.0 / 60.0, 60.0, &params, &mut bodies);
        assert!(wc > 0.0);
        for id in 0..3u64 {
            assert!(
                bodies.get(BodyId::new(id)).unwrap().wake_counter > 0.0,
                "link body {id} slipped to zero while the articulation is awake"
            );
        }
    }

    #[test]
    fn test_insertion_into_sleeping_articulation_wakes_all() {
        let (mut art, mut bodies, [_, _, grandchild]) = chain_of_three();
        art.set_active(false, &mut bodies);
        assert!(!bodies.get(BodyId::new(0)).unwrap().active);

        // The incoming body is not sleep-ready.
        let mut newcomer = Body::new(
            BodyId::new(9),
            Isometry3::identity(),
            1.0,
            Vector3::new(1.0, 1.0, 1.0),
        );
        newcomer.wake_counter = 0.3;
        bodies.insert(newcomer);
        art.add_link(&mut bodies, BodyId::new(9), Some(grandchild), Some(joint()))
            .unwrap();

        assert!(art.is_active());
        for id in 0..3u64 {
            let body = bodies.get(BodyId::new(id)).unwrap();
            assert!(body.active);
            assert!(body.wake_counter >= 0.3);
        }
    }
}
