//! Activity/island ledger.
//!
//! The ledger owns the authoritative mapping from bodies and constraint
//! edges to *islands*: maximal connected components of bodies joined by
//! touching contacts or joints. Islands carry the central activity
//! invariant — every member of an island shares one sleep state. Partial
//! sleep is never legal and is defended with debug assertions after each
//! transition.
//!
//! Island extent is never materialized as an object; it is rediscovered by
//! a flood fill over the connected edges each generation pass:
//!
//! ```text
//!   nodes:  [A]──[B]   [C]──[D]──[E]      [K]
//!            └── island 0 ──┘ └─ island 1 ─┘  (K kinematic: joins for
//!                                              waking, sleeps with no one)
//! ```
//!
//! Sleep readiness flows in from the after-integration sleep checks via
//! [`IslandLedger::notify_ready_for_sleeping`] and is consumed by the next
//! [`IslandLedger::update_islands`] pass, which returns the transitions for
//! the scene to apply.

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::articulation::ArticulationId;
use crate::body::{BodyId, PairId};

/// Stable handle to a node (body or articulation) in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(u32);

impl NodeHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable handle to an edge in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeHandle(u32);

impl EdgeHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a ledger node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRef {
    /// A single rigid body.
    Body(BodyId),
    /// A whole articulation; it sleeps and wakes atomically.
    Articulation(ArticulationId),
}

/// Connectivity role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Ordinary dynamic body.
    Dynamic,
    /// Kinematic bodies are one-way dominators: they join islands for
    /// waking purposes but never keep one awake by themselves and never
    /// sleep with it.
    Kinematic,
    /// One node per articulation.
    Articulation,
}

/// Kind of relationship an edge models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// A broad-phase overlap pair; connected once narrow-phase confirms
    /// touch.
    Contact,
    /// A joint; always connected while it exists.
    Joint,
}

#[derive(Debug)]
struct Node {
    body: BodyRef,
    kind: NodeKind,
    active: bool,
    /// Wake counter has decayed to zero; set by the sleep check, cleared
    /// on revival or clamping.
    ready: bool,
}

#[derive(Debug)]
struct Edge {
    a: NodeHandle,
    b: NodeHandle,
    kind: EdgeKind,
    connected: bool,
    pair: Option<PairId>,
}

/// Sleep/wake transitions decided by one island pass.
///
/// `to_clamp` lists members of mixed islands whose wake counter reached
/// zero while an island-mate is still awake; the scene must raise them to
/// the wake-counter floor so no member sleeps ahead of its island.
#[derive(Debug, Default)]
pub struct SleepWakeLists {
    /// Members of islands that transition to sleep this pass.
    pub to_sleep: Vec<BodyRef>,
    /// Members of sleeping islands that must wake this pass.
    pub to_wake: Vec<BodyRef>,
    /// Sleep-ready members of islands that cannot sleep yet.
    pub to_clamp: Vec<BodyRef>,
}

impl SleepWakeLists {
    /// Whether the pass decided no transitions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_sleep.is_empty() && self.to_wake.is_empty() && self.to_clamp.is_empty()
    }
}

/// Owner of island connectivity and the sleep/wake decision.
#[derive(Debug)]
pub struct IslandLedger {
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<u32>,
    edges: Vec<Option<Edge>>,
    free_edges: Vec<u32>,
    /// Contact edges incident to nodes woken by the last first pass whose
    /// touch state was never evaluated while asleep.
    woken_edges: Vec<EdgeHandle>,
}

impl Default for IslandLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl IslandLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            edges: Vec::new(),
            free_edges: Vec::new(),
            woken_edges: Vec::new(),
        }
    }

    /// Register a node. New nodes start active and not sleep-ready.
    pub fn add_node(&mut self, body: BodyRef, kind: NodeKind) -> NodeHandle {
        let node = Node {
            body,
            kind,
            active: true,
            ready: false,
        };
        if let Some(slot) = self.free_nodes.pop() {
            self.nodes[slot as usize] = Some(node);
            NodeHandle(slot)
        } else {
            self.nodes.push(Some(node));
            NodeHandle(u32::try_from(self.nodes.len() - 1).unwrap_or(u32::MAX))
        }
    }

    /// Remove a node. All incident edges must already be gone.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        debug_assert!(
            self.edges
                .iter()
                .flatten()
                .all(|e| e.a != handle && e.b != handle),
            "node removed while edges still reference it"
        );
        self.nodes[handle.index()] = None;
        self.free_nodes.push(handle.0);
    }

    /// Register an edge between two nodes.
    ///
    /// Contact edges start unconnected (touch is provisional until
    /// narrow-phase confirms it); joints are connected for their lifetime.
    pub fn add_edge(&mut self, a: NodeHandle, b: NodeHandle, kind: EdgeKind) -> EdgeHandle {
        debug_assert!(self.nodes[a.index()].is_some() && self.nodes[b.index()].is_some());
        let edge = Edge {
            a,
            b,
            kind,
            connected: kind == EdgeKind::Joint,
            pair: None,
        };
        if let Some(slot) = self.free_edges.pop() {
            self.edges[slot as usize] = Some(edge);
            EdgeHandle(slot)
        } else {
            self.edges.push(Some(edge));
            EdgeHandle(u32::try_from(self.edges.len() - 1).unwrap_or(u32::MAX))
        }
    }

    /// Remove an edge. A split this causes is discovered lazily by the
    /// next island pass, never eagerly.
    pub fn remove_edge(&mut self, handle: EdgeHandle) {
        self.woken_edges.retain(|&e| e != handle);
        self.edges[handle.index()] = None;
        self.free_edges.push(handle.0);
    }

    /// Mark an edge's touch as confirmed.
    pub fn set_edge_connected(&mut self, handle: EdgeHandle) {
        if let Some(edge) = self.edges[handle.index()].as_mut() {
            edge.connected = true;
        }
    }

    /// Mark an edge's touch as lost.
    pub fn set_edge_unconnected(&mut self, handle: EdgeHandle) {
        if let Some(edge) = self.edges[handle.index()].as_mut() {
            edge.connected = false;
        }
    }

    /// Attach the broad-phase pair identity to a contact edge.
    pub fn set_edge_pair(&mut self, handle: EdgeHandle, pair: PairId) {
        if let Some(edge) = self.edges[handle.index()].as_mut() {
            edge.pair = Some(pair);
        }
    }

    /// Endpoints of an edge.
    #[must_use]
    pub fn edge_nodes(&self, handle: EdgeHandle) -> Option<(NodeHandle, NodeHandle)> {
        self.edges[handle.index()].as_ref().map(|e| (e.a, e.b))
    }

    /// The body or articulation a node stands for.
    #[must_use]
    pub fn node_body(&self, handle: NodeHandle) -> Option<BodyRef> {
        self.nodes[handle.index()].as_ref().map(|n| n.body)
    }

    /// Whether a node is currently active.
    #[must_use]
    pub fn is_node_active(&self, handle: NodeHandle) -> bool {
        self.nodes[handle.index()].as_ref().is_some_and(|n| n.active)
    }

    /// Force a node's activity flag (external wakes, kinematic targets).
    pub fn set_node_active(&mut self, handle: NodeHandle, active: bool) {
        if let Some(node) = self.nodes[handle.index()].as_mut() {
            node.active = active;
            if active {
                node.ready = false;
            }
        }
    }

    /// The node's wake counter reached zero this frame.
    pub fn notify_ready_for_sleeping(&mut self, handle: NodeHandle) {
        if let Some(node) = self.nodes[handle.index()].as_mut() {
            node.ready = true;
        }
    }

    /// The node was revived mid-frame; it must not sleep this pass.
    pub fn notify_not_ready_for_sleeping(&mut self, handle: NodeHandle) {
        if let Some(node) = self.nodes[handle.index()].as_mut() {
            node.ready = false;
        }
    }

    /// First island-generation pass.
    ///
    /// Flood-fills connected components over the connected edges and
    /// decides, per island: sleep when every member is ready; wake when a
    /// sleeping member is reachable from an active node (or touched by an
    /// active kinematic); otherwise clamp ready members so they cannot
    /// slip to sleep ahead of the island. Pairs of freshly-woken nodes
    /// whose touch state was never evaluated while asleep are recorded for
    /// the second pass.
    pub fn update_islands(&mut self) -> SleepWakeLists {
        self.woken_edges.clear();
        let lists = self.run_island_pass(true);
        if !lists.is_empty() {
            debug!(
                to_sleep = lists.to_sleep.len(),
                to_wake = lists.to_wake.len(),
                to_clamp = lists.to_clamp.len(),
                "island pass"
            );
        }
        lists
    }

    /// Contact pairs that need narrow-phase re-evaluation before the
    /// second pass. Empty means the second pass can be skipped entirely.
    #[must_use]
    pub fn woken_pairs(&self) -> Vec<PairId> {
        self.woken_edges
            .iter()
            .filter_map(|&h| self.edges[h.index()].as_ref().and_then(|e| e.pair))
            .collect()
    }

    /// Second island-generation pass, run after narrow-phase re-evaluated
    /// the woken pairs. Re-partitions the islands; it can only put regions
    /// back to sleep, never wake more — waking here would mean the first
    /// pass missed connectivity, so the wake list is asserted empty.
    pub fn update_islands_second_pass(&mut self) -> SleepWakeLists {
        let lists = self.run_island_pass(false);
        debug_assert!(
            lists.to_wake.is_empty(),
            "second island pass may not wake additional objects"
        );
        lists
    }

    /// Drop woken pairs whose endpoints both went back to sleep during the
    /// second pass; their deferred contact reports must not be delivered.
    /// Returns the pairs that remain in need of report processing.
    pub fn remove_sleeping_pair_contact_managers(&mut self) -> Vec<PairId> {
        let edges = &self.edges;
        let nodes = &self.nodes;
        self.woken_edges.retain(|&h| {
            edges[h.index()].as_ref().is_some_and(|e| {
                let a_active = nodes[e.a.index()].as_ref().is_some_and(|n| n.active);
                let b_active = nodes[e.b.index()].as_ref().is_some_and(|n| n.active);
                a_active || b_active
            })
        });
        self.woken_pairs()
    }

    /// Free per-frame traversal state. Called from step finalization.
    pub fn free_buffers(&mut self) {
        self.woken_edges.clear();
    }

    /// Debug check of the atomic-sleep invariant: no island mixes active
    /// and sleeping members.
    pub fn debug_assert_islands_atomic(&self) {
        if cfg!(debug_assertions) {
            let (islands, _) = self.discover_islands();
            for island in &islands {
                let mut any_active = false;
                let mut any_asleep = false;
                for &n in island {
                    let Some(node) = self.nodes[n.index()].as_ref() else {
                        continue;
                    };
                    if node.kind == NodeKind::Kinematic {
                        continue;
                    }
                    if node.active {
                        any_active = true;
                    } else {
                        any_asleep = true;
                    }
                }
                debug_assert!(
                    !(any_active && any_asleep),
                    "island mixes active and sleeping members"
                );
            }
        }
    }

    /// Flood-fill the connected components over connected edges.
    ///
    /// Kinematic nodes are never expanded from, so they join adjacent
    /// islands without bridging them; their influence is handled by the
    /// caller scanning island-adjacent kinematics.
    fn discover_islands(&self) -> (Vec<SmallVec<[NodeHandle; 8]>>, Vec<SmallVec<[NodeHandle; 2]>>) {
        let n = self.nodes.len();

        // CSR adjacency over the live connected edges.
        let mut counts = vec![0u32; n];
        for edge in self.edges.iter().flatten() {
            if edge.connected {
                counts[edge.a.index()] += 1;
                counts[edge.b.index()] += 1;
            }
        }
        let mut offsets = vec![0u32; n + 1];
        for i in 0..n {
            offsets[i + 1] = offsets[i] + counts[i];
        }
        let mut entries = vec![0u32; offsets[n] as usize];
        let mut cursor = offsets.clone();
        for edge in self.edges.iter().flatten() {
            if edge.connected {
                entries[cursor[edge.a.index()] as usize] = edge.b.0;
                cursor[edge.a.index()] += 1;
                entries[cursor[edge.b.index()] as usize] = edge.a.0;
                cursor[edge.b.index()] += 1;
            }
        }

        let mut islands = Vec::new();
        let mut kinematic_rims: Vec<SmallVec<[NodeHandle; 2]>> = Vec::new();
        let mut visited = vec![false; n];
        let mut stack: Vec<u32> = Vec::new();

        for start in 0..n {
            let Some(node) = self.nodes[start].as_ref() else {
                continue;
            };
            if visited[start] || node.kind == NodeKind::Kinematic {
                continue;
            }
            let mut island: SmallVec<[NodeHandle; 8]> = SmallVec::new();
            let mut rim: SmallVec<[NodeHandle; 2]> = SmallVec::new();
            visited[start] = true;
            stack.push(u32::try_from(start).unwrap_or(u32::MAX));
            while let Some(slot) = stack.pop() {
                island.push(NodeHandle(slot));
                let (lo, hi) = (offsets[slot as usize] as usize, offsets[slot as usize + 1] as usize);
                for &next in &entries[lo..hi] {
                    let Some(neighbor) = self.nodes[next as usize].as_ref() else {
                        continue;
                    };
                    if neighbor.kind == NodeKind::Kinematic {
                        rim.push(NodeHandle(next));
                        continue;
                    }
                    if !visited[next as usize] {
                        visited[next as usize] = true;
                        stack.push(next);
                    }
                }
            }
            islands.push(island);
            kinematic_rims.push(rim);
        }
        (islands, kinematic_rims)
    }

    fn run_island_pass(&mut self, record_woken: bool) -> SleepWakeLists {
        let (islands, rims) = self.discover_islands();
        let mut lists = SleepWakeLists::default();

        for (island, rim) in islands.iter().zip(&rims) {
            let kinematic_holds_awake = rim
                .iter()
                .any(|&k| self.nodes[k.index()].as_ref().is_some_and(|n| n.active));

            let mut all_ready = !kinematic_holds_awake;
            let mut any_active = false;
            let mut any_asleep = false;
            for &h in island {
                let Some(node) = self.nodes[h.index()].as_ref() else {
                    continue;
                };
                all_ready &= node.ready;
                if node.active {
                    any_active = true;
                } else {
                    any_asleep = true;
                }
            }

            if all_ready && any_active {
                // Whole island idles out together.
                for &h in island {
                    if let Some(node) = self.nodes[h.index()].as_mut() {
                        node.active = false;
                        lists.to_sleep.push(node.body);
                    }
                }
            } else if !all_ready && any_asleep {
                // Something keeps this region alive; every sleeping member
                // must come back.
                let mut woken: SmallVec<[NodeHandle; 8]> = SmallVec::new();
                for &h in island {
                    if let Some(node) = self.nodes[h.index()].as_mut() {
                        if !node.active {
                            node.active = true;
                            node.ready = false;
                            lists.to_wake.push(node.body);
                            trace!(node = ?node.body, "island wake");
                            woken.push(h);
                        }
                    }
                }
                if record_woken {
                    for h in woken {
                        self.record_woken_edges(h);
                    }
                }
            } else if !all_ready && any_active {
                // Mixed readiness in an awake island: ready members are
                // clamped to the floor so none sleeps ahead of the rest.
                for &h in island {
                    if let Some(node) = self.nodes[h.index()].as_mut() {
                        if node.ready {
                            node.ready = false;
                            lists.to_clamp.push(node.body);
                        }
                    }
                }
            }
        }

        self.debug_assert_islands_atomic();
        lists
    }

    /// Contact edges of a freshly-woken node carry touch state that was
    /// never evaluated while the node slept; queue them for the second
    /// pass.
    fn record_woken_edges(&mut self, node: NodeHandle) {
        for (i, edge) in self.edges.iter().enumerate() {
            let Some(edge) = edge.as_ref() else { continue };
            if edge.kind == EdgeKind::Contact
                && edge.pair.is_some()
                && (edge.a == node || edge.b == node)
            {
                let handle = EdgeHandle(u32::try_from(i).unwrap_or(u32::MAX));
                if !self.woken_edges.contains(&handle) {
                    self.woken_edges.push(handle);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn body_ref(id: u64) -> BodyRef {
        BodyRef::Body(BodyId::new(id))
    }

    fn ledger_with_pair() -> (IslandLedger, NodeHandle, NodeHandle, EdgeHandle) {
        let mut ledger = IslandLedger::new();
        let a = ledger.add_node(body_ref(0), NodeKind::Dynamic);
        let b = ledger.add_node(body_ref(1), NodeKind::Dynamic);
        let e = ledger.add_edge(a, b, EdgeKind::Contact);
        ledger.set_edge_connected(e);
        ledger.set_edge_pair(e, PairId::new(7));
        (ledger, a, b, e)
    }

    #[test]
    fn test_island_sleeps_only_when_all_ready() {
        let (mut ledger, a, b, _e) = ledger_with_pair();

        ledger.notify_ready_for_sleeping(a);
        let lists = ledger.update_islands();
        // b is not ready, so a gets clamped instead of sleeping.
        assert!(lists.to_sleep.is_empty());
        assert_eq!(lists.to_clamp, vec![body_ref(0)]);

        ledger.notify_ready_for_sleeping(a);
        ledger.notify_ready_for_sleeping(b);
        let lists = ledger.update_islands();
        assert_eq!(lists.to_sleep.len(), 2);
        assert!(!ledger.is_node_active(a));
        assert!(!ledger.is_node_active(b));
    }

    #[test]
    fn test_connecting_to_active_node_wakes_island() {
        let (mut ledger, a, b, _e) = ledger_with_pair();
        ledger.notify_ready_for_sleeping(a);
        ledger.notify_ready_for_sleeping(b);
        ledger.update_islands();

        // A third, active body touches the sleeping pair.
        let c = ledger.add_node(body_ref(2), NodeKind::Dynamic);
        let e2 = ledger.add_edge(b, c, EdgeKind::Contact);
        ledger.set_edge_connected(e2);

        let lists = ledger.update_islands();
        assert_eq!(lists.to_wake.len(), 2);
        assert!(ledger.is_node_active(a));
        assert!(ledger.is_node_active(b));
    }

    #[test]
    fn test_woken_pairs_feed_second_pass() {
        let (mut ledger, a, b, _e) = ledger_with_pair();
        ledger.notify_ready_for_sleeping(a);
        ledger.notify_ready_for_sleeping(b);
        ledger.update_islands();

        let c = ledger.add_node(body_ref(2), NodeKind::Dynamic);
        let e2 = ledger.add_edge(b, c, EdgeKind::Contact);
        ledger.set_edge_connected(e2);
        ledger.update_islands();

        // The sleeping pair's contact was never evaluated while asleep.
        assert!(ledger.woken_pairs().contains(&PairId::new(7)));

        // Narrow-phase re-evaluation says: no touch after all.
        let first_edge = EdgeHandle(0);
        ledger.set_edge_unconnected(first_edge);
        ledger.notify_ready_for_sleeping(a);
        let lists = ledger.update_islands_second_pass();
        assert!(lists.to_wake.is_empty());
        assert_eq!(lists.to_sleep, vec![body_ref(0)]);

        // Pair had a sleeping endpoint put back to sleep; with the other
        // endpoint still awake it survives pruning.
        let retained = ledger.remove_sleeping_pair_contact_managers();
        assert!(retained.contains(&PairId::new(7)));
    }

    #[test]
    fn test_kinematic_wakes_but_never_sleeps() {
        let mut ledger = IslandLedger::new();
        let a = ledger.add_node(body_ref(0), NodeKind::Dynamic);
        let k = ledger.add_node(body_ref(10), NodeKind::Kinematic);
        let e = ledger.add_edge(a, k, EdgeKind::Contact);
        ledger.set_edge_connected(e);

        // Active kinematic holds the island awake despite a ready member.
        ledger.notify_ready_for_sleeping(a);
        let lists = ledger.update_islands();
        assert!(lists.to_sleep.is_empty());

        // Once the kinematic stops, the island may sleep without it.
        ledger.set_node_active(k, false);
        ledger.notify_ready_for_sleeping(a);
        let lists = ledger.update_islands();
        assert_eq!(lists.to_sleep, vec![body_ref(0)]);
        // The kinematic itself never appears in the sleep list.
        assert!(!lists.to_sleep.contains(&body_ref(10)));
    }

    #[test]
    fn test_edge_removal_splits_lazily() {
        let (mut ledger, a, b, e) = ledger_with_pair();
        ledger.remove_edge(e);
        ledger.notify_ready_for_sleeping(a);
        let lists = ledger.update_islands();
        // a is its own island now and sleeps alone; b stays awake.
        assert_eq!(lists.to_sleep, vec![body_ref(0)]);
        assert!(ledger.is_node_active(b));
    }
}
