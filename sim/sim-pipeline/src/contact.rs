//! Contact/touch lifecycle tracking.
//!
//! Narrow-phase output arrives as batches of new-touch and lost-touch
//! events. New touches connect ledger edges (which can wake islands on the
//! next generation pass); lost touches disconnect them and are *deferred*:
//! waking on every individual separation would thrash bodies awake many
//! times within a single step. Instead, lost pairs queue up and are
//! resolved at exactly one point per frame by
//! [`TouchTracker::process_lost_touch_pairs`].

use hashbrown::HashSet;
use tracing::trace;

use crate::body::{BodyId, BodyStore, PairId};
use crate::island::{EdgeHandle, IslandLedger};

/// One narrow-phase touch transition.
#[derive(Debug, Clone, Copy)]
pub struct TouchEvent {
    /// Broad-phase pair identity.
    pub pair: PairId,
    /// The ledger edge standing for this pair.
    pub edge: EdgeHandle,
    /// First body of the pair.
    pub a: BodyId,
    /// Second body of the pair.
    pub b: BodyId,
    /// Collision response is disabled for this pair (trigger-style
    /// contacts); such pairs never enter the deferred lost-touch list.
    pub response_disabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct LostTouchPair {
    a: BodyId,
    b: BodyId,
    /// Sleep state captured at defer time; consulted for bodies that no
    /// longer exist when the deferred list resolves.
    a_was_asleep: bool,
    b_was_asleep: bool,
}

/// Translates touch events into island-ledger updates and deferred
/// lost-touch wake decisions.
#[derive(Debug, Default)]
pub struct TouchTracker {
    deferred: Vec<LostTouchPair>,
    deleted: HashSet<BodyId>,
    out_of_bounds: Vec<BodyId>,
}

impl TouchTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one narrow-phase batch.
    ///
    /// New touches are applied before lost touches as a structural rule of
    /// this single entry point: a pair marked both new and lost in the
    /// same frame must come out "still touching", and processing order is
    /// the only signal distinguishing that from "touched, then separated".
    pub fn process_touch_events(
        &mut self,
        new_touches: &[TouchEvent],
        lost_touches: &[TouchEvent],
        bodies: &mut BodyStore,
        ledger: &mut IslandLedger,
    ) {
        for event in new_touches {
            ledger.set_edge_connected(event.edge);
            ledger.set_edge_pair(event.edge, event.pair);
            if let Some(body) = bodies.get_mut(event.a) {
                body.num_touching += 1;
            }
            if let Some(body) = bodies.get_mut(event.b) {
                body.num_touching += 1;
            }
            trace!(pair = %event.pair, "new touch");
        }
        for event in lost_touches {
            ledger.set_edge_unconnected(event.edge);
            if let Some(body) = bodies.get_mut(event.a) {
                body.num_touching = body.num_touching.saturating_sub(1);
            }
            if let Some(body) = bodies.get_mut(event.b) {
                body.num_touching = body.num_touching.saturating_sub(1);
            }
            if !event.response_disabled {
                self.deferred.push(LostTouchPair {
                    a: event.a,
                    b: event.b,
                    a_was_asleep: bodies.get(event.a).is_some_and(|b| !b.active),
                    b_was_asleep: bodies.get(event.b).is_some_and(|b| !b.active),
                });
            }
            trace!(pair = %event.pair, "lost touch");
        }
    }

    /// Mark a body as deleted this frame. The body itself is removed at
    /// the frame boundary; until then its pairs resolve through the
    /// deleted-partner branch below.
    pub fn note_body_deleted(&mut self, id: BodyId) {
        self.deleted.insert(id);
    }

    /// Resolve the deferred lost-touch list. Runs once per frame (after
    /// broad-phase) and on explicit flush.
    ///
    /// Per pair: two sleeping bodies stay asleep, even across a deletion
    /// (a legitimate resting separation; waking the survivor would pop
    /// resting stacks apart for no physical reason); otherwise a deleted
    /// partner wakes the survivor (it cannot tell a physical separation
    /// from the deletion); otherwise one sleeping body wakes both (their
    /// relative state is no longer verified consistent); two awake bodies
    /// need nothing.
    ///
    /// A deleted body's sleep state comes from the defer-time snapshot;
    /// the body itself may be long gone.
    pub fn process_lost_touch_pairs(
        &mut self,
        bodies: &mut BodyStore,
        ledger: &mut IslandLedger,
        reset_time: f64,
    ) {
        for pair in std::mem::take(&mut self.deferred) {
            let a_deleted = self.deleted.contains(&pair.a) || !bodies.contains(pair.a);
            let b_deleted = self.deleted.contains(&pair.b) || !bodies.contains(pair.b);
            let a_asleep = if a_deleted {
                pair.a_was_asleep
            } else {
                bodies.get(pair.a).is_some_and(|b| !b.active)
            };
            let b_asleep = if b_deleted {
                pair.b_was_asleep
            } else {
                bodies.get(pair.b).is_some_and(|b| !b.active)
            };

            if a_asleep && b_asleep {
                continue;
            }
            if a_deleted || b_deleted {
                if !a_deleted {
                    wake_body(pair.a, bodies, ledger, reset_time);
                }
                if !b_deleted {
                    wake_body(pair.b, bodies, ledger, reset_time);
                }
                continue;
            }
            if a_asleep != b_asleep {
                wake_body(pair.a, bodies, ledger, reset_time);
                wake_body(pair.b, bodies, ledger, reset_time);
            }
        }
    }

    /// Whether deferred lost-touch work is pending.
    #[must_use]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Report a body that left every broad-phase region. Out-of-bounds
    /// bodies are exempt from the lost-touch wake logic; whether to remove
    /// them is the caller's call.
    pub fn note_out_of_bounds(&mut self, id: BodyId) {
        self.out_of_bounds.push(id);
    }

    /// Take the out-of-bounds report list.
    pub fn drain_out_of_bounds(&mut self) -> Vec<BodyId> {
        std::mem::take(&mut self.out_of_bounds)
    }

    /// Frame-boundary cleanup: forget the frame's deleted set.
    pub fn end_of_frame(&mut self) {
        self.deleted.clear();
    }
}

/// Wake a single body: re-arm its counter and flip its ledger node active.
fn wake_body(id: BodyId, bodies: &mut BodyStore, ledger: &mut IslandLedger, reset_time: f64) {
    let Some(body) = bodies.get_mut(id) else {
        return;
    };
    let was_asleep = !body.active;
    body.wake(reset_time);
    if let Some(node) = body.node {
        ledger.set_node_active(node, true);
        ledger.notify_not_ready_for_sleeping(node);
    }
    if was_asleep {
        trace!(body = %id, "lost-touch wake");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::island::{BodyRef, NodeKind};
    use nalgebra::{Isometry3, Vector3};

    const RESET: f64 = 0.4;

    struct Fixture {
        bodies: BodyStore,
        ledger: IslandLedger,
        tracker: TouchTracker,
    }

    fn fixture(asleep: &[bool]) -> Fixture {
        let mut bodies = BodyStore::new();
        let mut ledger = IslandLedger::new();
        for (i, &asleep) in asleep.iter().enumerate() {
            let id = BodyId::new(i as u64);
            let mut body = Body::new(
                id,
                Isometry3::identity(),
                1.0,
                Vector3::new(1.0, 1.0, 1.0),
            );
            let node = ledger.add_node(BodyRef::Body(id), NodeKind::Dynamic);
            body.node = Some(node);
            if asleep {
                body.active = false;
                body.wake_counter = 0.0;
                ledger.set_node_active(node, false);
            }
            bodies.insert(body);
        }
        Fixture {
            bodies,
            ledger,
            tracker: TouchTracker::new(),
        }
    }

    fn lose_touch(fx: &mut Fixture, a: u64, b: u64) {
        let na = fx.bodies.get(BodyId::new(a)).unwrap().node.unwrap();
        let nb = fx.bodies.get(BodyId::new(b)).unwrap().node.unwrap();
        let edge = fx
            .ledger
            .add_edge(na, nb, crate::island::EdgeKind::Contact);
        let event = TouchEvent {
            pair: PairId::new(0),
            edge,
            a: BodyId::new(a),
            b: BodyId::new(b),
            response_disabled: false,
        };
        fx.tracker
            .process_touch_events(&[], &[event], &mut fx.bodies, &mut fx.ledger);
    }

    #[test]
    fn test_both_asleep_stay_asleep() {
        let mut fx = fixture(&[true, true]);
        lose_touch(&mut fx, 0, 1);
        fx.tracker
            .process_lost_touch_pairs(&mut fx.bodies, &mut fx.ledger, RESET);
        assert!(!fx.bodies.get(BodyId::new(0)).unwrap().active);
        assert!(!fx.bodies.get(BodyId::new(1)).unwrap().active);
    }

    #[test]
    fn test_one_asleep_wakes_both() {
        let mut fx = fixture(&[true, false]);
        lose_touch(&mut fx, 0, 1);
        fx.tracker
            .process_lost_touch_pairs(&mut fx.bodies, &mut fx.ledger, RESET);
        assert!(fx.bodies.get(BodyId::new(0)).unwrap().active);
        assert!(fx.bodies.get(BodyId::new(1)).unwrap().active);
        assert!(fx.bodies.get(BodyId::new(0)).unwrap().wake_counter >= RESET);
    }

    #[test]
    fn test_both_awake_nothing_happens() {
        let mut fx = fixture(&[false, false]);
        let before = fx.bodies.get(BodyId::new(0)).unwrap().wake_counter;
        lose_touch(&mut fx, 0, 1);
        fx.tracker
            .process_lost_touch_pairs(&mut fx.bodies, &mut fx.ledger, RESET);
        // No wake means no counter re-arm.
        assert_eq!(
            fx.bodies.get(BodyId::new(0)).unwrap().wake_counter,
            before
        );
    }

    #[test]
    fn test_deleted_partner_wakes_survivor_only() {
        let mut fx = fixture(&[true, false]);
        lose_touch(&mut fx, 0, 1);
        fx.tracker.note_body_deleted(BodyId::new(1));
        fx.tracker
            .process_lost_touch_pairs(&mut fx.bodies, &mut fx.ledger, RESET);
        // Survivor 0 wakes even though it was asleep; the deleted body is
        // left alone.
        assert!(fx.bodies.get(BodyId::new(0)).unwrap().active);
    }

    #[test]
    fn test_deleted_partner_with_both_asleep_leaves_survivor_asleep() {
        // Both asleep and the separation is caused purely by deleting one
        // of them: the survivor was verified at rest, waking it would pop
        // stacks apart for no physical reason.
        let mut fx = fixture(&[true, true]);
        lose_touch(&mut fx, 0, 1);
        fx.tracker.note_body_deleted(BodyId::new(0));
        fx.bodies.remove(BodyId::new(0));
        fx.tracker
            .process_lost_touch_pairs(&mut fx.bodies, &mut fx.ledger, RESET);
        assert!(!fx.bodies.get(BodyId::new(1)).unwrap().active);
    }

    #[test]
    fn test_response_disabled_pairs_never_defer() {
        let mut fx = fixture(&[true, false]);
        let na = fx.bodies.get(BodyId::new(0)).unwrap().node.unwrap();
        let nb = fx.bodies.get(BodyId::new(1)).unwrap().node.unwrap();
        let edge = fx
            .ledger
            .add_edge(na, nb, crate::island::EdgeKind::Contact);
        let event = TouchEvent {
            pair: PairId::new(0),
            edge,
            a: BodyId::new(0),
            b: BodyId::new(1),
            response_disabled: true,
        };
        fx.tracker
            .process_touch_events(&[], &[event], &mut fx.bodies, &mut fx.ledger);
        assert!(!fx.tracker.has_deferred());
    }

    #[test]
    fn test_new_before_lost_leaves_touch_consistent() {
        let mut fx = fixture(&[false, false]);
        let na = fx.bodies.get(BodyId::new(0)).unwrap().node.unwrap();
        let nb = fx.bodies.get(BodyId::new(1)).unwrap().node.unwrap();
        let edge = fx
            .ledger
            .add_edge(na, nb, crate::island::EdgeKind::Contact);
        let event = TouchEvent {
            pair: PairId::new(0),
            edge,
            a: BodyId::new(0),
            b: BodyId::new(1),
            response_disabled: false,
        };
        // Same pair both new and lost in one batch: the lost event wins
        // the edge state deterministically (applied second).
        fx.tracker
            .process_touch_events(&[event], &[event], &mut fx.bodies, &mut fx.ledger);
        assert_eq!(fx.bodies.get(BodyId::new(0)).unwrap().num_touching, 0);
    }
}
