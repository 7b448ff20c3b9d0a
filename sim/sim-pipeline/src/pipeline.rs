//! The per-frame step pipeline.
//!
//! One simulation step is a DAG of phases executed on a worker pool via
//! [`sim_task::TaskGraph`]:
//!
//! ```text
//! broad_phase → post_broad_phase → narrow_phase → post_narrow_phase
//!   → island_gen → post_island_gen
//!   → island_gen_second_pass → post_island_gen_second_pass   (conditional)
//!   → before_solver → update_dynamics
//!   → [ccd_sweep → ccd_resolve → ccd_post]*                  (conditional)
//!   → post_solver → finalization
//! ```
//!
//! The rigid-body phases form a chain, so the scene mutex handed through
//! the graph is uncontended; independent sub-pipelines can be spliced in
//! as extra siblings without touching these phases. Parallelism *within*
//! the batched phases (before-solver, after-integration) comes from
//! splitting bodies into `bodies_per_task` chunks, each accumulating local
//! results that are merged into shared state under a lock taken once per
//! batch.
//!
//! The CCD chain is double-buffered: two pass-state slots indexed by the
//! pass parity, so pass N+1's sweep may overlap pass N's bookkeeping. A
//! pass that reports zero sweep hits sets the done flag and every later
//! pass no-ops; the continuation into `post_solver` completes exactly
//! once either way.

use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use sim_task::TaskGraph;
use tracing::{debug, trace};

use crate::body::BodyId;
use crate::error::Result;
use crate::scene::{BitMap, CcdPassState, Scene};

impl Scene {
    /// Run the collision half of a step: broad-phase, deferred lost-touch
    /// resolution, narrow-phase.
    ///
    /// A zero or negative `dt` skips the phases ("paused") but still
    /// re-arms the per-frame report state: the report timestamp is bumped
    /// and the broken-constraint buffer cleared, so actors deleted during
    /// a paused frame do not reuse stale report-pair identities.
    ///
    /// # Errors
    ///
    /// Propagates task-graph failures; phase code itself reports bugs via
    /// assertions, not errors.
    pub fn collide(&mut self, dt: f64, pool: &rayon::ThreadPool) -> Result<()> {
        if dt <= 0.0 {
            self.bump_report_timestamp();
            self.broken_constraints.clear();
            debug!("non-positive timestep, skipping frame");
            return Ok(());
        }
        self.begin_step(dt);

        let shared = Mutex::new(self);
        let mut graph = TaskGraph::new();
        let bp = graph.spawn("broad_phase", || with_scene(&shared, phase_broad_phase), &[]);
        let post_bp = graph.spawn(
            "post_broad_phase",
            || with_scene(&shared, phase_post_broad_phase),
            &[bp],
        );
        let np = graph.spawn(
            "rigid_body_narrow_phase",
            || with_scene(&shared, phase_narrow_phase),
            &[post_bp],
        );
        let _post_np = graph.spawn(
            "post_narrow_phase",
            || with_scene(&shared, phase_post_narrow_phase),
            &[np],
        );
        graph.run(pool)?;
        Ok(())
    }

    /// Run the solve half of a step: island generation (two passes when
    /// needed), constraint solve, integration, CCD, sleep checks,
    /// finalization.
    ///
    /// # Errors
    ///
    /// Propagates task-graph failures.
    ///
    /// # Panics
    ///
    /// Calling `solve` with a positive `dt` when the frame's `collide`
    /// was skipped is a caller bug and asserts.
    pub fn solve(&mut self, dt: f64, pool: &rayon::ThreadPool) -> Result<()> {
        if dt <= 0.0 {
            return Ok(());
        }
        assert!(self.stepping, "solve before collide");
        let ccd_passes = self.config.ccd_max_passes;

        let shared = Mutex::new(self);
        let shared_ref = &shared;
        let mut graph = TaskGraph::new();

        let island_gen = graph.spawn("island_gen", || with_scene(shared_ref, phase_island_gen), &[]);
        let post_island_gen = graph.spawn(
            "post_island_gen",
            || with_scene(shared_ref, phase_post_island_gen),
            &[island_gen],
        );
        let second = graph.spawn(
            "island_gen_second_pass",
            || with_scene(shared_ref, phase_island_gen_second_pass),
            &[post_island_gen],
        );
        let post_second = graph.spawn(
            "post_island_gen_second_pass",
            || with_scene(shared_ref, phase_post_island_gen_second_pass),
            &[second],
        );
        let before_solver = graph.spawn(
            "before_solver",
            || with_scene(shared_ref, phase_before_solver),
            &[post_second],
        );
        let update_dynamics = graph.spawn(
            "update_dynamics",
            || with_scene(shared_ref, phase_update_dynamics),
            &[before_solver],
        );

        // CCD chain: a sweep/resolve/post triple per pass, all wired up
        // front; early termination is the done flag, not graph surgery.
        let mut tail = update_dynamics;
        for pass in 0..ccd_passes {
            let sweep = graph.spawn(
                "ccd_sweep",
                move || with_scene(shared_ref, |s| phase_ccd_sweep(s, pass)),
                &[tail],
            );
            let resolve = graph.spawn(
                "ccd_resolve",
                move || with_scene(shared_ref, |s| phase_ccd_resolve(s, pass)),
                &[sweep],
            );
            tail = graph.spawn(
                "ccd_post",
                move || with_scene(shared_ref, |s| phase_ccd_post(s, pass)),
                &[resolve],
            );
        }

        let post_solver = graph.spawn(
            "post_solver",
            || with_scene(shared_ref, phase_post_solver),
            &[tail],
        );
        let _finalization = graph.spawn(
            "finalization",
            || with_scene(shared_ref, phase_finalization),
            &[post_solver],
        );
        graph.run(pool)?;
        Ok(())
    }

    /// Convenience composition of [`Scene::collide`] and [`Scene::solve`].
    ///
    /// # Errors
    ///
    /// Propagates task-graph failures from either half.
    pub fn simulate(&mut self, dt: f64, pool: &rayon::ThreadPool) -> Result<()> {
        self.collide(dt, pool)?;
        self.solve(dt, pool)
    }

    /// The frame's timestep and its reciprocal, as stored by `collide`.
    #[must_use]
    pub fn timestep(&self) -> (f64, f64) {
        (self.dt, self.inv_dt)
    }

    fn begin_step(&mut self, dt: f64) {
        self.stepping = true;
        self.dt = dt;
        self.inv_dt = 1.0 / dt;
        self.bump_report_timestamp();
        self.broken_constraints.clear();
        self.changed_shapes.clear();
        self.ccd_states = [CcdPassState::default(); 2];
        self.ccd_done = false;
        self.solver_set.clear();
        self.solver_report = None;
        self.pending_touches = None;
        self.pending_sleep_wake = None;
        self.pending_second_pass.clear();
        self.pending_second_lists = None;
    }

    fn check_constraint_breakage(&mut self) {
        let Some(report) = self.solver_report.take() else {
            return;
        };
        for (edge, impulse) in report.joint_impulses {
            let Some(record) = self.joints.get(&edge).copied() else {
                continue;
            };
            if record.break_impulse.is_some_and(|threshold| impulse > threshold) {
                debug!(?edge, impulse, "constraint broke");
                self.remove_joint(edge);
                self.wake_body(record.a);
                self.wake_body(record.b);
                self.broken_constraints.push(edge);
            }
        }
    }
}

fn with_scene<R>(shared: &Mutex<&mut Scene>, f: impl FnOnce(&mut Scene) -> R) -> R {
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut **guard)
}

fn phase_broad_phase(scene: &mut Scene) {
    let result = scene.broad_phase.update(false, &scene.bodies);
    trace!(
        created = result.created_pairs.len(),
        destroyed = result.destroyed_pairs.len(),
        "broad phase"
    );
    scene.apply_broad_phase_result(&result);
}

fn phase_post_broad_phase(scene: &mut Scene) {
    let reset = scene.config.wake_counter_reset_time;
    scene
        .tracker
        .process_lost_touch_pairs(&mut scene.bodies, &mut scene.ledger, reset);
}

fn phase_narrow_phase(scene: &mut Scene) {
    let result = scene.narrow_phase.generate(&scene.bodies);
    scene.pending_touches = Some(result);
}

fn phase_post_narrow_phase(scene: &mut Scene) {
    if let Some(result) = scene.pending_touches.as_ref() {
        trace!(
            new = result.new_touches.len(),
            lost = result.lost_touches.len(),
            "narrow phase"
        );
    }
}

fn phase_island_gen(scene: &mut Scene) {
    if let Some(result) = scene.pending_touches.take() {
        let (new_events, lost_events) = scene.touch_events_for(&result);
        scene.tracker.process_touch_events(
            &new_events,
            &lost_events,
            &mut scene.bodies,
            &mut scene.ledger,
        );
    }
    let lists = scene.ledger.update_islands();
    scene.pending_sleep_wake = Some(lists);
}

fn phase_post_island_gen(scene: &mut Scene) {
    if let Some(lists) = scene.pending_sleep_wake.take() {
        scene.apply_sleep_wake_lists(&lists);
    }
    scene.pending_second_pass = scene.ledger.woken_pairs();
    if !scene.pending_second_pass.is_empty() {
        debug!(pairs = scene.pending_second_pass.len(), "second island pass armed");
    }
}

fn phase_island_gen_second_pass(scene: &mut Scene) {
    if scene.pending_second_pass.is_empty() {
        return;
    }
    let pairs = std::mem::take(&mut scene.pending_second_pass);
    let result = scene.narrow_phase.reevaluate(&pairs, &scene.bodies);
    let (new_events, lost_events) = scene.touch_events_for(&result);
    scene.tracker.process_touch_events(
        &new_events,
        &lost_events,
        &mut scene.bodies,
        &mut scene.ledger,
    );
    let lists = scene.ledger.update_islands_second_pass();
    scene.pending_second_lists = Some(lists);
}

fn phase_post_island_gen_second_pass(scene: &mut Scene) {
    if let Some(lists) = scene.pending_second_lists.take() {
        debug_assert!(lists.to_wake.is_empty());
        scene.apply_sleep_wake_lists(&lists);
        let retained = scene.ledger.remove_sleeping_pair_contact_managers();
        trace!(retained = retained.len(), "second pass contact managers");
    }
}

/// Pre-solve setup: the articulation resize point, link-state staging,
/// and the batched build of the solver's working set.
fn phase_before_solver(scene: &mut Scene) {
    for articulation in &mut scene.articulations {
        articulation.ensure_capacity();
        articulation.stage_link_state(&scene.bodies);
    }

    let batch = scene.config.bodies_per_task.max(1);
    let merged: Mutex<Vec<BodyId>> = Mutex::new(Vec::new());
    scene.bodies.slots_mut().par_chunks_mut(batch).for_each(|chunk| {
        let mut local = Vec::new();
        for body in chunk.iter().flatten() {
            // Articulation links reach the solver through their
            // articulation, not the rigid working set.
            if body.active && !body.kinematic && body.link_of.is_none() {
                local.push(body.id);
            }
        }
        if !local.is_empty() {
            merged
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(local);
        }
    });
    scene.solver_set = merged.into_inner().unwrap_or_else(PoisonError::into_inner);
    trace!(bodies = scene.solver_set.len(), "solver set");
}

fn phase_update_dynamics(scene: &mut Scene) {
    let dt = scene.dt;
    let report = scene
        .solver
        .solve(dt, &mut scene.bodies, &mut scene.articulations);
    scene.solver_report = Some(report);

    for body in scene.bodies.iter_mut() {
        if !body.active {
            continue;
        }
        body.pose.translation.vector += body.velocity.linear * dt;
        let spin = nalgebra::UnitQuaternion::from_scaled_axis(body.velocity.angular * dt);
        body.pose.rotation = spin * body.pose.rotation;
    }
}

fn phase_ccd_sweep(scene: &mut Scene, pass: u32) {
    if scene.ccd_done {
        return;
    }
    let hits = scene.ccd.sweep(pass, &scene.bodies);
    scene.ccd_states[(pass & 1) as usize].hits = hits;
    if hits == 0 {
        scene.ccd_done = true;
        trace!(pass, "ccd terminated");
    }
}

fn phase_ccd_resolve(scene: &mut Scene, pass: u32) {
    if scene.ccd_done {
        return;
    }
    let hits = scene.ccd_states[(pass & 1) as usize].hits;
    if hits > 0 {
        let dt = scene.dt;
        scene.ccd.resolve(pass, dt, &mut scene.bodies);
    }
}

fn phase_ccd_post(scene: &mut Scene, pass: u32) {
    if scene.ccd_done {
        return;
    }
    if scene.ccd_states[(pass & 1) as usize].hits > 0 {
        scene.bump_report_timestamp();
    }
}

/// After-integration sleep checks, batched per `bodies_per_task` with a
/// once-per-batch merge into shared state.
fn phase_post_solver(scene: &mut Scene) {
    #[derive(Default)]
    struct BatchOut {
        ready: Vec<BodyId>,
        not_ready: Vec<BodyId>,
        changed: BitMap,
    }

    let dt = scene.dt;
    let inv_dt = scene.inv_dt;
    let params = scene.config.sleep_params();
    let batch = scene.config.bodies_per_task.max(1);

    let merged: Mutex<BatchOut> = Mutex::new(BatchOut::default());
    scene
        .bodies
        .slots_mut()
        .par_chunks_mut(batch)
        .enumerate()
        .for_each(|(chunk_index, chunk)| {
            let mut local = BatchOut::default();
            for (offset, slot) in chunk.iter_mut().enumerate() {
                let Some(body) = slot.as_mut() else { continue };
                if !body.active || body.kinematic {
                    continue;
                }
                // Link bodies advance through their articulation's sleep
                // check instead.
                if body.link_of.is_none() {
                    let mut not_ready = false;
                    let wc = body.update_wake_counter(dt, inv_dt, &params, &mut not_ready);
                    if wc == 0.0 {
                        local.ready.push(body.id);
                    } else if not_ready {
                        local.not_ready.push(body.id);
                    }
                }
                let moving = body.velocity.linear.norm_squared()
                    + body.velocity.angular.norm_squared()
                    > 0.0;
                if moving && !body.frozen {
                    local.changed.set(chunk_index * batch + offset);
                }
            }
            // One merge per batch; the lock is never held across body
            // updates.
            let mut shared = merged.lock().unwrap_or_else(PoisonError::into_inner);
            shared.ready.extend(local.ready);
            shared.not_ready.extend(local.not_ready);
            shared.changed.union(&local.changed);
        });

    let out = merged.into_inner().unwrap_or_else(PoisonError::into_inner);
    scene.changed_shapes.union(&out.changed);
    for id in &out.ready {
        if let Some(node) = scene.bodies.get(*id).and_then(|b| b.node) {
            scene.ledger.notify_ready_for_sleeping(node);
        }
    }
    for id in &out.not_ready {
        if let Some(node) = scene.bodies.get(*id).and_then(|b| b.node) {
            scene.ledger.notify_not_ready_for_sleeping(node);
        }
    }

    for articulation in &mut scene.articulations {
        if !articulation.is_active() {
            continue;
        }
        let (wc, not_ready) = articulation.sleep_check(dt, inv_dt, &params, &mut scene.bodies);
        if let Some(node) = articulation.node {
            if wc == 0.0 {
                scene.ledger.notify_ready_for_sleeping(node);
            } else if not_ready {
                scene.ledger.notify_not_ready_for_sleeping(node);
            }
        }
    }
}

fn phase_finalization(scene: &mut Scene) {
    scene.check_constraint_breakage();

    // Mid-step removals drain here, where no phase can observe them.
    let removals = std::mem::take(&mut scene.deferred_removals);
    for id in removals {
        scene.remove_body_now(id);
    }

    scene.ledger.free_buffers();
    scene.ledger.debug_assert_islands_atomic();
    scene.tracker.end_of_frame();
    scene.bump_report_timestamp();
    scene.stepping = false;
}
