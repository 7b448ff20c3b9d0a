//! Reference-counted task-graph scheduler.
//!
//! A [`TaskGraph`] is a per-frame DAG of work items. Each task carries an
//! internal fan-in counter equal to its number of prerequisites; finishing a
//! task decrements the counter of every dependent, and a dependent that
//! reaches zero is handed to the worker pool. No task ever blocks a worker
//! waiting on another — "waiting" is expressed purely as not being runnable
//! yet. The only synchronous wait is [`TaskGraph::run`] itself, which returns
//! once the whole graph has drained.
//!
//! The graph is intended to be rebuilt (cheaply) every frame: build, wire,
//! run, drop.
//!
//! # Example
//!
//! ```
//! use sim_task::TaskGraph;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
//! let counter = AtomicU32::new(0);
//!
//! let mut graph = TaskGraph::new();
//! let a = graph.spawn("a", || { counter.fetch_add(1, Ordering::SeqCst); }, &[]);
//! let b = graph.spawn("b", || { counter.fetch_add(1, Ordering::SeqCst); }, &[a]);
//! let _c = graph.spawn("c", || { counter.fetch_add(1, Ordering::SeqCst); }, &[a, b]);
//! graph.run(&pool).unwrap();
//!
//! assert_eq!(counter.load(Ordering::SeqCst), 3);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tracing::trace;

/// Errors reported by the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The graph contains a dependency cycle: `unresolved` tasks never
    /// became runnable. Wiring a cycle is a caller bug, but `run` is the
    /// one place it is cheaply detectable.
    #[error("task graph contains a cycle: {unresolved} task(s) never ran")]
    Cycle {
        /// Number of tasks left with a nonzero fan-in counter.
        unresolved: usize,
    },
}

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Opaque handle to a task within one [`TaskGraph`].
///
/// Handles are only meaningful for the graph that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(usize);

type Work<'env> = Box<dyn FnOnce() + Send + 'env>;

struct Node<'env> {
    name: &'static str,
    work: Option<Work<'env>>,
    /// Number of prerequisites that must finish before this task runs.
    pending: usize,
    dependents: Vec<usize>,
}

/// A directed acyclic graph of one-shot work items.
///
/// The lifetime parameter allows tasks to borrow from the environment that
/// builds the graph; [`TaskGraph::run`] blocks until every task finished, so
/// the borrows never escape.
#[derive(Default)]
pub struct TaskGraph<'env> {
    nodes: Vec<Node<'env>>,
}

impl<'env> TaskGraph<'env> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of tasks in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a task that runs after every task in `depends_on` completed.
    ///
    /// `name` shows up in trace logs only. Duplicate handles in
    /// `depends_on` count once each; passing a handle from another graph
    /// is a caller bug and panics on an out-of-range index.
    pub fn spawn<F>(&mut self, name: &'static str, f: F, depends_on: &[TaskHandle]) -> TaskHandle
    where
        F: FnOnce() + Send + 'env,
    {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name,
            work: Some(Box::new(f)),
            pending: 0,
            dependents: Vec::new(),
        });
        for &dep in depends_on {
            self.add_dependency(TaskHandle(idx), dep);
        }
        TaskHandle(idx)
    }

    /// Make `task` wait for `prereq` as well.
    ///
    /// Used to splice extra fan-in after both tasks exist (sibling
    /// sub-pipelines joining a common continuation).
    pub fn add_dependency(&mut self, task: TaskHandle, prereq: TaskHandle) {
        assert!(task.0 < self.nodes.len() && prereq.0 < self.nodes.len());
        assert_ne!(task.0, prereq.0, "task cannot depend on itself");
        self.nodes[task.0].pending += 1;
        self.nodes[prereq.0].dependents.push(task.0);
    }

    /// Execute the graph to completion on `pool`.
    ///
    /// Tasks whose fan-in counter is zero are seeded immediately; every
    /// completion decrements its dependents and spawns those that reach
    /// zero. Returns once all tasks ran.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Cycle`] if any task never became runnable.
    ///
    /// # Panics
    ///
    /// Propagates panics from task bodies (via the pool).
    pub fn run(self, pool: &rayon::ThreadPool) -> Result<()> {
        let total = self.nodes.len();
        if total == 0 {
            return Ok(());
        }

        let mut work = Vec::with_capacity(total);
        let mut pending = Vec::with_capacity(total);
        let mut dependents = Vec::with_capacity(total);
        let mut names = Vec::with_capacity(total);
        for node in self.nodes {
            work.push(Mutex::new(node.work));
            pending.push(AtomicUsize::new(node.pending));
            dependents.push(node.dependents);
            names.push(node.name);
        }
        let executed = AtomicUsize::new(0);
        let rt = Runtime {
            work,
            pending,
            dependents,
            names,
            executed,
        };

        pool.scope(|scope| {
            for idx in 0..total {
                if rt.pending[idx].load(Ordering::Relaxed) == 0 {
                    spawn_task(&rt, scope, idx);
                }
            }
        });

        let ran = rt.executed.load(Ordering::Relaxed);
        if ran == total {
            Ok(())
        } else {
            Err(TaskError::Cycle {
                unresolved: total - ran,
            })
        }
    }
}

struct Runtime<'env> {
    work: Vec<Mutex<Option<Work<'env>>>>,
    pending: Vec<AtomicUsize>,
    dependents: Vec<Vec<usize>>,
    names: Vec<&'static str>,
    executed: AtomicUsize,
}

fn spawn_task<'a, 'scope>(rt: &'a Runtime<'_>, scope: &rayon::Scope<'scope>, idx: usize)
where
    'a: 'scope,
{
    scope.spawn(move |scope| {
        // A slot is taken at most once: each task reaches pending == 0 exactly
        // once, so an empty slot here would mean a wiring bug upstream.
        let slot = rt.work[idx].lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        let Some(work) = slot else { return };
        trace!(task = rt.names[idx], "running");
        work();
        rt.executed.fetch_add(1, Ordering::Relaxed);

        for &dep in &rt.dependents[idx] {
            if rt.pending[dep].fetch_sub(1, Ordering::AcqRel) == 1 {
                spawn_task(rt, scope, dep);
            }
        }
    });
}
