//! Flattening a task of tasks.
//!
//! Each strategy keeps its bookkeeping in a small shared struct that reacts
//! to the outer task's events. Inner subscriptions live in a per-subscription
//! [`CompositeDisposable`] which is disposed when the aggregate terminates or
//! is cancelled.
//!
//! The aggregate succeeds once the outer task has succeeded and every inner
//! task it started has succeeded too.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::disposable::{AnyDisposable, CompositeDisposable, Disposable, SerialDisposable};
use crate::reactive::{ExecutionContext, Observable};

use super::event::TaskEvent;
use super::task::{Task, TaskSink};

/// How [`Task::flat_map`] flattens the tasks it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlatMapStrategy {
    /// Run every inner task concurrently.
    Merge,

    /// Run inner tasks one at a time, in arrival order.
    Concat,

    /// Cancel the running inner task when a new one arrives.
    Latest,
}

impl<T, E> Task<Task<T, E>, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Run every inner task as it arrives and forward all of their values.
    ///
    /// An inner success is absorbed; the first failure from the outer task
    /// or any inner task ends the aggregate without waiting for the rest.
    pub fn merge(&self) -> Task<T, E> {
        let outer = self.clone();
        Task::new(move |sink| {
            subscribe(
                &outer,
                Merge {
                    output: Output::new(sink),
                    state: Mutex::new(MergeState {
                        active: 0,
                        outer_done: false,
                    }),
                },
            )
        })
    }

    /// Run inner tasks one at a time in arrival order.
    ///
    /// A queued task starts only after the previous one succeeded. A failure
    /// ends the aggregate and abandons the queue.
    pub fn concat(&self) -> Task<T, E> {
        let outer = self.clone();
        Task::new(move |sink| {
            subscribe(
                &outer,
                Concat {
                    output: Output::new(sink),
                    state: Mutex::new(ConcatState {
                        queue: VecDeque::new(),
                        running: false,
                        draining: false,
                        outer_done: false,
                    }),
                },
            )
        })
    }

    /// Keep only the newest inner task running.
    ///
    /// Starting an inner task disposes the previous one, so results from a
    /// superseded task never surface.
    pub fn switch_to_latest(&self) -> Task<T, E> {
        let outer = self.clone();
        Task::new(move |sink| {
            let output = Output::new(sink);
            let current = output.slot();
            subscribe(
                &outer,
                Latest {
                    output,
                    current,
                    state: Mutex::new(LatestState {
                        generation: 0,
                        inner_running: false,
                        outer_done: false,
                    }),
                },
            )
        })
    }
}

impl<T, E> Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Map every value to a task and flatten with `strategy`.
    pub fn flat_map<U, F>(&self, strategy: TaskFlatMapStrategy, transform: F) -> Task<U, E>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Task<U, E> + Send + Sync + 'static,
    {
        let nested = self.map(transform);
        match strategy {
            TaskFlatMapStrategy::Merge => nested.merge(),
            TaskFlatMapStrategy::Concat => nested.concat(),
            TaskFlatMapStrategy::Latest => nested.switch_to_latest(),
        }
    }
}

/// Bookkeeping of one flattening strategy for one subscription.
trait Flatten<T, E>: Send + Sync + Sized + 'static {
    /// Used in log lines.
    const NAME: &'static str;

    fn output(&self) -> &Output<T, E>;

    fn on_outer(self: &Arc<Self>, event: TaskEvent<Task<T, E>, E>);
}

/// Observe `outer` through `flatten`; the returned bag cancels everything.
fn subscribe<T, E, F>(outer: &Task<Task<T, E>, E>, flatten: F) -> Option<AnyDisposable>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Flatten<T, E>,
{
    let flatten = Arc::new(flatten);
    let handler = flatten.clone();
    let subscription = outer.observe_sink(
        ExecutionContext::immediate(),
        Arc::new(move |event| handler.on_outer(event)),
    );

    let bag = flatten.output().bag.clone();
    bag.add(subscription);
    Some(bag as AnyDisposable)
}

/// The aggregate's side of a composition.
struct Output<T, E> {
    /// Aggregate output.
    sink: TaskSink<T, E>,
    /// Outer and inner subscriptions.
    bag: Arc<CompositeDisposable>,
}

impl<T, E> Output<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn new(sink: TaskSink<T, E>) -> Self {
        Self {
            sink,
            bag: Arc::new(CompositeDisposable::new()),
        }
    }

    /// Register a fresh slot for one inner subscription.
    fn slot(&self) -> Arc<SerialDisposable> {
        let slot = Arc::new(SerialDisposable::default());
        self.bag.add(slot.clone());
        slot
    }

    fn fail(&self, strategy: &'static str, error: E) {
        tracing::debug!(strategy, "task composition failed");
        self.sink.failure(error);
        self.bag.dispose();
    }

    fn finish(&self, strategy: &'static str) {
        tracing::debug!(strategy, "task composition succeeded");
        self.sink.success();
        self.bag.dispose();
    }
}

/// Subscribe to `inner` in a fresh slot of `flatten`'s bag.
///
/// Values are forwarded, a failure ends the aggregate and a success is
/// handed to `on_success` after the slot has been released.
fn run_inner<T, E, F, S>(flatten: &Arc<F>, inner: Task<T, E>, on_success: S)
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Flatten<T, E>,
    S: Fn(&Arc<F>) + Send + Sync + 'static,
{
    let slot = flatten.output().slot();
    let this = flatten.clone();
    let finished = slot.clone();
    let subscription = inner.observe_sink(
        ExecutionContext::immediate(),
        Arc::new(move |event| match event {
            TaskEvent::Next(value) => this.output().sink.next(value),
            TaskEvent::Failure(error) => this.output().fail(F::NAME, error),
            TaskEvent::Success => {
                finished.dispose();
                on_success(&this);
            }
        }),
    );
    slot.replace(Some(subscription));
}

struct MergeState {
    /// Inner tasks started but not yet succeeded.
    active: usize,
    /// Whether the outer task has succeeded.
    outer_done: bool,
}

struct Merge<T, E> {
    output: Output<T, E>,
    state: Mutex<MergeState>,
}

impl<T, E> Flatten<T, E> for Merge<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    const NAME: &'static str = "merge";

    fn output(&self) -> &Output<T, E> {
        &self.output
    }

    fn on_outer(self: &Arc<Self>, event: TaskEvent<Task<T, E>, E>) {
        let done = match event {
            TaskEvent::Next(inner) => {
                self.state.lock().active += 1;
                run_inner(self, inner, |this| {
                    let done = {
                        let mut state = this.state.lock();
                        state.active -= 1;
                        state.outer_done && state.active == 0
                    };
                    if done {
                        this.output.finish(Self::NAME);
                    }
                });
                false
            }
            TaskEvent::Failure(error) => {
                self.output.fail(Self::NAME, error);
                false
            }
            TaskEvent::Success => {
                let mut state = self.state.lock();
                state.outer_done = true;
                state.active == 0
            }
        };
        if done {
            self.output.finish(Self::NAME);
        }
    }
}

struct ConcatState<T, E> {
    /// Inner tasks waiting for their turn.
    queue: VecDeque<Task<T, E>>,
    /// Whether an inner task is in flight.
    running: bool,
    /// Whether some call is looping in `run_next`.
    draining: bool,
    /// Whether the outer task has succeeded.
    outer_done: bool,
}

struct Concat<T, E> {
    output: Output<T, E>,
    state: Mutex<ConcatState<T, E>>,
}

impl<T, E> Concat<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Start queued tasks until one stays in flight or the queue is empty.
    ///
    /// Inner tasks that succeed synchronously call back in here; those nested
    /// calls return at once and the outermost call starts the next task, so
    /// the stack does not grow with the queue.
    fn run_next(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let next = {
                let mut state = self.state.lock();
                let next = if state.running {
                    None
                } else {
                    state.queue.pop_front()
                };
                match next {
                    Some(task) => {
                        state.running = true;
                        task
                    }
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            run_inner(self, next, |this| {
                let done = {
                    let mut state = this.state.lock();
                    state.running = false;
                    state.outer_done && state.queue.is_empty()
                };
                if done {
                    this.output.finish(Self::NAME);
                } else {
                    this.run_next();
                }
            });
        }
    }
}

impl<T, E> Flatten<T, E> for Concat<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    const NAME: &'static str = "concat";

    fn output(&self) -> &Output<T, E> {
        &self.output
    }

    fn on_outer(self: &Arc<Self>, event: TaskEvent<Task<T, E>, E>) {
        match event {
            TaskEvent::Next(inner) => {
                self.state.lock().queue.push_back(inner);
                self.run_next();
            }
            TaskEvent::Failure(error) => {
                self.state.lock().queue.clear();
                self.output.fail(Self::NAME, error);
            }
            TaskEvent::Success => {
                let done = {
                    let mut state = self.state.lock();
                    state.outer_done = true;
                    !state.running && state.queue.is_empty()
                };
                if done {
                    self.output.finish(Self::NAME);
                }
            }
        }
    }
}

struct LatestState {
    /// Bumped for every inner task; stale events carry an older id.
    generation: u64,
    /// Whether the newest inner task is still in flight.
    inner_running: bool,
    /// Whether the outer task has succeeded.
    outer_done: bool,
}

struct Latest<T, E> {
    output: Output<T, E>,
    /// Subscription to the newest inner task.
    current: Arc<SerialDisposable>,
    state: Mutex<LatestState>,
}

impl<T, E> Latest<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn start(self: &Arc<Self>, inner: Task<T, E>) {
        let id = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.inner_running = true;
            state.generation
        };
        self.current.replace(None);

        let this = self.clone();
        let subscription = inner.observe_sink(
            ExecutionContext::immediate(),
            Arc::new(move |event| {
                if this.state.lock().generation != id {
                    return;
                }
                match event {
                    TaskEvent::Next(value) => this.output.sink.next(value),
                    TaskEvent::Failure(error) => this.output.fail(Self::NAME, error),
                    TaskEvent::Success => {
                        let done = {
                            let mut state = this.state.lock();
                            state.inner_running = false;
                            state.outer_done
                        };
                        if done {
                            this.output.finish(Self::NAME);
                        }
                    }
                }
            }),
        );

        if self.state.lock().generation == id {
            self.current.replace(Some(subscription));
        } else {
            subscription.dispose();
        }
    }
}

impl<T, E> Flatten<T, E> for Latest<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    const NAME: &'static str = "switch_to_latest";

    fn output(&self) -> &Output<T, E> {
        &self.output
    }

    fn on_outer(self: &Arc<Self>, event: TaskEvent<Task<T, E>, E>) {
        match event {
            TaskEvent::Next(inner) => self.start(inner),
            TaskEvent::Failure(error) => self.output.fail(Self::NAME, error),
            TaskEvent::Success => {
                let done = {
                    let mut state = self.state.lock();
                    state.outer_done = true;
                    !state.inner_running
                };
                if done {
                    self.output.finish(Self::NAME);
                }
            }
        }
    }
}
