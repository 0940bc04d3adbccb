//! The task type and its guarded sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::disposable::AnyDisposable;
use crate::reactive::{ExecutionContext, Observable, ObservableExt, Sink, Stream};

use super::event::TaskEvent;

/// Producer-side handle of a task subscription.
///
/// Enforces the task state machine: once `failure` or `success` has been
/// sent, everything else sent through this sink is ignored.
pub struct TaskSink<T, E> {
    /// Subscriber-side sink of the underlying stream.
    sink: Sink<TaskEvent<T, E>>,
    /// Set once a terminal event went through; shared by clones.
    completed: Arc<AtomicBool>,
}

impl<T, E> Clone for TaskSink<T, E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            completed: Arc::clone(&self.completed),
        }
    }
}

impl<T, E> TaskSink<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn new(sink: Sink<TaskEvent<T, E>>) -> Self {
        Self {
            sink,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn send(&self, event: TaskEvent<T, E>) {
        if event.is_terminal() {
            if self.completed.swap(true, Ordering::AcqRel) {
                return;
            }
        } else if self.completed.load(Ordering::Acquire) {
            return;
        }

        (self.sink)(event);
    }

    pub fn next(&self, value: T) {
        self.send(TaskEvent::Next(value));
    }

    pub fn failure(&self, error: E) {
        self.send(TaskEvent::Failure(error));
    }

    pub fn success(&self) {
        self.send(TaskEvent::Success);
    }

    /// Whether a terminal event has been sent.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// A cold sequence of values ending in success or failure.
///
/// Like [`Stream`], the producer runs again for every subscription.
///
/// # Example
///
/// ```rust,ignore
/// let fetch = Task::new(|sink: TaskSink<String, FetchError>| {
///     sink.next("payload".to_string());
///     sink.success();
///     None
/// });
///
/// fetch.observe(ExecutionContext::immediate(), |event| match event {
///     TaskEvent::Next(body) => println!("{body}"),
///     TaskEvent::Failure(err) => eprintln!("{err}"),
///     TaskEvent::Success => println!("done"),
/// });
/// ```
pub struct Task<T, E> {
    stream: Stream<TaskEvent<T, E>>,
}

impl<T, E> Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a task from a producer.
    ///
    /// Each subscription gets its own [`TaskSink`].
    pub fn new<P>(producer: P) -> Self
    where
        P: Fn(TaskSink<T, E>) -> Option<AnyDisposable> + Send + Sync + 'static,
    {
        Self {
            stream: Stream::new(move |sink| producer(TaskSink::new(sink))),
        }
    }

    /// Adopt any sequence of task events, enforcing the terminal rule on it.
    pub fn from_observable<O>(source: O) -> Self
    where
        O: Observable<Event = TaskEvent<T, E>>,
    {
        Self::new(move |sink| {
            Some(source.observe_sink(
                ExecutionContext::immediate(),
                Arc::new(move |event| sink.send(event)),
            ))
        })
    }

    /// Emit `value`, then succeed.
    pub fn just(value: T) -> Self {
        Self::new(move |sink| {
            sink.next(value.clone());
            sink.success();
            None
        })
    }

    /// Succeed without a value.
    pub fn succeeded() -> Self {
        Self::new(|sink| {
            sink.success();
            None
        })
    }

    /// Fail immediately with `error`.
    pub fn failed(error: E) -> Self {
        Self::new(move |sink| {
            sink.failure(error.clone());
            None
        })
    }

    /// Observe only the `Next` values.
    pub fn observe_next<F>(&self, context: ExecutionContext, on_next: F) -> AnyDisposable
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.observe(context, move |event| {
            if let TaskEvent::Next(value) = event {
                on_next(value);
            }
        })
    }

    /// Observe only the failure, if one happens.
    pub fn observe_error<F>(&self, context: ExecutionContext, on_error: F) -> AnyDisposable
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        self.observe(context, move |event| {
            if let TaskEvent::Failure(error) = event {
                on_error(error);
            }
        })
    }

    pub fn map<U, F>(&self, transform: F) -> Task<U, E>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Task {
            stream: self.stream.map(move |event| event.map(&transform)),
        }
    }

    pub fn map_error<G, F>(&self, transform: F) -> Task<T, G>
    where
        G: Clone + Send + Sync + 'static,
        F: Fn(E) -> G + Send + Sync + 'static,
    {
        Task {
            stream: self.stream.map(move |event| event.map_error(&transform)),
        }
    }

    /// The values of this task as a plain stream; the outcome is dropped.
    pub fn into_stream(self) -> Stream<T> {
        self.stream.map(|event| event.value().cloned()).ignore_nil()
    }
}

impl<T, E> Clone for Task<T, E> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<T, E> Observable for Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Event = TaskEvent<T, E>;

    fn observe_sink(&self, context: ExecutionContext, sink: Sink<TaskEvent<T, E>>) -> AnyDisposable {
        self.stream.observe_sink(context, sink)
    }
}

impl<T, E> std::fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
