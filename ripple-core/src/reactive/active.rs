//! Active Streams
//!
//! An [`ActiveStream`] is the hot, multicast counterpart of
//! [`Stream`](super::Stream). Its producer runs at most once, on the first
//! subscription, and every subscriber shares that execution.
//!
//! # Replay
//!
//! Dispatched events are kept in a sliding window of the last `limit`
//! events. A new subscriber synchronously receives everything in the window
//! before it sees any new event.
//!
//! # Re-entrancy
//!
//! Dispatch to all subscribers happens under the instance lock, so pushes
//! from different threads are serialized. An event pushed from inside a
//! running dispatch on the same instance (for example by a subscriber) still
//! lands in the replay window, but its fan-out is dropped, not queued.
//!
//! # Ownership
//!
//! While at least one subscriber is attached the instance keeps a strong
//! handle to itself, so the producer stays alive even if every external
//! handle is dropped. When the count returns to zero the self-handle is
//! released; once the instance is unreachable the producer's disposable is
//! disposed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::disposable::{from_fn, AnyDisposable, CompositeDisposable, Disposable, SimpleDisposable};
use crate::error::{Result, StreamError};

use super::context::ExecutionContext;
use super::observable::{dispatcher, Bindable, Observable, Sink};

type Producer<E> = Box<dyn FnOnce(Sink<E>) -> Option<AnyDisposable> + Send>;

/// How many past events an [`ActiveStream`] replays to new subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayLimit {
    /// Keep every event.
    #[default]
    Unbounded,

    /// Keep only the most recent `n` events.
    Last(usize),
}

impl ReplayLimit {
    fn exceeded_by(self, len: usize) -> bool {
        match self {
            ReplayLimit::Unbounded => false,
            ReplayLimit::Last(limit) => len > limit,
        }
    }
}

struct State<E> {
    /// Replay window, oldest first.
    buffer: VecDeque<E>,
    /// Current subscribers keyed by token, in subscription order.
    observers: IndexMap<u64, Sink<E>>,
    /// Token handed to the next subscriber.
    next_token: u64,
}

struct Shared<E> {
    /// How much of the past new subscribers get replayed.
    limit: ReplayLimit,
    /// Buffer and subscribers.
    state: ReentrantMutex<RefCell<State<E>>>,
    /// Set while a fan-out is running.
    dispatching: AtomicBool,
    /// Number of attached subscribers.
    subscribers: AtomicUsize,
    /// Strong self-handle, present while `subscribers > 0`.
    keep_alive: Mutex<Option<Arc<Shared<E>>>>,
    /// Producer waiting for the first subscriber.
    producer: Mutex<Option<Producer<E>>>,
    /// Cancels the running producer.
    producer_disposable: Mutex<Option<AnyDisposable>>,
}

type StateGuard<'a, E> = ReentrantMutexGuard<'a, RefCell<State<E>>>;

/// Clears the dispatch flag when the fan-out finishes, even on unwind.
struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<E> Shared<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn next(&self, event: E) {
        // Other threads wait here; only the dispatching thread gets past the
        // lock while the flag is set.
        let guard = self.state.lock();
        self.append_and_dispatch(&guard, event);
    }

    /// Derive the next event from the latest buffered one, atomically with
    /// respect to other threads.
    fn next_from_latest<F>(&self, derive: F) -> Result<()>
    where
        F: FnOnce(&E) -> E,
    {
        let guard = self.state.lock();
        let latest = guard.borrow().buffer.back().cloned();
        let latest = latest.ok_or(StreamError::Empty)?;
        self.append_and_dispatch(&guard, derive(&latest));
        Ok(())
    }

    fn append_and_dispatch(&self, guard: &StateGuard<'_, E>, event: E) {
        {
            let mut state = guard.borrow_mut();
            state.buffer.push_back(event.clone());
            while self.limit.exceeded_by(state.buffer.len()) {
                state.buffer.pop_front();
            }
        }

        if self.dispatching.swap(true, Ordering::AcqRel) {
            tracing::debug!("dispatch already in progress, buffered event without fan-out");
            return;
        }
        let _dispatch = DispatchGuard(&self.dispatching);

        let observers: Vec<Sink<E>> = guard.borrow().observers.values().cloned().collect();
        for observer in observers {
            observer(event.clone());
        }
    }

    fn remove(&self, token: u64) {
        let released = {
            let guard = self.state.lock();
            let removed = guard.borrow_mut().observers.shift_remove(&token).is_some();

            if removed && self.subscribers.fetch_sub(1, Ordering::AcqRel) == 1 {
                tracing::trace!(token, "last subscriber left, releasing self-hold");
                self.keep_alive.lock().take()
            } else {
                None
            }
        };

        // Dropped outside the lock: this may be the final strong handle.
        drop(released);
    }
}

impl<E> Drop for Shared<E> {
    fn drop(&mut self) {
        if let Some(disposable) = self.producer_disposable.get_mut().take() {
            tracing::trace!("active stream unreachable, disposing producer");
            disposable.dispose();
        }
    }
}

/// A hot, buffering, multicast event sequence.
///
/// Clones are handles to the same instance.
///
/// # Example
///
/// ```rust,ignore
/// let clicks = ActiveStream::with_limit(ReplayLimit::Last(1));
/// clicks.next("first");
///
/// // Replays "first" immediately.
/// clicks.observe(ExecutionContext::immediate(), |c| println!("{c}"));
/// ```
pub struct ActiveStream<E> {
    inner: Arc<Shared<E>>,
}

impl<E> ActiveStream<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// An unbounded stream with no producer; events come from [`next`](Self::next).
    pub fn new() -> Self {
        Self::with_limit(ReplayLimit::Unbounded)
    }

    /// A stream with no producer and the given replay window.
    pub fn with_limit(limit: ReplayLimit) -> Self {
        Self::build(limit, None)
    }

    /// A stream fed by `producer`, which runs once on the first subscription.
    pub fn from_producer<P>(limit: ReplayLimit, producer: P) -> Self
    where
        P: FnOnce(Sink<E>) -> Option<AnyDisposable> + Send + 'static,
    {
        Self::build(limit, Some(Box::new(producer)))
    }

    /// Share one subscription to `source` among all subscribers.
    pub fn from_observable<O>(limit: ReplayLimit, source: O) -> Self
    where
        O: Observable<Event = E>,
    {
        Self::from_producer(limit, move |sink| {
            Some(source.observe_sink(ExecutionContext::immediate(), sink))
        })
    }

    fn build(limit: ReplayLimit, producer: Option<Producer<E>>) -> Self {
        Self {
            inner: Arc::new(Shared {
                limit,
                state: ReentrantMutex::new(RefCell::new(State {
                    buffer: VecDeque::new(),
                    observers: IndexMap::new(),
                    next_token: 0,
                })),
                dispatching: AtomicBool::new(false),
                subscribers: AtomicUsize::new(0),
                keep_alive: Mutex::new(None),
                producer: Mutex::new(producer),
                producer_disposable: Mutex::new(None),
            }),
        }
    }

    /// Buffer `event` and deliver it to every current subscriber.
    pub fn next(&self, event: E) {
        self.inner.next(event);
    }

    /// Push the event derived from the most recently buffered one.
    ///
    /// Reading and pushing happen under one lock, so concurrent callers never
    /// lose an update. Fails with [`StreamError::Empty`] when nothing has
    /// been buffered.
    pub fn next_from_latest<F>(&self, derive: F) -> Result<()>
    where
        F: FnOnce(&E) -> E,
    {
        self.inner.next_from_latest(derive)
    }

    /// The most recently buffered event.
    pub fn value(&self) -> Result<E> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state.buffer.back().cloned().ok_or(StreamError::Empty)
    }

    /// Snapshot of the replay window, oldest first.
    pub fn buffered(&self) -> Vec<E> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state.buffer.iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> ReplayLimit {
        self.inner.limit
    }

    fn start_producer(&self) {
        let producer = self.inner.producer.lock().take();
        let Some(producer) = producer else {
            return;
        };

        tracing::trace!("first subscriber attached, starting producer");
        let weak: Weak<Shared<E>> = Arc::downgrade(&self.inner);
        let disposable = producer(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.next(event);
            }
        }));
        *self.inner.producer_disposable.lock() = disposable;
    }
}

impl<E> Default for ActiveStream<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ActiveStream<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Bindable<E> for ActiveStream<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// A sink that pushes into this stream until `disconnect` is disposed.
    ///
    /// The sink holds only a weak handle, so it never keeps the stream alive.
    fn sink(&self, disconnect: &CompositeDisposable) -> Sink<E> {
        let connected = Arc::new(SimpleDisposable::new());
        disconnect.add(connected.clone());

        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |event| {
            if connected.is_disposed() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.next(event);
            }
        })
    }
}

impl<E> Observable for ActiveStream<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Event = E;

    fn observe_sink(&self, context: ExecutionContext, sink: Sink<E>) -> AnyDisposable {
        let alive = Arc::new(SimpleDisposable::new());
        let dispatch = dispatcher(context, alive.clone(), sink);

        let token = {
            let guard = self.inner.state.lock();
            let (token, replay) = {
                let mut state = guard.borrow_mut();
                let token = state.next_token;
                state.next_token += 1;
                (token, state.buffer.iter().cloned().collect::<Vec<_>>())
            };

            for event in replay {
                dispatch(event);
            }

            guard.borrow_mut().observers.insert(token, dispatch);
            let subscribers = self.inner.subscribers.fetch_add(1, Ordering::AcqRel) + 1;
            if subscribers == 1 {
                *self.inner.keep_alive.lock() = Some(Arc::clone(&self.inner));
            }
            tracing::trace!(token, subscribers, "subscriber attached");
            token
        };

        self.start_producer();

        let weak = Arc::downgrade(&self.inner);
        from_fn(move || {
            alive.dispose();
            if let Some(inner) = weak.upgrade() {
                inner.remove(token);
            }
        })
    }
}

impl<E> std::fmt::Debug for ActiveStream<E>
where
    E: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStream")
            .field("limit", &self.limit())
            .field("buffered", &self.buffered())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn recorder<E: Clone + Send + 'static>() -> (Arc<Mutex<Vec<E>>>, impl Fn(E) + Send + Sync) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        (log, move |event| log_clone.lock().push(event))
    }

    #[test]
    fn replays_buffer_to_late_subscriber() {
        let stream = ActiveStream::new();
        stream.next(1);
        stream.next(2);

        let (log, sink) = recorder();
        let _subscription = stream.observe(ExecutionContext::immediate(), sink);
        stream.next(3);

        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn limit_keeps_sliding_window() {
        let stream = ActiveStream::with_limit(ReplayLimit::Last(2));
        for i in 1..=5 {
            stream.next(i);
        }

        assert_eq!(stream.buffered(), vec![4, 5]);

        let (log, sink) = recorder();
        let _subscription = stream.observe(ExecutionContext::immediate(), sink);
        assert_eq!(*log.lock(), vec![4, 5]);
    }

    #[test]
    fn value_reads_latest_or_fails_when_empty() {
        let stream: ActiveStream<i32> = ActiveStream::new();
        assert_eq!(stream.value(), Err(StreamError::Empty));

        stream.next(9);
        stream.next(10);
        assert_eq!(stream.value(), Ok(10));
    }

    #[test]
    fn producer_runs_once_for_many_subscribers() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let stream = ActiveStream::from_producer(ReplayLimit::Unbounded, move |sink: Sink<i32>| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            sink(1);
            sink(2);
            None
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let (first, sink) = recorder();
        let _a = stream.observe(ExecutionContext::immediate(), sink);
        let (second, sink) = recorder();
        let _b = stream.observe(ExecutionContext::immediate(), sink);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(*first.lock(), vec![1, 2]);
        assert_eq!(*second.lock(), vec![1, 2]);
    }

    #[test]
    fn dispose_detaches_single_subscriber() {
        let stream = ActiveStream::new();
        let (first, sink) = recorder();
        let a = stream.observe(ExecutionContext::immediate(), sink);
        let (second, sink) = recorder();
        let _b = stream.observe(ExecutionContext::immediate(), sink);
        assert_eq!(stream.subscriber_count(), 2);

        stream.next(1);
        a.dispose();
        a.dispose();
        stream.next(2);

        assert_eq!(stream.subscriber_count(), 1);
        assert_eq!(*first.lock(), vec![1]);
        assert_eq!(*second.lock(), vec![1, 2]);
    }

    #[test]
    fn reentrant_next_is_buffered_but_not_delivered() {
        let stream = ActiveStream::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner = stream.clone();
        let log_clone = log.clone();
        let _subscription = stream.observe(ExecutionContext::immediate(), move |n: i32| {
            log_clone.lock().push(n);
            if n < 100 {
                inner.next(n + 100);
            }
        });

        stream.next(1);
        stream.next(2);

        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(stream.buffered(), vec![1, 101, 2, 102]);
        assert_eq!(stream.value(), Ok(102));

        // Late subscribers replay the re-entrant events too.
        let (late, sink) = recorder();
        let _late = stream.observe(ExecutionContext::immediate(), sink);
        assert_eq!(*late.lock(), vec![1, 101, 2, 102]);
    }

    #[test]
    fn next_from_latest_derives_from_window() {
        let stream = ActiveStream::with_limit(ReplayLimit::Last(1));
        assert_eq!(stream.next_from_latest(|n: &i32| n + 1), Err(StreamError::Empty));

        stream.next(1);
        stream.next_from_latest(|n| n * 10).unwrap();
        assert_eq!(stream.value(), Ok(10));
    }

    #[test]
    fn subscriber_keeps_instance_alive_until_disposed() {
        let cleaned = Arc::new(AtomicI32::new(0));
        let cleaned_clone = cleaned.clone();
        let slot: Arc<Mutex<Option<Sink<i32>>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();

        let stream = ActiveStream::from_producer(ReplayLimit::Unbounded, move |sink: Sink<i32>| {
            *slot_clone.lock() = Some(sink);
            Some(from_fn(move || {
                cleaned_clone.fetch_add(1, Ordering::SeqCst);
            }))
        });

        let (log, sink) = recorder();
        let subscription = stream.observe(ExecutionContext::immediate(), sink);
        drop(stream);

        // Still alive through the self-hold.
        let producer_sink = slot.lock().clone().unwrap();
        producer_sink(7);
        assert_eq!(*log.lock(), vec![7]);
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);

        subscription.dispose();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);

        // Nothing left to deliver to.
        producer_sink(8);
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn external_handle_keeps_producer_after_last_unsubscribe() {
        let cleaned = Arc::new(AtomicI32::new(0));
        let cleaned_clone = cleaned.clone();

        let stream = ActiveStream::from_producer(ReplayLimit::Unbounded, move |_: Sink<i32>| {
            Some(from_fn(move || {
                cleaned_clone.fetch_add(1, Ordering::SeqCst);
            }))
        });

        let subscription = stream.observe(ExecutionContext::immediate(), |_| {});
        subscription.dispose();
        assert_eq!(stream.subscriber_count(), 0);
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);

        drop(stream);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sink_stops_after_disconnect() {
        let stream = ActiveStream::new();
        let disconnect = CompositeDisposable::new();
        let sink = stream.sink(&disconnect);

        sink(1);
        disconnect.dispose();
        sink(2);

        assert_eq!(stream.buffered(), vec![1]);
    }

    #[test]
    fn subscriber_may_subscribe_during_dispatch() {
        let stream = ActiveStream::new();
        let late = Arc::new(Mutex::new(Vec::new()));
        let held = Arc::new(Mutex::new(Vec::new()));

        let inner = stream.clone();
        let late_clone = late.clone();
        let held_clone = held.clone();
        let _subscription = stream.observe(ExecutionContext::immediate(), move |n: i32| {
            if n == 1 {
                let late = late_clone.clone();
                let subscription = inner.observe(ExecutionContext::immediate(), move |m| {
                    late.lock().push(m);
                });
                held_clone.lock().push(subscription);
            }
        });

        stream.next(1);
        stream.next(2);

        assert_eq!(*late.lock(), vec![1, 2]);
    }
}
