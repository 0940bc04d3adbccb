//! Cold Streams
//!
//! A [`Stream`] is only a description: a producer function that is invoked
//! afresh for every subscription. Nothing runs until `observe` is called and
//! any side effect inside the producer repeats once per subscriber.

use std::sync::Arc;

use crate::disposable::{AnyDisposable, CompositeDisposable, SimpleDisposable};

use super::context::ExecutionContext;
use super::observable::{dispatcher, Observable, Sink};

type Producer<E> = dyn Fn(Sink<E>) -> Option<AnyDisposable> + Send + Sync;

/// A cold, re-executing event sequence.
///
/// # Example
///
/// ```rust,ignore
/// let numbers = Stream::new(|sink| {
///     sink(1);
///     sink(2);
///     None
/// });
///
/// numbers.observe(ExecutionContext::immediate(), |n| println!("{n}"));
/// ```
pub struct Stream<E> {
    /// Invoked once per subscription.
    producer: Arc<Producer<E>>,
}

impl<E> Stream<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Create a stream from a producer.
    ///
    /// The producer receives the subscriber's sink and may return a
    /// disposable that stops its work.
    pub fn new<P>(producer: P) -> Self
    where
        P: Fn(Sink<E>) -> Option<AnyDisposable> + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Emit a single event.
    pub fn just(event: E) -> Self {
        Self::new(move |sink| {
            sink(event.clone());
            None
        })
    }

    /// Emit each element of `events` in order.
    pub fn sequence<I>(events: I) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        let events: Vec<E> = events.into_iter().collect();
        Self::new(move |sink| {
            for event in &events {
                sink(event.clone());
            }
            None
        })
    }

    /// A stream that never emits.
    pub fn empty() -> Self {
        Self::new(|_| None)
    }
}

impl<E> Clone for Stream<E> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<E> Observable for Stream<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Event = E;

    fn observe_sink(&self, context: ExecutionContext, sink: Sink<E>) -> AnyDisposable {
        let alive = Arc::new(SimpleDisposable::new());
        let dispatch = dispatcher(context, alive.clone(), sink);

        tracing::trace!("running cold stream producer");
        let upstream = (self.producer)(dispatch);

        let subscription = CompositeDisposable::new();
        subscription.add(alive);
        if let Some(upstream) = upstream {
            subscription.add(upstream);
        }
        Arc::new(subscription)
    }
}

impl<E> std::fmt::Debug for Stream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::{from_fn, Disposable};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn each_subscription_reruns_producer() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let stream = Stream::new(move |sink: Sink<i32>| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            sink(1);
            None
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            stream.observe(ExecutionContext::immediate(), |_| {});
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn sequence_emits_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();

        Stream::sequence(vec![1, 2, 3]).observe(ExecutionContext::immediate(), move |n| {
            log_clone.lock().push(n);
        });

        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn dispose_stops_delivery_and_runs_producer_cleanup() {
        let slot: Arc<Mutex<Option<Sink<i32>>>> = Arc::new(Mutex::new(None));
        let cleaned = Arc::new(AtomicI32::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let slot_clone = slot.clone();
        let cleaned_clone = cleaned.clone();
        let stream = Stream::new(move |sink: Sink<i32>| {
            *slot_clone.lock() = Some(sink);
            let cleaned = cleaned_clone.clone();
            Some(from_fn(move || {
                cleaned.fetch_add(1, Ordering::SeqCst);
            }))
        });

        let log_clone = log.clone();
        let subscription = stream.observe(ExecutionContext::immediate(), move |n| {
            log_clone.lock().push(n);
        });

        let sink = slot.lock().clone().unwrap();
        sink(1);
        subscription.dispose();
        sink(2);

        assert_eq!(*log.lock(), vec![1]);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_hop_through_context() {
        let queue: Arc<Mutex<Vec<crate::reactive::Job>>> = Arc::new(Mutex::new(Vec::new()));
        let queue_clone = queue.clone();
        let context = ExecutionContext::new(move |job| queue_clone.lock().push(job));

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        Stream::just(5).observe(context, move |n| log_clone.lock().push(n));

        assert!(log.lock().is_empty());
        let jobs: Vec<_> = queue.lock().drain(..).collect();
        for job in jobs {
            job();
        }
        assert_eq!(*log.lock(), vec![5]);
    }
}
