//! Combinators
//!
//! Every operator here returns a cold [`Stream`] that wraps the upstream's
//! `observe`. Nothing runs until the result is observed, and each
//! subscription to the result makes its own subscription upstream.
//!
//! Upstreams are always observed on the immediate context; the subscriber's
//! own context is applied once, at the outermost stream.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::disposable::{AnyDisposable, CompositeDisposable, Disposable, SerialDisposable};

use super::active::{ActiveStream, ReplayLimit};
use super::context::ExecutionContext;
use super::observable::{Bindable, Observable, Sink};
use super::scheduler::Scheduler;
use super::stream::Stream;

/// How a stream of streams is flattened by [`ObservableExt::flat_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatMapStrategy {
    /// Forward events from every inner stream as they arrive.
    Merge,

    /// Only forward events from the most recent inner stream.
    Latest,
}

fn immediate() -> ExecutionContext {
    ExecutionContext::immediate()
}

/// Cold stream that hands each upstream event to a step built per subscription.
fn relay<O, U, M, F>(source: O, make_step: M) -> Stream<U>
where
    O: Observable,
    U: Clone + Send + Sync + 'static,
    M: Fn() -> F + Send + Sync + 'static,
    F: Fn(O::Event, &Sink<U>) + Send + Sync + 'static,
{
    Stream::new(move |sink: Sink<U>| {
        let step = make_step();
        Some(source.observe_sink(
            immediate(),
            Arc::new(move |event| step(event, &sink)),
        ))
    })
}

/// Transformations available on every cloneable [`Observable`].
pub trait ObservableExt: Observable + Clone + Sized {
    fn map<U, F>(&self, transform: F) -> Stream<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(Self::Event) -> U + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        relay(self.clone(), move || {
            let transform = transform.clone();
            move |event: Self::Event, sink: &Sink<U>| sink(transform(event))
        })
    }

    fn filter<F>(&self, predicate: F) -> Stream<Self::Event>
    where
        F: Fn(&Self::Event) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        relay(self.clone(), move || {
            let predicate = predicate.clone();
            move |event: Self::Event, sink: &Sink<Self::Event>| {
                if predicate(&event) {
                    sink(event);
                }
            }
        })
    }

    /// Observe the upstream through `context`, so downstream work runs there.
    fn switch_to(&self, context: ExecutionContext) -> Stream<Self::Event> {
        let source = self.clone();
        Stream::new(move |sink| Some(source.observe_sink(context.clone(), sink)))
    }

    /// Pair every event with the one before it.
    fn zip_previous(&self) -> Stream<(Option<Self::Event>, Self::Event)> {
        relay(self.clone(), || {
            let previous = Mutex::new(None::<Self::Event>);
            move |event: Self::Event, sink: &Sink<(Option<Self::Event>, Self::Event)>| {
                let prior = previous.lock().replace(event.clone());
                sink((prior, event));
            }
        })
    }

    /// Drop the first `count` events.
    fn skip(&self, count: usize) -> Stream<Self::Event> {
        relay(self.clone(), move || {
            let remaining = AtomicUsize::new(count);
            move |event: Self::Event, sink: &Sink<Self::Event>| {
                let skipped = remaining
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok();
                if !skipped {
                    sink(event);
                }
            }
        })
    }

    /// Forward the first `count` events, then detach from the upstream.
    fn take(&self, count: usize) -> Stream<Self::Event> {
        let source = self.clone();
        Stream::new(move |sink: Sink<Self::Event>| {
            if count == 0 {
                return None;
            }

            let upstream = Arc::new(SerialDisposable::default());

            let taken = AtomicUsize::new(0);
            let stop = upstream.clone();
            let subscription = source.observe_sink(
                immediate(),
                Arc::new(move |event| {
                    let seen = taken.fetch_add(1, Ordering::AcqRel);
                    if seen < count {
                        sink(event);
                    }
                    if seen + 1 >= count {
                        stop.dispose();
                    }
                }),
            );
            upstream.replace(Some(subscription));
            Some(upstream as AnyDisposable)
        })
    }

    /// Emit `event` to each subscriber before anything from upstream.
    fn start_with(&self, event: Self::Event) -> Stream<Self::Event> {
        let source = self.clone();
        Stream::new(move |sink: Sink<Self::Event>| {
            sink(event.clone());
            Some(source.observe_sink(immediate(), sink))
        })
    }

    /// Combine the latest event of both sides once each side has emitted.
    fn combine_latest_with<O>(&self, other: &O) -> Stream<(Self::Event, O::Event)>
    where
        O: Observable + Clone,
    {
        let left = self.clone();
        let right = other.clone();
        Stream::new(move |sink: Sink<(Self::Event, O::Event)>| {
            let latest = Arc::new(Mutex::new((None::<Self::Event>, None::<O::Event>)));
            let subscription = CompositeDisposable::new();

            let left_latest = latest.clone();
            let left_sink = sink.clone();
            subscription.add(left.observe_sink(
                immediate(),
                Arc::new(move |a: Self::Event| {
                    let pair = {
                        let mut latest = left_latest.lock();
                        latest.0 = Some(a.clone());
                        latest.1.clone().map(|b| (a, b))
                    };
                    if let Some(pair) = pair {
                        left_sink(pair);
                    }
                }),
            ));

            subscription.add(right.observe_sink(
                immediate(),
                Arc::new(move |b: O::Event| {
                    let pair = {
                        let mut latest = latest.lock();
                        latest.1 = Some(b.clone());
                        latest.0.clone().map(|a| (a, b))
                    };
                    if let Some(pair) = pair {
                        sink(pair);
                    }
                }),
            ));

            Some(Arc::new(subscription) as AnyDisposable)
        })
    }

    /// Flatten a stream of streams by forwarding every inner event.
    fn merge(&self) -> Stream<<Self::Event as Observable>::Event>
    where
        Self::Event: Observable,
    {
        let source = self.clone();
        Stream::new(move |sink: Sink<<Self::Event as Observable>::Event>| {
            let subscription = Arc::new(CompositeDisposable::new());
            let inner_subscriptions = subscription.clone();

            let outer = source.observe_sink(
                immediate(),
                Arc::new(move |inner: Self::Event| {
                    inner_subscriptions.add(inner.observe_sink(immediate(), sink.clone()));
                }),
            );
            subscription.add(outer);

            Some(subscription as AnyDisposable)
        })
    }

    /// Flatten a stream of streams, keeping only the newest inner stream.
    ///
    /// The previous inner subscription is disposed as soon as a new one
    /// arrives, so late events from it never surface.
    fn switch_to_latest(&self) -> Stream<<Self::Event as Observable>::Event>
    where
        Self::Event: Observable,
    {
        let source = self.clone();
        Stream::new(move |sink: Sink<<Self::Event as Observable>::Event>| {
            let current = Arc::new(SerialDisposable::default());
            let generation = Arc::new(AtomicU64::new(0));

            let slot = current.clone();
            let outer = source.observe_sink(
                immediate(),
                Arc::new(move |inner: Self::Event| {
                    let id = generation.fetch_add(1, Ordering::AcqRel) + 1;
                    slot.replace(None);

                    let sink = sink.clone();
                    let live = generation.clone();
                    let subscription = inner.observe_sink(
                        immediate(),
                        Arc::new(move |event| {
                            if live.load(Ordering::Acquire) == id {
                                sink(event);
                            }
                        }),
                    );

                    if generation.load(Ordering::Acquire) == id {
                        slot.replace(Some(subscription));
                    } else {
                        subscription.dispose();
                    }
                }),
            );

            Some(Arc::new(CompositeDisposable::with_children([
                outer,
                current as AnyDisposable,
            ])) as AnyDisposable)
        })
    }

    /// Map each event to a stream and flatten with `strategy`.
    fn flat_map<U, F>(&self, strategy: FlatMapStrategy, transform: F) -> Stream<U::Event>
    where
        U: Observable + Clone,
        F: Fn(Self::Event) -> U + Send + Sync + 'static,
    {
        let mapped = self.map(transform);
        match strategy {
            FlatMapStrategy::Merge => mapped.merge(),
            FlatMapStrategy::Latest => mapped.switch_to_latest(),
        }
    }

    /// Suppress events equal to the one immediately before them.
    fn distinct(&self) -> Stream<Self::Event>
    where
        Self::Event: PartialEq,
    {
        relay(self.clone(), || {
            let last = Mutex::new(None::<Self::Event>);
            move |event: Self::Event, sink: &Sink<Self::Event>| {
                let changed = {
                    let mut last = last.lock();
                    if last.as_ref() == Some(&event) {
                        false
                    } else {
                        *last = Some(event.clone());
                        true
                    }
                };
                if changed {
                    sink(event);
                }
            }
        })
    }

    /// Unwrap `Some` events and drop `None`s.
    fn ignore_nil<T>(&self) -> Stream<T>
    where
        Self: Observable<Event = Option<T>>,
        T: Clone + Send + Sync + 'static,
    {
        relay(self.clone(), || {
            |event: Option<T>, sink: &Sink<T>| {
                if let Some(value) = event {
                    sink(value);
                }
            }
        })
    }

    /// Emit at most one event per `interval`: the latest one seen.
    ///
    /// The first event of a quiet period arms a timer; later events replace
    /// the pending one; when the timer fires the pending event is emitted and
    /// the timer re-arms. A timer that fires with nothing pending disarms
    /// instead of repeating the last value.
    fn throttle<S>(&self, interval: Duration, scheduler: S) -> Stream<Self::Event>
    where
        S: Scheduler + 'static,
    {
        let source = self.clone();
        let scheduler = Arc::new(scheduler);
        Stream::new(move |sink: Sink<Self::Event>| {
            let throttle = Arc::new(Throttle {
                interval,
                scheduler: scheduler.clone(),
                sink,
                state: Mutex::new(ThrottleState {
                    pending: None,
                    armed: false,
                }),
                timer: Arc::new(SerialDisposable::default()),
            });

            let timer = throttle.timer.clone();
            let upstream = source.observe_sink(
                immediate(),
                Arc::new(move |event| throttle.push(event)),
            );

            Some(Arc::new(CompositeDisposable::with_children([
                upstream,
                timer as AnyDisposable,
            ])) as AnyDisposable)
        })
    }

    /// Shift every event later by `interval`.
    fn delay<S>(&self, interval: Duration, scheduler: S) -> Stream<Self::Event>
    where
        S: Scheduler + 'static,
    {
        let source = self.clone();
        let scheduler = Arc::new(scheduler);
        Stream::new(move |sink: Sink<Self::Event>| {
            let timers = Arc::new(CompositeDisposable::new());

            let scheduler = scheduler.clone();
            let pending = timers.clone();
            let upstream = source.observe_sink(
                immediate(),
                Arc::new(move |event| {
                    let slot = Arc::new(SerialDisposable::default());
                    pending.add(slot.clone());

                    let sink = sink.clone();
                    let finished = slot.clone();
                    slot.replace(Some(scheduler.schedule_after(
                        interval,
                        Box::new(move || {
                            sink(event);
                            finished.dispose();
                        }),
                    )));
                }),
            );

            Some(Arc::new(CompositeDisposable::with_children([
                upstream,
                timers as AnyDisposable,
            ])) as AnyDisposable)
        })
    }

    /// Share one upstream subscription among many subscribers.
    fn share(&self, limit: ReplayLimit) -> ActiveStream<Self::Event> {
        ActiveStream::from_observable(limit, self.clone())
    }

    /// Push every event into `target` until the returned handle is disposed.
    fn bind_to<B>(&self, target: &B) -> AnyDisposable
    where
        B: Bindable<Self::Event>,
    {
        let binding = Arc::new(CompositeDisposable::new());
        let sink = target.sink(&binding);
        binding.add(self.observe_sink(immediate(), sink));
        binding
    }
}

impl<O> ObservableExt for O where O: Observable + Clone {}

struct ThrottleState<E> {
    /// Latest event not yet emitted.
    pending: Option<E>,
    /// Whether a flush is scheduled.
    armed: bool,
}

struct Throttle<E, S> {
    /// Minimum spacing between emissions.
    interval: Duration,
    scheduler: Arc<S>,
    /// Downstream.
    sink: Sink<E>,
    state: Mutex<ThrottleState<E>>,
    /// The scheduled flush, if any.
    timer: Arc<SerialDisposable>,
}

impl<E, S> Throttle<E, S>
where
    E: Clone + Send + Sync + 'static,
    S: Scheduler + 'static,
{
    fn push(self: &Arc<Self>, event: E) {
        let arm = {
            let mut state = self.state.lock();
            state.pending = Some(event);
            !std::mem::replace(&mut state.armed, true)
        };
        if arm {
            self.arm();
        }
    }

    fn arm(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = self.scheduler.schedule_after(
            self.interval,
            Box::new(move || {
                if let Some(throttle) = weak.upgrade() {
                    throttle.flush();
                }
            }),
        );
        self.timer.replace(Some(handle));
    }

    fn flush(self: &Arc<Self>) {
        let pending = {
            let mut state = self.state.lock();
            let pending = state.pending.take();
            if pending.is_none() {
                state.armed = false;
            }
            pending
        };

        if let Some(event) = pending {
            self.arm();
            (self.sink)(event);
        }
    }
}
