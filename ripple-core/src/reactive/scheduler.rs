//! Delayed Work
//!
//! Time-based operators such as `throttle` and `delay` need "run this later".
//! A [`Scheduler`] provides exactly that and hands back a disposable that
//! cancels the pending job.
//!
//! [`VirtualScheduler`] keeps its own clock and only runs jobs when told to
//! advance, which makes time-dependent pipelines deterministic under test.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::disposable::{from_fn, AnyDisposable, Disposable, SimpleDisposable};

use super::context::Job;

/// Runs jobs after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `job` once `delay` has elapsed, unless the returned handle is
    /// disposed first.
    fn schedule_after(&self, delay: Duration, job: Job) -> AnyDisposable;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule_after(&self, delay: Duration, job: Job) -> AnyDisposable {
        (**self).schedule_after(delay, job)
    }
}

/// Sleeps on a freshly spawned OS thread per job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> AnyDisposable {
        let cancelled = Arc::new(SimpleDisposable::new());
        let flag = cancelled.clone();

        let spawned = std::thread::Builder::new()
            .name("ripple-timer".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                if !flag.is_disposed() {
                    job();
                }
            });

        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn timer thread, job dropped");
        }

        cancelled
    }
}

/// Sleeps with `tokio::time` on the given runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime of the calling task.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> AnyDisposable {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            job();
        });
        from_fn(move || task.abort())
    }
}

struct Pending {
    job: Job,
    /// Disposed when the caller cancels the job.
    cancelled: Arc<SimpleDisposable>,
}

#[derive(Default)]
struct VirtualClock {
    /// Virtual time elapsed since creation.
    now: Duration,
    /// Submission counter, used to break ties between equal due times.
    sequence: u64,
    // Keyed by (due time, submission order) so ties run first-in first-out.
    pending: BTreeMap<(Duration, u64), Pending>,
}

/// A manually driven clock for deterministic tests.
#[derive(Default)]
pub struct VirtualScheduler {
    clock: Mutex<VirtualClock>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Jobs waiting to run, cancelled ones included.
    pub fn pending_count(&self) -> usize {
        self.clock.lock().pending.len()
    }

    /// Move the clock forward by `by`, running every job that falls due in
    /// order. Jobs scheduled while advancing run too if they fall inside the
    /// window.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.lock().now + by;

        loop {
            let due = {
                let mut clock = self.clock.lock();
                let next_key = clock
                    .pending
                    .keys()
                    .next()
                    .copied()
                    .filter(|(due, _)| *due <= target);

                match next_key {
                    Some(key) => {
                        clock.now = key.0;
                        clock.pending.remove(&key)
                    }
                    None => None,
                }
            };

            match due {
                Some(pending) if !pending.cancelled.is_disposed() => (pending.job)(),
                Some(_) => continue,
                None => break,
            }
        }

        self.clock.lock().now = target;
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_after(&self, delay: Duration, job: Job) -> AnyDisposable {
        let cancelled = Arc::new(SimpleDisposable::new());
        let mut clock = self.clock.lock();
        let key = (clock.now + delay, clock.sequence);
        clock.sequence += 1;
        clock.pending.insert(
            key,
            Pending {
                job,
                cancelled: cancelled.clone(),
            },
        );
        cancelled
    }
}
