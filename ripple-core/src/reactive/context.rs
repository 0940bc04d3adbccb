//! Execution Context
//!
//! An execution context decides where and when a callback runs. The engine
//! never schedules work on its own; every `observe` call is handed a context
//! and each event delivered to that subscriber goes through it.
//!
//! # Provided Contexts
//!
//! - `immediate`: run synchronously on the calling thread.
//! - `serial`: a dedicated background thread draining a FIFO queue.
//! - `tokio`: spawn each callback onto a tokio runtime.
//! - `new`: wrap any "run this job" function, e.g. a UI main-thread hop.

use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

/// A unit of work handed to a context.
pub type Job = Box<dyn FnOnce() + Send>;

#[derive(Clone)]
enum Kind {
    Immediate,
    Custom(Arc<dyn Fn(Job) + Send + Sync>),
}

/// Where a subscriber's callbacks run.
///
/// Cheap to clone; clones share the same underlying executor.
#[derive(Clone)]
pub struct ExecutionContext {
    kind: Kind,
}

impl ExecutionContext {
    /// Run callbacks synchronously on whichever thread produced the event.
    pub fn immediate() -> Self {
        Self {
            kind: Kind::Immediate,
        }
    }

    /// Wrap a scheduling function.
    pub fn new<F>(schedule: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Custom(Arc::new(schedule)),
        }
    }

    /// Run callbacks one at a time, in submission order, on a named
    /// background thread.
    ///
    /// The thread exits once every clone of the returned context is dropped
    /// and the queue has drained.
    pub fn serial(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                tracing::trace!("serial execution context drained");
            })?;

        let sender = Mutex::new(sender);
        Ok(Self::new(move |job| {
            if sender.lock().send(job).is_err() {
                tracing::warn!("serial execution context is gone, dropping job");
            }
        }))
    }

    /// Spawn each callback as a task on the given tokio runtime.
    pub fn tokio(handle: tokio::runtime::Handle) -> Self {
        Self::new(move |job| {
            handle.spawn(async move { job() });
        })
    }

    /// Run `job` in this context.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.kind {
            Kind::Immediate => job(),
            Kind::Custom(schedule) => schedule(Box::new(job)),
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self.kind, Kind::Immediate)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::immediate()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Kind::Immediate => f.write_str("ExecutionContext::Immediate"),
            Kind::Custom(_) => f.write_str("ExecutionContext::Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    #[test]
    fn immediate_runs_inline() {
        let ran = Arc::new(AtomicI32::new(0));
        let ran_clone = ran.clone();

        ExecutionContext::immediate().execute(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(ExecutionContext::default().is_immediate());
    }

    #[test]
    fn custom_context_receives_jobs() {
        let queue: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));
        let queue_clone = queue.clone();
        let context = ExecutionContext::new(move |job| queue_clone.lock().push(job));

        let ran = Arc::new(AtomicI32::new(0));
        let ran_clone = ran.clone();
        context.execute(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Deferred until we drain the queue ourselves.
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let jobs: Vec<Job> = queue.lock().drain(..).collect();
        for job in jobs {
            job();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn serial_context_preserves_order() {
        let context = ExecutionContext::serial("ripple-test-serial").unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let log = log.clone();
            context.execute(move || log.lock().push(i));
        }
        context.execute(move || done_tx.send(()).unwrap());

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn tokio_context_spawns_on_runtime() {
        let context = ExecutionContext::tokio(tokio::runtime::Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();

        context.execute(move || {
            let _ = tx.send(7);
        });

        assert_eq!(rx.await.unwrap(), 7);
    }
}
