//! Disposables
//!
//! A disposable is a cancellation handle. It starts out active and moves to
//! disposed exactly once; the cleanup it carries runs on that transition and
//! never again. Every other part of the engine hands these back from
//! `observe` so callers can tear down in-flight work.
//!
//! # Variants
//!
//! - [`SimpleDisposable`]: just the flag.
//! - [`ActionDisposable`]: runs a closure once.
//! - [`CompositeDisposable`]: disposes a group of children together.
//! - [`SerialDisposable`]: holds at most one live child, replacing disposes the old one.
//! - [`DisposeOnDrop`]: also disposes when its owner goes away.
//!
//! # Re-entrancy
//!
//! State changes happen under a `parking_lot::ReentrantMutex`, so a cleanup
//! action may call back into `dispose` (its own or a parent's) on the same
//! thread without deadlocking.

mod action;
mod composite;
mod serial;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use action::ActionDisposable;
pub use composite::CompositeDisposable;
pub use serial::SerialDisposable;

/// A handle that cancels some piece of work.
///
/// `dispose` must be idempotent and safe to call from anywhere, including
/// from inside the cleanup it triggers.
pub trait Disposable: Send + Sync {
    /// Cancel the work. Only the first call has an effect.
    fn dispose(&self);

    /// Whether `dispose` has been called.
    fn is_disposed(&self) -> bool;
}

/// Shared, type-erased disposable as handed out by `observe`.
pub type AnyDisposable = Arc<dyn Disposable>;

/// Wrap a closure into a shared disposable.
pub fn from_fn<F>(action: F) -> AnyDisposable
where
    F: FnOnce() + Send + 'static,
{
    Arc::new(ActionDisposable::new(action))
}

/// A disposable with no cleanup, only the disposed flag.
#[derive(Debug, Default)]
pub struct SimpleDisposable {
    disposed: AtomicBool,
}

impl SimpleDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> AnyDisposable {
        Arc::new(Self::new())
    }
}

impl Disposable for SimpleDisposable {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Ties disposal of the wrapped handle to the end-of-life of this value.
///
/// Store one inside an object and everything added to it is torn down when
/// the object is dropped, even if nobody calls `dispose` explicitly.
pub struct DisposeOnDrop {
    inner: AnyDisposable,
}

impl DisposeOnDrop {
    pub fn new(inner: AnyDisposable) -> Self {
        Self { inner }
    }

    /// The wrapped handle.
    pub fn inner(&self) -> &AnyDisposable {
        &self.inner
    }
}

impl Disposable for DisposeOnDrop {
    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl Drop for DisposeOnDrop {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for DisposeOnDrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposeOnDrop")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Convenience adapters available on every shared disposable.
pub trait DisposableExt {
    /// Dispose this handle when the returned guard is dropped.
    fn dispose_on_drop(self) -> DisposeOnDrop;

    /// Register this handle with a composite so it is torn down with it.
    fn dispose_in(self, bag: &CompositeDisposable);
}

impl DisposableExt for AnyDisposable {
    fn dispose_on_drop(self) -> DisposeOnDrop {
        DisposeOnDrop::new(self)
    }

    fn dispose_in(self, bag: &CompositeDisposable) {
        bag.add(self);
    }
}
