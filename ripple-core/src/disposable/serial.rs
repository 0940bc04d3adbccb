//! Single-slot replacement chain.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;

use super::{AnyDisposable, Disposable};

/// Holds at most one live child.
///
/// Installing a new child disposes the outgoing one first. Once the serial
/// disposable itself is disposed, anything handed to it is disposed instead
/// of installed.
pub struct SerialDisposable {
    disposed: AtomicBool,
    current: ReentrantMutex<RefCell<Option<AnyDisposable>>>,
}

impl SerialDisposable {
    pub fn new(initial: Option<AnyDisposable>) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            current: ReentrantMutex::new(RefCell::new(initial)),
        }
    }

    /// Swap in `child`, disposing whatever was there before.
    pub fn replace(&self, child: Option<AnyDisposable>) {
        let guard = self.current.lock();

        if self.disposed.load(Ordering::Acquire) {
            if let Some(child) = child {
                child.dispose();
            }
            return;
        }

        let previous = guard.borrow_mut().take();
        if let Some(previous) = previous {
            previous.dispose();
        }

        // The outgoing cleanup may have disposed us.
        if self.disposed.load(Ordering::Acquire) {
            if let Some(child) = child {
                child.dispose();
            }
            return;
        }

        *guard.borrow_mut() = child;
    }

    /// The currently installed child, if any.
    pub fn current(&self) -> Option<AnyDisposable> {
        self.current.lock().borrow().clone()
    }
}

impl Default for SerialDisposable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Disposable for SerialDisposable {
    fn dispose(&self) {
        let guard = self.current.lock();

        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let current = guard.borrow_mut().take();
        if let Some(current) = current {
            current.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SerialDisposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
