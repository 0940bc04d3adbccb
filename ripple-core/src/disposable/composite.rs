//! Group disposal.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;
use smallvec::SmallVec;

use super::{AnyDisposable, Disposable};

type Children = SmallVec<[AnyDisposable; 4]>;

/// Disposes all of its children together.
///
/// Children added after the composite was disposed are disposed on the spot
/// and never retained.
pub struct CompositeDisposable {
    disposed: AtomicBool,
    /// Retained children; emptied on dispose.
    children: ReentrantMutex<RefCell<Children>>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self {
            disposed: AtomicBool::new(false),
            children: ReentrantMutex::new(RefCell::new(SmallVec::new())),
        }
    }

    pub fn with_children<I>(children: I) -> Self
    where
        I: IntoIterator<Item = AnyDisposable>,
    {
        Self {
            disposed: AtomicBool::new(false),
            children: ReentrantMutex::new(RefCell::new(children.into_iter().collect())),
        }
    }

    /// Retain `child` until this composite is disposed.
    ///
    /// Children that were already disposed on their own are pruned here.
    pub fn add(&self, child: AnyDisposable) {
        let guard = self.children.lock();

        if self.disposed.load(Ordering::Acquire) {
            child.dispose();
            return;
        }

        let mut children = guard.borrow_mut();
        children.retain(|existing| !existing.is_disposed());
        children.push(child);
    }

    /// Number of retained children that are still live.
    pub fn len(&self) -> usize {
        let guard = self.children.lock();
        let children = guard.borrow();
        children.iter().filter(|child| !child.is_disposed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CompositeDisposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for CompositeDisposable {
    fn dispose(&self) {
        let guard = self.children.lock();

        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let children = std::mem::take(&mut *guard.borrow_mut());
        for child in children {
            child.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CompositeDisposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeDisposable")
            .field("disposed", &self.is_disposed())
            .field("children", &self.len())
            .finish()
    }
}
