//! Closure-backed disposable.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;

use super::Disposable;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Runs its cleanup closure exactly once, on the first `dispose`.
///
/// The closure runs synchronously while the instance lock is held. The lock
/// is re-entrant, so the closure may dispose this same handle again; that
/// nested call finds the closure already taken and returns.
pub struct ActionDisposable {
    disposed: AtomicBool,
    /// Taken on the first `dispose`.
    action: ReentrantMutex<RefCell<Option<Cleanup>>>,
}

impl ActionDisposable {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            disposed: AtomicBool::new(false),
            action: ReentrantMutex::new(RefCell::new(Some(Box::new(action)))),
        }
    }
}

impl Disposable for ActionDisposable {
    fn dispose(&self) {
        let guard = self.action.lock();
        let action = guard.borrow_mut().take();

        if let Some(action) = action {
            self.disposed.store(true, Ordering::Release);
            action();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ActionDisposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    #[test]
    fn action_runs_exactly_once() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let disposable = ActionDisposable::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!disposable.is_disposed());

        for _ in 0..5 {
            disposable.dispose();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(disposable.is_disposed());
    }

    #[test]
    fn action_may_dispose_itself() {
        let count = Arc::new(AtomicI32::new(0));
        let slot: Arc<parking_lot::Mutex<Option<Arc<ActionDisposable>>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let count_clone = count.clone();
        let slot_clone = slot.clone();
        let disposable = Arc::new(ActionDisposable::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
            let me = slot_clone.lock().clone();
            if let Some(me) = me {
                assert!(me.is_disposed());
                me.dispose();
            }
        }));
        *slot.lock() = Some(disposable.clone());

        disposable.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_dispose_runs_once() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let disposable = Arc::new(ActionDisposable::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let disposable = disposable.clone();
                std::thread::spawn(move || disposable.dispose())
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
