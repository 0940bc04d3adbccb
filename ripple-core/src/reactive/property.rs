//! Property
//!
//! A [`Property`] holds a current value and announces changes to it. It is a
//! thin layer over an [`ActiveStream`] with a replay window of one, so every
//! new observer starts from the current value.

use std::sync::Arc;

use crate::disposable::{AnyDisposable, CompositeDisposable, Disposable, SimpleDisposable};
use crate::error::Result;

use super::active::{ActiveStream, ReplayLimit};
use super::context::ExecutionContext;
use super::observable::{Bindable, Observable, Sink};

/// A mutable value that can be observed.
///
/// The replay window is the only copy of the value, so `get` always agrees
/// with what a new observer is replayed.
///
/// # Example
///
/// ```rust,ignore
/// let name = Property::new("anonymous".to_string());
/// name.observe(ExecutionContext::immediate(), |n| println!("name: {n}"));
/// name.set("ada".to_string());
/// ```
pub struct Property<T> {
    /// Change stream whose single buffered event is the current value.
    stream: ActiveStream<T>,
}

impl<T> Property<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let stream = ActiveStream::with_limit(ReplayLimit::Last(1));
        stream.next(initial);
        Self { stream }
    }

    /// The current value.
    pub fn get(&self) -> Result<T> {
        self.stream.value()
    }

    /// Replace the value and notify observers.
    ///
    /// A `set` made from inside an observer of this same property becomes
    /// the current value but is not dispatched again.
    pub fn set(&self, value: T) {
        self.stream.next(value);
    }

    /// Derive the next value from the current one.
    ///
    /// `f` runs under the property's lock: concurrent updates never
    /// interleave, and `f` may read this property.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.stream.next_from_latest(f)
    }

    /// The underlying change stream.
    pub fn stream(&self) -> &ActiveStream<T> {
        &self.stream
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<T> Observable for Property<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Event = T;

    fn observe_sink(&self, context: ExecutionContext, sink: Sink<T>) -> AnyDisposable {
        self.stream.observe_sink(context, sink)
    }
}

impl<T> Bindable<T> for Property<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bound values go through [`set`](Property::set), so `get` stays current.
    fn sink(&self, disconnect: &CompositeDisposable) -> Sink<T> {
        let connected = Arc::new(SimpleDisposable::new());
        disconnect.add(connected.clone());

        let property = self.clone();
        Arc::new(move |value| {
            if !connected.is_disposed() {
                property.set(value);
            }
        })
    }
}

impl<T> std::fmt::Debug for Property<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get().ok())
            .field("subscriber_count", &self.stream.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn observer_starts_from_current_value() {
        let property = Property::new(1);
        property.set(2);

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let _subscription = property.observe(ExecutionContext::immediate(), move |v| {
            log_clone.lock().push(v);
        });

        property.update(|v| v * 10).unwrap();

        assert_eq!(*log.lock(), vec![2, 20]);
        assert_eq!(property.get(), Ok(20));
    }

    #[test]
    fn binding_updates_value() {
        use crate::reactive::{ActiveStream, ObservableExt};

        let source = ActiveStream::new();
        let property = Property::new(0);
        let binding = source.bind_to(&property);

        source.next(5);
        assert_eq!(property.get(), Ok(5));

        binding.dispose();
        source.next(6);
        assert_eq!(property.get(), Ok(5));
    }

    #[test]
    fn clones_share_value() {
        let a = Property::new(String::from("a"));
        let b = a.clone();
        b.set(String::from("b"));

        assert_eq!(a.get(), Ok(String::from("b")));
        assert_eq!(a.stream().value(), Ok(String::from("b")));
    }

    #[test]
    fn reentrant_set_becomes_current_value() {
        let property = Property::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = property.clone();
        let seen_clone = seen.clone();
        let _subscription = property.observe(ExecutionContext::immediate(), move |v: i32| {
            seen_clone.lock().push(v);
            if v == 1 {
                inner.set(2);
            }
        });

        property.set(1);

        assert_eq!(*seen.lock(), vec![0, 1]);
        assert_eq!(property.get(), Ok(2));
        assert_eq!(property.stream().value(), Ok(2));

        let replayed = Arc::new(Mutex::new(Vec::new()));
        let replayed_clone = replayed.clone();
        let _late = property.observe(ExecutionContext::immediate(), move |v| {
            replayed_clone.lock().push(v);
        });
        assert_eq!(*replayed.lock(), vec![2]);
    }

    #[test]
    fn update_may_read_the_property() {
        let property = Property::new(3);
        let reader = property.clone();
        property
            .update(|v| v + reader.get().unwrap_or_default())
            .unwrap();
        assert_eq!(property.get(), Ok(6));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let property = Property::new(0);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let property = property.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        property.update(|v| v + 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(property.get(), Ok(1000));
    }
}
