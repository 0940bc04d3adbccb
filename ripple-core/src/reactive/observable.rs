//! The sequence capability shared by every event source.

use std::sync::Arc;

use crate::disposable::{AnyDisposable, CompositeDisposable, Disposable};

use super::context::ExecutionContext;

/// A callback accepting one event.
pub type Sink<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Anything that can deliver a sequence of events to observers.
///
/// Platform bridges implement this to turn foreign callback registration
/// into a sequence; the combinators in [`ObservableExt`](super::ObservableExt)
/// work over any implementor.
pub trait Observable: Send + Sync + 'static {
    type Event: Clone + Send + Sync + 'static;

    /// Register `sink` to receive events through `context`.
    ///
    /// Disposing the returned handle detaches exactly this registration.
    fn observe_sink(&self, context: ExecutionContext, sink: Sink<Self::Event>) -> AnyDisposable;

    /// Closure flavour of [`observe_sink`](Self::observe_sink).
    fn observe<F>(&self, context: ExecutionContext, sink: F) -> AnyDisposable
    where
        F: Fn(Self::Event) + Send + Sync + 'static,
        Self: Sized,
    {
        self.observe_sink(context, Arc::new(sink))
    }
}

/// A destination that events can be bound into.
///
/// Hot sequences hand out a sink that stays connected until `disconnect` is
/// disposed; one-way bindings tie `disconnect` to the lifetime of whatever
/// owns the binding.
pub trait Bindable<E>: Send + Sync {
    fn sink(&self, disconnect: &CompositeDisposable) -> Sink<E>;
}

/// Wrap `sink` so every event hops through `context` and nothing is
/// delivered once `alive` has been disposed.
pub(crate) fn dispatcher<E, D>(context: ExecutionContext, alive: Arc<D>, sink: Sink<E>) -> Sink<E>
where
    E: Send + 'static,
    D: Disposable + 'static,
{
    if context.is_immediate() {
        return Arc::new(move |event| {
            if !alive.is_disposed() {
                sink(event);
            }
        });
    }

    Arc::new(move |event| {
        if alive.is_disposed() {
            return;
        }
        let alive = alive.clone();
        let sink = sink.clone();
        context.execute(move || {
            if !alive.is_disposed() {
                sink(event);
            }
        });
    })
}
