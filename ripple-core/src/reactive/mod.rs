//! Reactive Primitives
//!
//! This module implements the event-propagation core: cold and hot
//! sequences, the contexts they deliver on, and the combinators that
//! compose them.
//!
//! # Concepts
//!
//! ## Streams
//!
//! A [`Stream`] is cold. It wraps a producer function and runs it again for
//! every subscriber, so side effects inside the producer repeat per
//! subscription.
//!
//! ## Active Streams
//!
//! An [`ActiveStream`] is hot. It runs its producer once, multicasts every
//! event to all current subscribers, and replays a window of recent events
//! to newcomers. [`Property`] builds a current-value holder on top of it.
//!
//! ## Contexts and Schedulers
//!
//! Each `observe` call takes an [`ExecutionContext`] that decides where the
//! subscriber's callbacks run. Time-based operators take a [`Scheduler`].
//!
//! # Data Flow
//!
//! Producers push events forward through the sink chain to the observers
//! registered at the moment of the push; disposables flow backward as
//! cancellation handles.

mod active;
mod context;
mod observable;
mod operators;
mod property;
mod scheduler;
mod stream;

pub use active::{ActiveStream, ReplayLimit};
pub use context::{ExecutionContext, Job};
pub use observable::{Bindable, Observable, Sink};
pub use operators::{FlatMapStrategy, ObservableExt};
pub use property::Property;
pub use scheduler::{Scheduler, ThreadScheduler, TokioScheduler, VirtualScheduler};
pub use stream::Stream;
