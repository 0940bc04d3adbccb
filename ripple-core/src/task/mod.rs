//! Tasks
//!
//! A [`Task`] is an event sequence for asynchronous work with an explicit
//! outcome. Its events are [`TaskEvent`]s: any number of `Next` values
//! followed by exactly one terminal `Success` or `Failure`. Nothing is
//! delivered after the terminal event.
//!
//! # Composition
//!
//! A task whose values are themselves tasks can be flattened three ways:
//!
//! - [`merge`](Task::merge): run every inner task as it arrives.
//! - [`concat`](Task::concat): run inner tasks one after another, in order.
//! - [`switch_to_latest`](Task::switch_to_latest): only the newest inner task
//!   is live; starting one cancels the previous.
//!
//! All three propagate the first failure immediately. None of them retry;
//! retry is the caller's business and is done by observing again.

mod compose;
mod event;
#[allow(clippy::module_inception)]
mod task;

pub use compose::TaskFlatMapStrategy;
pub use event::TaskEvent;
pub use task::{Task, TaskSink};
