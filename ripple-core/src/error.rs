//! Error types shared across the engine.

use std::any::Any;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Failures surfaced by the core at the point of the offending read.
///
/// Disposal never fails and task failures are carried as values inside
/// [`TaskEvent::Failure`](crate::task::TaskEvent::Failure), so this enum stays small.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The latest value of a hot sequence was read before anything was dispatched.
    #[error("stream has not emitted any event yet")]
    Empty,

    /// A foreign value handed over by a bridge did not have the expected type.
    #[error("value could not be converted to `{expected}`")]
    Conversion { expected: &'static str },
}

/// Convert a type-erased value coming from a foreign callback into `T`.
pub fn downcast<T: Any>(value: Box<dyn Any + Send>) -> Result<T> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| StreamError::Conversion {
            expected: std::any::type_name::<T>(),
        })
}
