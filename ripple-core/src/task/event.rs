//! Task event variants.

/// One event of a [`Task`](super::Task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent<T, E> {
    /// A produced value. May repeat.
    Next(T),

    /// The task failed. Terminal.
    Failure(E),

    /// The task finished. Terminal.
    Success,
}

impl<T, E> TaskEvent<T, E> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Next(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TaskEvent::Next(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            TaskEvent::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> TaskEvent<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            TaskEvent::Next(value) => TaskEvent::Next(f(value)),
            TaskEvent::Failure(error) => TaskEvent::Failure(error),
            TaskEvent::Success => TaskEvent::Success,
        }
    }

    pub fn map_error<G, F>(self, f: F) -> TaskEvent<T, G>
    where
        F: FnOnce(E) -> G,
    {
        match self {
            TaskEvent::Next(value) => TaskEvent::Next(value),
            TaskEvent::Failure(error) => TaskEvent::Failure(f(error)),
            TaskEvent::Success => TaskEvent::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(!TaskEvent::<i32, ()>::Next(1).is_terminal());
        assert!(TaskEvent::<i32, ()>::Success.is_terminal());
        assert!(TaskEvent::<i32, &str>::Failure("boom").is_terminal());
    }

    #[test]
    fn map_touches_only_matching_variant() {
        let next: TaskEvent<i32, &str> = TaskEvent::Next(2);
        assert_eq!(next.map(|v| v * 3), TaskEvent::Next(6));

        let failure: TaskEvent<i32, &str> = TaskEvent::Failure("bad");
        assert_eq!(failure.clone().map(|v| v * 3), TaskEvent::Failure("bad"));
        assert_eq!(failure.map_error(str::len), TaskEvent::Failure(3));
        assert_eq!(TaskEvent::<i32, &str>::Success.value(), None);
    }
}
