//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive data layer.
//! It implements:
//!
//! - Disposables for tracking and cancelling in-flight work
//! - Cold streams that re-run their producer per subscription
//! - Hot, multicast streams with bounded replay and subscriber-driven teardown
//! - Tasks: event sequences with an explicit success/failure outcome
//! - An LCS sequence diff for describing collection changes
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `disposable`: Cancellation handles and their composites
//! - `reactive`: Execution contexts, schedulers, streams and combinators
//! - `task`: Asynchronous operations and their compositions
//! - `diff`: Edit scripts and collection change events
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{ActiveStream, ExecutionContext, Observable, ObservableExt, ReplayLimit};
//! use std::sync::{Arc, Mutex};
//!
//! // Create a hot stream that replays its latest event
//! let count = ActiveStream::with_limit(ReplayLimit::Last(1));
//! count.next(1);
//!
//! // Derive a stream and observe it
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let log = seen.clone();
//! let _subscription = count
//!     .map(|n| n * 2)
//!     .observe(ExecutionContext::immediate(), move |n| log.lock().unwrap().push(n));
//!
//! // Push another event
//! count.next(5);
//! assert_eq!(*seen.lock().unwrap(), vec![2, 10]);
//! ```

pub mod diff;
pub mod disposable;
pub mod error;
pub mod reactive;
pub mod task;

pub use error::{Result, StreamError};
