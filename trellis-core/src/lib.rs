//! Trellis Core
//!
//! This crate provides a fine-grained reactive computation engine. It
//! implements:
//!
//! - Reactive primitives (signals, computeds, effects, effect scopes)
//! - A push-pull dependency graph with lazy, glitch-free updates
//! - Batching and an ordered effect queue
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Dependency graph, propagation algorithms and the scheduler
//! - `reactive`: Thread-local runtime and the user-facing primitives
//! - `error`: Errors reported by the runtime
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_core::reactive::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Computed::new(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = {
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     Effect::new(move || log.borrow_mut().push((count.get(), doubled.get())))
//! };
//!
//! // Update the signal
//! count.set(5);
//! // Effect ran again
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result};
