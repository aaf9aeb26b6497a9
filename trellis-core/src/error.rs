//! Error types for the reactive runtime.
//!
//! Most failures in a reactive program come from user code (a getter or an
//! effect panicking) and unwind straight through the engine. The variants
//! here cover misuse of the runtime itself.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors reported by the reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed was read while its own getter was running.
    #[error("computed {node:?} was read while it was being recomputed")]
    CyclicRead { node: NodeId },

    /// `end_batch` was called more often than `start_batch`.
    #[error("end_batch called without a matching start_batch")]
    UnbalancedBatch,

    /// `Runtime::init` was called after the thread's runtime already existed.
    #[error("the reactive runtime for this thread is already initialised")]
    AlreadyInitialized,
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
