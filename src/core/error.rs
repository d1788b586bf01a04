//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// An item with the same key is already held.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    /// The addressed item, queue, unit or quota does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Pop on a heap or queue without items.
    #[error("heap is empty")]
    Empty,
    /// A serialized unit key did not have the expected shape.
    #[error("failed to parse key: {0}")]
    KeyParse(String),
    /// A resource quantity string could not be parsed.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
    /// Startup or runtime configuration problem.
    #[error("configuration error: {0}")]
    Config(String),
    /// The queue was closed or replaced and no longer accepts units.
    #[error("queue closed: {0}")]
    QueueClosed(String),
    /// Failure reported by an external client (update, release, quota listing).
    #[error("client error: {0}")]
    Client(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// Whether this error is the benign "object is gone" condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
