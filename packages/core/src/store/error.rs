//! Store Error Types
//!
//! One taxonomy covers every failure the store surfaces to callers.
//! Validation and not-found errors are recoverable and returned directly;
//! `DuplicateId` and `IndexCorruption` are bug-level conditions that are
//! logged and never silently swallowed.

use crate::store::validation::ValidationErrors;
use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Requested id does not exist
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Internal invariant violation: ids are store-assigned, so a collision
    /// should be unreachable. Logged and rejected, never absorbed.
    #[error("Duplicate node id: {id}")]
    DuplicateId { id: String },

    /// Pre-commit validation failed; the store is unchanged and the caller
    /// may retry with corrected input
    #[error("Node validation failed: {0}")]
    Validation(ValidationErrors),

    /// Delete without cascade on a node that still has children
    #[error("Node {id} has {child_count} children; pass cascade=true or detach them first")]
    HasChildren { id: String, child_count: usize },

    /// Secondary indices have diverged from the canonical node map.
    /// Queries refuse to serve until a rebuild completes; writes against
    /// the canonical map continue to be accepted.
    #[error("Index corruption detected ({context}); rebuild required before queries are served")]
    IndexCorruption { context: String },

    /// Reserved for optimistic-concurrency extensions; not produced by the
    /// current single-writer paths
    #[error("Concurrent modification conflict on node {id}")]
    ConcurrentModification { id: String },

    /// Query cannot be answered by the declared indices
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Store configuration rejected at construction time
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Persistence adapter failure (load or flush)
    #[error("Persistence adapter failed: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a duplicate-id error
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Create a has-children error
    pub fn has_children(id: impl Into<String>, child_count: usize) -> Self {
        Self::HasChildren {
            id: id.into(),
            child_count,
        }
    }

    /// Create an index-corruption error
    pub fn index_corruption(context: impl Into<String>) -> Self {
        Self::IndexCorruption {
            context: context.into(),
        }
    }

    /// Create an unsupported-query error
    pub fn unsupported_query(msg: impl Into<String>) -> Self {
        Self::UnsupportedQuery(msg.into())
    }

    /// Create an invalid-configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
