//! Store Layer
//!
//! This module holds the engine itself: the locked node map, the index
//! structures derived from it, validation, the query engine with its
//! result cache, and the persistence seam.
//!
//! # Architecture
//!
//! All state lives behind a single `RwLock` inside [`NodeStore`]. A write
//! operation validates against current state, commits the record, updates
//! every derived index, and evicts dependent cache entries before the lock
//! is released, so readers only ever observe fully consistent snapshots.
//!
//! - [`config`] - Store configuration: kind registry, index declarations
//! - `node_store` - CRUD, hierarchy maintenance, index rebuild
//! - `index_manager` - Kind, parent, attribute, and composite indices
//! - `query` - Exact, range, fuzzy, and composite queries over indices
//! - `validation` - Referential and schema checks before commit
//! - [`persistence`] - Snapshot load/flush behind a trait

pub mod config;
mod error;
mod index_manager;
mod node_store;
pub mod persistence;
mod query;
mod validation;

#[cfg(test)]
mod query_test;

pub use config::{Dimension, KindPolicy, KindSpec, StoreConfig};
pub use error::StoreError;
pub use index_manager::{IndexKey, IndexManager};
pub use node_store::NodeStore;
pub use persistence::{JsonFileAdapter, PersistenceAdapter};
pub use query::{FuzzyField, QueryEngine, QuerySpec, QueryStats};
pub use validation::{ValidationEngine, ValidationErrors, ValidationIssue, ValidationResult};
