//! Nodeverse Core Engine
//!
//! This crate provides the centralized node store for the Nodeverse
//! knowledge system: a single authoritative in-memory map of typed nodes
//! with derived indices, validated writes, and cached queries.
//!
//! # Architecture
//!
//! - **Single source of truth**: one locked node map; every index and
//!   cache entry is derived state that can be rebuilt from it
//! - **Validated commits**: referential integrity (parents, cycles) and
//!   per-kind attribute schemas are checked before any write lands
//! - **Dimension-keyed indices**: kind, parent, declared attributes, and
//!   declared composite pairs, maintained incrementally on every write
//! - **Conservative cache invalidation**: cached query results are keyed
//!   by the dimensions they depend on and evicted eagerly on writes
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, attribute values, patches)
//! - [`store`] - The engine: store core, indices, queries, validation,
//!   persistence
//!
//! # Examples
//!
//! ```
//! use nodeverse_core::models::CreateNodeParams;
//! use nodeverse_core::store::{NodeStore, StoreConfig};
//!
//! let store = NodeStore::new(StoreConfig::permissive()).unwrap();
//! let folder = store
//!     .create(CreateNodeParams {
//!         kind: "folder".to_string(),
//!         name: "Projects".to_string(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//! assert!(store.get(&folder.id).is_ok());
//! ```

pub mod models;
pub mod store;

// Re-export commonly used types
pub use models::{AttributeType, AttributeValue, CreateNodeParams, Node, NodeUpdate};
pub use store::{
    NodeStore, QueryEngine, QuerySpec, StoreConfig, StoreError,
};
