//! Data Models
//!
//! Core data structures shared by every store component:
//!
//! - `Node` - the universal record managed by the store
//! - `AttributeValue` / `AttributeType` - the typed metadata bag
//! - `CreateNodeParams` / `NodeUpdate` - mutation inputs
//! - `DeleteResult` / `StoreMetrics` - operation outputs

mod node;
mod value;

pub use node::{CreateNodeParams, DeleteResult, Node, NodeUpdate, StoreMetrics};
pub use value::{AttributeType, AttributeValue};
