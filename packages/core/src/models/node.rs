//! Node Data Structures
//!
//! This module defines the universal `Node` record and the auxiliary types
//! used by the store's mutation API (`CreateNodeParams`, `NodeUpdate`,
//! `DeleteResult`, `StoreMetrics`).
//!
//! # Architecture
//!
//! - **Universal Node**: a single struct represents every record kind
//! - **Open kind tag**: `kind` is a string, governed by the kind registry
//!   rather than a closed enum
//! - **Typed attribute bag**: metadata lives in `attributes`, a map of
//!   string keys to [`AttributeValue`]s
//! - **Store-owned identity**: ids and timestamps are assigned by the store,
//!   never by callers
//!
//! # Examples
//!
//! ```rust
//! use nodeverse_core::models::{AttributeValue, Node};
//! use std::collections::BTreeMap;
//!
//! let mut attributes = BTreeMap::new();
//! attributes.insert("priority".to_string(), AttributeValue::Int(5));
//!
//! let node = Node::new(
//!     "task".to_string(),
//!     "Write documentation".to_string(),
//!     "Cover the query layer".to_string(),
//!     None,
//!     attributes,
//! );
//! assert!(node.is_root());
//! ```

use crate::models::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Deserialize a double-`Option` field: field absent -> `None`,
/// field present (including explicit `null`) -> `Some(inner)`.
fn deserialize_optional_field<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Universal node record managed by the store.
///
/// # Fields
///
/// - `id`: unique identifier, UUID v4 assigned on creation, immutable
/// - `kind`: type tag classifying the node, primary index partition
/// - `name`: human-readable label, not required to be unique
/// - `content`: freeform UTF-8 payload, opaque to the store
/// - `parent_id`: optional reference to the parent node
/// - `children`: ordered child ids, kept in sync with the children's
///   `parent_id` by the store (insertion order is traversal order)
/// - `attributes`: typed metadata bag
/// - `created_at` / `updated_at`: store-assigned timestamps
///
/// # Invariants (maintained by the store, not by callers)
///
/// 1. `id` is unique and never reused, even after deletion
/// 2. `parent_id`, when set, names an existing node whose `children`
///    contains this id
/// 3. `children` holds no duplicates and no dangling ids
/// 4. Attribute values under registered index keys conform to the declared
///    type for that dimension
///
/// # Schema evolution
///
/// Unknown fields are ignored on deserialization and the collection fields
/// default when absent, so readers of older records keep working as new
/// optional fields are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier (UUID v4, store-assigned)
    pub id: String,

    /// Kind tag (e.g. "doc", "task", "folder")
    pub kind: String,

    /// Human-readable label
    pub name: String,

    /// Freeform payload, opaque to the store
    pub content: String,

    /// Parent node reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Ordered child ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,

    /// Typed metadata bag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Creation timestamp (store-assigned)
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp (store-assigned)
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Construct a node with a fresh UUID and current timestamps.
    ///
    /// Committed nodes are only created through `NodeStore::create`; this
    /// constructor exists for the store itself, persistence loading, and
    /// tests. A node built here is not part of any store until committed.
    pub fn new(
        kind: String,
        name: String,
        content: String,
        parent_id: Option<String>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            name,
            content,
            parent_id,
            children: Vec::new(),
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this node has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Bump `updated_at` to now
    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Parameters for `NodeStore::create`.
///
/// The store assigns `id`, `children`, and both timestamps; callers only
/// provide the fields below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeParams {
    /// Kind tag for the new node
    pub kind: String,
    /// Human-readable label
    pub name: String,
    /// Freeform payload
    #[serde(default)]
    pub content: String,
    /// Optional parent (must exist, validated before commit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Initial attribute bag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Sparse patch for `NodeStore::update`.
///
/// Only fields present in the patch are applied. Nullable fields use the
/// double-`Option` pattern so "don't touch" and "set to NULL" stay
/// distinguishable:
///
/// - `None`: don't change the field
/// - `Some(None)`: clear the field (e.g. detach from parent)
/// - `Some(Some(v))`: set the field to `v`
///
/// # Examples
///
/// ```rust
/// use nodeverse_core::models::NodeUpdate;
///
/// // Rename only
/// let patch = NodeUpdate::new().with_name("renamed".to_string());
///
/// // Move to root (clear parent_id)
/// let patch = NodeUpdate {
///     parent_id: Some(None),
///     ..Default::default()
/// };
/// assert!(!patch.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    /// Change the kind tag (re-validated against the kind registry)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Change the label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Change the payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Reparent the node
    ///
    /// Double-`Option`: `Some(None)` detaches the node (moves it to root),
    /// `Some(Some(id))` moves it under `id`. The store rewires both the old
    /// and the new parent's `children` atomically.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent_id: Option<Option<String>>,

    /// Replace the whole attribute bag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, AttributeValue>>,
}

impl NodeUpdate {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a new kind
    pub fn with_kind(mut self, kind: String) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set a new name
    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    /// Set new content
    pub fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }

    /// Move under a new parent (`None` moves the node to root)
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Replace the attribute bag
    pub fn with_attributes(mut self, attributes: BTreeMap<String, AttributeValue>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Whether the patch changes anything
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.name.is_none()
            && self.content.is_none()
            && self.parent_id.is_none()
            && self.attributes.is_none()
    }
}

/// Result of a delete operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Number of nodes removed (1 for a leaf, subtree size when cascading)
    pub deleted_count: usize,
}

/// Aggregate counts over the node universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    /// Total number of nodes
    pub total_nodes: usize,
    /// Node count per kind
    pub nodes_by_kind: BTreeMap<String, usize>,
}
