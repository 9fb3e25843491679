//! Node Store Core
//!
//! Sole authoritative holder of the node universe. All mutations flow
//! through this type; every other component (indices, query engine,
//! persistence) holds only derived views that are rebuilt or incrementally
//! updated from the canonical map here.
//!
//! # Concurrency
//!
//! One `RwLock` protects the node map together with its indices, so an
//! index update is never visible without the write that triggered it.
//! Writers hold the lock exclusively for the whole
//! validate-mutate-index-update sequence; readers take shared locks and
//! clone out snapshots. Nothing suspends while a lock is held, and
//! persistence I/O runs outside any lock against a snapshot.
//!
//! # Sharing
//!
//! The store is an explicit handle: construct one `Arc<NodeStore>` and pass
//! it to every collaborator. There is deliberately no global instance.
//!
//! # Examples
//!
//! ```rust
//! use nodeverse_core::models::CreateNodeParams;
//! use nodeverse_core::store::{NodeStore, StoreConfig};
//!
//! let store = NodeStore::new(StoreConfig::permissive()).unwrap();
//! let folder = store
//!     .create(CreateNodeParams {
//!         kind: "folder".to_string(),
//!         name: "inbox".to_string(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//! assert_eq!(store.get(&folder.id).unwrap().name, "inbox");
//! ```

use crate::models::{CreateNodeParams, DeleteResult, Node, NodeUpdate, StoreMetrics};
use crate::store::config::StoreConfig;
use crate::store::index_manager::IndexManager;
use crate::store::persistence::PersistenceAdapter;
use crate::store::query::QueryCache;
use crate::store::validation::{
    ValidationEngine, ValidationErrors, ValidationIssue, ValidationResult,
};
use crate::store::StoreError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Canonical map plus its derived indices, guarded as one unit
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) indices: IndexManager,
}

/// The centralized node store
#[derive(Debug)]
pub struct NodeStore {
    pub(crate) state: RwLock<StoreState>,
    pub(crate) cache: QueryCache,
    config: std::sync::Arc<StoreConfig>,
    validator: ValidationEngine,
}

impl NodeStore {
    /// Build a store from a validated configuration
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let config = std::sync::Arc::new(config);
        Ok(Self {
            state: RwLock::new(StoreState {
                nodes: HashMap::new(),
                indices: IndexManager::new(config.clone()),
            }),
            cache: QueryCache::new(config.cache_ttl),
            validator: ValidationEngine::new(config.clone()),
            config,
        })
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::index_corruption("store lock poisoned"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::index_corruption("store lock poisoned"))
    }

    fn ensure_indices_healthy(state: &StoreState) -> Result<(), StoreError> {
        match state.indices.corruption() {
            Some(context) => Err(StoreError::index_corruption(context)),
            None => Ok(()),
        }
    }

    fn log_warnings(id: &str, report: &ValidationResult) {
        for warning in &report.warnings {
            tracing::warn!(id, warning = %warning, "validation warning");
        }
    }

    //
    // CORE CRUD OPERATIONS
    //

    /// Create a node: allocate a fresh id, validate, commit, index.
    ///
    /// All-or-nothing: a failed validation leaves the store unchanged.
    pub fn create(&self, params: CreateNodeParams) -> Result<Node, StoreError> {
        let CreateNodeParams {
            kind,
            name,
            content,
            parent_id,
            attributes,
        } = params;

        let mut state = self.write_state()?;
        let node = Node::new(kind, name, content, parent_id, attributes);

        // Unreachable with store-assigned UUIDs; treated as a bug, not input
        if state.nodes.contains_key(&node.id) {
            tracing::error!(id = %node.id, "store-assigned id collided");
            return Err(StoreError::duplicate_id(&node.id));
        }

        let report = self.validator.validate(&node, &state.nodes);
        Self::log_warnings(&node.id, &report);
        if !report.is_valid() {
            return Err(StoreError::Validation(ValidationErrors(report.errors)));
        }

        if let Some(parent_id) = node.parent_id.clone() {
            let parent = state
                .nodes
                .get_mut(&parent_id)
                .ok_or_else(|| StoreError::not_found(&parent_id))?;
            parent.children.push(node.id.clone());
            parent.touch();
        }

        let touched = state.indices.on_create(&node);
        state.nodes.insert(node.id.clone(), node.clone());
        // Evict under the write lock so no reader can hit a stale entry
        // after observing the new state
        self.cache.invalidate(&touched);
        drop(state);

        tracing::debug!(id = %node.id, kind = %node.kind, "node created");
        Ok(node)
    }

    /// Fetch a node by id, as an immutable snapshot
    pub fn get(&self, id: &str) -> Result<Node, StoreError> {
        let state = self.read_state()?;
        state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    /// Apply a sparse patch, re-validating the whole resulting node.
    ///
    /// Reparenting rewires both parents' `children` in the same critical
    /// section, so a reader never observes a half-moved node.
    pub fn update(&self, id: &str, patch: NodeUpdate) -> Result<Node, StoreError> {
        let mut state = self.write_state()?;
        let old = state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))?;
        if patch.is_empty() {
            return Ok(old);
        }

        let mut next = old.clone();
        if let Some(kind) = patch.kind {
            next.kind = kind;
        }
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(content) = patch.content {
            next.content = content;
        }
        if let Some(parent_id) = patch.parent_id {
            next.parent_id = parent_id;
        }
        if let Some(attributes) = patch.attributes {
            next.attributes = attributes;
        }
        next.touch();

        let report = self.validator.validate(&next, &state.nodes);
        Self::log_warnings(id, &report);
        if !report.is_valid() {
            return Err(StoreError::Validation(ValidationErrors(report.errors)));
        }

        if old.parent_id != next.parent_id {
            if let Some(old_parent_id) = &old.parent_id {
                if let Some(parent) = state.nodes.get_mut(old_parent_id) {
                    parent.children.retain(|child| child != id);
                    parent.touch();
                }
            }
            if let Some(new_parent_id) = &next.parent_id {
                let parent = state
                    .nodes
                    .get_mut(new_parent_id)
                    .ok_or_else(|| StoreError::not_found(new_parent_id))?;
                parent.children.push(id.to_string());
                parent.touch();
            }
        }

        let touched = state.indices.on_update(&old, &next);
        state.nodes.insert(id.to_string(), next.clone());
        self.cache.invalidate(&touched);
        drop(state);

        tracing::debug!(id, "node updated");
        Ok(next)
    }

    /// Delete a node.
    ///
    /// With `cascade == false` the call fails with `HasChildren` when the
    /// node still has children. With `cascade == true` the whole subtree is
    /// removed depth-first, leaf to root, emitting one index removal per
    /// node.
    pub fn delete(&self, id: &str, cascade: bool) -> Result<DeleteResult, StoreError> {
        let mut state = self.write_state()?;
        let node = state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))?;

        if !cascade && !node.children.is_empty() {
            return Err(StoreError::has_children(id, node.children.len()));
        }

        // Collect the subtree in pre-order, then remove in reverse so
        // children always go before their parents.
        let mut order = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(n) = state.nodes.get(&current) {
                order.push(current);
                stack.extend(n.children.iter().cloned());
            }
        }

        let mut touched = std::collections::BTreeSet::new();
        for node_id in order.iter().rev() {
            if let Some(removed) = state.nodes.remove(node_id) {
                touched.extend(state.indices.on_delete(&removed));
            }
        }

        if let Some(parent_id) = &node.parent_id {
            if let Some(parent) = state.nodes.get_mut(parent_id) {
                parent.children.retain(|child| child != id);
                parent.touch();
            }
        }
        self.cache.invalidate(&touched);
        drop(state);

        tracing::debug!(id, deleted_count = order.len(), cascade, "node deleted");
        Ok(DeleteResult {
            deleted_count: order.len(),
        })
    }

    /// Delete using the node's per-kind default cascade policy
    /// (`KindSpec::cascade_by_default`; unregistered kinds reject)
    pub fn delete_with_kind_policy(&self, id: &str) -> Result<DeleteResult, StoreError> {
        let cascade = {
            let state = self.read_state()?;
            let node = state
                .nodes
                .get(id)
                .ok_or_else(|| StoreError::not_found(id))?;
            self.config
                .kinds
                .get(&node.kind)
                .map(|spec| spec.cascade_by_default)
                .unwrap_or(false)
        };
        self.delete(id, cascade)
    }

    //
    // READS
    //

    /// All nodes of a kind, via the kind partition (sorted by id for
    /// deterministic output)
    pub fn list_by_kind(&self, kind: &str) -> Result<Vec<Node>, StoreError> {
        let state = self.read_state()?;
        Self::ensure_indices_healthy(&state)?;
        let mut nodes: Vec<Node> = state
            .indices
            .kind_partition(kind)
            .map(|ids| ids.iter().filter_map(|id| state.nodes.get(id).cloned()).collect())
            .unwrap_or_default();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    /// Children of a node, in the `children` insertion order
    pub fn get_children(&self, id: &str) -> Result<Vec<Node>, StoreError> {
        let state = self.read_state()?;
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        let mut children = Vec::with_capacity(node.children.len());
        for child_id in &node.children {
            match state.nodes.get(child_id) {
                Some(child) => children.push(child.clone()),
                // `children` never holds dangling ids; an entry with no
                // backing record is map divergence and must not be
                // silently served
                None => {
                    return Err(StoreError::index_corruption(format!(
                        "child {child_id} of {id} missing from canonical map"
                    )))
                }
            }
        }
        Ok(children)
    }

    /// Parent of a node, if it has one
    pub fn get_parent(&self, id: &str) -> Result<Option<Node>, StoreError> {
        let state = self.read_state()?;
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        Ok(node
            .parent_id
            .as_ref()
            .and_then(|parent_id| state.nodes.get(parent_id))
            .cloned())
    }

    /// Total node count
    pub fn len(&self) -> usize {
        self.read_state().map(|state| state.nodes.len()).unwrap_or(0)
    }

    /// Whether the store holds no nodes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate counts over the node universe
    pub fn metrics(&self) -> Result<StoreMetrics, StoreError> {
        let state = self.read_state()?;
        let mut nodes_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for node in state.nodes.values() {
            *nodes_by_kind.entry(node.kind.clone()).or_default() += 1;
        }
        Ok(StoreMetrics {
            total_nodes: state.nodes.len(),
            nodes_by_kind,
        })
    }

    //
    // INDEX MAINTENANCE
    //

    /// Re-derive every index from the canonical map, clearing any
    /// corruption flag and the query cache
    pub fn rebuild_indices(&self) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        let StoreState { nodes, indices } = &mut *state;
        indices.rebuild(nodes);
        self.cache.invalidate_all();
        drop(state);
        Ok(())
    }

    /// Cross-check indices against the canonical map
    pub fn verify_indices(&self) -> Result<(), StoreError> {
        let state = self.read_state()?;
        state
            .indices
            .verify(&state.nodes)
            .map_err(StoreError::index_corruption)
    }

    //
    // PERSISTENCE
    //

    /// Re-validate a loaded snapshot as a whole: per-node checks through
    /// the validation engine, plus the parent/child pairing that single-node
    /// validation cannot see. A snapshot that fails here is never installed.
    fn check_snapshot(&self, nodes: &HashMap<String, Node>) -> Result<(), StoreError> {
        let mut issues = Vec::new();
        for node in nodes.values() {
            let report = self.validator.validate(node, nodes);
            Self::log_warnings(&node.id, &report);
            issues.extend(report.errors);

            if let Some(parent_id) = &node.parent_id {
                if let Some(parent) = nodes.get(parent_id) {
                    if !parent.children.contains(&node.id) {
                        issues.push(ValidationIssue::ParentChildMismatch {
                            parent_id: parent_id.clone(),
                            child_id: node.id.clone(),
                        });
                    }
                }
            }

            let mut seen = HashSet::new();
            for child_id in &node.children {
                if !seen.insert(child_id.as_str()) {
                    issues.push(ValidationIssue::DuplicateChild {
                        parent_id: node.id.clone(),
                        child_id: child_id.clone(),
                    });
                    continue;
                }
                match nodes.get(child_id) {
                    None => issues.push(ValidationIssue::DanglingChild {
                        parent_id: node.id.clone(),
                        child_id: child_id.clone(),
                    }),
                    Some(child) if child.parent_id.as_deref() != Some(node.id.as_str()) => {
                        issues.push(ValidationIssue::ParentChildMismatch {
                            parent_id: node.id.clone(),
                            child_id: child_id.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(ValidationErrors(issues)))
        }
    }

    /// Replace the node universe with the adapter's records, rebuilding
    /// every index. Called once at startup.
    ///
    /// The snapshot is validated as a whole before anything is installed:
    /// duplicate ids, dangling references, and parent/child pairings that
    /// disagree all reject the load and leave the store untouched.
    pub fn load_from(&self, adapter: &dyn PersistenceAdapter) -> Result<usize, StoreError> {
        let records = adapter.load()?;
        let mut map = HashMap::with_capacity(records.len());
        for node in records {
            let id = node.id.clone();
            if map.insert(id.clone(), node).is_some() {
                return Err(StoreError::duplicate_id(id));
            }
        }
        self.check_snapshot(&map)?;

        let mut state = self.write_state()?;
        state.nodes = map;
        let StoreState { nodes, indices } = &mut *state;
        indices.rebuild(nodes);
        let count = nodes.len();
        self.cache.invalidate_all();
        drop(state);

        tracing::info!(node_count = count, "node universe loaded");
        Ok(count)
    }

    /// Flush a snapshot of the node universe through the adapter.
    ///
    /// The snapshot is taken under a brief read lock; the adapter's I/O
    /// runs with no store lock held.
    pub fn flush_to(&self, adapter: &dyn PersistenceAdapter) -> Result<usize, StoreError> {
        let snapshot: Vec<Node> = {
            let state = self.read_state()?;
            let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
            nodes.sort_by(|a, b| a.id.cmp(&b.id));
            nodes
        };
        adapter.flush(&snapshot)?;
        tracing::debug!(node_count = snapshot.len(), "node universe flushed");
        Ok(snapshot.len())
    }
}
