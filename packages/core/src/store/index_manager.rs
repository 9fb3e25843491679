//! Index Manager
//!
//! Maintains the secondary indices that let queries avoid full scans:
//! `by_kind`, `by_parent`, one index per declared attribute key, and the
//! declared composite (dimension-pair) indices.
//!
//! # Architecture
//!
//! - Indices are derived views over the canonical node map, never sources
//!   of truth; `rebuild` re-derives everything from the map.
//! - Attribute indices are ordered (`BTreeMap` keyed by [`IndexKey`]) so
//!   the same structure serves exact and range lookups.
//! - Composite maintenance is mechanical: each declared pair is updated
//!   from the same per-dimension keys as the single-field indices.
//! - Every mutation hook returns the set of touched [`Dimension`]s, which
//!   the store feeds to the query cache for eager invalidation.
//!
//! # Corruption
//!
//! If a removal does not find the entry the canonical map says must exist,
//! the manager marks itself corrupted. While corrupted, query paths refuse
//! to serve (`StoreError::IndexCorruption`) until `rebuild` runs; writes
//! against the canonical map continue to be accepted.

use crate::models::{AttributeValue, Node};
use crate::store::config::{Dimension, StoreConfig};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// `f64` wrapper with a total order (IEEE 754 totalOrder), usable as an
/// ordered index key
#[derive(Debug, Clone, Copy)]
pub struct OrderedF64(pub f64);

impl PartialEq for OrderedF64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for OrderedF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits());
    }
}

/// Key of an index partition: an indexable attribute value, or the string
/// key of a built-in dimension (kind tag, parent id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    Float(OrderedF64),
    Str(String),
}

impl IndexKey {
    /// Convert an attribute value into an index key. `List` values are not
    /// indexable and yield `None`.
    pub fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Bool(b) => Some(IndexKey::Bool(*b)),
            AttributeValue::Int(i) => Some(IndexKey::Int(*i)),
            AttributeValue::Float(f) => Some(IndexKey::Float(OrderedF64(*f))),
            AttributeValue::Str(s) => Some(IndexKey::Str(s.clone())),
            AttributeValue::List(_) => None,
        }
    }
}

type Partition = HashSet<String>;
type AttributeIndex = BTreeMap<IndexKey, Partition>;
type CompositeIndex = HashMap<(IndexKey, IndexKey), Partition>;

/// Secondary indices over the node universe
#[derive(Debug)]
pub struct IndexManager {
    config: Arc<StoreConfig>,
    by_kind: HashMap<String, Partition>,
    by_parent: HashMap<String, Partition>,
    by_attribute: HashMap<String, AttributeIndex>,
    composite: HashMap<(Dimension, Dimension), CompositeIndex>,
    corrupted: Option<String>,
}

/// Remove `id` from the partition under `key`, dropping empty partitions.
/// Returns false when the expected entry was absent.
fn remove_id<K: Eq + Hash>(index: &mut HashMap<K, Partition>, key: &K, id: &str) -> bool {
    let Some(ids) = index.get_mut(key) else {
        return false;
    };
    let removed = ids.remove(id);
    if ids.is_empty() {
        index.remove(key);
    }
    removed
}

fn remove_id_ordered<K: Ord>(index: &mut BTreeMap<K, Partition>, key: &K, id: &str) -> bool {
    let Some(ids) = index.get_mut(key) else {
        return false;
    };
    let removed = ids.remove(id);
    if ids.is_empty() {
        index.remove(key);
    }
    removed
}

impl IndexManager {
    /// Create empty indices for the declared dimensions
    pub fn new(config: Arc<StoreConfig>) -> Self {
        let by_attribute = config
            .indexed_attributes
            .keys()
            .map(|key| (key.clone(), AttributeIndex::new()))
            .collect();
        let composite = config
            .composite_indices
            .iter()
            .cloned()
            .map(|pair| (pair, CompositeIndex::new()))
            .collect();
        Self {
            config,
            by_kind: HashMap::new(),
            by_parent: HashMap::new(),
            by_attribute,
            composite,
            corrupted: None,
        }
    }

    /// The index key a node contributes to a dimension, if any
    fn dimension_key(node: &Node, dim: &Dimension) -> Option<IndexKey> {
        match dim {
            Dimension::Kind => Some(IndexKey::Str(node.kind.clone())),
            Dimension::Parent => node.parent_id.clone().map(IndexKey::Str),
            Dimension::Attribute(key) => node.attributes.get(key).and_then(IndexKey::from_value),
        }
    }

    /// Dimensions a node currently occupies (for cache invalidation)
    fn occupied_dimensions(&self, node: &Node) -> BTreeSet<Dimension> {
        let mut dims = BTreeSet::new();
        dims.insert(Dimension::Kind);
        if node.parent_id.is_some() {
            dims.insert(Dimension::Parent);
        }
        for key in self.config.indexed_attributes.keys() {
            if node.attributes.contains_key(key) {
                dims.insert(Dimension::Attribute(key.clone()));
            }
        }
        dims
    }

    fn insert_node(&mut self, node: &Node) {
        self.by_kind
            .entry(node.kind.clone())
            .or_default()
            .insert(node.id.clone());

        if let Some(parent_id) = &node.parent_id {
            self.by_parent
                .entry(parent_id.clone())
                .or_default()
                .insert(node.id.clone());
        }

        for key in self.config.indexed_attributes.keys() {
            if let Some(index_key) = node.attributes.get(key).and_then(IndexKey::from_value) {
                if let Some(index) = self.by_attribute.get_mut(key) {
                    index.entry(index_key).or_default().insert(node.id.clone());
                }
            }
        }

        for (pair, index) in &mut self.composite {
            let primary = Self::dimension_key(node, &pair.0);
            let secondary = Self::dimension_key(node, &pair.1);
            if let (Some(p), Some(s)) = (primary, secondary) {
                index.entry((p, s)).or_default().insert(node.id.clone());
            }
        }
    }

    fn remove_node(&mut self, node: &Node) {
        if !remove_id(&mut self.by_kind, &node.kind, &node.id) {
            self.mark_corrupted(format!(
                "node {} missing from kind partition '{}'",
                node.id, node.kind
            ));
        }

        if let Some(parent_id) = &node.parent_id {
            if !remove_id(&mut self.by_parent, parent_id, &node.id) {
                self.mark_corrupted(format!(
                    "node {} missing from parent partition '{parent_id}'",
                    node.id
                ));
            }
        }

        for key in self.config.indexed_attributes.keys().cloned().collect::<Vec<_>>() {
            if let Some(index_key) = node.attributes.get(&key).and_then(IndexKey::from_value) {
                let missing = match self.by_attribute.get_mut(&key) {
                    Some(index) => !remove_id_ordered(index, &index_key, &node.id),
                    None => true,
                };
                if missing {
                    self.mark_corrupted(format!(
                        "node {} missing from attribute index '{key}'",
                        node.id
                    ));
                }
            }
        }

        let pairs: Vec<(Dimension, Dimension)> = self.composite.keys().cloned().collect();
        for pair in pairs {
            let primary = Self::dimension_key(node, &pair.0);
            let secondary = Self::dimension_key(node, &pair.1);
            if let (Some(p), Some(s)) = (primary, secondary) {
                let missing = match self.composite.get_mut(&pair) {
                    Some(index) => !remove_id(index, &(p, s), &node.id),
                    None => true,
                };
                if missing {
                    self.mark_corrupted(format!(
                        "node {} missing from composite index ({}, {})",
                        node.id, pair.0, pair.1
                    ));
                }
            }
        }
    }

    /// Index a newly committed node. Returns the touched dimensions.
    pub fn on_create(&mut self, node: &Node) -> BTreeSet<Dimension> {
        self.insert_node(node);
        self.occupied_dimensions(node)
    }

    /// Remove a deleted node from every index. Returns the touched
    /// dimensions.
    pub fn on_delete(&mut self, node: &Node) -> BTreeSet<Dimension> {
        self.remove_node(node);
        self.occupied_dimensions(node)
    }

    /// Apply an update incrementally: only the dimensions whose key changed
    /// are rewritten, so an attribute change never rebuilds unrelated
    /// indices.
    ///
    /// The kind dimension is always reported as touched even when the kind
    /// itself is unchanged: every cached query snapshot depends on it (see
    /// `QuerySpec::dependencies`), and any update re-snapshots the record.
    pub fn on_update(&mut self, old: &Node, new: &Node) -> BTreeSet<Dimension> {
        let mut touched = BTreeSet::new();
        touched.insert(Dimension::Kind);

        if old.kind != new.kind {
            if !remove_id(&mut self.by_kind, &old.kind, &old.id) {
                self.mark_corrupted(format!(
                    "node {} missing from kind partition '{}'",
                    old.id, old.kind
                ));
            }
            self.by_kind
                .entry(new.kind.clone())
                .or_default()
                .insert(new.id.clone());
        }

        if old.parent_id != new.parent_id {
            touched.insert(Dimension::Parent);
            if let Some(old_parent) = &old.parent_id {
                if !remove_id(&mut self.by_parent, old_parent, &old.id) {
                    self.mark_corrupted(format!(
                        "node {} missing from parent partition '{old_parent}'",
                        old.id
                    ));
                }
            }
            if let Some(new_parent) = &new.parent_id {
                self.by_parent
                    .entry(new_parent.clone())
                    .or_default()
                    .insert(new.id.clone());
            }
        }

        for key in self.config.indexed_attributes.keys().cloned().collect::<Vec<_>>() {
            let old_key = old.attributes.get(&key).and_then(IndexKey::from_value);
            let new_key = new.attributes.get(&key).and_then(IndexKey::from_value);
            if old_key == new_key {
                continue;
            }
            touched.insert(Dimension::Attribute(key.clone()));
            if let Some(old_key) = old_key {
                let missing = match self.by_attribute.get_mut(&key) {
                    Some(index) => !remove_id_ordered(index, &old_key, &old.id),
                    None => true,
                };
                if missing {
                    self.mark_corrupted(format!(
                        "node {} missing from attribute index '{key}'",
                        old.id
                    ));
                }
            }
            if let Some(new_key) = new_key {
                if let Some(index) = self.by_attribute.get_mut(&key) {
                    index.entry(new_key).or_default().insert(new.id.clone());
                }
            }
        }

        // Composite entries move whenever either component moved
        let pairs: Vec<(Dimension, Dimension)> = self.composite.keys().cloned().collect();
        for pair in pairs {
            let old_entry = Self::dimension_key(old, &pair.0).zip(Self::dimension_key(old, &pair.1));
            let new_entry = Self::dimension_key(new, &pair.0).zip(Self::dimension_key(new, &pair.1));
            if old_entry == new_entry {
                continue;
            }
            if let Some(old_entry) = old_entry {
                let missing = match self.composite.get_mut(&pair) {
                    Some(index) => !remove_id(index, &old_entry, &old.id),
                    None => true,
                };
                if missing {
                    self.mark_corrupted(format!(
                        "node {} missing from composite index ({}, {})",
                        old.id, pair.0, pair.1
                    ));
                }
            }
            if let Some(new_entry) = new_entry {
                if let Some(index) = self.composite.get_mut(&pair) {
                    index.entry(new_entry).or_default().insert(new.id.clone());
                }
            }
        }

        touched
    }

    //
    // LOOKUPS
    //

    /// Ids of all nodes with the given kind
    pub fn kind_partition(&self, kind: &str) -> Option<&Partition> {
        self.by_kind.get(kind)
    }

    /// Ids of all children of the given parent
    pub fn parent_partition(&self, parent_id: &str) -> Option<&Partition> {
        self.by_parent.get(parent_id)
    }

    /// Exact lookup on a declared attribute index
    pub fn attribute_partition(&self, key: &str, value: &IndexKey) -> Option<&Partition> {
        self.by_attribute.get(key).and_then(|index| index.get(value))
    }

    /// Inclusive range scan over a declared attribute index. An inverted
    /// interval (`low > high`) is empty, never a panic.
    pub fn attribute_range(&self, key: &str, low: &IndexKey, high: &IndexKey) -> Vec<String> {
        if low > high {
            return Vec::new();
        }
        let Some(index) = self.by_attribute.get(key) else {
            return Vec::new();
        };
        index
            .range(low.clone()..=high.clone())
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Whether a composite index is declared for the ordered pair
    pub fn has_composite(&self, pair: &(Dimension, Dimension)) -> bool {
        self.composite.contains_key(pair)
    }

    /// Lookup on a declared composite index
    pub fn composite_partition(
        &self,
        pair: &(Dimension, Dimension),
        keys: &(IndexKey, IndexKey),
    ) -> Option<&Partition> {
        self.composite.get(pair).and_then(|index| index.get(keys))
    }

    //
    // CORRUPTION & REBUILD
    //

    /// Corruption context, if the indices have diverged from the map
    pub fn corruption(&self) -> Option<&str> {
        self.corrupted.as_deref()
    }

    /// Flag the indices as diverged. Queries refuse to serve until
    /// `rebuild` clears the flag.
    pub fn mark_corrupted(&mut self, context: impl Into<String>) {
        let context = context.into();
        tracing::error!(context = %context, "index corruption detected; rebuild required");
        // First divergence wins; later findings are consequences
        if self.corrupted.is_none() {
            self.corrupted = Some(context);
        }
    }

    /// Re-derive every index from the canonical node map and clear the
    /// corruption flag.
    pub fn rebuild(&mut self, nodes: &HashMap<String, Node>) {
        self.by_kind.clear();
        self.by_parent.clear();
        for index in self.by_attribute.values_mut() {
            index.clear();
        }
        for index in self.composite.values_mut() {
            index.clear();
        }
        for node in nodes.values() {
            self.insert_node(node);
        }
        self.corrupted = None;
        tracing::info!(node_count = nodes.len(), "indices rebuilt from canonical map");
    }

    /// Cross-check every index against the canonical node map.
    pub fn verify(&self, nodes: &HashMap<String, Node>) -> Result<(), String> {
        if let Some(context) = &self.corrupted {
            return Err(format!("corruption flagged: {context}"));
        }
        let mut expected = IndexManager::new(self.config.clone());
        for node in nodes.values() {
            expected.insert_node(node);
        }
        if self.by_kind != expected.by_kind {
            return Err("by_kind index diverges from canonical map".to_string());
        }
        if self.by_parent != expected.by_parent {
            return Err("by_parent index diverges from canonical map".to_string());
        }
        if self.by_attribute != expected.by_attribute {
            return Err("attribute indices diverge from canonical map".to_string());
        }
        if self.composite != expected.composite {
            return Err("composite indices diverge from canonical map".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeType, AttributeValue};
    use crate::store::config::StoreConfig;
    use std::collections::BTreeMap;

    fn config() -> Arc<StoreConfig> {
        Arc::new(
            StoreConfig::permissive()
                .index_attribute("priority", AttributeType::Int)
                .index_attribute("status", AttributeType::Str)
                .composite_index(Dimension::Kind, Dimension::Attribute("status".to_string())),
        )
    }

    fn task(name: &str, priority: i64, status: &str, parent: Option<&str>) -> Node {
        let mut attributes = BTreeMap::new();
        attributes.insert("priority".to_string(), AttributeValue::Int(priority));
        attributes.insert("status".to_string(), AttributeValue::from(status));
        Node::new(
            "task".to_string(),
            name.to_string(),
            String::new(),
            parent.map(str::to_string),
            attributes,
        )
    }

    #[test]
    fn test_create_populates_all_dimensions() {
        let mut indices = IndexManager::new(config());
        let node = task("t1", 5, "open", Some("p-1"));
        let touched = indices.on_create(&node);

        assert!(indices.kind_partition("task").unwrap().contains(&node.id));
        assert!(indices.parent_partition("p-1").unwrap().contains(&node.id));
        assert!(indices
            .attribute_partition("priority", &IndexKey::Int(5))
            .unwrap()
            .contains(&node.id));
        assert!(indices
            .composite_partition(
                &(Dimension::Kind, Dimension::Attribute("status".to_string())),
                &(
                    IndexKey::Str("task".to_string()),
                    IndexKey::Str("open".to_string())
                ),
            )
            .unwrap()
            .contains(&node.id));

        assert!(touched.contains(&Dimension::Kind));
        assert!(touched.contains(&Dimension::Parent));
        assert!(touched.contains(&Dimension::Attribute("priority".to_string())));
    }

    #[test]
    fn test_attribute_update_touches_only_that_dimension_plus_kind() {
        let mut indices = IndexManager::new(config());
        let old = task("t1", 1, "open", None);
        indices.on_create(&old);

        let mut new = old.clone();
        new.attributes
            .insert("priority".to_string(), AttributeValue::Int(9));
        let touched = indices.on_update(&old, &new);

        assert!(touched.contains(&Dimension::Attribute("priority".to_string())));
        assert!(touched.contains(&Dimension::Kind));
        assert!(!touched.contains(&Dimension::Attribute("status".to_string())));
        assert!(!touched.contains(&Dimension::Parent));

        assert!(indices
            .attribute_partition("priority", &IndexKey::Int(1))
            .is_none());
        assert!(indices
            .attribute_partition("priority", &IndexKey::Int(9))
            .unwrap()
            .contains(&new.id));
    }

    #[test]
    fn test_range_scan_is_inclusive() {
        let mut indices = IndexManager::new(config());
        let nodes: Vec<Node> = [1, 5, 9]
            .iter()
            .map(|p| task(&format!("t{p}"), *p, "open", None))
            .collect();
        for node in &nodes {
            indices.on_create(node);
        }

        let hits = indices.attribute_range("priority", &IndexKey::Int(2), &IndexKey::Int(9));
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&nodes[1].id));
        assert!(hits.contains(&nodes[2].id));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let mut indices = IndexManager::new(config());
        indices.on_create(&task("t5", 5, "open", None));

        let hits = indices.attribute_range("priority", &IndexKey::Int(9), &IndexKey::Int(2));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_delete_empties_partitions() {
        let mut indices = IndexManager::new(config());
        let node = task("t1", 5, "open", None);
        indices.on_create(&node);
        indices.on_delete(&node);

        assert!(indices.kind_partition("task").is_none());
        assert!(indices
            .attribute_partition("status", &IndexKey::Str("open".to_string()))
            .is_none());
        assert!(indices.corruption().is_none());
    }

    #[test]
    fn test_removing_unindexed_node_marks_corruption() {
        let mut indices = IndexManager::new(config());
        let node = task("ghost", 5, "open", None);
        // Never indexed: the canonical map and the indices disagree
        indices.on_delete(&node);
        assert!(indices.corruption().is_some());
    }

    #[test]
    fn test_rebuild_restores_consistency() {
        let mut indices = IndexManager::new(config());
        let node = task("t1", 5, "open", None);
        let mut nodes = HashMap::new();
        nodes.insert(node.id.clone(), node.clone());

        indices.mark_corrupted("simulated divergence");
        assert!(indices.verify(&nodes).is_err());

        indices.rebuild(&nodes);
        assert!(indices.corruption().is_none());
        assert!(indices.verify(&nodes).is_ok());
        assert!(indices.kind_partition("task").unwrap().contains(&node.id));
    }

    #[test]
    fn test_float_keys_order_totally() {
        assert!(OrderedF64(1.0) < OrderedF64(2.5));
        assert!(OrderedF64(-1.0) < OrderedF64(0.0));
        assert_eq!(OrderedF64(3.5), OrderedF64(3.5));
    }
}
