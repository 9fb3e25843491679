//! Query Engine
//!
//! Answers read queries against the store's indices without callers having
//! to understand indexing internals. Four query shapes are supported:
//!
//! - **Exact**: `field = value`, served from the matching index
//! - **Range**: `field in [low, high]` (inclusive), served from the ordered
//!   attribute index; only declared orderable dimensions qualify
//! - **Fuzzy**: case-insensitive substring match on `name` or `content`,
//!   a linear scan over the kind partition bounded by the configured
//!   result cap
//! - **Composite**: conjunction of two exact terms, served by a declared
//!   composite index when one exists, otherwise by intersecting the two
//!   single-field lookups
//!
//! # Caching
//!
//! Results are cached under the normalized query spec for the configured
//! TTL. Invalidation is eager and conservative: a write touching any index
//! dimension evicts every cached entry that depends on that dimension,
//! whatever the specific value. Every entry additionally depends on the
//! kind dimension, which every write touches, so no cached snapshot
//! outlives a write to any record it may embed.
//!
//! Results are immutable snapshots: mutating a returned `Vec<Node>` never
//! affects store state.

use crate::models::{AttributeValue, Node};
use crate::store::config::Dimension;
use crate::store::index_manager::IndexKey;
use crate::store::node_store::{NodeStore, StoreState};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// String field targeted by a fuzzy query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FuzzyField {
    Name,
    Content,
}

/// A read query, as a tagged union over the four supported shapes.
///
/// The serialized form doubles as the cache key, so two structurally equal
/// specs always share a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QuerySpec {
    /// `field = value`
    #[serde(rename_all = "camelCase")]
    Exact {
        field: Dimension,
        value: AttributeValue,
    },
    /// `attribute in [low, high]`, bounds inclusive; an inverted interval
    /// matches nothing
    #[serde(rename_all = "camelCase")]
    Range {
        attribute: String,
        low: AttributeValue,
        high: AttributeValue,
    },
    /// Case-insensitive substring match, optionally restricted to a kind
    /// partition
    #[serde(rename_all = "camelCase")]
    Fuzzy {
        field: FuzzyField,
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    /// Conjunction of two exact terms
    #[serde(rename_all = "camelCase")]
    Composite {
        primary_field: Dimension,
        primary_value: AttributeValue,
        secondary_field: Dimension,
        secondary_value: AttributeValue,
    },
}

impl QuerySpec {
    /// Normalized cache key
    pub(crate) fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Index dimensions a cached result for this spec depends on.
    ///
    /// The kind dimension is always included: results embed whole records,
    /// and every write touches the kind dimension, so this keeps any write
    /// to an embedded record from leaving a stale snapshot behind.
    pub(crate) fn dependencies(&self) -> BTreeSet<Dimension> {
        let mut dims = BTreeSet::new();
        dims.insert(Dimension::Kind);
        match self {
            QuerySpec::Exact { field, .. } => {
                dims.insert(field.clone());
            }
            QuerySpec::Range { attribute, .. } => {
                dims.insert(Dimension::Attribute(attribute.clone()));
            }
            QuerySpec::Fuzzy { .. } => {}
            QuerySpec::Composite {
                primary_field,
                secondary_field,
                ..
            } => {
                dims.insert(primary_field.clone());
                dims.insert(secondary_field.clone());
            }
        }
        dims
    }
}

/// Counters over the engine's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug)]
struct CacheEntry {
    results: Vec<Node>,
    cached_at: Instant,
    depends: BTreeSet<Dimension>,
}

/// TTL cache for query results, keyed by normalized spec.
///
/// Owned by the store so that write paths can invalidate eagerly while
/// still holding the write lock's ordering guarantees.
#[derive(Debug)]
pub(crate) struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<Node>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => Some(entry.results.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn insert(&self, key: String, results: Vec<Node>, depends: BTreeSet<Dimension>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    results,
                    cached_at: Instant::now(),
                    depends,
                },
            );
        }
    }

    /// Evict every entry depending on any touched dimension
    pub(crate) fn invalidate(&self, touched: &BTreeSet<Dimension>) {
        if touched.is_empty() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, entry| entry.depends.is_disjoint(touched));
        }
    }

    pub(crate) fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Read-side front door over the store's indices
#[derive(Debug)]
pub struct QueryEngine {
    store: Arc<NodeStore>,
    stats: Mutex<QueryStats>,
}

impl QueryEngine {
    pub fn new(store: Arc<NodeStore>) -> Self {
        Self {
            store,
            stats: Mutex::new(QueryStats::default()),
        }
    }

    /// Execute a query, consulting the result cache first.
    ///
    /// Refuses with `IndexCorruption` while the indices are flagged as
    /// diverged; `NodeStore::rebuild_indices` restores service.
    pub fn query(&self, spec: &QuerySpec) -> Result<Vec<Node>, StoreError> {
        let state = self.store.read_state()?;
        if let Some(context) = state.indices.corruption() {
            self.record(false);
            return Err(StoreError::index_corruption(context));
        }

        let key = spec.cache_key();
        if let Some(hit) = self.store.cache.get(&key) {
            self.record(true);
            tracing::debug!(query = %key, "query served from cache");
            return Ok(hit);
        }
        self.record(false);

        // The read lock stays held through compute-and-insert, so no write
        // can slip between executing the query and caching its result.
        let results = self.execute(&state, spec)?;
        self.store
            .cache
            .insert(key, results.clone(), spec.dependencies());
        Ok(results)
    }

    /// Counters since construction
    pub fn stats(&self) -> QueryStats {
        self.stats.lock().map(|stats| *stats).unwrap_or_default()
    }

    fn record(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.total_queries += 1;
            if hit {
                stats.cache_hits += 1;
            } else {
                stats.cache_misses += 1;
            }
        }
    }

    fn execute(&self, state: &StoreState, spec: &QuerySpec) -> Result<Vec<Node>, StoreError> {
        match spec {
            QuerySpec::Exact { field, value } => {
                let ids = self.exact_ids(state, field, value)?;
                Ok(Self::snapshot(state, ids))
            }
            QuerySpec::Range {
                attribute,
                low,
                high,
            } => self.execute_range(state, attribute, low, high),
            QuerySpec::Fuzzy {
                field,
                pattern,
                kind,
            } => self.execute_fuzzy(state, *field, pattern, kind.as_deref()),
            QuerySpec::Composite {
                primary_field,
                primary_value,
                secondary_field,
                secondary_value,
            } => self.execute_composite(
                state,
                (primary_field, primary_value),
                (secondary_field, secondary_value),
            ),
        }
    }

    /// Resolve one exact term to the owning partition's ids
    fn exact_ids(
        &self,
        state: &StoreState,
        field: &Dimension,
        value: &AttributeValue,
    ) -> Result<HashSet<String>, StoreError> {
        let partition = match field {
            Dimension::Kind => {
                let kind = value.as_str().ok_or_else(|| {
                    StoreError::unsupported_query("kind dimension expects a string value")
                })?;
                state.indices.kind_partition(kind)
            }
            Dimension::Parent => {
                let parent_id = value.as_str().ok_or_else(|| {
                    StoreError::unsupported_query("parent dimension expects a string node id")
                })?;
                state.indices.parent_partition(parent_id)
            }
            Dimension::Attribute(key) => {
                let declared = self
                    .store
                    .config()
                    .indexed_attribute_type(key)
                    .ok_or_else(|| {
                        StoreError::unsupported_query(format!(
                            "attribute '{key}' is not a declared index dimension"
                        ))
                    })?;
                if !declared.matches(value) {
                    return Err(StoreError::unsupported_query(format!(
                        "attribute '{key}' expects {declared} values"
                    )));
                }
                let index_key = IndexKey::from_value(value).ok_or_else(|| {
                    StoreError::unsupported_query("list values are not indexable")
                })?;
                state.indices.attribute_partition(key, &index_key)
            }
        };
        Ok(partition.cloned().unwrap_or_default())
    }

    fn execute_range(
        &self,
        state: &StoreState,
        attribute: &str,
        low: &AttributeValue,
        high: &AttributeValue,
    ) -> Result<Vec<Node>, StoreError> {
        let declared = self
            .store
            .config()
            .indexed_attribute_type(attribute)
            .ok_or_else(|| {
                StoreError::unsupported_query(format!(
                    "attribute '{attribute}' is not a declared index dimension"
                ))
            })?;
        if !declared.is_orderable() {
            return Err(StoreError::unsupported_query(format!(
                "attribute '{attribute}' ({declared}) does not support range queries"
            )));
        }
        if !declared.matches(low) || !declared.matches(high) {
            return Err(StoreError::unsupported_query(format!(
                "range bounds for '{attribute}' must be {declared} values"
            )));
        }
        let low_key = IndexKey::from_value(low)
            .ok_or_else(|| StoreError::unsupported_query("list values are not indexable"))?;
        let high_key = IndexKey::from_value(high)
            .ok_or_else(|| StoreError::unsupported_query("list values are not indexable"))?;
        let ids = state.indices.attribute_range(attribute, &low_key, &high_key);
        Ok(Self::snapshot(state, ids))
    }

    fn execute_fuzzy(
        &self,
        state: &StoreState,
        field: FuzzyField,
        pattern: &str,
        kind: Option<&str>,
    ) -> Result<Vec<Node>, StoreError> {
        let cap = self.store.config().fuzzy_result_cap;
        let needle = pattern.to_lowercase();

        // Scan the kind partition (or all nodes) in id order so a capped
        // result set stays deterministic.
        let mut candidates: Vec<&String> = match kind {
            Some(kind) => state
                .indices
                .kind_partition(kind)
                .map(|ids| ids.iter().collect())
                .unwrap_or_default(),
            None => state.nodes.keys().collect(),
        };
        candidates.sort();

        let mut results = Vec::new();
        for id in candidates {
            if results.len() >= cap {
                break;
            }
            let Some(node) = state.nodes.get(id) else {
                continue;
            };
            let haystack = match field {
                FuzzyField::Name => &node.name,
                FuzzyField::Content => &node.content,
            };
            if haystack.to_lowercase().contains(&needle) {
                results.push(node.clone());
            }
        }
        Ok(results)
    }

    fn execute_composite(
        &self,
        state: &StoreState,
        primary: (&Dimension, &AttributeValue),
        secondary: (&Dimension, &AttributeValue),
    ) -> Result<Vec<Node>, StoreError> {
        let pair = (primary.0.clone(), secondary.0.clone());
        if state.indices.has_composite(&pair) {
            let primary_key = IndexKey::from_value(primary.1)
                .ok_or_else(|| StoreError::unsupported_query("list values are not indexable"))?;
            let secondary_key = IndexKey::from_value(secondary.1)
                .ok_or_else(|| StoreError::unsupported_query("list values are not indexable"))?;
            let ids = state
                .indices
                .composite_partition(&pair, &(primary_key, secondary_key))
                .cloned()
                .unwrap_or_default();
            return Ok(Self::snapshot(state, ids));
        }

        // No declared composite: intersect the two single-field lookups
        let primary_ids = self.exact_ids(state, primary.0, primary.1)?;
        let secondary_ids = self.exact_ids(state, secondary.0, secondary.1)?;
        let ids: Vec<String> = primary_ids
            .intersection(&secondary_ids)
            .cloned()
            .collect();
        Ok(Self::snapshot(state, ids))
    }

    /// Materialize ids into cloned nodes, sorted by id for deterministic
    /// output
    fn snapshot(state: &StoreState, ids: impl IntoIterator<Item = String>) -> Vec<Node> {
        let mut nodes: Vec<Node> = ids
            .into_iter()
            .filter_map(|id| state.nodes.get(&id).cloned())
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }
}
