//! Store Configuration
//!
//! Index dimensions, the kind registry, and tuning knobs are declared up
//! front at store-construction time, not ad hoc per query. The store
//! validates the configuration once in `NodeStore::new` and then treats it
//! as immutable shared state (`Arc<StoreConfig>`).

use crate::models::AttributeType;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default TTL for cached query results
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default result cap for fuzzy (linear-scan) queries
const DEFAULT_FUZZY_RESULT_CAP: usize = 100;

/// Default bound for the ancestry walk used by cycle detection. Hierarchies
/// deeper than this are rejected rather than traversed.
const DEFAULT_MAX_ANCESTRY_DEPTH: usize = 1_000;

/// An index dimension: one of the built-in partitions or a declared
/// attribute key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    /// Partition by `kind`
    Kind,
    /// Partition by `parent_id`
    Parent,
    /// Partition by a declared attribute key
    Attribute(String),
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Kind => write!(f, "kind"),
            Dimension::Parent => write!(f, "parent"),
            Dimension::Attribute(key) => write!(f, "attribute:{key}"),
        }
    }
}

/// Policy for kinds that are not present in the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KindPolicy {
    /// Reject writes whose `kind` is not registered (guards against silent
    /// typos creating orphan kinds)
    #[default]
    Registered,
    /// Admit any kind string
    AdHoc,
}

/// Per-kind registration: attribute key namespace and deletion default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSpec {
    /// Declared attribute keys and their types. An empty map means the kind
    /// declares no namespace and any keys are accepted without warnings.
    #[serde(default)]
    pub attribute_types: BTreeMap<String, AttributeType>,

    /// Whether `delete_with_kind_policy` cascades for nodes of this kind.
    /// Defaults to `false`: deleting a node with children is rejected
    /// unless the caller opts into cascading.
    #[serde(default)]
    pub cascade_by_default: bool,
}

impl KindSpec {
    /// A kind with no declared attribute namespace
    pub fn open() -> Self {
        Self::default()
    }

    /// Declare an attribute key for this kind
    pub fn with_attribute(mut self, key: impl Into<String>, ty: AttributeType) -> Self {
        self.attribute_types.insert(key.into(), ty);
        self
    }

    /// Make cascade the default deletion policy for this kind
    pub fn cascade_by_default(mut self) -> Self {
        self.cascade_by_default = true;
        self
    }
}

/// Store-wide configuration, declared once at construction time.
///
/// # Examples
///
/// ```rust
/// use nodeverse_core::models::AttributeType;
/// use nodeverse_core::store::{Dimension, KindSpec, StoreConfig};
///
/// let config = StoreConfig::new()
///     .register_kind("task", KindSpec::open().with_attribute("priority", AttributeType::Int))
///     .register_kind("folder", KindSpec::open())
///     .index_attribute("priority", AttributeType::Int)
///     .composite_index(Dimension::Kind, Dimension::Attribute("priority".to_string()));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Registered kinds and their specs
    #[serde(default)]
    pub kinds: BTreeMap<String, KindSpec>,

    /// What to do with unregistered kinds
    #[serde(default)]
    pub kind_policy: KindPolicy,

    /// Attribute keys maintained as secondary indices, with the value type
    /// every indexed write must conform to
    #[serde(default)]
    pub indexed_attributes: BTreeMap<String, AttributeType>,

    /// Declared composite indices (ordered dimension pairs)
    #[serde(default)]
    pub composite_indices: Vec<(Dimension, Dimension)>,

    /// TTL for cached query results
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    /// Result cap for fuzzy queries
    #[serde(default = "default_fuzzy_result_cap")]
    pub fuzzy_result_cap: usize,

    /// Bound for ancestry walks (cycle detection)
    #[serde(default = "default_max_ancestry_depth")]
    pub max_ancestry_depth: usize,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_fuzzy_result_cap() -> usize {
    DEFAULT_FUZZY_RESULT_CAP
}

fn default_max_ancestry_depth() -> usize {
    DEFAULT_MAX_ANCESTRY_DEPTH
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kinds: BTreeMap::new(),
            kind_policy: KindPolicy::default(),
            indexed_attributes: BTreeMap::new(),
            composite_indices: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fuzzy_result_cap: DEFAULT_FUZZY_RESULT_CAP,
            max_ancestry_depth: DEFAULT_MAX_ANCESTRY_DEPTH,
        }
    }
}

impl StoreConfig {
    /// Empty configuration with the `Registered` kind policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration admitting any kind, with no declared indices.
    /// Convenient for tests and exploratory use.
    pub fn permissive() -> Self {
        Self {
            kind_policy: KindPolicy::AdHoc,
            ..Self::default()
        }
    }

    /// Register a kind
    pub fn register_kind(mut self, kind: impl Into<String>, spec: KindSpec) -> Self {
        self.kinds.insert(kind.into(), spec);
        self
    }

    /// Declare a secondary index over an attribute key
    pub fn index_attribute(mut self, key: impl Into<String>, ty: AttributeType) -> Self {
        self.indexed_attributes.insert(key.into(), ty);
        self
    }

    /// Declare a composite index over an ordered dimension pair
    pub fn composite_index(mut self, primary: Dimension, secondary: Dimension) -> Self {
        self.composite_indices.push((primary, secondary));
        self
    }

    /// Set the kind policy
    pub fn with_kind_policy(mut self, policy: KindPolicy) -> Self {
        self.kind_policy = policy;
        self
    }

    /// Set the query-cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the fuzzy-query result cap
    pub fn with_fuzzy_result_cap(mut self, cap: usize) -> Self {
        self.fuzzy_result_cap = cap;
        self
    }

    /// Whether `kind` is acceptable under the registry and policy
    pub fn kind_allowed(&self, kind: &str) -> bool {
        self.kind_policy == KindPolicy::AdHoc || self.kinds.contains_key(kind)
    }

    /// Declared type for an indexed attribute key, if any
    pub fn indexed_attribute_type(&self, key: &str) -> Option<AttributeType> {
        self.indexed_attributes.get(key).copied()
    }

    /// Whether a dimension can back index lookups
    fn dimension_declared(&self, dim: &Dimension) -> bool {
        match dim {
            Dimension::Kind | Dimension::Parent => true,
            Dimension::Attribute(key) => self.indexed_attributes.contains_key(key),
        }
    }

    /// Check internal consistency of the declarations.
    ///
    /// Called once by `NodeStore::new`; a rejected configuration never
    /// produces a store.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (key, ty) in &self.indexed_attributes {
            if !ty.is_indexable() {
                return Err(StoreError::invalid_config(format!(
                    "indexed attribute '{key}' declares non-indexable type {ty}"
                )));
            }
        }
        for (primary, secondary) in &self.composite_indices {
            if primary == secondary {
                return Err(StoreError::invalid_config(format!(
                    "composite index ({primary}, {secondary}) repeats a dimension"
                )));
            }
            for dim in [primary, secondary] {
                if !self.dimension_declared(dim) {
                    return Err(StoreError::invalid_config(format!(
                        "composite index references undeclared dimension {dim}"
                    )));
                }
            }
        }
        if self.max_ancestry_depth == 0 {
            return Err(StoreError::invalid_config(
                "max_ancestry_depth must be at least 1",
            ));
        }
        Ok(())
    }
}
