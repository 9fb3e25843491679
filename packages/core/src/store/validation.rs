//! Validation Engine
//!
//! Gates every mutation with structural and referential checks before the
//! store commits. Validation is a pure function of the proposed node plus
//! the current (read-only) node map, so it can be retried or run
//! speculatively without side effects.
//!
//! Checks run in order:
//!
//! 1. referenced `parent_id` exists
//! 2. no self-parenting and no cycle creation, via an ancestry walk bounded
//!    by `StoreConfig::max_ancestry_depth`
//! 3. values under indexed attribute keys conform to the declared type
//! 4. `kind` is registered, unless the policy admits ad hoc kinds
//!
//! Errors block the commit; warnings (undeclared attribute keys on a kind
//! that declares a namespace) are logged by the store but do not block.

use crate::models::{AttributeType, Node};
use crate::store::config::StoreConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A single validation finding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    #[error("parent node does not exist: {parent_id}")]
    MissingParent { parent_id: String },

    #[error("node {id} cannot be its own parent")]
    SelfParent { id: String },

    #[error("reparenting {id} under {parent_id} would create a cycle")]
    CycleDetected { id: String, parent_id: String },

    #[error("ancestry deeper than the configured limit of {limit}")]
    AncestryTooDeep { limit: usize },

    #[error("attribute '{key}' must be {expected}, found {found}")]
    AttributeTypeMismatch {
        key: String,
        expected: AttributeType,
        found: AttributeType,
    },

    #[error("kind is not registered: {kind}")]
    UnregisteredKind { kind: String },

    #[error("attribute '{key}' is not declared for kind '{kind}'")]
    UnknownAttributeKey { kind: String, key: String },

    #[error("node {parent_id} lists missing child {child_id}")]
    DanglingChild { parent_id: String, child_id: String },

    #[error("node {parent_id} lists child {child_id} more than once")]
    DuplicateChild { parent_id: String, child_id: String },

    #[error("parent {parent_id} and child {child_id} disagree about their link")]
    ParentChildMismatch { parent_id: String, child_id: String },
}

/// Blocking findings of a failed validation, carried by
/// `StoreError::Validation`
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Outcome of validating one proposed node
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Blocking findings; empty means the commit may proceed
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking findings, surfaced via logging
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Whether the commit may proceed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }
}

/// Pre-commit checker for the store
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    config: Arc<StoreConfig>,
}

impl ValidationEngine {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self { config }
    }

    /// Validate `proposed` against the current node map.
    ///
    /// For updates, `nodes` still holds the previous version of the node
    /// under `proposed.id`; the ancestry walk therefore detects cycles that
    /// the proposed reparenting would introduce.
    pub fn validate(&self, proposed: &Node, nodes: &HashMap<String, Node>) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.check_parent(proposed, nodes, &mut result);
        self.check_attributes(proposed, &mut result);
        self.check_kind(proposed, &mut result);
        result
    }

    /// Checks (a) and (b): parent existence, self-parenting, cycles
    fn check_parent(
        &self,
        proposed: &Node,
        nodes: &HashMap<String, Node>,
        result: &mut ValidationResult,
    ) {
        let Some(parent_id) = &proposed.parent_id else {
            return;
        };

        if *parent_id == proposed.id {
            result.error(ValidationIssue::SelfParent {
                id: proposed.id.clone(),
            });
            return;
        }

        if !nodes.contains_key(parent_id) {
            result.error(ValidationIssue::MissingParent {
                parent_id: parent_id.clone(),
            });
            return;
        }

        // Walk the ancestry chain from the proposed parent to the root. If
        // the walk reaches the proposed node, committing would close a
        // cycle. The walk is bounded so a corrupt chain cannot loop forever.
        let limit = self.config.max_ancestry_depth;
        let mut current = parent_id.as_str();
        for _ in 0..limit {
            let Some(ancestor) = nodes.get(current) else {
                // Dangling ancestor reference: the missing-parent error for
                // that node fired when it was written; nothing more to add.
                return;
            };
            match &ancestor.parent_id {
                Some(next) if *next == proposed.id => {
                    result.error(ValidationIssue::CycleDetected {
                        id: proposed.id.clone(),
                        parent_id: parent_id.clone(),
                    });
                    return;
                }
                Some(next) => current = next,
                None => return,
            }
        }
        result.error(ValidationIssue::AncestryTooDeep { limit });
    }

    /// Check (c): indexed attribute keys carry values of the declared type
    fn check_attributes(&self, proposed: &Node, result: &mut ValidationResult) {
        for (key, expected) in &self.config.indexed_attributes {
            if let Some(value) = proposed.attributes.get(key) {
                if !expected.matches(value) {
                    result.error(ValidationIssue::AttributeTypeMismatch {
                        key: key.clone(),
                        expected: *expected,
                        found: value.attribute_type(),
                    });
                }
            }
        }
    }

    /// Check (d): kind registration, plus the per-kind attribute namespace
    fn check_kind(&self, proposed: &Node, result: &mut ValidationResult) {
        let Some(spec) = self.config.kinds.get(&proposed.kind) else {
            if !self.config.kind_allowed(&proposed.kind) {
                result.error(ValidationIssue::UnregisteredKind {
                    kind: proposed.kind.clone(),
                });
            }
            return;
        };

        // Typed keys in the kind namespace are enforced like index
        // dimensions; keys outside a declared namespace only warn.
        for (key, value) in &proposed.attributes {
            match spec.attribute_types.get(key) {
                Some(expected) if !expected.matches(value) => {
                    result.error(ValidationIssue::AttributeTypeMismatch {
                        key: key.clone(),
                        expected: *expected,
                        found: value.attribute_type(),
                    });
                }
                Some(_) => {}
                None if !spec.attribute_types.is_empty() => {
                    result.warning(ValidationIssue::UnknownAttributeKey {
                        kind: proposed.kind.clone(),
                        key: key.clone(),
                    });
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeValue, Node};
    use crate::store::config::{KindSpec, StoreConfig};
    use std::collections::BTreeMap;

    fn node(kind: &str, name: &str, parent_id: Option<&str>) -> Node {
        Node::new(
            kind.to_string(),
            name.to_string(),
            String::new(),
            parent_id.map(str::to_string),
            BTreeMap::new(),
        )
    }

    fn engine(config: StoreConfig) -> ValidationEngine {
        ValidationEngine::new(Arc::new(config))
    }

    #[test]
    fn test_missing_parent_is_an_error() {
        let engine = engine(StoreConfig::permissive());
        let nodes = HashMap::new();
        let proposed = node("doc", "orphan", Some("nope"));

        let result = engine.validate(&proposed, &nodes);
        assert!(!result.is_valid());
        assert!(matches!(
            result.errors[0],
            ValidationIssue::MissingParent { .. }
        ));
    }

    #[test]
    fn test_self_parent_is_an_error() {
        let engine = engine(StoreConfig::permissive());
        let mut proposed = node("doc", "selfie", None);
        proposed.parent_id = Some(proposed.id.clone());

        let result = engine.validate(&proposed, &HashMap::new());
        assert!(matches!(
            result.errors[0],
            ValidationIssue::SelfParent { .. }
        ));
    }

    #[test]
    fn test_cycle_detection_on_reparent() {
        let engine = engine(StoreConfig::permissive());

        // a -> b (b's parent is a); reparenting a under b closes a cycle
        let mut a = node("doc", "a", None);
        let b = node("doc", "b", Some(&a.id));
        let mut nodes = HashMap::new();
        nodes.insert(a.id.clone(), a.clone());
        nodes.insert(b.id.clone(), b.clone());

        a.parent_id = Some(b.id.clone());
        let result = engine.validate(&a, &nodes);
        assert!(matches!(
            result.errors[0],
            ValidationIssue::CycleDetected { .. }
        ));
    }

    #[test]
    fn test_ancestry_walk_is_bounded() {
        let mut config = StoreConfig::permissive();
        config.max_ancestry_depth = 3;
        let engine = engine(config);

        // Chain of 5 ancestors exceeds the limit of 3
        let mut nodes = HashMap::new();
        let mut parent: Option<String> = None;
        let mut last_id = String::new();
        for i in 0..5 {
            let n = node("doc", &format!("n{i}"), parent.as_deref());
            parent = Some(n.id.clone());
            last_id = n.id.clone();
            nodes.insert(n.id.clone(), n);
        }

        let proposed = node("doc", "leaf", Some(&last_id));
        let result = engine.validate(&proposed, &nodes);
        assert!(matches!(
            result.errors[0],
            ValidationIssue::AncestryTooDeep { limit: 3 }
        ));
    }

    #[test]
    fn test_indexed_attribute_type_mismatch() {
        let config = StoreConfig::permissive().index_attribute("priority", AttributeType::Int);
        let engine = engine(config);

        let mut proposed = node("task", "t", None);
        proposed.attributes.insert(
            "priority".to_string(),
            AttributeValue::Str("high".to_string()),
        );

        let result = engine.validate(&proposed, &HashMap::new());
        assert!(matches!(
            result.errors[0],
            ValidationIssue::AttributeTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_unregistered_kind_rejected_under_strict_policy() {
        let engine = engine(StoreConfig::new().register_kind("doc", KindSpec::open()));

        let ok = engine.validate(&node("doc", "fine", None), &HashMap::new());
        assert!(ok.is_valid());

        let bad = engine.validate(&node("dok", "typo", None), &HashMap::new());
        assert!(matches!(
            bad.errors[0],
            ValidationIssue::UnregisteredKind { .. }
        ));
    }

    #[test]
    fn test_unknown_key_in_declared_namespace_warns() {
        let config = StoreConfig::new().register_kind(
            "task",
            KindSpec::open().with_attribute("status", AttributeType::Str),
        );
        let engine = engine(config);

        let mut proposed = node("task", "t", None);
        proposed
            .attributes
            .insert("surprise".to_string(), AttributeValue::Bool(true));

        let result = engine.validate(&proposed, &HashMap::new());
        assert!(result.is_valid());
        assert!(matches!(
            result.warnings[0],
            ValidationIssue::UnknownAttributeKey { .. }
        ));
    }

    #[test]
    fn test_kind_namespace_types_are_enforced() {
        let config = StoreConfig::new().register_kind(
            "task",
            KindSpec::open().with_attribute("status", AttributeType::Str),
        );
        let engine = engine(config);

        let mut proposed = node("task", "t", None);
        proposed
            .attributes
            .insert("status".to_string(), AttributeValue::Int(3));

        let result = engine.validate(&proposed, &HashMap::new());
        assert!(!result.is_valid());
    }
}
