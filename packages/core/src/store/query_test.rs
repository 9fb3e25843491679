//! Integration Tests for the Query Engine
//!
//! Covers the four query shapes, cache coherence across writes, hit/miss
//! accounting, and the corruption refusal path.

#[cfg(test)]
mod query_tests {
    use crate::models::{AttributeType, AttributeValue, CreateNodeParams, NodeUpdate};
    use crate::store::{
        Dimension, FuzzyField, KindPolicy, NodeStore, QueryEngine, QuerySpec, StoreConfig,
        StoreError,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> StoreConfig {
        StoreConfig::new()
            .with_kind_policy(KindPolicy::AdHoc)
            .index_attribute("priority", AttributeType::Int)
            .index_attribute("status", AttributeType::Str)
            .composite_index(
                Dimension::Kind,
                Dimension::Attribute("status".to_string()),
            )
    }

    fn test_engine() -> (Arc<NodeStore>, QueryEngine) {
        let store = Arc::new(NodeStore::new(test_config()).unwrap());
        let engine = QueryEngine::new(store.clone());
        (store, engine)
    }

    fn create(
        store: &NodeStore,
        kind: &str,
        name: &str,
        attributes: &[(&str, AttributeValue)],
    ) -> String {
        let attributes: BTreeMap<String, AttributeValue> = attributes
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        store
            .create(CreateNodeParams {
                kind: kind.to_string(),
                name: name.to_string(),
                attributes,
                ..Default::default()
            })
            .unwrap()
            .id
    }

    fn seed_documents(store: &NodeStore) {
        for name in ["alpha", "beta", "gamma"] {
            create(store, "document", name, &[]);
        }
        for name in ["delta", "epsilon"] {
            create(store, "note", name, &[]);
        }
    }

    #[test]
    fn test_exact_kind_query() {
        let (store, engine) = test_engine();
        seed_documents(&store);

        let results = engine
            .query(&QuerySpec::Exact {
                field: Dimension::Kind,
                value: AttributeValue::from("document"),
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|node| node.kind == "document"));
        // Deterministic order
        assert!(results.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[test]
    fn test_exact_parent_query() {
        let (store, engine) = test_engine();
        let parent = create(&store, "folder", "root", &[]);
        let child = store
            .create(CreateNodeParams {
                kind: "file".to_string(),
                name: "inside".to_string(),
                parent_id: Some(parent.clone()),
                ..Default::default()
            })
            .unwrap();

        let results = engine
            .query(&QuerySpec::Exact {
                field: Dimension::Parent,
                value: AttributeValue::from(parent),
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, child.id);
    }

    #[test]
    fn test_exact_attribute_query() {
        let (store, engine) = test_engine();
        let hit = create(&store, "task", "a", &[("priority", 5_i64.into())]);
        create(&store, "task", "b", &[("priority", 9_i64.into())]);
        create(&store, "task", "c", &[]);

        let results = engine
            .query(&QuerySpec::Exact {
                field: Dimension::Attribute("priority".to_string()),
                value: 5_i64.into(),
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit);
    }

    #[test]
    fn test_exact_query_on_undeclared_attribute_is_unsupported() {
        let (_store, engine) = test_engine();
        let err = engine
            .query(&QuerySpec::Exact {
                field: Dimension::Attribute("color".to_string()),
                value: AttributeValue::from("red"),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedQuery(_)));
    }

    #[test]
    fn test_range_query_is_inclusive() {
        let (store, engine) = test_engine();
        for priority in [1_i64, 5, 9] {
            create(
                &store,
                "task",
                &format!("p{priority}"),
                &[("priority", priority.into())],
            );
        }

        let results = engine
            .query(&QuerySpec::Range {
                attribute: "priority".to_string(),
                low: 2_i64.into(),
                high: 9_i64.into(),
            })
            .unwrap();
        let mut names: Vec<&str> = results.iter().map(|node| node.name.as_str()).collect();
        names.sort();
        assert_eq!(names, ["p5", "p9"]);
    }

    #[test]
    fn test_range_query_with_inverted_bounds_is_empty() {
        let (store, engine) = test_engine();
        for priority in [1_i64, 5, 9] {
            create(
                &store,
                "task",
                &format!("p{priority}"),
                &[("priority", priority.into())],
            );
        }

        // [9, 2] is an empty interval, not a crash
        let results = engine
            .query(&QuerySpec::Range {
                attribute: "priority".to_string(),
                low: 9_i64.into(),
                high: 2_i64.into(),
            })
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_range_query_rejects_mismatched_bound_types() {
        let (_store, engine) = test_engine();
        let err = engine
            .query(&QuerySpec::Range {
                attribute: "priority".to_string(),
                low: AttributeValue::from("low"),
                high: 9_i64.into(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedQuery(_)));
    }

    #[test]
    fn test_fuzzy_query_is_case_insensitive() {
        let (store, engine) = test_engine();
        create(&store, "document", "Quarterly Report", &[]);
        create(&store, "document", "quarterly summary", &[]);
        create(&store, "document", "unrelated", &[]);

        let results = engine
            .query(&QuerySpec::Fuzzy {
                field: FuzzyField::Name,
                pattern: "QUARTERLY".to_string(),
                kind: None,
            })
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_fuzzy_query_scoped_to_kind_and_capped() {
        let store = Arc::new(
            NodeStore::new(test_config().with_fuzzy_result_cap(3)).unwrap(),
        );
        let engine = QueryEngine::new(store.clone());
        for i in 0..5 {
            create(&store, "document", &format!("match {i}"), &[]);
        }
        create(&store, "note", "match too", &[]);

        let results = engine
            .query(&QuerySpec::Fuzzy {
                field: FuzzyField::Name,
                pattern: "match".to_string(),
                kind: Some("document".to_string()),
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|node| node.kind == "document"));
    }

    #[test]
    fn test_fuzzy_query_searches_content() {
        let (store, engine) = test_engine();
        store
            .create(CreateNodeParams {
                kind: "note".to_string(),
                name: "untitled".to_string(),
                content: "remember the milk".to_string(),
                ..Default::default()
            })
            .unwrap();

        let results = engine
            .query(&QuerySpec::Fuzzy {
                field: FuzzyField::Content,
                pattern: "the milk".to_string(),
                kind: None,
            })
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_composite_query_uses_declared_index() {
        let (store, engine) = test_engine();
        let hit = create(&store, "task", "open task", &[("status", "open".into())]);
        create(&store, "task", "done task", &[("status", "done".into())]);
        create(&store, "note", "open note", &[("status", "open".into())]);

        let results = engine
            .query(&QuerySpec::Composite {
                primary_field: Dimension::Kind,
                primary_value: AttributeValue::from("task"),
                secondary_field: Dimension::Attribute("status".to_string()),
                secondary_value: AttributeValue::from("open"),
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit);
    }

    #[test]
    fn test_composite_query_falls_back_to_intersection() {
        let (store, engine) = test_engine();
        let hit = create(
            &store,
            "task",
            "urgent open",
            &[("status", "open".into()), ("priority", 9_i64.into())],
        );
        create(&store, "task", "casual open", &[("status", "open".into())]);
        create(&store, "task", "urgent done", &[("priority", 9_i64.into())]);

        // (status, priority) has no declared composite index
        let results = engine
            .query(&QuerySpec::Composite {
                primary_field: Dimension::Attribute("status".to_string()),
                primary_value: AttributeValue::from("open"),
                secondary_field: Dimension::Attribute("priority".to_string()),
                secondary_value: 9_i64.into(),
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit);
    }

    #[test]
    fn test_cache_hit_and_miss_accounting() {
        let (store, engine) = test_engine();
        seed_documents(&store);

        let spec = QuerySpec::Exact {
            field: Dimension::Kind,
            value: AttributeValue::from("document"),
        };
        engine.query(&spec).unwrap();
        engine.query(&spec).unwrap();
        engine.query(&spec).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 2);
    }

    #[test]
    fn test_write_invalidates_dependent_cache_entries() {
        let (store, engine) = test_engine();
        seed_documents(&store);

        let spec = QuerySpec::Exact {
            field: Dimension::Kind,
            value: AttributeValue::from("document"),
        };
        assert_eq!(engine.query(&spec).unwrap().len(), 3);

        create(&store, "document", "zeta", &[]);
        assert_eq!(engine.query(&spec).unwrap().len(), 4);

        let stats = engine.stats();
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.cache_misses, 2);
    }

    #[test]
    fn test_update_invalidates_embedded_snapshots() {
        let (store, engine) = test_engine();
        let id = create(&store, "document", "draft", &[]);

        let spec = QuerySpec::Exact {
            field: Dimension::Kind,
            value: AttributeValue::from("document"),
        };
        assert_eq!(engine.query(&spec).unwrap()[0].name, "draft");

        store
            .update(&id, NodeUpdate::new().with_name("final".to_string()))
            .unwrap();
        assert_eq!(engine.query(&spec).unwrap()[0].name, "final");
    }

    #[test]
    fn test_expired_entries_are_recomputed() {
        let store = Arc::new(
            NodeStore::new(test_config().with_cache_ttl(Duration::from_millis(10))).unwrap(),
        );
        let engine = QueryEngine::new(store.clone());
        seed_documents(&store);

        let spec = QuerySpec::Exact {
            field: Dimension::Kind,
            value: AttributeValue::from("note"),
        };
        engine.query(&spec).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        engine.query(&spec).unwrap();

        assert_eq!(engine.stats().cache_misses, 2);
    }

    #[test]
    fn test_corrupted_indices_refuse_queries_until_rebuild() {
        let (store, engine) = test_engine();
        seed_documents(&store);

        store
            .state
            .write()
            .unwrap()
            .indices
            .mark_corrupted("injected for test");

        let spec = QuerySpec::Exact {
            field: Dimension::Kind,
            value: AttributeValue::from("document"),
        };
        assert!(matches!(
            engine.query(&spec),
            Err(StoreError::IndexCorruption { .. })
        ));
        assert!(matches!(
            store.list_by_kind("document"),
            Err(StoreError::IndexCorruption { .. })
        ));

        store.rebuild_indices().unwrap();
        assert_eq!(engine.query(&spec).unwrap().len(), 3);
        store.verify_indices().unwrap();
    }

    #[test]
    fn test_results_are_detached_snapshots() {
        let (store, engine) = test_engine();
        let id = create(&store, "document", "original", &[]);

        let spec = QuerySpec::Exact {
            field: Dimension::Kind,
            value: AttributeValue::from("document"),
        };
        let mut results = engine.query(&spec).unwrap();
        results[0].name = "mutated locally".to_string();

        assert_eq!(store.get(&id).unwrap().name, "original");
    }

    #[test]
    fn test_spec_serialization_round_trip() {
        let spec = QuerySpec::Composite {
            primary_field: Dimension::Kind,
            primary_value: AttributeValue::from("task"),
            secondary_field: Dimension::Attribute("status".to_string()),
            secondary_value: AttributeValue::from("open"),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: QuerySpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
