use std::sync::Arc;

use proptest::prelude::*;
use schema_union_core::{
    BooleanLeaf, ComponentSchema, ConfigError, Field, IntegerLeaf, KeyedError, LeafAdapter,
    MultiNested, MultiNestedOptions, ObjectSchema, Record, SchemaError, StringLeaf,
    TimestampLeaf, UnknownPolicy, ValueSchemaKind, ValueTypedDictSchema, WHOLE_RECORD,
};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn string_object(name: &str, keys: &[&str]) -> Arc<dyn ComponentSchema> {
    let schema = keys.iter().fold(ObjectSchema::new(name), |schema, key| {
        schema.with_field(Field::leaf(*key, Arc::new(StringLeaf::new())))
    });
    Arc::new(schema)
}

fn string_values(name: &str) -> ValueTypedDictSchema {
    ValueTypedDictSchema::new(
        name,
        ValueSchemaKind::Leaf(LeafAdapter::new("value", Arc::new(StringLeaf::new()))),
    )
}

fn host_attributes() -> Arc<dyn ComponentSchema> {
    Arc::new(
        ObjectSchema::new("host_attributes")
            .with_field(Field::leaf("a_str", Arc::new(StringLeaf::new())))
            .with_field(Field::leaf("a_int", Arc::new(IntegerLeaf::new())))
            .with_field(Field::leaf("a_at", Arc::new(TimestampLeaf))),
    )
}

fn flags() -> Arc<dyn ComponentSchema> {
    Arc::new(ObjectSchema::new("flags").with_field(Field::leaf("b_flag", Arc::new(BooleanLeaf))))
}

fn hybrid() -> Arc<dyn ComponentSchema> {
    Arc::new(
        string_values("hybrid")
            .with_static_field(Field::leaf("static1", Arc::new(StringLeaf::new()))),
    )
}

fn merged_with(components: Vec<Arc<dyn ComponentSchema>>, unknown: UnknownPolicy) -> MultiNested {
    MultiNested::new(
        "merged",
        components,
        MultiNestedOptions::merged().with_unknown(unknown),
    )
    .unwrap()
}

fn validation(err: SchemaError) -> KeyedError {
    match err {
        SchemaError::Validation(err) => err,
        SchemaError::Config(err) => panic!("unexpected configuration error: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Exclusive mode
// ---------------------------------------------------------------------------

#[test]
fn test_exclusive_returns_first_matching_shape() {
    // Both components accept {"x": ...}; the first one decodes "at" as a
    // timestamp, the second would keep it as an integer.
    let stamped: Arc<dyn ComponentSchema> = Arc::new(
        ObjectSchema::new("stamped")
            .with_field(Field::leaf("x", Arc::new(StringLeaf::new())))
            .with_field(Field::leaf("at", Arc::new(TimestampLeaf))),
    );
    let counted: Arc<dyn ComponentSchema> = Arc::new(
        ObjectSchema::new("counted")
            .with_field(Field::leaf("x", Arc::new(StringLeaf::new())))
            .with_field(Field::leaf("at", Arc::new(IntegerLeaf::new()))),
    );

    let union = MultiNested::new(
        "either",
        vec![stamped.clone(), counted.clone()],
        MultiNestedOptions::exclusive(),
    )
    .unwrap();
    let out = union.load(&json!({"x": "v", "at": 0})).unwrap();
    assert_eq!(out, json!({"x": "v", "at": "1970-01-01T00:00:00Z"}));

    let reversed =
        MultiNested::new("either", vec![counted, stamped], MultiNestedOptions::exclusive())
            .unwrap();
    let out = reversed.load(&json!({"x": "v", "at": 0})).unwrap();
    assert_eq!(out, json!({"x": "v", "at": 0}));
}

#[test]
fn test_exclusive_blank_hook_schema_claims_by_validation() {
    let upper_only: Arc<dyn ComponentSchema> =
        Arc::new(ObjectSchema::new("upper_only").with_hook(|record| {
            for (key, value) in record {
                let ok = value
                    .as_str()
                    .is_some_and(|s| s.chars().all(|c| !c.is_lowercase()));
                if !ok {
                    return Err(KeyedError::for_key(key.clone(), "Must be upper case."));
                }
            }
            Ok(())
        }));
    let union =
        MultiNested::new("upper", vec![upper_only], MultiNestedOptions::exclusive()).unwrap();

    assert_eq!(
        union.load(&json!({"A": "X", "B": "Y"})).unwrap(),
        json!({"A": "X", "B": "Y"})
    );
    let err = validation(union.load(&json!({"A": "X", "B": "y"})).unwrap_err());
    assert_eq!(err.messages("B"), ["Must be upper case."]);
}

// ---------------------------------------------------------------------------
// Merged mode
// ---------------------------------------------------------------------------

#[test]
fn test_merged_disjointness_enforced_at_construction() {
    let err = MultiNested::new(
        "both",
        vec![
            string_object("left", &["x", "l"]),
            string_object("right", &["x", "r"]),
        ],
        MultiNestedOptions::merged(),
    )
    .unwrap_err();
    let ConfigError::NotDisjoint { conflicts } = &err else {
        panic!("expected NotDisjoint, got {err:?}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].key, "x");
    assert!(err.to_string().contains("left"));
    assert!(err.to_string().contains("right"));
}

#[test]
fn test_merged_unions_claims_and_requires_full_coverage() {
    let union = MultiNested::new(
        "ab",
        vec![string_object("a", &["a"]), string_object("b", &["b"])],
        MultiNestedOptions::merged(),
    )
    .unwrap();

    assert_eq!(
        union.load(&json!({"a": "1", "b": "2"})).unwrap(),
        json!({"a": "1", "b": "2"})
    );

    let err = validation(union.load(&json!({"a": "1", "c": "3"})).unwrap_err());
    assert_eq!(err.keys().collect::<Vec<_>>(), ["c"]);
}

#[test]
fn test_merged_with_many_rejected_before_any_call() {
    let err = MultiNested::new(
        "ab",
        vec![string_object("a", &["a"])],
        MultiNestedOptions::merged().with_many(true),
    )
    .unwrap_err();
    assert_eq!(err, ConfigError::MergedWithMany);
}

#[test]
fn test_key_by_key_fallback_claims_valid_keys_despite_invalid_ones() {
    let counts: Arc<dyn ComponentSchema> =
        Arc::new(LeafAdapter::new("counts", Arc::new(IntegerLeaf::new())));
    let labels: Arc<dyn ComponentSchema> = Arc::new(string_values("labels"));
    let union = MultiNested::new(
        "mixed",
        vec![counts, labels],
        MultiNestedOptions::merged(),
    )
    .unwrap();

    // "n" is claimed by counts, "s" fails counts but is then claimed by labels.
    assert_eq!(
        union.load(&json!({"n": 1, "s": "text"})).unwrap(),
        json!({"n": 1, "s": "text"})
    );

    // "bad" fails both blank components; "n" is still claimed.
    let err = validation(union.load(&json!({"n": 1, "bad": [1]})).unwrap_err());
    assert_eq!(err.keys().collect::<Vec<_>>(), ["bad"]);
    assert_eq!(
        err.messages("bad"),
        ["Not a valid integer.", "Not a valid string."]
    );
}

#[test]
fn test_merged_value_dict_with_named_attributes() {
    let union = MultiNested::new(
        "attributes",
        vec![host_attributes(), Arc::new(string_values("custom"))],
        MultiNestedOptions::merged(),
    )
    .unwrap();

    let value = union
        .load(&json!({"a_str": "db", "a_at": 60, "tag_env": "prod"}))
        .unwrap();
    assert_eq!(
        value,
        json!({"a_str": "db", "a_at": "1970-01-01T00:01:00Z", "tag_env": "prod"})
    );
    assert_eq!(
        union.dump(&value).unwrap(),
        json!({"a_str": "db", "a_at": 60, "tag_env": "prod"})
    );
}

#[test]
fn test_merged_failed_nested_field_fails_under_every_policy() {
    let owner = || -> Arc<dyn ComponentSchema> {
        let inner: Arc<dyn ComponentSchema> = Arc::new(
            ObjectSchema::new("inner").with_field(Field::leaf("n", Arc::new(IntegerLeaf::new()))),
        );
        Arc::new(ObjectSchema::new("owner").with_field(Field::nested("o", inner)))
    };
    let input = json!({"o": {"n": "not-an-int"}, "name": "x"});

    for unknown in [UnknownPolicy::Reject, UnknownPolicy::Ignore, UnknownPolicy::Include] {
        let union = merged_with(vec![owner(), string_object("named", &["name"])], unknown);
        let err = validation(union.load(&input).unwrap_err());
        assert_eq!(err.messages("o.n"), ["Not a valid integer."], "{unknown:?}");
        assert!(!err.contains_key("o"), "{unknown:?}");
        assert!(!err.contains_key("name"), "{unknown:?}");
    }
}

#[test]
fn test_merged_failed_hook_fails_under_every_policy() {
    let range = || -> Arc<dyn ComponentSchema> {
        Arc::new(
            ObjectSchema::new("range")
                .with_field(Field::leaf("lo", Arc::new(IntegerLeaf::new())))
                .with_field(Field::leaf("hi", Arc::new(IntegerLeaf::new())))
                .with_hook(|record| {
                    if record["lo"].as_i64() > record["hi"].as_i64() {
                        return Err(KeyedError::whole_record("lo must not exceed hi."));
                    }
                    Ok(())
                }),
        )
    };
    let input = json!({"lo": 5, "hi": 1, "name": "x"});

    for unknown in [UnknownPolicy::Reject, UnknownPolicy::Ignore, UnknownPolicy::Include] {
        let union = merged_with(vec![range(), string_object("named", &["name"])], unknown);
        let err = validation(union.load(&input).unwrap_err());
        assert_eq!(err.messages(WHOLE_RECORD), ["lo must not exceed hi."], "{unknown:?}");
        assert!(!err.contains_key("lo"), "{unknown:?}");
        assert!(!err.contains_key("hi"), "{unknown:?}");
    }

    let union = merged_with(
        vec![range(), string_object("named", &["name"])],
        UnknownPolicy::Reject,
    );
    assert_eq!(
        union.load(&json!({"lo": 1, "hi": 5, "name": "x"})).unwrap(),
        json!({"lo": 1, "hi": 5, "name": "x"})
    );
}

#[test]
fn test_merged_keys_rejected_by_declared_component_are_not_retried() {
    // "tags" would accept "alias" as a string, but "host" owns it.
    let host: Arc<dyn ComponentSchema> = Arc::new(
        ObjectSchema::new("host")
            .with_field(Field::leaf("alias", Arc::new(StringLeaf::new().with_max_length(3)))),
    );
    let union = merged_with(
        vec![host, Arc::new(string_values("tags"))],
        UnknownPolicy::Reject,
    );
    let err = validation(union.load(&json!({"alias": "too long", "rack": "r1"})).unwrap_err());
    assert_eq!(err.keys().collect::<Vec<_>>(), ["alias"]);
}

#[test]
fn test_merged_hybrid_dict_takes_keys_nobody_declares() {
    let union = merged_with(
        vec![string_object("o", &["a"]), hybrid()],
        UnknownPolicy::Reject,
    );
    let record = json!({"a": "1", "static1": "x", "dyn1": "v1"});

    let value = union.load(&record).unwrap();
    assert_eq!(value, record);
    assert_eq!(union.dump(&value).unwrap(), record);

    let err = validation(union.load(&json!({"a": "1", "dyn1": 2})).unwrap_err());
    assert_eq!(err.messages("dyn1"), ["Not a valid string."]);
    assert!(!err.contains_key("a"));
}

// ---------------------------------------------------------------------------
// Hybrid dictionary
// ---------------------------------------------------------------------------

#[test]
fn test_value_typed_dict_static_and_dynamic_keys() {
    let schema = string_values("hybrid")
        .with_static_field(Field::leaf("static1", Arc::new(StringLeaf::new())));

    let input = json!({"static1": "x", "dyn1": "v1", "dyn2": "v2"});
    let out = schema
        .load(input.as_object().unwrap(), UnknownPolicy::Reject)
        .unwrap();
    assert_eq!(Value::Object(out), input);

    let bad = json!({"static1": "x", "dyn1": "v1", "dyn2": false});
    let err = schema
        .load(bad.as_object().unwrap(), UnknownPolicy::Reject)
        .unwrap_err();
    assert_eq!(err.messages("dyn2"), ["Not a valid string."]);
    assert!(!err.contains_key("static1"));
    assert!(!err.contains_key("dyn1"));
}

#[test]
fn test_exclusive_hybrid_dict_round_trips() {
    let union = MultiNested::new("u", vec![hybrid()], MultiNestedOptions::exclusive()).unwrap();
    let record = json!({"static1": "x", "dyn1": "v1"});

    let value = union.load(&record).unwrap();
    assert_eq!(value, record);
    assert_eq!(union.dump(&value).unwrap(), record);

    let err = validation(union.dump(&json!({"static1": "x", "dyn1": 1})).unwrap_err());
    assert_eq!(err.messages("dyn1"), ["Not a valid string."]);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_shared_combinator_serves_concurrent_calls() {
    let union = Arc::new(
        MultiNested::new(
            "attributes",
            vec![host_attributes(), Arc::new(string_values("custom"))],
            MultiNestedOptions::merged(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let union = Arc::clone(&union);
            std::thread::spawn(move || {
                let key = format!("tag_{i}");
                let out = union.load(&json!({"a_int": i, (key.clone()): "v"})).unwrap();
                out[&key] == json!("v")
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

fn attribute_record() -> impl Strategy<Value = Value> {
    (
        proptest::option::of("[a-z]{0,8}"),
        proptest::option::of(any::<i64>()),
        proptest::option::of(0i64..4_000_000_000),
        proptest::option::of(any::<bool>()),
        proptest::collection::btree_map("x_[a-z]{1,6}", "[ -~]{0,10}", 0..4),
    )
        .prop_map(|(s, n, at, flag, dynamic)| {
            let mut record = Record::new();
            if let Some(s) = s {
                record.insert("a_str".into(), json!(s));
            }
            if let Some(n) = n {
                record.insert("a_int".into(), json!(n));
            }
            if let Some(at) = at {
                record.insert("a_at".into(), json!(at));
            }
            if let Some(flag) = flag {
                record.insert("b_flag".into(), json!(flag));
            }
            for (key, value) in dynamic {
                record.insert(key, json!(value));
            }
            Value::Object(record)
        })
}

proptest! {
    #[test]
    fn test_merged_load_then_dump_reproduces_record(record in attribute_record()) {
        let union = MultiNested::new(
            "attributes",
            vec![host_attributes(), flags(), Arc::new(string_values("custom"))],
            MultiNestedOptions::merged(),
        )
        .unwrap();
        let value = union.load(&record).unwrap();
        prop_assert_eq!(union.dump(&value).unwrap(), record);
    }

    #[test]
    fn test_exclusive_load_then_dump_reproduces_record(record in attribute_record()) {
        // Without dynamic keys and flags the record fits host_attributes alone.
        let mut record = record;
        if let Some(map) = record.as_object_mut() {
            map.retain(|key, _| key.starts_with("a_"));
        }
        let union = MultiNested::new(
            "either",
            vec![host_attributes(), flags()],
            MultiNestedOptions::exclusive(),
        )
        .unwrap();
        let value = union.load(&record).unwrap();
        prop_assert_eq!(union.dump(&value).unwrap(), record);
    }

    #[test]
    fn test_many_round_trips_each_element(records in proptest::collection::vec(attribute_record(), 0..4)) {
        let records: Vec<Value> = records
            .into_iter()
            .map(|mut r| {
                if let Some(map) = r.as_object_mut() {
                    map.retain(|key, _| key.starts_with("a_"));
                }
                r
            })
            .collect();
        let union = MultiNested::new(
            "list",
            vec![host_attributes()],
            MultiNestedOptions::exclusive().with_many(true),
        )
        .unwrap();
        let input = Value::Array(records);
        let value = union.load(&input).unwrap();
        prop_assert_eq!(union.dump(&value).unwrap(), input);
    }
}
