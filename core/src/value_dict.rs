//! Hybrid dictionary schema: static named fields plus an open map whose
//! values all share one value schema.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter::LeafAdapter;
use crate::describe::SchemaDescription;
use crate::error::KeyedError;
use crate::object::{Field, ObjectSchema, nested_map};
use crate::schema::ComponentSchema;
use crate::types::{Record, UnknownPolicy};

/// The schema applied to every non-static key.
///
/// The set of value-schema kinds is closed: a leaf adapter or a nested
/// component schema. Descriptor layers that accept free-form type names
/// must reject anything else while building.
#[derive(Debug, Clone)]
pub enum ValueSchemaKind {
    /// Each dynamic value is a leaf.
    Leaf(LeafAdapter),
    /// Each dynamic value is a nested record, or a list of them.
    Nested {
        /// Schema of the nested record(s).
        schema: Arc<dyn ComponentSchema>,
        /// Whether each value is a list of records.
        many: bool,
    },
}

/// Static fields plus arbitrarily many same-typed dynamic keys.
///
/// Keys named by a static field go through the static schema; every other
/// key is validated and decoded by the value schema. A failing dynamic key
/// fails the call immediately with an error keyed by that key.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use schema_union_core::{
///     ComponentSchema, Field, LeafAdapter, StringLeaf, UnknownPolicy, ValueSchemaKind,
///     ValueTypedDictSchema,
/// };
/// use serde_json::json;
///
/// let schema = ValueTypedDictSchema::new(
///     "custom",
///     ValueSchemaKind::Leaf(LeafAdapter::new("value", Arc::new(StringLeaf::new()))),
/// )
/// .with_static_field(Field::leaf("static1", Arc::new(StringLeaf::new())));
///
/// let input = json!({"static1": "x", "dyn1": "v1", "dyn2": "v2"});
/// let out = schema
///     .load(input.as_object().unwrap(), UnknownPolicy::Reject)
///     .unwrap();
/// assert_eq!(serde_json::Value::Object(out), input);
///
/// let bad = json!({"static1": "x", "dyn1": "v1", "dyn2": 2});
/// let err = schema
///     .load(bad.as_object().unwrap(), UnknownPolicy::Reject)
///     .unwrap_err();
/// assert_eq!(err.keys().collect::<Vec<_>>(), ["dyn2"]);
/// ```
#[derive(Debug, Clone)]
pub struct ValueTypedDictSchema {
    static_schema: ObjectSchema,
    value: ValueSchemaKind,
}

impl ValueTypedDictSchema {
    /// A dictionary whose every key is validated by `value`.
    pub fn new(name: impl Into<String>, value: ValueSchemaKind) -> Self {
        Self {
            static_schema: ObjectSchema::new(name),
            value,
        }
    }

    /// Adds a statically named field.
    pub fn with_static_field(mut self, field: Field) -> Self {
        self.static_schema = self.static_schema.with_field(field);
        self
    }

    /// The value schema.
    pub fn value_schema(&self) -> &ValueSchemaKind {
        &self.value
    }

    fn split(&self, record: &Record) -> (Record, Vec<(String, Value)>) {
        let mut fixed = Record::new();
        let mut dynamic = Vec::new();
        for (key, value) in record {
            if self.static_schema.field(key).is_some() {
                fixed.insert(key.clone(), value.clone());
            } else {
                dynamic.push((key.clone(), value.clone()));
            }
        }
        (fixed, dynamic)
    }

    fn load_value(&self, key: &str, raw: &Value, unknown: UnknownPolicy) -> Result<Value, KeyedError> {
        match &self.value {
            ValueSchemaKind::Leaf(adapter) => adapter
                .leaf()
                .load(raw)
                .map_err(|err| KeyedError::for_key(key, err.to_string())),
            ValueSchemaKind::Nested { schema, many } => {
                nested_map(raw, *many, |record| schema.load(record, unknown))
                    .map_err(|err| err.nested_under(key))
            }
        }
    }

    fn dump_value(&self, key: &str, value: &Value) -> Result<Value, KeyedError> {
        match &self.value {
            ValueSchemaKind::Leaf(adapter) => adapter
                .leaf()
                .dump(value)
                .map_err(|err| KeyedError::for_key(key, err.to_string())),
            ValueSchemaKind::Nested { schema, many } => {
                nested_map(value, *many, |record| schema.dump(record))
                    .map_err(|err| err.nested_under(key))
            }
        }
    }
}

impl ComponentSchema for ValueTypedDictSchema {
    fn name(&self) -> &str {
        self.static_schema.name()
    }

    fn declared_keys(&self) -> BTreeSet<String> {
        self.static_schema.declared_keys()
    }

    fn claims_undeclared_keys(&self) -> bool {
        true
    }

    fn load(&self, record: &Record, unknown: UnknownPolicy) -> Result<Record, KeyedError> {
        let (fixed, dynamic) = self.split(record);
        let mut out = self.static_schema.load(&fixed, unknown)?;
        for (key, raw) in dynamic {
            let value = self.load_value(&key, &raw, unknown)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn dump(&self, value: &Record) -> Result<Record, KeyedError> {
        let (fixed, dynamic) = self.split(value);
        let mut out = self.static_schema.dump(&fixed)?;
        for (key, v) in dynamic {
            let raw = self.dump_value(&key, &v)?;
            out.insert(key, raw);
        }
        Ok(out)
    }

    fn describe(&self) -> SchemaDescription {
        let value = match &self.value {
            ValueSchemaKind::Leaf(adapter) => adapter.describe(),
            ValueSchemaKind::Nested { schema, many } => {
                let mut desc = schema.describe();
                desc.many = *many;
                desc
            }
        };
        SchemaDescription::value_dict(
            self.static_schema.name(),
            self.static_schema.field_descriptions(),
            value,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::leaf::{BooleanLeaf, StringLeaf, TimestampLeaf};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn role() -> Arc<dyn ComponentSchema> {
        Arc::new(
            ObjectSchema::new("role")
                .with_field(Field::leaf("group_dn", Arc::new(StringLeaf::new())).required()),
        )
    }

    fn groups_to_roles() -> ValueTypedDictSchema {
        ValueTypedDictSchema::new(
            "groups_to_roles",
            ValueSchemaKind::Nested {
                schema: role(),
                many: true,
            },
        )
        .with_static_field(
            Field::leaf("handle_nested", Arc::new(BooleanLeaf)).with_load_default(json!(false)),
        )
    }

    #[test]
    fn test_nested_many_value_schema() {
        let out = groups_to_roles()
            .load(
                &record(json!({"admin": [{"group_dn": "cn=a"}], "guest": []})),
                UnknownPolicy::Reject,
            )
            .unwrap();
        assert_eq!(out["handle_nested"], json!(false));
        assert_eq!(out["admin"], json!([{"group_dn": "cn=a"}]));
    }

    #[test]
    fn test_nested_value_error_keyed_by_dynamic_key() {
        let err = groups_to_roles()
            .load(&record(json!({"admin": [{}]})), UnknownPolicy::Reject)
            .unwrap_err();
        assert_eq!(
            err.messages("admin.0.group_dn"),
            ["Missing data for required field."]
        );
    }

    #[test]
    fn test_static_field_error_reported() {
        let err = groups_to_roles()
            .load(&record(json!({"handle_nested": "yes"})), UnknownPolicy::Reject)
            .unwrap_err();
        assert_eq!(err.messages("handle_nested"), ["Not a valid boolean."]);
    }

    #[test]
    fn test_dump_encodes_dynamic_values() {
        let schema = ValueTypedDictSchema::new(
            "stamps",
            ValueSchemaKind::Leaf(LeafAdapter::new("value", Arc::new(TimestampLeaf))),
        );
        let out = schema
            .dump(&record(json!({"created": "1970-01-01T00:01:00Z"})))
            .unwrap();
        assert_eq!(out, record(json!({"created": 60})));

        let err = schema.dump(&record(json!({"created": 60}))).unwrap_err();
        assert_eq!(err.messages("created"), ["Not a valid timestamp."]);
    }

    #[test]
    fn test_declared_keys_are_static_fields_only() {
        let keys = groups_to_roles().declared_keys();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), ["handle_nested"]);
    }

    #[test]
    fn test_blank_when_no_static_fields() {
        let schema = ValueTypedDictSchema::new(
            "tags",
            ValueSchemaKind::Leaf(LeafAdapter::new("value", Arc::new(StringLeaf::new()))),
        );
        assert!(schema.is_blank());
        assert!(schema.describe().additional_properties.is_some());
    }
}
