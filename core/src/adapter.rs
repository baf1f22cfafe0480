//! Adapts a bare leaf validator into a blank component schema.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::describe::SchemaDescription;
use crate::error::{ErrorAccumulator, KeyedError};
use crate::leaf::{LeafError, LeafValidator};
use crate::schema::ComponentSchema;
use crate::types::{Record, UnknownPolicy};

/// A [`LeafValidator`] acting as a [`ComponentSchema`].
///
/// The adapter declares no keys. Every key of the record it is given is
/// checked by the wrapped leaf, and failures are reported per key.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use schema_union_core::{ComponentSchema, LeafAdapter, StringLeaf, UnknownPolicy};
/// use serde_json::json;
///
/// let tags = LeafAdapter::new("tags", Arc::new(StringLeaf::new()));
/// assert!(tags.is_blank());
///
/// let record = json!({"a": "x", "b": 1});
/// let err = tags
///     .load(record.as_object().unwrap(), UnknownPolicy::Reject)
///     .unwrap_err();
/// assert_eq!(err.messages("b"), ["Not a valid string."]);
/// assert!(!err.contains_key("a"));
/// ```
#[derive(Debug, Clone)]
pub struct LeafAdapter {
    name: String,
    leaf: Arc<dyn LeafValidator>,
}

impl LeafAdapter {
    /// Wraps `leaf` under `name`.
    pub fn new(name: impl Into<String>, leaf: Arc<dyn LeafValidator>) -> Self {
        Self {
            name: name.into(),
            leaf,
        }
    }

    /// The wrapped leaf.
    pub fn leaf(&self) -> &Arc<dyn LeafValidator> {
        &self.leaf
    }

    fn map_entries(
        &self,
        record: &Record,
        f: impl Fn(&serde_json::Value) -> Result<serde_json::Value, LeafError>,
    ) -> Result<Record, KeyedError> {
        let mut out = Record::new();
        let mut errors = ErrorAccumulator::new();
        for (key, value) in record {
            match f(value) {
                Ok(mapped) => {
                    out.insert(key.clone(), mapped);
                }
                Err(err) => errors.add(key.clone(), err.to_string()),
            }
        }
        errors.finish()?;
        Ok(out)
    }
}

impl ComponentSchema for LeafAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn load(&self, record: &Record, _unknown: UnknownPolicy) -> Result<Record, KeyedError> {
        self.map_entries(record, |raw| self.leaf.load(raw))
    }

    fn dump(&self, value: &Record) -> Result<Record, KeyedError> {
        self.map_entries(value, |v| self.leaf.dump(v))
    }

    fn describe(&self) -> SchemaDescription {
        SchemaDescription::leaf(&self.name, self.leaf.type_name())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::leaf::{IntegerLeaf, TimestampLeaf};

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_adapter_decodes_every_entry() {
        let adapter = LeafAdapter::new("times", Arc::new(TimestampLeaf));
        let out = adapter
            .load(&record(json!({"created": 0})), UnknownPolicy::Reject)
            .unwrap();
        assert_eq!(out["created"], json!("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn test_adapter_dump_encodes_then_validates() {
        let adapter = LeafAdapter::new("counts", Arc::new(IntegerLeaf::new()));
        let out = adapter.dump(&record(json!({"n": 3}))).unwrap();
        assert_eq!(out, record(json!({"n": 3})));

        let err = adapter.dump(&record(json!({"n": "3"}))).unwrap_err();
        assert_eq!(err.messages("n"), ["Not a valid integer."]);
    }

    #[test]
    fn test_adapter_describes_leaf_type() {
        let adapter = LeafAdapter::new("counts", Arc::new(IntegerLeaf::new()));
        assert_eq!(adapter.describe().leaf_type.as_deref(), Some("integer"));
    }
}
