//! Schemas with named fields.
//!
//! An [`ObjectSchema`] declares its field names, so combinators can
//! partition input by them. An object schema with no fields and only load
//! hooks is the canonical *blank* component: it claims keys by running its
//! hooks, not by name.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::combinator::MultiNested;
use crate::describe::{FieldDescription, SchemaDescription};
use crate::error::{ErrorAccumulator, KeyedError};
use crate::leaf::LeafValidator;
use crate::schema::ComponentSchema;
use crate::types::{Record, UnknownPolicy};

const MISSING: &str = "Missing data for required field.";
const UNKNOWN: &str = "Unknown field.";
const NULL: &str = "Field may not be null.";
pub(crate) const INVALID_TYPE: &str = "Invalid input type.";

/// Post-load check run on the decoded record.
pub type LoadHook = Arc<dyn Fn(&Record) -> Result<(), KeyedError> + Send + Sync>;

/// What a field holds.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A single leaf value.
    Leaf(Arc<dyn LeafValidator>),
    /// A nested record, or a list of them when `many` is set.
    Nested {
        /// Schema of the nested record(s).
        schema: Arc<dyn ComponentSchema>,
        /// Whether the field holds a list.
        many: bool,
    },
    /// A one-of / all-of union of records.
    Union(Arc<MultiNested>),
}

impl FieldKind {
    fn type_name(&self) -> String {
        match self {
            FieldKind::Leaf(leaf) => leaf.type_name().to_string(),
            FieldKind::Nested { schema, .. } => schema.name().to_string(),
            FieldKind::Union(union) => union.name().to_string(),
        }
    }

    fn is_many(&self) -> bool {
        match self {
            FieldKind::Leaf(_) => false,
            FieldKind::Nested { many, .. } => *many,
            FieldKind::Union(union) => union.options().many,
        }
    }

    /// Loads one raw value. Errors are keyed relative to the field.
    pub(crate) fn load(&self, raw: &Value, unknown: UnknownPolicy) -> Result<Value, KeyedError> {
        match self {
            FieldKind::Leaf(leaf) => leaf
                .load(raw)
                .map_err(|err| KeyedError::whole_record(err.to_string())),
            FieldKind::Nested { schema, many } => {
                nested_map(raw, *many, |record| schema.load(record, unknown))
            }
            FieldKind::Union(union) => union.load(raw).map_err(|err| err.into_keyed()),
        }
    }

    /// Dumps one decoded value. Errors are keyed relative to the field.
    pub(crate) fn dump(&self, value: &Value) -> Result<Value, KeyedError> {
        match self {
            FieldKind::Leaf(leaf) => leaf
                .dump(value)
                .map_err(|err| KeyedError::whole_record(err.to_string())),
            FieldKind::Nested { schema, many } => {
                nested_map(value, *many, |record| schema.dump(record))
            }
            FieldKind::Union(union) => union.dump(value).map_err(|err| err.into_keyed()),
        }
    }
}

/// Applies `f` to a nested record or to each record of a list.
pub(crate) fn nested_map(
    value: &Value,
    many: bool,
    f: impl Fn(&Record) -> Result<Record, KeyedError>,
) -> Result<Value, KeyedError> {
    if !many {
        let record = value
            .as_object()
            .ok_or_else(|| KeyedError::whole_record(INVALID_TYPE))?;
        return f(record).map(Value::Object);
    }

    let items = value
        .as_array()
        .ok_or_else(|| KeyedError::whole_record(INVALID_TYPE))?;
    let mut out = Vec::with_capacity(items.len());
    let mut errors = ErrorAccumulator::new();
    for (index, item) in items.iter().enumerate() {
        let result = match item.as_object() {
            Some(record) => f(record),
            None => Err(KeyedError::whole_record(INVALID_TYPE)),
        };
        match result {
            Ok(record) => out.push(Value::Object(record)),
            Err(err) => errors.add_keyed(err.nested_under(&index.to_string())),
        }
    }
    errors.finish()?;
    Ok(Value::Array(out))
}

/// A named field of an [`ObjectSchema`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use schema_union_core::{Field, StringLeaf};
/// use serde_json::json;
///
/// let field = Field::leaf("search_in", Arc::new(StringLeaf::new()))
///     .with_load_default(json!("this_connection"));
/// assert!(!field.is_required());
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    allow_none: bool,
    load_default: Option<Value>,
}

impl Field {
    /// A field of arbitrary kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            allow_none: false,
            load_default: None,
        }
    }

    /// A leaf-valued field.
    pub fn leaf(name: impl Into<String>, leaf: Arc<dyn LeafValidator>) -> Self {
        Self::new(name, FieldKind::Leaf(leaf))
    }

    /// A field holding one nested record.
    pub fn nested(name: impl Into<String>, schema: Arc<dyn ComponentSchema>) -> Self {
        Self::new(name, FieldKind::Nested { schema, many: false })
    }

    /// A field holding a list of nested records.
    pub fn nested_many(name: impl Into<String>, schema: Arc<dyn ComponentSchema>) -> Self {
        Self::new(name, FieldKind::Nested { schema, many: true })
    }

    /// A field holding a union.
    pub fn union(name: impl Into<String>, union: Arc<MultiNested>) -> Self {
        Self::new(name, FieldKind::Union(union))
    }

    /// Marks the field as required on load.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Accepts `null` as a value.
    pub fn allow_none(mut self) -> Self {
        self.allow_none = true;
        self
    }

    /// Inserts `value` on load when the key is absent.
    pub fn with_load_default(mut self, value: Value) -> Self {
        self.load_default = Some(value);
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether the field must be present on load.
    pub fn is_required(&self) -> bool {
        self.required
    }

    fn load(&self, raw: &Value, unknown: UnknownPolicy) -> Result<Value, KeyedError> {
        if raw.is_null() {
            return if self.allow_none {
                Ok(Value::Null)
            } else {
                Err(KeyedError::whole_record(NULL))
            };
        }
        self.kind.load(raw, unknown)
    }

    fn dump(&self, value: &Value) -> Result<Value, KeyedError> {
        if value.is_null() && self.allow_none {
            return Ok(Value::Null);
        }
        self.kind.dump(value)
    }

    fn description(&self) -> FieldDescription {
        FieldDescription {
            name: self.name.clone(),
            type_name: self.kind.type_name(),
            required: self.required,
            many: self.kind.is_many(),
        }
    }
}

/// A schema with a fixed set of named fields and optional load hooks.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use schema_union_core::{ComponentSchema, Field, IntegerLeaf, ObjectSchema, StringLeaf, UnknownPolicy};
/// use serde_json::json;
///
/// let schema = ObjectSchema::new("endpoint")
///     .with_field(Field::leaf("host", Arc::new(StringLeaf::new())).required())
///     .with_field(Field::leaf("port", Arc::new(IntegerLeaf::new())));
///
/// let ok = json!({"host": "db", "port": 5432});
/// assert!(schema.load(ok.as_object().unwrap(), UnknownPolicy::Reject).is_ok());
///
/// let bad = json!({"port": 5432, "tls": true});
/// let err = schema
///     .load(bad.as_object().unwrap(), UnknownPolicy::Reject)
///     .unwrap_err();
/// assert_eq!(err.messages("host"), ["Missing data for required field."]);
/// assert_eq!(err.messages("tls"), ["Unknown field."]);
/// ```
#[derive(Clone)]
pub struct ObjectSchema {
    name: String,
    fields: Vec<Field>,
    hooks: Vec<LoadHook>,
}

impl fmt::Debug for ObjectSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl ObjectSchema {
    /// An object schema with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a hook run on every successfully loaded record.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record) -> Result<(), KeyedError> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn field_descriptions(&self) -> Vec<FieldDescription> {
        self.fields.iter().map(Field::description).collect()
    }
}

impl ComponentSchema for ObjectSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_keys(&self) -> BTreeSet<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn load(&self, record: &Record, unknown: UnknownPolicy) -> Result<Record, KeyedError> {
        let mut out = Record::new();
        let mut errors = ErrorAccumulator::new();

        for (key, raw) in record {
            match self.field(key) {
                Some(field) => match field.load(raw, unknown) {
                    Ok(value) => {
                        out.insert(key.clone(), value);
                    }
                    Err(err) => errors.add_keyed(err.nested_under(key)),
                },
                None => match unknown {
                    UnknownPolicy::Reject => errors.add(key.clone(), UNKNOWN),
                    UnknownPolicy::Ignore => {}
                    UnknownPolicy::Include => {
                        out.insert(key.clone(), raw.clone());
                    }
                },
            }
        }

        for field in &self.fields {
            if record.contains_key(&field.name) {
                continue;
            }
            if let Some(default) = &field.load_default {
                out.insert(field.name.clone(), default.clone());
            } else if field.required {
                errors.add(field.name.clone(), MISSING);
            }
        }

        errors.finish()?;

        let mut errors = ErrorAccumulator::new();
        for hook in &self.hooks {
            if let Err(err) = hook(&out) {
                errors.add_keyed(err);
            }
        }
        errors.finish()?;

        Ok(out)
    }

    fn dump(&self, value: &Record) -> Result<Record, KeyedError> {
        let mut out = Record::new();
        let mut errors = ErrorAccumulator::new();

        for (key, v) in value {
            match self.field(key) {
                Some(field) => match field.dump(v) {
                    Ok(raw) => {
                        out.insert(key.clone(), raw);
                    }
                    Err(err) => errors.add_keyed(err.nested_under(key)),
                },
                // Blank schemas pass everything through; named schemas drop
                // what they do not know.
                None if self.fields.is_empty() => {
                    out.insert(key.clone(), v.clone());
                }
                None => {}
            }
        }

        errors.finish()?;
        Ok(out)
    }

    fn describe(&self) -> SchemaDescription {
        SchemaDescription::object(&self.name, self.field_descriptions())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::leaf::{IntegerLeaf, StringLeaf, TimestampLeaf};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn role() -> Arc<dyn ComponentSchema> {
        Arc::new(
            ObjectSchema::new("role")
                .with_field(Field::leaf("group_dn", Arc::new(StringLeaf::new())).required())
                .with_field(
                    Field::leaf("search_in", Arc::new(StringLeaf::new()))
                        .with_load_default(json!("this_connection")),
                ),
        )
    }

    #[test]
    fn test_load_default_inserted_when_absent() {
        let out = role()
            .load(&record(json!({"group_dn": "cn=admins"})), UnknownPolicy::Reject)
            .unwrap();
        assert_eq!(out["search_in"], json!("this_connection"));
    }

    #[test]
    fn test_unknown_policy_ignore_and_include() {
        let input = record(json!({"group_dn": "x", "extra": 1}));
        let ignored = role().load(&input, UnknownPolicy::Ignore).unwrap();
        assert!(!ignored.contains_key("extra"));
        let included = role().load(&input, UnknownPolicy::Include).unwrap();
        assert_eq!(included["extra"], json!(1));
    }

    #[test]
    fn test_nested_many_errors_are_indexed() {
        let schema = ObjectSchema::new("roles").with_field(Field::nested_many("admin", role()));
        let err = schema
            .load(
                &record(json!({"admin": [{"group_dn": "a"}, {"search_in": "x"}]})),
                UnknownPolicy::Reject,
            )
            .unwrap_err();
        assert_eq!(
            err.messages("admin.1.group_dn"),
            ["Missing data for required field."]
        );
        assert!(!err.contains_key("admin.0.group_dn"));
    }

    #[test]
    fn test_nested_rejects_non_object() {
        let schema = ObjectSchema::new("outer").with_field(Field::nested("inner", role()));
        let err = schema
            .load(&record(json!({"inner": 3})), UnknownPolicy::Reject)
            .unwrap_err();
        assert_eq!(err.messages("inner"), ["Invalid input type."]);
    }

    #[test]
    fn test_null_handling() {
        let schema = ObjectSchema::new("s")
            .with_field(Field::leaf("a", Arc::new(IntegerLeaf::new())))
            .with_field(Field::leaf("b", Arc::new(IntegerLeaf::new())).allow_none());
        let err = schema
            .load(&record(json!({"a": null, "b": null})), UnknownPolicy::Reject)
            .unwrap_err();
        assert_eq!(err.messages("a"), ["Field may not be null."]);
        assert!(!err.contains_key("b"));
    }

    #[test]
    fn test_hooks_run_after_fields() {
        let schema = ObjectSchema::new("range")
            .with_field(Field::leaf("low", Arc::new(IntegerLeaf::new())))
            .with_field(Field::leaf("high", Arc::new(IntegerLeaf::new())))
            .with_hook(|r| match (r.get("low"), r.get("high")) {
                (Some(lo), Some(hi)) if lo.as_i64() > hi.as_i64() => {
                    Err(KeyedError::whole_record("low must not exceed high"))
                }
                _ => Ok(()),
            });
        assert!(schema
            .load(&record(json!({"low": 1, "high": 2})), UnknownPolicy::Reject)
            .is_ok());
        let err = schema
            .load(&record(json!({"low": 3, "high": 2})), UnknownPolicy::Reject)
            .unwrap_err();
        assert_eq!(err.to_string(), "_schema: low must not exceed high");
    }

    #[test]
    fn test_dump_encodes_known_fields_and_drops_unknown() {
        let schema = ObjectSchema::new("event")
            .with_field(Field::leaf("at", Arc::new(TimestampLeaf)));
        let out = schema
            .dump(&record(json!({"at": "1970-01-01T00:00:10Z", "junk": 1})))
            .unwrap();
        assert_eq!(out, record(json!({"at": 10})));
    }

    #[test]
    fn test_describe_lists_fields() {
        let desc = role().describe();
        assert_eq!(desc.properties.len(), 2);
        assert!(desc.properties[0].required);
        assert_eq!(desc.properties[1].type_name, "string");
    }
}
