//! Read-only structural descriptions for documentation generators.
//!
//! A combinator describes itself as a `oneOf` (exclusive) or `allOf`
//! (merged) union over its components. Descriptions serialize to JSON with
//! camelCase keys so they can be spliced into an OpenAPI document.

use serde::Serialize;

/// Kind of schema being described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// A bare leaf validator.
    Leaf,
    /// A schema with named fields.
    Object,
    /// Static fields plus an open map of same-typed values.
    ValueDict,
    /// A one-of / all-of combinator.
    Union,
}

/// One named field of an object description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescription {
    /// Field name.
    pub name: String,
    /// Leaf type name or nested schema name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether the field must be present on load.
    pub required: bool,
    /// Whether the field holds a list of nested records.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub many: bool,
}

/// Structural description of a schema.
///
/// # Examples
///
/// ```
/// use schema_union_core::{SchemaDescription, SchemaKind};
///
/// let desc = SchemaDescription::leaf("tag", "string");
/// assert_eq!(desc.kind, SchemaKind::Leaf);
/// let json = serde_json::to_value(&desc).unwrap();
/// assert_eq!(json["leafType"], "string");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescription {
    /// Schema name.
    pub name: String,
    /// What kind of schema this is.
    pub kind: SchemaKind,
    /// Leaf type name, for leaves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_type: Option<String>,
    /// Named fields, for objects and value dictionaries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<FieldDescription>,
    /// Schema every non-static key must satisfy, for value dictionaries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<SchemaDescription>>,
    /// Alternatives of an exclusive union.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<SchemaDescription>,
    /// Parts of a merged union.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<SchemaDescription>,
    /// Whether the payload is a list.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub many: bool,
}

impl SchemaDescription {
    fn empty(name: &str, kind: SchemaKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            leaf_type: None,
            properties: Vec::new(),
            additional_properties: None,
            one_of: Vec::new(),
            all_of: Vec::new(),
            many: false,
        }
    }

    /// Describes a leaf.
    pub fn leaf(name: &str, leaf_type: &str) -> Self {
        Self {
            leaf_type: Some(leaf_type.to_string()),
            ..Self::empty(name, SchemaKind::Leaf)
        }
    }

    /// Describes an object with the given fields.
    pub fn object(name: &str, properties: Vec<FieldDescription>) -> Self {
        Self {
            properties,
            ..Self::empty(name, SchemaKind::Object)
        }
    }

    /// Describes a value-typed dictionary.
    pub fn value_dict(
        name: &str,
        properties: Vec<FieldDescription>,
        value: SchemaDescription,
    ) -> Self {
        Self {
            properties,
            additional_properties: Some(Box::new(value)),
            ..Self::empty(name, SchemaKind::ValueDict)
        }
    }

    /// Describes an exclusive union.
    pub fn one_of(name: &str, alternatives: Vec<SchemaDescription>, many: bool) -> Self {
        Self {
            one_of: alternatives,
            many,
            ..Self::empty(name, SchemaKind::Union)
        }
    }

    /// Describes a merged union.
    pub fn all_of(name: &str, parts: Vec<SchemaDescription>) -> Self {
        Self {
            all_of: parts,
            ..Self::empty(name, SchemaKind::Union)
        }
    }
}
