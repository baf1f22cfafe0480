//! Declarative schema-set descriptors.
//!
//! A descriptor file names every schema of a set and says how it is built.
//! Schemas refer to each other by name with `ref`.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! schemas:
//!   host_attributes:
//!     kind: object
//!     fields:
//!       alias: { type: string, max_length: 64 }
//!       ipaddress: { type: string }
//!   custom_attributes:
//!     kind: value_dict
//!     value: { type: string }
//!   attributes:
//!     kind: multi_nested
//!     components: [host_attributes, custom_attributes]
//!     merged: true
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use schema_union_core::UnknownPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::Result;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Options understood by the built-in leaf types.
///
/// Options a leaf type does not use are rejected when the registry is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeafOptions {
    /// Minimum string length (`string`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length (`string`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression the whole string must match (`string`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Allowed values (`string`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// Inclusive lower bound (`integer`, `float`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,
    /// Inclusive upper bound (`integer`, `float`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,
    /// Required value (`constant`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Element type (`list`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<LeafDescriptor>>,
    /// Reject duplicate elements (`list`).
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
}

/// A built-in leaf type with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafDescriptor {
    /// One of `string`, `integer`, `float`, `boolean`, `constant`,
    /// `timestamp`, `list`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Type-specific options.
    #[serde(flatten)]
    pub options: LeafOptions,
}

/// Either an inline leaf type or a reference to another schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    /// Inline leaf type name.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Name of another schema in the same set.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<String>,
    /// Options for an inline leaf type.
    #[serde(flatten)]
    pub options: LeafOptions,
    /// The value is a list of the referenced type.
    #[serde(default, skip_serializing_if = "is_false")]
    pub many: bool,
}

/// A named field of an object or value dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// What the field holds.
    #[serde(flatten)]
    pub target: TypeRef,
    /// Missing field is an error on load.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// `null` is accepted and kept.
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_none: bool,
    /// Value inserted on load when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_default: Option<Value>,
}

/// An object schema: named fields only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Fields by name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDescriptor>,
}

/// A hybrid dictionary: static fields plus same-typed dynamic keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDictDescriptor {
    /// Statically named fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub static_fields: BTreeMap<String, FieldDescriptor>,
    /// Schema of every other key.
    pub value: TypeRef,
}

/// A union of component schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiNestedDescriptor {
    /// Component schema names, in priority order.
    pub components: Vec<String>,
    /// Merged (`true`) or exclusive (`false`) composition.
    #[serde(default)]
    pub merged: bool,
    /// The payload is a list of records.
    #[serde(default)]
    pub many: bool,
    /// Policy for keys no component claims.
    #[serde(default)]
    pub unknown: UnknownPolicy,
}

/// One schema of the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaDescriptor {
    /// A named leaf type, usable from `ref`.
    Leaf(LeafDescriptor),
    /// An object schema.
    Object(ObjectDescriptor),
    /// A hybrid dictionary.
    ValueDict(ValueDictDescriptor),
    /// A multi-nested union.
    MultiNested(MultiNestedDescriptor),
}

impl SchemaDescriptor {
    /// Names of the schemas this descriptor refers to.
    pub fn references(&self) -> Vec<&str> {
        fn field_refs<'a>(fields: &'a BTreeMap<String, FieldDescriptor>, out: &mut Vec<&'a str>) {
            out.extend(fields.values().filter_map(|f| f.target.schema_ref.as_deref()));
        }

        let mut out = Vec::new();
        match self {
            SchemaDescriptor::Leaf(_) => {}
            SchemaDescriptor::Object(object) => field_refs(&object.fields, &mut out),
            SchemaDescriptor::ValueDict(dict) => {
                field_refs(&dict.static_fields, &mut out);
                out.extend(dict.value.schema_ref.as_deref());
            }
            SchemaDescriptor::MultiNested(union) => {
                out.extend(union.components.iter().map(String::as_str));
            }
        }
        out
    }
}

/// A complete schema set.
///
/// # Examples
///
/// ```
/// use schema_union_config::{RegistryConfig, SchemaDescriptor};
///
/// let config = RegistryConfig::from_yaml_str(r#"
/// version: "1.0"
/// schemas:
///   tag:
///     kind: leaf
///     type: string
///     max_length: 16
/// "#).unwrap();
/// assert!(matches!(config.schemas["tag"], SchemaDescriptor::Leaf(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Descriptor format version (e.g. `"1.0"`).
    pub version: String,
    /// Schemas by name.
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaDescriptor>,
}

impl RegistryConfig {
    /// Loads a descriptor file. Files ending in `.json` are parsed as JSON,
    /// anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::RegistryError::IoError) if the file cannot
    /// be read, or a [`JsonError`](crate::RegistryError::JsonError) /
    /// [`YamlError`](crate::RegistryError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = if has_json_extension(path) {
            serde_json::from_reader(reader)?
        } else {
            serde_yaml::from_reader(reader)?
        };
        Ok(config)
    }

    /// Saves the descriptors as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::RegistryError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::RegistryError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Parses descriptors from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`YamlError`](crate::RegistryError::YamlError) on malformed input.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parses descriptors from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError`](crate::RegistryError::JsonError) on malformed input.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
version: "1.0"
schemas:
  role:
    kind: object
    fields:
      group_dn: { type: string, required: true }
  groups_to_roles:
    kind: value_dict
    static_fields:
      handle_nested: { type: boolean, load_default: false }
    value: { ref: role, many: true }
  attributes:
    kind: multi_nested
    components: [host, custom]
    merged: true
    unknown: ignore
  tags:
    kind: leaf
    type: list
    items: { type: string, pattern: "^[a-z]+$" }
    unique: true
"#
    }

    #[test]
    fn test_deserialize_kinds() {
        let config = RegistryConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.schemas.len(), 4);

        let SchemaDescriptor::Object(role) = &config.schemas["role"] else {
            panic!("role should be an object");
        };
        let group_dn = &role.fields["group_dn"];
        assert_eq!(group_dn.target.type_name.as_deref(), Some("string"));
        assert!(group_dn.required);

        let SchemaDescriptor::ValueDict(dict) = &config.schemas["groups_to_roles"] else {
            panic!("groups_to_roles should be a value_dict");
        };
        assert_eq!(dict.value.schema_ref.as_deref(), Some("role"));
        assert!(dict.value.many);
        assert_eq!(
            dict.static_fields["handle_nested"].load_default,
            Some(json!(false))
        );

        let SchemaDescriptor::MultiNested(union) = &config.schemas["attributes"] else {
            panic!("attributes should be multi_nested");
        };
        assert!(union.merged);
        assert!(!union.many);
        assert_eq!(union.unknown, UnknownPolicy::Ignore);

        let SchemaDescriptor::Leaf(tags) = &config.schemas["tags"] else {
            panic!("tags should be a leaf");
        };
        assert_eq!(tags.type_name, "list");
        assert!(tags.options.unique);
        let items = tags.options.items.as_ref().unwrap();
        assert_eq!(items.options.pattern.as_deref(), Some("^[a-z]+$"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let yaml = "version: \"1.0\"\nschemas:\n  x:\n    kind: table\n";
        assert!(RegistryConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_numeric_bounds() {
        let yaml = r#"
version: "1.0"
schemas:
  port: { kind: leaf, type: integer, minimum: 1, maximum: 65535 }
  ratio: { kind: leaf, type: float, minimum: 0.0, maximum: 1.5 }
"#;
        let config = RegistryConfig::from_yaml_str(yaml).unwrap();
        let SchemaDescriptor::Leaf(port) = &config.schemas["port"] else {
            panic!("port should be a leaf");
        };
        assert_eq!(port.options.minimum.as_ref().and_then(Number::as_i64), Some(1));
        let SchemaDescriptor::Leaf(ratio) = &config.schemas["ratio"] else {
            panic!("ratio should be a leaf");
        };
        assert_eq!(ratio.options.maximum.as_ref().and_then(Number::as_f64), Some(1.5));
    }

    #[test]
    fn test_references() {
        let config = RegistryConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.schemas["groups_to_roles"].references(), ["role"]);
        assert_eq!(config.schemas["attributes"].references(), ["host", "custom"]);
        assert!(config.schemas["tags"].references().is_empty());
    }

    #[test]
    fn test_json_matches_yaml() {
        let json = r#"{
            "version": "1.0",
            "schemas": {
                "role": {
                    "kind": "object",
                    "fields": {"group_dn": {"type": "string", "required": true}}
                }
            }
        }"#;
        let from_json = RegistryConfig::from_json_str(json).unwrap();
        let from_yaml = RegistryConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(from_json.schemas["role"], from_yaml.schemas["role"]);
    }
}
