//! Resolution of descriptors into ready-to-use schemas.

use std::collections::BTreeMap;
use std::sync::Arc;

use schema_union_core::{
    BooleanLeaf, ComponentSchema, ConfigError, ConstantLeaf, Field, FieldKind, FloatLeaf,
    IntegerLeaf, KeyedError, LeafAdapter, LeafValidator, ListLeaf, MultiNested,
    MultiNestedOptions, ObjectSchema, SchemaDescription, SchemaError, StringLeaf,
    TimestampLeaf, UnknownPolicy, ValueSchemaKind, ValueTypedDictSchema,
};
use serde_json::{Number, Value};
use tracing::{debug, info};

use crate::descriptor::{
    FieldDescriptor, LeafDescriptor, LeafOptions, MultiNestedDescriptor, ObjectDescriptor,
    RegistryConfig, SchemaDescriptor, TypeRef, ValueDictDescriptor,
};
use crate::error::{RegistryError, Result};

const INVALID_TYPE: &str = "Invalid input type.";

/// A schema built from a descriptor.
#[derive(Debug, Clone)]
pub enum RegisteredSchema {
    /// A named leaf type.
    Leaf(Arc<dyn LeafValidator>),
    /// An object schema or value dictionary.
    Component(Arc<dyn ComponentSchema>),
    /// A multi-nested union.
    Union(Arc<MultiNested>),
}

impl RegisteredSchema {
    /// Validates and decodes `input`.
    ///
    /// Components reject unknown keys; leaf errors are reported against the
    /// whole input.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] if `input` does not validate.
    pub fn load(&self, input: &Value) -> std::result::Result<Value, SchemaError> {
        match self {
            RegisteredSchema::Leaf(leaf) => leaf
                .load(input)
                .map_err(|err| KeyedError::whole_record(err.to_string()).into()),
            RegisteredSchema::Component(schema) => {
                let record = input
                    .as_object()
                    .ok_or_else(|| KeyedError::whole_record(INVALID_TYPE))?;
                Ok(Value::Object(schema.load(record, UnknownPolicy::Reject)?))
            }
            RegisteredSchema::Union(union) => union.load(input),
        }
    }

    /// Encodes a decoded value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] if `value` cannot be encoded.
    pub fn dump(&self, value: &Value) -> std::result::Result<Value, SchemaError> {
        match self {
            RegisteredSchema::Leaf(leaf) => leaf
                .dump(value)
                .map_err(|err| KeyedError::whole_record(err.to_string()).into()),
            RegisteredSchema::Component(schema) => {
                let record = value
                    .as_object()
                    .ok_or_else(|| KeyedError::whole_record(INVALID_TYPE))?;
                Ok(Value::Object(schema.dump(record)?))
            }
            RegisteredSchema::Union(union) => union.dump(value),
        }
    }

    /// Describes the schema under `name`.
    ///
    /// # Errors
    ///
    /// Returns the configuration error of an unusable deferred union.
    pub fn describe(&self, name: &str) -> std::result::Result<SchemaDescription, ConfigError> {
        match self {
            RegisteredSchema::Leaf(leaf) => Ok(SchemaDescription::leaf(name, leaf.type_name())),
            RegisteredSchema::Component(schema) => Ok(schema.describe()),
            RegisteredSchema::Union(union) => union.describe(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RegisteredSchema::Leaf(_) => "leaf",
            RegisteredSchema::Component(_) => "component",
            RegisteredSchema::Union(_) => "union",
        }
    }
}

/// All schemas of a descriptor set, built and checked.
///
/// Building resolves every `ref`, rejects unknown references and reference
/// cycles, and constructs every union, so disjointness and option checks
/// happen here rather than on first use.
///
/// # Examples
///
/// ```
/// use schema_union_config::{RegistryConfig, SchemaRegistry};
/// use serde_json::json;
///
/// let config = RegistryConfig::from_yaml_str(r#"
/// version: "1.0"
/// schemas:
///   host:
///     kind: object
///     fields:
///       alias: { type: string }
///   custom:
///     kind: value_dict
///     value: { type: string }
///   attributes:
///     kind: multi_nested
///     components: [host, custom]
///     merged: true
/// "#).unwrap();
///
/// let registry = SchemaRegistry::from_config(&config).unwrap();
/// let attributes = registry.get("attributes").unwrap();
/// let input = json!({"alias": "db01", "rack": "r12"});
/// assert_eq!(attributes.load(&input).unwrap(), input);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, RegisteredSchema>,
}

impl SchemaRegistry {
    /// Builds every schema of `config`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownSchemaRef`] for a `ref` or component name
    ///   that is not defined.
    /// - [`RegistryError::ReferenceCycle`] if schemas refer to each other in
    ///   a loop.
    /// - [`RegistryError::InvalidDescriptor`] for structurally wrong
    ///   descriptors.
    /// - [`RegistryError::Schema`] wrapping the engine's [`ConfigError`]
    ///   (unsupported value type, non-disjoint merged components, ...).
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        check_references(config)?;
        let mut builder = Builder {
            config,
            built: BTreeMap::new(),
            visiting: Vec::new(),
        };
        for name in config.schemas.keys() {
            builder.build(name)?;
        }
        info!(version = %config.version, schemas = builder.built.len(), "Built schema registry");
        Ok(Self {
            schemas: builder.built,
        })
    }

    /// Looks up a schema by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredSchema> {
        self.schemas.get(name)
    }

    /// Looks up a schema by name, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no schema is named `name`.
    pub fn require(&self, name: &str) -> Result<&RegisteredSchema> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Schema names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Number of schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if the registry holds no schemas.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Every name a descriptor refers to must be defined in the set.
fn check_references(config: &RegistryConfig) -> Result<()> {
    for (name, descriptor) in &config.schemas {
        if let Some(target) = descriptor
            .references()
            .into_iter()
            .find(|target| !config.schemas.contains_key(*target))
        {
            return Err(RegistryError::UnknownSchemaRef {
                schema: name.clone(),
                target: target.to_string(),
            });
        }
    }
    Ok(())
}

struct Builder<'a> {
    config: &'a RegistryConfig,
    built: BTreeMap<String, RegisteredSchema>,
    visiting: Vec<String>,
}

impl Builder<'_> {
    fn build(&mut self, name: &str) -> Result<RegisteredSchema> {
        if let Some(schema) = self.built.get(name) {
            return Ok(schema.clone());
        }
        if let Some(start) = self.visiting.iter().position(|n| n == name) {
            let mut cycle = self.visiting[start..].to_vec();
            cycle.push(name.to_string());
            return Err(RegistryError::ReferenceCycle(cycle));
        }
        let descriptor = self
            .config
            .schemas
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        self.visiting.push(name.to_string());
        let result = self.build_descriptor(name, descriptor);
        self.visiting.pop();

        let schema = result?;
        debug!(schema = name, kind = schema.kind(), "Built schema");
        self.built.insert(name.to_string(), schema.clone());
        Ok(schema)
    }


    fn build_descriptor(
        &mut self,
        name: &str,
        descriptor: &SchemaDescriptor,
    ) -> Result<RegisteredSchema> {
        match descriptor {
            SchemaDescriptor::Leaf(leaf) => Ok(RegisteredSchema::Leaf(build_leaf(name, leaf)?)),
            SchemaDescriptor::Object(object) => {
                let schema = self.build_object(name, object)?;
                Ok(RegisteredSchema::Component(Arc::new(schema)))
            }
            SchemaDescriptor::ValueDict(dict) => {
                let schema = self.build_value_dict(name, dict)?;
                Ok(RegisteredSchema::Component(Arc::new(schema)))
            }
            SchemaDescriptor::MultiNested(union) => {
                let union = self.build_union(name, union)?;
                Ok(RegisteredSchema::Union(Arc::new(union)))
            }
        }
    }

    fn build_object(&mut self, name: &str, descriptor: &ObjectDescriptor) -> Result<ObjectSchema> {
        let mut schema = ObjectSchema::new(name);
        for (field_name, field) in &descriptor.fields {
            schema = schema.with_field(self.build_field(name, field_name, field)?);
        }
        Ok(schema)
    }

    fn build_value_dict(
        &mut self,
        name: &str,
        descriptor: &ValueDictDescriptor,
    ) -> Result<ValueTypedDictSchema> {
        let value = match self.build_target(name, &descriptor.value)? {
            FieldKind::Leaf(leaf) => ValueSchemaKind::Leaf(LeafAdapter::new(name, leaf)),
            FieldKind::Nested { schema, many } => ValueSchemaKind::Nested { schema, many },
            FieldKind::Union(union) => {
                return Err(RegistryError::schema(
                    name,
                    ConfigError::UnsupportedValueType(format!(
                        "multi_nested schema '{}'",
                        union.name()
                    )),
                ));
            }
        };
        let mut schema = ValueTypedDictSchema::new(name, value);
        for (field_name, field) in &descriptor.static_fields {
            schema = schema.with_static_field(self.build_field(name, field_name, field)?);
        }
        Ok(schema)
    }

    fn build_union(&mut self, name: &str, descriptor: &MultiNestedDescriptor) -> Result<MultiNested> {
        let mut components: Vec<Arc<dyn ComponentSchema>> = Vec::new();
        for component in &descriptor.components {
            match self.build(component)? {
                RegisteredSchema::Leaf(leaf) => {
                    components.push(Arc::new(LeafAdapter::new(component.as_str(), leaf)));
                }
                RegisteredSchema::Component(schema) => components.push(schema),
                RegisteredSchema::Union(_) => {
                    return Err(RegistryError::invalid(
                        name,
                        format!("component '{component}' is itself a multi_nested schema"),
                    ));
                }
            }
        }
        let options = if descriptor.merged {
            MultiNestedOptions::merged()
        } else {
            MultiNestedOptions::exclusive()
        }
        .with_many(descriptor.many)
        .with_unknown(descriptor.unknown);

        MultiNested::new(name, components, options).map_err(|err| RegistryError::schema(name, err))
    }

    fn build_field(&mut self, schema: &str, name: &str, field: &FieldDescriptor) -> Result<Field> {
        let mut built = Field::new(name, self.build_target(schema, &field.target)?);
        if field.required {
            built = built.required();
        }
        if field.allow_none {
            built = built.allow_none();
        }
        if let Some(default) = &field.load_default {
            built = built.with_load_default(default.clone());
        }
        Ok(built)
    }

    fn build_target(&mut self, schema: &str, target: &TypeRef) -> Result<FieldKind> {
        match (&target.type_name, &target.schema_ref) {
            (Some(type_name), None) => {
                let leaf = build_leaf_type(schema, type_name, &target.options)?;
                Ok(FieldKind::Leaf(listed(leaf, target.many)))
            }
            (None, Some(reference)) => {
                if target.options != LeafOptions::default() {
                    return Err(RegistryError::invalid(
                        schema,
                        format!("leaf options cannot be combined with ref '{reference}'"),
                    ));
                }
                match self.build(reference)? {
                    RegisteredSchema::Leaf(leaf) => Ok(FieldKind::Leaf(listed(leaf, target.many))),
                    RegisteredSchema::Component(nested) => Ok(FieldKind::Nested {
                        schema: nested,
                        many: target.many,
                    }),
                    RegisteredSchema::Union(union) => {
                        if target.many {
                            return Err(RegistryError::invalid(
                                schema,
                                format!("'many' on ref '{reference}'; set it on the multi_nested schema"),
                            ));
                        }
                        Ok(FieldKind::Union(union))
                    }
                }
            }
            (Some(_), Some(_)) => Err(RegistryError::invalid(schema, "both 'type' and 'ref' given")),
            (None, None) => Err(RegistryError::invalid(schema, "one of 'type' or 'ref' is required")),
        }
    }
}

fn listed(leaf: Arc<dyn LeafValidator>, many: bool) -> Arc<dyn LeafValidator> {
    if many {
        Arc::new(ListLeaf::new(leaf))
    } else {
        leaf
    }
}

fn build_leaf(schema: &str, descriptor: &LeafDescriptor) -> Result<Arc<dyn LeafValidator>> {
    build_leaf_type(schema, &descriptor.type_name, &descriptor.options)
}

fn build_leaf_type(
    schema: &str,
    type_name: &str,
    options: &LeafOptions,
) -> Result<Arc<dyn LeafValidator>> {
    let unused = |option: &str| {
        RegistryError::schema(
            schema,
            ConfigError::InvalidLeafOptions(format!("'{option}' does not apply to type '{type_name}'")),
        )
    };
    let string_opts = options.min_length.is_some()
        || options.max_length.is_some()
        || options.pattern.is_some()
        || !options.choices.is_empty();
    let numeric_opts = options.minimum.is_some() || options.maximum.is_some();
    let list_opts = options.items.is_some() || options.unique;

    if string_opts && type_name != "string" {
        return Err(unused("min_length/max_length/pattern/choices"));
    }
    if numeric_opts && type_name != "integer" && type_name != "float" {
        return Err(unused("minimum/maximum"));
    }
    if list_opts && type_name != "list" {
        return Err(unused("items/unique"));
    }
    if options.value.is_some() && type_name != "constant" {
        return Err(unused("value"));
    }

    let leaf: Arc<dyn LeafValidator> = match type_name {
        "string" => {
            let mut leaf = StringLeaf::new();
            if let Some(min) = options.min_length {
                leaf = leaf.with_min_length(min);
            }
            if let Some(max) = options.max_length {
                leaf = leaf.with_max_length(max);
            }
            if let Some(pattern) = &options.pattern {
                leaf = leaf
                    .with_pattern(pattern)
                    .map_err(|err| RegistryError::schema(schema, err))?;
            }
            if !options.choices.is_empty() {
                leaf = leaf.with_choices(options.choices.iter().cloned());
            }
            Arc::new(leaf)
        }
        "integer" => {
            let minimum = integer_bound(schema, options.minimum.as_ref())?;
            let maximum = integer_bound(schema, options.maximum.as_ref())?;
            let leaf = IntegerLeaf::new()
                .with_range(minimum, maximum)
                .map_err(|err| RegistryError::schema(schema, err))?;
            Arc::new(leaf)
        }
        "float" => {
            let minimum = options.minimum.as_ref().and_then(Number::as_f64);
            let maximum = options.maximum.as_ref().and_then(Number::as_f64);
            let leaf = FloatLeaf::new()
                .with_range(minimum, maximum)
                .map_err(|err| RegistryError::schema(schema, err))?;
            Arc::new(leaf)
        }
        "boolean" => Arc::new(BooleanLeaf),
        "timestamp" => Arc::new(TimestampLeaf),
        "constant" => {
            let value = options
                .value
                .clone()
                .ok_or_else(|| RegistryError::invalid(schema, "type 'constant' needs 'value'"))?;
            Arc::new(ConstantLeaf::new(value))
        }
        "list" => {
            let items = options
                .items
                .as_ref()
                .ok_or_else(|| RegistryError::invalid(schema, "type 'list' needs 'items'"))?;
            let mut leaf = ListLeaf::new(build_leaf(schema, items)?);
            if options.unique {
                leaf = leaf.unique();
            }
            Arc::new(leaf)
        }
        other => {
            return Err(RegistryError::schema(
                schema,
                ConfigError::UnsupportedValueType(other.to_string()),
            ));
        }
    };
    Ok(leaf)
}

fn integer_bound(schema: &str, bound: Option<&Number>) -> Result<Option<i64>> {
    match bound {
        None => Ok(None),
        Some(n) => n.as_i64().map(Some).ok_or_else(|| {
            RegistryError::schema(
                schema,
                ConfigError::InvalidLeafOptions(format!("integer bound {n} is not an integer")),
            )
        }),
    }
}
