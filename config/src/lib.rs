//! Declarative schema sets for `schema-union`.
//!
//! A schema set is described in YAML (or JSON) and built once into a
//! [`SchemaRegistry`]. Building resolves references between schemas and
//! runs every construction check of the engine, so a registry that exists
//! is fully usable.
//!
//! # Quick start
//!
//! ```no_run
//! use schema_union_config::{RegistryConfig, SchemaRegistry};
//! use serde_json::json;
//!
//! let config = RegistryConfig::load("schemas.yml").unwrap();
//! let registry = SchemaRegistry::from_config(&config).unwrap();
//!
//! let attributes = registry.require("attributes").unwrap();
//! let value = attributes.load(&json!({"alias": "db01"})).unwrap();
//! let wire = attributes.dump(&value).unwrap();
//! ```

mod descriptor;
mod error;
mod registry;

pub use descriptor::{
    FieldDescriptor, LeafDescriptor, LeafOptions, MultiNestedDescriptor, ObjectDescriptor,
    RegistryConfig, SchemaDescriptor, TypeRef, ValueDictDescriptor,
};
pub use error::{RegistryError, Result};
pub use registry::{RegisteredSchema, SchemaRegistry};
