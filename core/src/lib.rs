//! Polymorphic schema composition and validation.
//!
//! This crate decides which shape(s) a raw record conforms to, validates it,
//! and either decodes it into an internal value (`load`) or encodes an
//! internal value back into a wire record (`dump`):
//!
//! - [`LeafValidator`]: the per-value type contract (string, integer,
//!   timestamp, …). A few common leaves ship with the crate.
//! - [`ComponentSchema`]: the uniform capability of composable schemas:
//!   declared keys, `load`, `dump`. Implemented by [`ObjectSchema`],
//!   [`ValueTypedDictSchema`] and [`LeafAdapter`].
//! - [`MultiNested`]: composes components in **exclusive** mode (first
//!   component that explains the whole record wins) or **merged** mode
//!   (components claim disjoint key subsets that together cover the record).
//! - [`ErrorAccumulator`] / [`KeyedError`]: keyed diagnostics collected
//!   across failed attempts.
//!
//! Configuration problems ([`ConfigError`]) surface when a schema is built,
//! never while a record is processed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use schema_union_core::*;
//! use serde_json::json;
//!
//! // Named host attributes plus free-form string attributes.
//! let host: Arc<dyn ComponentSchema> = Arc::new(
//!     ObjectSchema::new("host_attributes")
//!         .with_field(Field::leaf("alias", Arc::new(StringLeaf::new())))
//!         .with_field(Field::leaf("ipaddress", Arc::new(StringLeaf::new()))),
//! );
//! let custom: Arc<dyn ComponentSchema> = Arc::new(ValueTypedDictSchema::new(
//!     "custom_attributes",
//!     ValueSchemaKind::Leaf(LeafAdapter::new("tag", Arc::new(StringLeaf::new()))),
//! ));
//!
//! let attributes =
//!     MultiNested::new("attributes", vec![host, custom], MultiNestedOptions::merged()).unwrap();
//!
//! let value = attributes
//!     .load(&json!({"alias": "db01", "rack": "r12"}))
//!     .unwrap();
//! assert_eq!(value, json!({"alias": "db01", "rack": "r12"}));
//!
//! let err = attributes.load(&json!({"alias": "db01", "rack": 12})).unwrap_err();
//! assert_eq!(err.as_validation().unwrap().messages("rack"), ["Not a valid string."]);
//! ```

mod adapter;
mod combinator;
mod describe;
mod error;
mod leaf;
mod object;
mod schema;
mod types;
mod value_dict;

pub use adapter::LeafAdapter;
pub use combinator::MultiNested;
pub use describe::{FieldDescription, SchemaDescription, SchemaKind};
pub use error::{ConfigError, ErrorAccumulator, KeyConflict, KeyedError, SchemaError};
pub use leaf::{
    BooleanLeaf, ConstantLeaf, FloatLeaf, IntegerLeaf, LeafError, LeafValidator, ListLeaf,
    StringLeaf, TimestampLeaf,
};
pub use object::{Field, FieldKind, LoadHook, ObjectSchema};
pub use schema::ComponentSchema;
pub use types::{Mode, MultiNestedOptions, Record, UnknownPolicy, WHOLE_RECORD};
pub use value_dict::{ValueSchemaKind, ValueTypedDictSchema};
