//! The uniform capability every composable schema exposes.

use std::collections::BTreeSet;
use std::fmt;

use crate::describe::SchemaDescription;
use crate::error::KeyedError;
use crate::types::{Record, UnknownPolicy};

/// A candidate shape that can take part in composition.
///
/// A component either declares a fixed key set, which combinators use to
/// partition input before dispatch, or declares nothing and is *blank*: it
/// claims keys by validating them, so combinators try it key by key. A
/// component with declared keys may also be *open*, taking any key that no
/// other component declares.
pub trait ComponentSchema: Send + Sync + fmt::Debug {
    /// Name used in diagnostics and descriptions.
    fn name(&self) -> &str;

    /// Keys this schema statically knows about.
    fn declared_keys(&self) -> BTreeSet<String>;

    /// Validates a raw record and decodes it.
    fn load(&self, record: &Record, unknown: UnknownPolicy) -> Result<Record, KeyedError>;

    /// Encodes a decoded value into a wire record.
    fn dump(&self, value: &Record) -> Result<Record, KeyedError>;

    /// Structural description for documentation generators.
    fn describe(&self) -> SchemaDescription;

    /// Returns `true` if the schema declares no keys.
    fn is_blank(&self) -> bool {
        self.declared_keys().is_empty()
    }

    /// Returns `true` if `load` accepts keys beyond the declared ones as
    /// its own (an open map next to named fields).
    fn claims_undeclared_keys(&self) -> bool {
        false
    }
}
