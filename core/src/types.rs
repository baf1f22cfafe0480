//! Shared record and option types.
//!
//! Records are plain JSON objects. The engine never inspects the payload of
//! a value beyond its key; leaf validators check their own payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A string-keyed record, either raw (wire) or decoded (internal).
///
/// Insertion order is preserved so that diagnostics and dumped output follow
/// the order of the input, but equality ignores order.
pub type Record = Map<String, Value>;

/// Key under which whole-record errors are reported.
///
/// # Examples
///
/// ```
/// use schema_union_core::{KeyedError, WHOLE_RECORD};
///
/// let err = KeyedError::whole_record("Invalid input type.");
/// assert_eq!(err.messages(WHOLE_RECORD), ["Invalid input type."]);
/// ```
pub const WHOLE_RECORD: &str = "_schema";

/// What to do with keys that no field or component claims.
///
/// # Examples
///
/// ```
/// use schema_union_core::UnknownPolicy;
///
/// assert_eq!(UnknownPolicy::default(), UnknownPolicy::Reject);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Report each unclaimed key as an error (the default).
    #[default]
    Reject,
    /// Drop unclaimed keys silently.
    Ignore,
    /// Keep unclaimed keys verbatim in the output.
    Include,
}

/// Composition mode of a [`MultiNested`](crate::MultiNested) combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Exactly one component must explain the whole record; first match wins.
    #[default]
    Exclusive,
    /// Components claim disjoint key subsets whose union must cover the record.
    Merged,
}

/// Fixed configuration of a combinator.
///
/// # Examples
///
/// ```
/// use schema_union_core::{Mode, MultiNestedOptions, UnknownPolicy};
///
/// let opts = MultiNestedOptions::merged();
/// assert_eq!(opts.mode, Mode::Merged);
/// assert!(!opts.many);
/// assert_eq!(opts.unknown, UnknownPolicy::Reject);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MultiNestedOptions {
    /// Exclusive or merged composition.
    pub mode: Mode,
    /// Whether the payload is a list of records instead of a single record.
    pub many: bool,
    /// Policy for keys no component claims.
    pub unknown: UnknownPolicy,
}

impl MultiNestedOptions {
    /// Options for an exclusive, single-record combinator.
    pub fn exclusive() -> Self {
        Self::default()
    }

    /// Options for a merged, single-record combinator.
    pub fn merged() -> Self {
        Self {
            mode: Mode::Merged,
            ..Self::default()
        }
    }

    /// Switches list handling on or off.
    pub fn with_many(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    /// Sets the unknown-key policy.
    pub fn with_unknown(mut self, unknown: UnknownPolicy) -> Self {
        self.unknown = unknown;
        self
    }
}

/// Builds a one-entry record.
pub(crate) fn single_entry(key: &str, value: &Value) -> Record {
    let mut record = Record::new();
    record.insert(key.to_string(), value.clone());
    record
}
