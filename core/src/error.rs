//! Error types: keyed validation errors, their accumulator, and
//! construction-time configuration errors.
//!
//! Validation failures are always reported as a [`KeyedError`]: an ordered
//! mapping from field name (or [`WHOLE_RECORD`]) to messages. Component
//! attempts inside a combinator fold their failures into an
//! [`ErrorAccumulator`], which renders one combined error when nothing
//! matches.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::WHOLE_RECORD;

/// Validation failure keyed by field name.
///
/// # Examples
///
/// ```
/// use schema_union_core::KeyedError;
///
/// let mut err = KeyedError::for_key("port", "Not a valid integer.");
/// err.push("port", "Must be greater than or equal to 1.");
/// assert_eq!(err.messages("port").len(), 2);
/// assert!(err.messages("host").is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyedError {
    errors: BTreeMap<String, Vec<String>>,
}

impl KeyedError {
    /// Creates an error with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error reported against the whole record.
    pub fn whole_record(message: impl Into<String>) -> Self {
        Self::for_key(WHOLE_RECORD, message)
    }

    /// Creates an error with a single message for `key`.
    pub fn for_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(key, message);
        err
    }

    /// Appends a message under `key`.
    pub fn push(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(key.into())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for `key`, empty if none.
    pub fn messages(&self, key: &str) -> &[String] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if any message is recorded for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.errors.contains_key(key)
    }

    /// Keys with at least one message, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    /// Iterates `(key, messages)` pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns `true` if no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of distinct keys carrying messages.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Re-roots every key below `prefix`.
    ///
    /// Whole-record messages move to `prefix` itself; `inner` becomes
    /// `prefix.inner`.
    ///
    /// # Examples
    ///
    /// ```
    /// use schema_union_core::KeyedError;
    ///
    /// let mut err = KeyedError::whole_record("Invalid input type.");
    /// err.push("name", "Field may not be null.");
    /// let nested = err.nested_under("owner");
    /// assert_eq!(nested.messages("owner"), ["Invalid input type."]);
    /// assert_eq!(nested.messages("owner.name"), ["Field may not be null."]);
    /// ```
    pub fn nested_under(self, prefix: &str) -> Self {
        let mut nested = Self::new();
        for (key, messages) in self.errors {
            let target = if key == WHOLE_RECORD {
                prefix.to_string()
            } else {
                format!("{prefix}.{key}")
            };
            nested.errors.entry(target).or_default().extend(messages);
        }
        nested
    }

    /// Keeps only the entries whose key satisfies `keep`.
    pub(crate) fn retain_keys(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.errors.retain(|key, _| keep(key));
    }

    /// Moves whole-record messages under `key`, leaving other keys as they are.
    pub fn attribute_to(self, key: &str) -> Self {
        let mut attributed = Self::new();
        for (k, messages) in self.errors {
            let target = if k == WHOLE_RECORD { key.to_string() } else { k };
            attributed.errors.entry(target).or_default().extend(messages);
        }
        attributed
    }
}

impl fmt::Display for KeyedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, messages)) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{key}: {}", messages.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for KeyedError {}

/// Collects keyed messages across failed component attempts.
///
/// Messages are appended, never overwritten, so a key that failed against
/// several components reports every reason.
///
/// # Examples
///
/// ```
/// use schema_union_core::{ErrorAccumulator, KeyedError, WHOLE_RECORD};
///
/// let mut acc = ErrorAccumulator::new();
/// acc.add_message("No schema matched.");
/// acc.add_keyed(KeyedError::for_key("a", "Not a valid string."));
/// acc.add_keyed(KeyedError::for_key("a", "Unknown field."));
///
/// let err = acc.into_error();
/// assert_eq!(err.messages(WHOLE_RECORD), ["No schema matched."]);
/// assert_eq!(err.messages("a"), ["Not a valid string.", "Unknown field."]);
/// ```
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: KeyedError,
}

impl ErrorAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a whole-record message.
    pub fn add_message(&mut self, message: impl Into<String>) {
        self.errors.push(WHOLE_RECORD, message);
    }

    /// Adds several whole-record messages.
    pub fn add_messages<I, S>(&mut self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for message in messages {
            self.add_message(message);
        }
    }

    /// Adds a message under `key`.
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(key, message);
    }

    /// Folds a keyed error in key by key.
    pub fn add_keyed(&mut self, error: KeyedError) {
        for (key, messages) in error.errors {
            self.errors.errors.entry(key).or_default().extend(messages);
        }
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes the accumulator and returns everything recorded.
    pub fn into_error(self) -> KeyedError {
        self.errors
    }

    /// `Ok(())` if nothing was recorded, the combined error otherwise.
    pub fn finish(self) -> Result<(), KeyedError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// One key declared by two components of a merged combinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConflict {
    /// The shared key.
    pub key: String,
    /// Component that declared the key first.
    pub first: String,
    /// Component that declared it again.
    pub second: String,
}

impl fmt::Display for KeyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({} and {})", self.key, self.first, self.second)
    }
}

fn format_conflicts(conflicts: &[KeyConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Construction-time configuration errors.
///
/// These are never produced while loading or dumping a record, except when a
/// deferred component list is resolved on first use, in which case the same
/// memoized error is returned on every call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two components of a merged combinator declare the same key.
    #[error("schemas not disjoint, shared keys: {}", format_conflicts(.conflicts))]
    NotDisjoint {
        /// Every shared key with the two components declaring it.
        conflicts: Vec<KeyConflict>,
    },
    /// Merged mode was combined with list handling.
    #[error("merged=true cannot be combined with many=true")]
    MergedWithMany,
    /// A combinator was given no components.
    #[error("combinator '{0}' has no component schemas")]
    EmptyComponents(String),
    /// A value schema was neither a known leaf type nor a nested schema.
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(String),
    /// A string pattern failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
    /// Leaf options are contradictory (e.g. minimum above maximum).
    #[error("invalid leaf options: {0}")]
    InvalidLeafOptions(String),
}

/// Error returned by combinator load/dump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The input did not validate.
    #[error("validation failed:\n{0}")]
    Validation(#[from] KeyedError),
    /// The combinator configuration is unusable.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SchemaError {
    /// Flattens the error into a [`KeyedError`], reporting configuration
    /// failures against the whole record.
    pub fn into_keyed(self) -> KeyedError {
        match self {
            SchemaError::Validation(err) => err,
            SchemaError::Config(err) => KeyedError::whole_record(err.to_string()),
        }
    }

    /// Returns the keyed validation error, if this is one.
    pub fn as_validation(&self) -> Option<&KeyedError> {
        match self {
            SchemaError::Validation(err) => Some(err),
            SchemaError::Config(_) => None,
        }
    }
}
