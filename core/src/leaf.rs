//! Leaf validators: the per-value type contracts the engine composes.
//!
//! The engine treats a [`LeafValidator`] as opaque. A handful of common
//! leaves ship with the crate so that schemas can be declared without
//! writing new validator types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::error::ConfigError;

/// A single value failed its type or format contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeafError {
    /// Wrong JSON type.
    #[error("Not a valid {expected}.")]
    InvalidType {
        /// Expected type name.
        expected: &'static str,
    },
    /// `null` given where a value is required.
    #[error("Field may not be null.")]
    Null,
    /// String shorter than allowed.
    #[error("Shorter than minimum length {min}.")]
    TooShort {
        /// Minimum length in characters.
        min: usize,
    },
    /// String longer than allowed.
    #[error("Longer than maximum length {max}.")]
    TooLong {
        /// Maximum length in characters.
        max: usize,
    },
    /// String does not match the configured pattern.
    #[error("String does not match expected pattern {pattern}.")]
    PatternMismatch {
        /// The pattern source.
        pattern: String,
    },
    /// String is not one of the enumerated choices.
    #[error("Must be one of: {}.", .choices.join(", "))]
    NotAChoice {
        /// Allowed values.
        choices: Vec<String>,
    },
    /// Number below the configured minimum.
    #[error("Must be greater than or equal to {min}.")]
    BelowMinimum {
        /// Rendered minimum.
        min: String,
    },
    /// Number above the configured maximum.
    #[error("Must be less than or equal to {max}.")]
    AboveMaximum {
        /// Rendered maximum.
        max: String,
    },
    /// Value differs from the required constant.
    #[error("Must be equal to {expected}.")]
    NotConstant {
        /// Rendered constant.
        expected: String,
    },
    /// Unique list contains the same entry twice.
    #[error("Duplicate entry found at index {index}: {entry}")]
    Duplicate {
        /// Index of the repeated entry.
        index: usize,
        /// Rendered entry.
        entry: String,
    },
    /// A list item failed its own contract.
    #[error("Item {index}: {error}")]
    Item {
        /// Index of the failing item.
        index: usize,
        /// Failure of the item.
        error: Box<LeafError>,
    },
    /// Timestamp could not be converted.
    #[error("Not a valid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Capability for one concrete data type.
///
/// `validate` checks a *wire* value. Loading validates then decodes;
/// dumping encodes then validates the result.
pub trait LeafValidator: Send + Sync + fmt::Debug {
    /// Short type name used in descriptions and diagnostics.
    fn type_name(&self) -> &'static str;

    /// Checks a wire value against the type contract.
    fn validate(&self, raw: &Value) -> Result<(), LeafError>;

    /// Converts a validated wire value into its internal form.
    fn decode(&self, raw: &Value) -> Result<Value, LeafError> {
        Ok(raw.clone())
    }

    /// Converts an internal value into its wire form.
    fn encode(&self, value: &Value) -> Result<Value, LeafError> {
        Ok(value.clone())
    }

    /// Validates then decodes a wire value.
    fn load(&self, raw: &Value) -> Result<Value, LeafError> {
        self.validate(raw)?;
        self.decode(raw)
    }

    /// Encodes an internal value and validates the produced wire value.
    fn dump(&self, value: &Value) -> Result<Value, LeafError> {
        let raw = self.encode(value)?;
        self.validate(&raw)?;
        Ok(raw)
    }
}

/// String leaf with optional length, pattern and choice constraints.
///
/// # Examples
///
/// ```
/// use schema_union_core::{LeafValidator, StringLeaf};
/// use serde_json::json;
///
/// let leaf = StringLeaf::new()
///     .with_pattern("^[a-z]+$")
///     .unwrap()
///     .with_max_length(8);
/// assert!(leaf.validate(&json!("abc")).is_ok());
/// assert!(leaf.validate(&json!("ABC")).is_err());
/// assert!(leaf.validate(&json!(3)).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StringLeaf {
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    choices: Vec<String>,
}

impl StringLeaf {
    /// Any string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires at least `min` characters.
    pub fn with_min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Allows at most `max` characters.
    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Requires the string to match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the pattern does not compile.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
        self.pattern = Some(regex);
        Ok(self)
    }

    /// Restricts the value to one of `choices`.
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }
}

impl LeafValidator for StringLeaf {
    fn type_name(&self) -> &'static str {
        "string"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        let s = match raw {
            Value::String(s) => s,
            Value::Null => return Err(LeafError::Null),
            _ => return Err(LeafError::InvalidType { expected: "string" }),
        };

        let len = s.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(LeafError::TooShort { min });
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(LeafError::TooLong { max });
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(s) {
                return Err(LeafError::PatternMismatch {
                    pattern: pattern.as_str().to_string(),
                });
            }
        }
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c == s) {
            return Err(LeafError::NotAChoice {
                choices: self.choices.clone(),
            });
        }
        Ok(())
    }
}

/// Integer leaf with optional inclusive bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerLeaf {
    minimum: Option<i64>,
    maximum: Option<i64>,
}

impl IntegerLeaf {
    /// Any integer representable as `i64`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the value to `minimum..=maximum`, either side optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLeafOptions`] if `minimum > maximum`.
    pub fn with_range(
        mut self,
        minimum: Option<i64>,
        maximum: Option<i64>,
    ) -> Result<Self, ConfigError> {
        if let (Some(min), Some(max)) = (minimum, maximum) {
            if min > max {
                return Err(ConfigError::InvalidLeafOptions(format!(
                    "integer minimum {min} exceeds maximum {max}"
                )));
            }
        }
        self.minimum = minimum;
        self.maximum = maximum;
        Ok(self)
    }
}

impl LeafValidator for IntegerLeaf {
    fn type_name(&self) -> &'static str {
        "integer"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        if raw.is_null() {
            return Err(LeafError::Null);
        }
        let n = raw
            .as_i64()
            .ok_or(LeafError::InvalidType { expected: "integer" })?;
        if let Some(min) = self.minimum {
            if n < min {
                return Err(LeafError::BelowMinimum {
                    min: min.to_string(),
                });
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                return Err(LeafError::AboveMaximum {
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Floating-point leaf with optional inclusive bounds. Integers are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatLeaf {
    minimum: Option<f64>,
    maximum: Option<f64>,
}

impl FloatLeaf {
    /// Any finite number.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the value to `minimum..=maximum`, either side optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLeafOptions`] if `minimum > maximum`.
    pub fn with_range(
        mut self,
        minimum: Option<f64>,
        maximum: Option<f64>,
    ) -> Result<Self, ConfigError> {
        if let (Some(min), Some(max)) = (minimum, maximum) {
            if min > max {
                return Err(ConfigError::InvalidLeafOptions(format!(
                    "float minimum {min} exceeds maximum {max}"
                )));
            }
        }
        self.minimum = minimum;
        self.maximum = maximum;
        Ok(self)
    }
}

impl LeafValidator for FloatLeaf {
    fn type_name(&self) -> &'static str {
        "number"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        if raw.is_null() {
            return Err(LeafError::Null);
        }
        let n = raw
            .as_f64()
            .ok_or(LeafError::InvalidType { expected: "number" })?;
        if let Some(min) = self.minimum {
            if n < min {
                return Err(LeafError::BelowMinimum {
                    min: min.to_string(),
                });
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                return Err(LeafError::AboveMaximum {
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Boolean leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanLeaf;

impl LeafValidator for BooleanLeaf {
    fn type_name(&self) -> &'static str {
        "boolean"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        match raw {
            Value::Bool(_) => Ok(()),
            Value::Null => Err(LeafError::Null),
            _ => Err(LeafError::InvalidType { expected: "boolean" }),
        }
    }
}

/// Leaf accepting exactly one fixed value.
///
/// # Examples
///
/// ```
/// use schema_union_core::{ConstantLeaf, LeafValidator};
/// use serde_json::json;
///
/// let leaf = ConstantLeaf::new(json!("enabled"));
/// assert!(leaf.validate(&json!("enabled")).is_ok());
/// assert!(leaf.validate(&json!("disabled")).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ConstantLeaf {
    value: Value,
}

impl ConstantLeaf {
    /// Accepts only `value`.
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl LeafValidator for ConstantLeaf {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        if raw == &self.value {
            Ok(())
        } else {
            Err(LeafError::NotConstant {
                expected: self.value.to_string(),
            })
        }
    }
}

/// Timestamp leaf: epoch seconds on the wire, RFC 3339 UTC internally.
///
/// # Examples
///
/// ```
/// use schema_union_core::{LeafValidator, TimestampLeaf};
/// use serde_json::json;
///
/// let leaf = TimestampLeaf;
/// let decoded = leaf.load(&json!(1609459200)).unwrap();
/// assert_eq!(decoded, json!("2021-01-01T00:00:00Z"));
/// assert_eq!(leaf.dump(&decoded).unwrap(), json!(1609459200));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampLeaf;

impl LeafValidator for TimestampLeaf {
    fn type_name(&self) -> &'static str {
        "timestamp"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        if raw.is_null() {
            return Err(LeafError::Null);
        }
        let secs = raw
            .as_f64()
            .ok_or(LeafError::InvalidType { expected: "timestamp" })?;
        if !secs.is_finite() {
            return Err(LeafError::InvalidTimestamp(secs.to_string()));
        }
        Ok(())
    }

    fn decode(&self, raw: &Value) -> Result<Value, LeafError> {
        let dt = match raw.as_i64() {
            Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0),
            None => {
                let secs = raw
                    .as_f64()
                    .ok_or(LeafError::InvalidType { expected: "timestamp" })?;
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round() as u32;
                DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999))
            }
        }
        .ok_or_else(|| LeafError::InvalidTimestamp(raw.to_string()))?;
        Ok(Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
    }

    fn encode(&self, value: &Value) -> Result<Value, LeafError> {
        let s = value
            .as_str()
            .ok_or(LeafError::InvalidType { expected: "timestamp" })?;
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|err| LeafError::InvalidTimestamp(err.to_string()))?
            .with_timezone(&Utc);
        let nanos = dt.timestamp_subsec_nanos();
        if nanos == 0 {
            Ok(Value::from(dt.timestamp()))
        } else {
            Ok(Value::from(dt.timestamp() as f64 + f64::from(nanos) / 1e9))
        }
    }
}

/// List leaf whose items all satisfy one inner leaf.
#[derive(Debug, Clone)]
pub struct ListLeaf {
    items: Arc<dyn LeafValidator>,
    unique: bool,
}

impl ListLeaf {
    /// A list of `items`.
    pub fn new(items: Arc<dyn LeafValidator>) -> Self {
        Self {
            items,
            unique: false,
        }
    }

    /// Rejects lists that repeat an entry.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn items_of<'a>(raw: &'a Value) -> Result<&'a Vec<Value>, LeafError> {
        match raw {
            Value::Array(items) => Ok(items),
            Value::Null => Err(LeafError::Null),
            _ => Err(LeafError::InvalidType { expected: "list" }),
        }
    }

    fn map_items(
        &self,
        raw: &Value,
        f: impl Fn(&dyn LeafValidator, &Value) -> Result<Value, LeafError>,
    ) -> Result<Value, LeafError> {
        Self::items_of(raw)?
            .iter()
            .enumerate()
            .map(|(index, item)| {
                f(self.items.as_ref(), item).map_err(|error| LeafError::Item {
                    index,
                    error: Box::new(error),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

impl LeafValidator for ListLeaf {
    fn type_name(&self) -> &'static str {
        "list"
    }

    fn validate(&self, raw: &Value) -> Result<(), LeafError> {
        let items = Self::items_of(raw)?;
        for (index, item) in items.iter().enumerate() {
            self.items.validate(item).map_err(|error| LeafError::Item {
                index,
                error: Box::new(error),
            })?;
            if self.unique && items[..index].contains(item) {
                return Err(LeafError::Duplicate {
                    index,
                    entry: item.to_string(),
                });
            }
        }
        Ok(())
    }

    fn decode(&self, raw: &Value) -> Result<Value, LeafError> {
        self.map_items(raw, |leaf, item| leaf.decode(item))
    }

    fn encode(&self, value: &Value) -> Result<Value, LeafError> {
        self.map_items(value, |leaf, item| leaf.encode(item))
    }
}
