//! Multi-candidate composition of component schemas.
//!
//! A [`MultiNested`] combinator holds an ordered list of component schemas
//! and one of two modes:
//!
//! - **exclusive**: components are tried in order and the first one that
//!   explains the whole record wins. Later components are never consulted,
//!   so callers list the most specific shapes first.
//! - **merged**: every component claims the keys it declares (or, for blank
//!   components, the keys it validates) from a shrinking working copy of the
//!   record. An open component such as a hybrid dictionary also receives the
//!   keys no component declares. Keys a declared component fails on are not
//!   offered to anyone else and always fail the call. The claims must cover
//!   the record exactly.
//!
//! Failed attempts are folded into an [`ErrorAccumulator`] and only surface
//! when nothing explains the record.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use schema_union_core::{
//!     ComponentSchema, Field, IntegerLeaf, MultiNested, MultiNestedOptions, ObjectSchema,
//!     StringLeaf,
//! };
//! use serde_json::json;
//!
//! let name: Arc<dyn ComponentSchema> = Arc::new(
//!     ObjectSchema::new("name").with_field(Field::leaf("a", Arc::new(StringLeaf::new()))),
//! );
//! let size: Arc<dyn ComponentSchema> = Arc::new(
//!     ObjectSchema::new("size").with_field(Field::leaf("b", Arc::new(IntegerLeaf::new()))),
//! );
//! let both = MultiNested::new("both", vec![name, size], MultiNestedOptions::merged()).unwrap();
//!
//! assert_eq!(both.load(&json!({"a": "x", "b": 2})).unwrap(), json!({"a": "x", "b": 2}));
//! let err = both.load(&json!({"a": "x", "c": 3})).unwrap_err();
//! assert_eq!(err.as_validation().unwrap().messages("c"), ["Unknown field."]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::describe::SchemaDescription;
use crate::error::{ConfigError, ErrorAccumulator, KeyConflict, KeyedError, SchemaError};
use crate::object::INVALID_TYPE;
use crate::schema::ComponentSchema;
use crate::types::{Mode, MultiNestedOptions, Record, UnknownPolicy, single_entry};

const UNKNOWN: &str = "Unknown field.";
const NO_MATCH: &str = "No component schema matched.";

/// Produces the component list of a deferred combinator.
type ComponentFactory = Box<dyn Fn() -> Vec<Arc<dyn ComponentSchema>> + Send + Sync>;

type Resolved = Result<Vec<Arc<dyn ComponentSchema>>, ConfigError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Load,
    Dump,
}

/// Keys a blank component claimed one at a time.
struct KeyClaims {
    value: Record,
    claimed: Vec<String>,
    rejected: Vec<Rejection>,
}

impl KeyClaims {
    fn into_error(self) -> KeyedError {
        let mut errors = ErrorAccumulator::new();
        for rejection in self.rejected {
            errors.add_keyed(rejection.error);
        }
        errors.into_error()
    }
}

/// A failed attempt together with the input keys it was offered.
struct Rejection {
    keys: Vec<String>,
    error: KeyedError,
}

/// Ordered, possibly lazily resolved component schemas.
///
/// Resolution happens at most once, even under concurrent first use; the
/// outcome, including a configuration error, is memoized.
struct ComponentList {
    resolved: OnceLock<Resolved>,
    factory: Option<ComponentFactory>,
}

impl fmt::Debug for ComponentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved.get() {
            Some(Ok(components)) => f
                .debug_list()
                .entries(components.iter().map(|c| c.name()))
                .finish(),
            Some(Err(err)) => write!(f, "<unusable: {err}>"),
            None => f.write_str("<deferred>"),
        }
    }
}

/// Composition of several component schemas.
///
/// Construction checks the configuration: merged mode with `many` is
/// rejected, an empty component list is rejected, and in merged mode the
/// declared key sets must be pairwise disjoint. With [`MultiNested::deferred`]
/// the component-dependent checks run once, when the list is first resolved.
///
/// A combinator is immutable after construction and can be shared across
/// threads.
pub struct MultiNested {
    name: String,
    options: MultiNestedOptions,
    components: ComponentList,
}

impl fmt::Debug for MultiNested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiNested")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("components", &self.components)
            .finish()
    }
}

impl MultiNested {
    /// Builds a combinator over an already constructed component list.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MergedWithMany`] for merged mode with `many`.
    /// - [`ConfigError::EmptyComponents`] if `components` is empty.
    /// - [`ConfigError::NotDisjoint`] if merged components share a key.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use schema_union_core::{
    ///     ComponentSchema, ConfigError, Field, MultiNested, MultiNestedOptions, ObjectSchema,
    ///     StringLeaf,
    /// };
    ///
    /// let x = || -> Arc<dyn ComponentSchema> {
    ///     Arc::new(ObjectSchema::new("x").with_field(Field::leaf("x", Arc::new(StringLeaf::new()))))
    /// };
    /// let err = MultiNested::new("xx", vec![x(), x()], MultiNestedOptions::merged()).unwrap_err();
    /// assert!(matches!(err, ConfigError::NotDisjoint { .. }));
    /// assert!(err.to_string().contains("'x'"));
    /// ```
    pub fn new(
        name: impl Into<String>,
        components: Vec<Arc<dyn ComponentSchema>>,
        options: MultiNestedOptions,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        check_options(&options)?;
        check_components(&name, &components, options.mode)?;
        Ok(Self {
            name,
            options,
            components: ComponentList {
                resolved: OnceLock::from(Ok(components)),
                factory: None,
            },
        })
    }

    /// Builds a combinator whose components are produced by `factory` on
    /// first use.
    ///
    /// Option checks run now. Component checks run once at resolution; a
    /// failure is memoized and returned from every later call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MergedWithMany`] for merged mode with `many`.
    pub fn deferred<F>(
        name: impl Into<String>,
        factory: F,
        options: MultiNestedOptions,
    ) -> Result<Self, ConfigError>
    where
        F: Fn() -> Vec<Arc<dyn ComponentSchema>> + Send + Sync + 'static,
    {
        check_options(&options)?;
        Ok(Self {
            name: name.into(),
            options,
            components: ComponentList {
                resolved: OnceLock::new(),
                factory: Some(Box::new(factory)),
            },
        })
    }

    /// Combinator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed options.
    pub fn options(&self) -> MultiNestedOptions {
        self.options
    }

    /// Returns `true` once the component list has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.components.resolved.get().is_some()
    }

    /// The component list, resolving it on first access.
    ///
    /// # Errors
    ///
    /// Returns the memoized configuration error of a deferred list.
    pub fn components(&self) -> Result<&[Arc<dyn ComponentSchema>], ConfigError> {
        self.components
            .resolved
            .get_or_init(|| {
                let components = match &self.components.factory {
                    Some(factory) => factory(),
                    None => Vec::new(),
                };
                debug!(schema = %self.name, count = components.len(), "Resolved deferred components");
                let checked = check_components(&self.name, &components, self.options.mode);
                if let Err(err) = &checked {
                    warn!(schema = %self.name, error = %err, "Deferred components are unusable");
                }
                checked.map(|()| components)
            })
            .as_ref()
            .map(Vec::as_slice)
            .map_err(Clone::clone)
    }

    /// Describes the union as `oneOf` (exclusive) or `allOf` (merged).
    ///
    /// # Errors
    ///
    /// Returns the configuration error of an unusable deferred list.
    pub fn describe(&self) -> Result<SchemaDescription, ConfigError> {
        let parts = self
            .components()?
            .iter()
            .map(|c| c.describe())
            .collect();
        Ok(match self.options.mode {
            Mode::Exclusive => SchemaDescription::one_of(&self.name, parts, self.options.many),
            Mode::Merged => SchemaDescription::all_of(&self.name, parts),
        })
    }

    /// Validates and decodes a record, or a list of records when `many` is set.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Validation`] if the input is not of the expected shape
    /// or no component explains it; [`SchemaError::Config`] if a deferred
    /// component list is unusable.
    pub fn load(&self, input: &Value) -> Result<Value, SchemaError> {
        self.apply(Direction::Load, input)
    }

    /// Encodes a decoded value, or a list of them when `many` is set.
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load).
    pub fn dump(&self, value: &Value) -> Result<Value, SchemaError> {
        self.apply(Direction::Dump, value)
    }

    /// Loads a single record, ignoring `many`.
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load).
    pub fn load_record(&self, record: &Record) -> Result<Record, SchemaError> {
        let components = self.components()?;
        Ok(self.process(Direction::Load, components, record)?)
    }

    /// Dumps a single value, ignoring `many`.
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load).
    pub fn dump_record(&self, value: &Record) -> Result<Record, SchemaError> {
        let components = self.components()?;
        Ok(self.process(Direction::Dump, components, value)?)
    }

    fn apply(&self, direction: Direction, input: &Value) -> Result<Value, SchemaError> {
        let components = self.components()?;

        if !self.options.many {
            let record = input
                .as_object()
                .ok_or_else(|| KeyedError::whole_record(INVALID_TYPE))?;
            return Ok(Value::Object(self.process(direction, components, record)?));
        }

        let items = input
            .as_array()
            .ok_or_else(|| KeyedError::whole_record(INVALID_TYPE))?;
        let mut out = Vec::with_capacity(items.len());
        let mut errors = ErrorAccumulator::new();
        for (index, item) in items.iter().enumerate() {
            let result = match item.as_object() {
                Some(record) => self.process(direction, components, record),
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

    fn process(
        &self,
        direction: Direction,
        components: &[Arc<dyn ComponentSchema>],
        record: &Record,
    ) -> Result<Record, KeyedError> {
        match self.options.mode {
            Mode::Exclusive => self.exclusive(direction, components, record),
            Mode::Merged => self.merged(direction, components, record),
        }
    }

    fn exclusive(
        &self,
        direction: Direction,
        components: &[Arc<dyn ComponentSchema>],
        record: &Record,
    ) -> Result<Record, KeyedError> {
        let mut errors = ErrorAccumulator::new();

        for component in components {
            let attempt = if component.is_blank() {
                if record.is_empty() {
                    continue;
                }
                let claims = self.key_by_key(direction, component.as_ref(), record);
                if claims.rejected.is_empty() {
                    Ok(claims.value)
                } else {
                    Err(claims.into_error())
                }
            } else {
                self.whole_record(direction, component.as_ref(), record)
            };

            match attempt {
                Ok(value) => {
                    debug!(schema = %self.name, component = component.name(), ?direction, "Component matched");
                    return Ok(value);
                }
                Err(err) => {
                    debug!(schema = %self.name, component = component.name(), ?direction, "Component rejected record");
                    errors.add_keyed(err);
                }
            }
        }

        if errors.is_empty() {
            errors.add_message(if record.is_empty() { INVALID_TYPE } else { NO_MATCH });
        }
        Err(errors.into_error())
    }

    fn merged(
        &self,
        direction: Direction,
        components: &[Arc<dyn ComponentSchema>],
        record: &Record,
    ) -> Result<Record, KeyedError> {
        let owned: BTreeSet<String> = components.iter().flat_map(|c| c.declared_keys()).collect();
        let mut remaining = record.clone();
        // Keys a declared component failed on; nobody else is offered them.
        let mut held = Record::new();
        let mut merged = Record::new();
        let mut rejections = Vec::new();

        for component in components {
            if component.is_blank() {
                let claims = self.key_by_key(direction, component.as_ref(), &remaining);
                for key in &claims.claimed {
                    remaining.remove(key);
                }
                merged.extend(claims.value);
                rejections.extend(claims.rejected);
                continue;
            }

            let declared = component.declared_keys();
            let open = component.claims_undeclared_keys();
            let subset: Record = remaining
                .iter()
                .filter(|(key, _)| {
                    declared.contains(key.as_str()) || (open && !owned.contains(key.as_str()))
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();

            match self.claim_declared(direction, component.as_ref(), &subset) {
                Ok((value, claimed)) => {
                    debug!(schema = %self.name, component = component.name(), claimed = claimed.len(), ?direction, "Component claimed keys");
                    for key in &claimed {
                        remaining.remove(key);
                    }
                    merged.extend(value);
                }
                Err(error) => {
                    debug!(schema = %self.name, component = component.name(), ?direction, "Component rejected its keys");
                    for key in subset.keys() {
                        if let Some(value) = remaining.remove(key) {
                            held.insert(key.clone(), value);
                        }
                    }
                    rejections.push(Rejection {
                        keys: subset.keys().cloned().collect(),
                        error,
                    });
                }
            }
        }

        let unclaimed = |key: &str| remaining.contains_key(key) || held.contains_key(key);
        let mut errors = ErrorAccumulator::new();
        let mut failed_keys = BTreeSet::new();
        for mut rejection in rejections {
            let live: Vec<String> = rejection
                .keys
                .iter()
                .filter(|key| unclaimed(key.as_str()))
                .cloned()
                .collect();
            if live.is_empty() && !rejection.keys.is_empty() {
                continue;
            }
            rejection.error.retain_keys(|key| {
                let input = input_key(record, key);
                !record.contains_key(input) || unclaimed(input)
            });
            errors.add_keyed(rejection.error);
            failed_keys.extend(live);
        }

        let mut failed = !held.is_empty();
        for (key, value) in &remaining {
            if failed_keys.contains(key) {
                failed = true;
                continue;
            }
            match self.options.unknown {
                UnknownPolicy::Reject => {
                    errors.add(key.clone(), UNKNOWN);
                    failed = true;
                }
                UnknownPolicy::Ignore => {}
                UnknownPolicy::Include => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        if failed {
            debug!(schema = %self.name, unclaimed = remaining.len() + held.len(), "Keys left unclaimed");
            if errors.is_empty() {
                errors.add_message(NO_MATCH);
            }
        }

        if failed || (record.is_empty() && !errors.is_empty()) {
            return Err(errors.into_error());
        }
        Ok(merged)
    }

    /// Runs a declared-key component against the whole record (exclusive mode).
    fn whole_record(
        &self,
        direction: Direction,
        component: &dyn ComponentSchema,
        record: &Record,
    ) -> Result<Record, KeyedError> {
        match direction {
            Direction::Load => component.load(record, self.options.unknown),
            Direction::Dump => {
                let mut dumped = component.dump(record)?;
                let reloaded = component.load(&dumped, self.options.unknown)?;

                // Whatever the component did not carry through is unknown to it.
                let mut errors = ErrorAccumulator::new();
                for (key, value) in record {
                    if reloaded.contains_key(key.as_str()) {
                        continue;
                    }
                    match self.options.unknown {
                        UnknownPolicy::Reject => errors.add(key.clone(), UNKNOWN),
                        UnknownPolicy::Ignore => {}
                        UnknownPolicy::Include => {
                            dumped.insert(key.clone(), value.clone());
                        }
                    }
                }
                errors.finish()?;
                Ok(dumped)
            }
        }
    }

    /// Runs a declared-key component against its share of the working record
    /// (merged mode), returning its output and the input keys it claimed.
    ///
    /// A dump does not say which keys it consumed, so the dumped fragment is
    /// loaded back through the same component and the keys that survive are
    /// the claim. This assumes the component's dump output is loadable by
    /// itself; components that add derived keys on dump are misattributed.
    fn claim_declared(
        &self,
        direction: Direction,
        component: &dyn ComponentSchema,
        subset: &Record,
    ) -> Result<(Record, Vec<String>), KeyedError> {
        match direction {
            Direction::Load => {
                let value = component.load(subset, self.options.unknown)?;
                Ok((value, subset.keys().cloned().collect()))
            }
            Direction::Dump => {
                let dumped = component.dump(subset)?;
                let reloaded = component.load(&dumped, self.options.unknown)?;
                let claimed = reloaded
                    .keys()
                    .filter(|key| subset.contains_key(key.as_str()))
                    .cloned()
                    .collect();
                Ok((dumped, claimed))
            }
        }
    }

    /// Offers each key of `record` to a blank component on its own.
    fn key_by_key(
        &self,
        direction: Direction,
        component: &dyn ComponentSchema,
        record: &Record,
    ) -> KeyClaims {
        let mut claims = KeyClaims {
            value: Record::new(),
            claimed: Vec::new(),
            rejected: Vec::new(),
        };

        for (key, value) in record {
            let single = single_entry(key, value);
            let result = match direction {
                Direction::Load => component.load(&single, UnknownPolicy::Include),
                Direction::Dump => component.dump(&single).and_then(|dumped| {
                    component
                        .load(&dumped, UnknownPolicy::Include)
                        .map(|_| dumped)
                }),
            };
            match result {
                Ok(out) => {
                    claims.value.extend(out);
                    claims.claimed.push(key.clone());
                }
                Err(err) => claims.rejected.push(Rejection {
                    keys: vec![key.clone()],
                    error: err.attribute_to(key),
                }),
            }
        }
        claims
    }
}

/// The input key an error key refers to: the key itself, or the head of a
/// dotted path into a nested value.
fn input_key<'a>(record: &Record, error_key: &'a str) -> &'a str {
    if record.contains_key(error_key) {
        return error_key;
    }
    error_key.split_once('.').map_or(error_key, |(head, _)| head)
}

fn check_options(options: &MultiNestedOptions) -> Result<(), ConfigError> {
    if options.mode == Mode::Merged && options.many {
        return Err(ConfigError::MergedWithMany);
    }
    Ok(())
}

fn check_components(
    name: &str,
    components: &[Arc<dyn ComponentSchema>],
    mode: Mode,
) -> Result<(), ConfigError> {
    if components.is_empty() {
        return Err(ConfigError::EmptyComponents(name.to_string()));
    }
    if mode == Mode::Merged {
        check_disjoint(components)?;
    }
    Ok(())
}

fn check_disjoint(components: &[Arc<dyn ComponentSchema>]) -> Result<(), ConfigError> {
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    let mut conflicts = Vec::new();

    for component in components {
        for key in component.declared_keys() {
            match owners.get(&key) {
                Some(first) => conflicts.push(KeyConflict {
                    key,
                    first: (*first).to_string(),
                    second: component.name().to_string(),
                }),
                None => {
                    owners.insert(key, component.name());
                }
            }
        }
    }

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::NotDisjoint { conflicts })
    }
}
