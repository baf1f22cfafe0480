//! Error types for descriptor loading and registry construction.
//!
//! Every failure here happens while a registry is being built. Once a
//! [`SchemaRegistry`](crate::SchemaRegistry) exists, only validation errors
//! remain possible.

use schema_union_core::ConfigError;
use thiserror::Error;

/// Errors that can occur while reading descriptors or building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A schema was rejected by the engine (disjointness, leaf options, ...).
    #[error("schema '{schema}': {source}")]
    Schema {
        /// Name of the descriptor being built.
        schema: String,
        /// Engine error.
        #[source]
        source: ConfigError,
    },

    /// A descriptor names a schema that does not exist.
    #[error("schema '{schema}' references unknown schema '{target}'")]
    UnknownSchemaRef {
        /// Referencing schema.
        schema: String,
        /// Missing name.
        target: String,
    },

    /// Descriptors reference each other in a loop.
    #[error("reference cycle: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),

    /// A descriptor is structurally wrong (e.g. both `type` and `ref`).
    #[error("invalid descriptor '{schema}': {reason}")]
    InvalidDescriptor {
        /// Offending schema.
        schema: String,
        /// What is wrong.
        reason: String,
    },

    /// A lookup named a schema the registry does not hold.
    #[error("no schema named '{0}'")]
    NotFound(String),
}

impl RegistryError {
    pub(crate) fn schema(schema: &str, source: ConfigError) -> Self {
        Self::Schema {
            schema: schema.to_string(),
            source,
        }
    }

    pub(crate) fn invalid(schema: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            schema: schema.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the engine error underneath, if this is one.
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            Self::Schema { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`RegistryError`].
pub type Result<T> = std::result::Result<T, RegistryError>;
