//! Error types for the ODM
//!
//! Every failure surfaces to the immediate caller; nothing is retried.
//! Driver failures are carried through unchanged as [`DriverError`].

use elif_validation::ValidationErrors;
use std::fmt;
use std::sync::Arc;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ODM error type alias
pub type OdmError = ModelError;

/// ODM result type alias
pub type OdmResult<T> = ModelResult<T>;

/// Error types for ODM operations
#[derive(Debug, Clone)]
pub enum ModelError {
    /// Document failed schema validation
    Validation(ValidationErrors),
    /// A relation path names a relation the model does not declare
    UnknownRelation { relation: String, model: String },
    /// A connection name that was never registered
    UnknownConnection(String),
    /// A model name that was never registered
    UnknownModel(String),
    /// Relation write rejected
    InvalidRelationOperation(RelationshipError),
    /// Failure reported by the storage driver
    Driver(DriverError),
    /// Malformed builder input
    Query(QueryError),
    /// Invalid model, relation or connection declaration
    Configuration(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Record not found
    NotFound(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Validation(errors) => write!(f, "Validation error: {}", errors),
            ModelError::UnknownRelation { relation, model } => {
                write!(f, "Relation '{}' does not exist on '{}' Model", relation, model)
            }
            ModelError::UnknownConnection(name) => write!(f, "Unknown connection '{}'", name),
            ModelError::UnknownModel(name) => write!(f, "Unknown model '{}'", name),
            ModelError::InvalidRelationOperation(err) => write!(f, "Relationship error: {}", err),
            ModelError::Driver(err) => write!(f, "Driver error: {}", err),
            ModelError::Query(err) => write!(f, "Query error: {}", err),
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::NotFound(collection) => {
                write!(f, "Record not found in collection '{}'", collection)
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Validation(errors) => Some(errors),
            ModelError::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl ModelError {
    pub fn unknown_relation(relation: impl Into<String>, model: impl Into<String>) -> Self {
        ModelError::UnknownRelation {
            relation: relation.into(),
            model: model.into(),
        }
    }

    /// Validation errors, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ModelError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ModelError {
    fn from(errors: ValidationErrors) -> Self {
        ModelError::Validation(errors)
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

// Convert from anyhow errors
impl From<anyhow::Error> for ModelError {
    fn from(err: anyhow::Error) -> Self {
        ModelError::Driver(DriverError::new(err))
    }
}

impl From<DriverError> for ModelError {
    fn from(err: DriverError) -> Self {
        ModelError::Driver(err)
    }
}

/// Opaque storage driver failure
#[derive(Debug, Clone)]
pub struct DriverError(Arc<anyhow::Error>);

impl DriverError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::new(anyhow::Error::msg(message))
    }

    /// The underlying driver error
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DriverError {}

/// Error types for query builder input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    /// Like pattern that is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl From<QueryError> for ModelError {
    fn from(err: QueryError) -> Self {
        ModelError::Query(err)
    }
}

/// Error types for relation writes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelationshipError {
    /// A one-to-one relation already points at another row
    #[error("This item already has one {relation}")]
    AlreadyHasOne { relation: String },

    #[error("Can't insert multiple items through '{relation}'")]
    MultipleInsertNotAllowed { relation: String },

    /// Relation write through an owner that has not been saved
    #[error("Can't use relation '{relation}' before the owner is saved")]
    UnsavedOwner { relation: String },
}

impl From<RelationshipError> for ModelError {
    fn from(err: RelationshipError) -> Self {
        ModelError::InvalidRelationOperation(err)
    }
}
