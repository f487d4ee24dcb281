//! # elif-validation
//!
//! Recursive schema validation for elif-odm documents. A [`Schema`] maps field
//! names to [`Type`] validators or nested schemas; validating a document casts
//! values, substitutes defaults and collects path-keyed errors.

pub mod error;
pub mod schema;
pub mod types;

// Re-exports for easy access
pub use error::{DeclarationError, ValidationErrors, ValidationResult, REQUIRED_MESSAGE};
pub use schema::{Schema, SchemaNode};
pub use types::{
    AnyType, ArrayType, BooleanType, DateType, NumberType, ObjectIdType, ObjectType, StringType,
    Type, TypeBuilder, TypeKind, Validated,
};
