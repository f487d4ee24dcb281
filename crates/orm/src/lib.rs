//! # elif-odm: Document ODM for elif.rs
//!
//! Models declared with a validation schema and relations, a fluent
//! relational query builder compiled to aggregation pipelines, batched
//! eager loading and relation-aware filtering. Storage is reached through
//! the [`StorageDriver`] trait; an in-memory driver ships with the crate.

pub mod backends;
pub mod callback;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod identity;
pub mod model;
pub mod query;
pub mod relationships;

// Re-export core traits and types
pub use backends::{
    Document, DriverHandle, MemoryDriver, OrderDirection, Pipeline, RowStream, Stage, StorageDriver,
};
pub use callback::OnComplete;
pub use config::{ConnectionConfig, DatabaseConfig, DriverRegistry};
pub use database::{Database, DatabaseBuilder};
pub use error::*;
pub use filter::{Filter, Operator};
pub use identity::ObjectId;
pub use model::{
    Model, ModelDefinition, ModelEvent, ModelInstance, ModelRegistry, QueryMethods, Related,
};
pub use query::{Query, RelatedQuery, TrashedScope};
pub use relationships::{RelationDescriptor, RelationKind};

pub use elif_validation::{types, Schema, TypeBuilder, ValidationErrors};
