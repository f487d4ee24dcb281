//! Model System - model declarations and instances
//!
//! - `core_trait`: the `Model` trait a model type implements
//! - `definition`: schema, relations, flags and accessors of a model
//! - `registry`: model name to definition, resolved lazily
//! - `query_methods`: model-level query entry points
//! - `instance`: attribute maps bound to a definition
//! - `events`: listeners fired after single-row writes

pub mod core_trait;
pub mod definition;
pub mod events;
pub mod instance;
pub mod query_methods;
pub mod registry;

pub use core_trait::Model;
pub use definition::{
    Accessors, GetterFn, ModelDefinition, SetterFn, VirtualFn, CREATED_AT, DEFAULT_CONNECTION,
    DELETED_AT, UPDATED_AT,
};
pub use events::{EventRegistry, Listener, ModelEvent};
pub use instance::{ModelInstance, Related};
pub use query_methods::QueryMethods;
pub use registry::ModelRegistry;
