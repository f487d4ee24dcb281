//! Core Model Trait - static model declaration
//!
//! A model type names itself and declares its definition; everything else
//! (collection, connection, timestamps, soft deletes, relations, accessors)
//! lives on the [`ModelDefinition`] it produces.

use super::definition::ModelDefinition;

/// A model type
pub trait Model: Send + Sync + 'static {
    /// Model name, used by relations to reference this model
    const NAME: &'static str;

    /// Refine the default definition (schema, relations, flags, accessors)
    fn define(definition: ModelDefinition) -> ModelDefinition {
        definition
    }

    /// Full definition of this model
    fn definition() -> ModelDefinition {
        Self::define(ModelDefinition::new(Self::NAME))
    }
}
