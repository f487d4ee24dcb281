//! Model Registry - model name to definition, resolved at use
//!
//! Relations name their target model; the target is looked up here when a
//! query expands the relation, which lets models reference each other
//! cyclically.

use super::definition::ModelDefinition;
use crate::error::{ModelError, ModelResult};
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of model definitions
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelDefinition>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one with the same name
    pub fn register(&self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        let name = definition.name().to_string();
        let definition = Arc::new(definition);
        tracing::info!(
            "Registering model: {} (collection '{}', {} relations)",
            name,
            definition.collection_name(),
            definition.relations().len()
        );
        self.models.insert(name, Arc::clone(&definition));
        definition
    }

    /// Return the registered definition or register the one produced by `define`
    pub fn get_or_register<F>(&self, name: &str, define: F) -> Arc<ModelDefinition>
    where
        F: FnOnce() -> ModelDefinition,
    {
        if let Some(existing) = self.models.get(name) {
            return Arc::clone(existing.value());
        }
        self.register(define())
    }

    pub fn get(&self, name: &str) -> ModelResult<Arc<ModelDefinition>> {
        self.models
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
