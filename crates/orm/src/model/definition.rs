//! Model definitions - the model-to-core boundary
//!
//! A definition carries everything the core needs to know about a model:
//! its schema, declared relations, collection and connection names, the
//! timestamp and soft-delete flags, and a static accessor table.

use crate::backends::Document;
use crate::error::{ModelError, ModelResult};
use crate::relationships::inference::collection_name;
use crate::relationships::RelationDescriptor;
use elif_validation::{types, Schema, SchemaNode, Type};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Connection used when a model does not name one
pub const DEFAULT_CONNECTION: &str = "default";

pub type GetterFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type VirtualFn = Arc<dyn Fn(&Document) -> Value + Send + Sync>;

/// Per-field getter/setter overrides and computed attributes
#[derive(Clone, Default)]
pub struct Accessors {
    getters: HashMap<String, GetterFn>,
    setters: HashMap<String, SetterFn>,
    virtuals: Vec<(String, VirtualFn)>,
}

impl Accessors {
    /// Value as read through the field's getter
    pub fn get(&self, field: &str, value: &Value) -> Value {
        match self.getters.get(field) {
            Some(getter) => getter(value),
            None => value.clone(),
        }
    }

    /// Value as written through the field's setter
    pub fn set(&self, field: &str, value: Value) -> Value {
        match self.setters.get(field) {
            Some(setter) => setter(value),
            None => value,
        }
    }

    pub fn has_getter(&self, field: &str) -> bool {
        self.getters.contains_key(field)
    }

    pub fn virtual_attribute(&self, name: &str) -> Option<&VirtualFn> {
        self.virtuals
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, compute)| compute)
    }

    pub fn virtuals(&self) -> impl Iterator<Item = (&str, &VirtualFn)> {
        self.virtuals.iter().map(|(name, compute)| (name.as_str(), compute))
    }
}

/// Everything the core knows about a model
#[derive(Clone)]
pub struct ModelDefinition {
    name: String,
    collection: String,
    connection: String,
    schema: Schema,
    relations: Vec<RelationDescriptor>,
    timestamps: bool,
    soft_delete: bool,
    accessors: Accessors,
}

impl ModelDefinition {
    /// New definition named `name`, stored in the snake_case plural collection
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: collection_name(&name),
            name,
            connection: DEFAULT_CONNECTION.to_string(),
            schema: Schema::new(),
            relations: Vec::new(),
            timestamps: true,
            soft_delete: false,
            accessors: Accessors::default(),
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    /// Declare a relation; a later declaration with the same name replaces it
    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        let relation = relation.with_owner(&self.name);
        self.relations.retain(|existing| existing.name() != relation.name());
        self.relations.push(relation);
        self
    }

    pub fn has_one(self, name: &str, related: &str) -> Self {
        self.with_relation(RelationDescriptor::has_one(name, related))
    }

    pub fn has_many(self, name: &str, related: &str) -> Self {
        self.with_relation(RelationDescriptor::has_many(name, related))
    }

    pub fn morph_one(self, name: &str, related: &str) -> Self {
        self.with_relation(RelationDescriptor::morph_one(name, related))
    }

    pub fn morph_many(self, name: &str, related: &str) -> Self {
        self.with_relation(RelationDescriptor::morph_many(name, related))
    }

    pub fn embed_many(self, name: &str, related: &str) -> Self {
        self.with_relation(RelationDescriptor::embed_many(name, related))
    }

    /// Transform a field's value whenever it is read
    pub fn getter<F>(mut self, field: &str, getter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.accessors.getters.insert(field.to_string(), Arc::new(getter));
        self
    }

    /// Transform a field's value whenever it is written
    pub fn setter<F>(mut self, field: &str, setter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.accessors.setters.insert(field.to_string(), Arc::new(setter));
        self
    }

    /// Computed attribute that is not stored
    pub fn virtual_attribute<F>(mut self, name: &str, compute: F) -> Self
    where
        F: Fn(&Document) -> Value + Send + Sync + 'static,
    {
        self.accessors
            .virtuals
            .retain(|(existing, _)| existing != name);
        self.accessors
            .virtuals
            .push((name.to_string(), Arc::new(compute)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn uses_soft_deletes(&self) -> bool {
        self.soft_delete
    }

    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|relation| relation.name() == name)
    }

    /// Relation lookup failing with `UnknownRelation`
    pub fn require_relation(&self, name: &str) -> ModelResult<&RelationDescriptor> {
        self.relation(name)
            .ok_or_else(|| ModelError::unknown_relation(name, &self.name))
    }

    pub fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    /// Declared schema plus identity, timestamp and soft-delete fields
    pub fn effective_schema(&self) -> Schema {
        let mut schema = self.schema.clone();
        schema.prepend("id".to_string(), SchemaNode::Field(types::object_id().into()));

        if self.timestamps {
            let created: Type = types::date().default_now().into();
            schema.insert(CREATED_AT.to_string(), SchemaNode::Field(created));
            schema.insert(UPDATED_AT.to_string(), SchemaNode::Field(types::date().into()));
            schema = schema.touch_on_update(UPDATED_AT);
        }

        if self.soft_delete {
            schema.insert(DELETED_AT.to_string(), SchemaNode::Field(types::date().into()));
        }

        schema
    }

    /// Validate a model document (identity as `id`, hex strings)
    pub fn validate(&self, document: &Document, is_update: bool) -> ModelResult<Document> {
        self.effective_schema()
            .validate(document, is_update)
            .map_err(ModelError::Validation)
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("connection", &self.connection)
            .field("fields", &self.schema.names().collect::<Vec<_>>())
            .field("relations", &self.relations)
            .field("timestamps", &self.timestamps)
            .field("soft_delete", &self.soft_delete)
            .finish()
    }
}
