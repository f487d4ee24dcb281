//! Schema - ordered, recursive map of field names to validators

use crate::error::{ValidationErrors, ValidationResult};
use crate::types::{date, Type};
use serde_json::{Map, Value};

/// A schema entry: a leaf validator or a nested schema
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Field(Type),
    Nested(Schema),
}

/// Field name to validator mapping, kept in declaration order
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, SchemaNode)>,
    touch_on_update: Option<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a leaf field
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<Type>) -> Self {
        self.insert(name.into(), SchemaNode::Field(ty.into()));
        self
    }

    /// Declare a nested sub-schema
    pub fn nested(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.insert(name.into(), SchemaNode::Nested(schema));
        self
    }

    /// Stamp `field` with the current time whenever a document is validated as an update
    pub fn touch_on_update(mut self, field: impl Into<String>) -> Self {
        self.touch_on_update = Some(field.into());
        self
    }

    /// Insert or replace a node. Replacing keeps the original position.
    pub fn insert(&mut self, name: String, node: SchemaNode) {
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = node,
            None => self.fields.push((name, node)),
        }
    }

    /// Insert a node in first position, removing any earlier declaration of it
    pub fn prepend(&mut self, name: String, node: SchemaNode) {
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.insert(0, (name, node));
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, node)| node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a whole document.
    ///
    /// Undeclared fields are dropped. On update, entries that only report
    /// absence are pruned and the touch-on-update field is stamped.
    pub fn validate(
        &self,
        document: &Map<String, Value>,
        is_update: bool,
    ) -> ValidationResult<Map<String, Value>> {
        let (mut value, mut errors) = self.validate_partial(document, is_update);

        if is_update {
            errors.prune_absence();

            if let Some(field) = &self.touch_on_update {
                value.insert(field.clone(), date::now_value());
            }
        }

        errors.into_result(value)
    }

    /// Validate without update-time pruning, returning everything collected
    pub fn validate_partial(
        &self,
        document: &Map<String, Value>,
        is_update: bool,
    ) -> (Map<String, Value>, ValidationErrors) {
        let mut value = Map::new();
        let mut errors = ValidationErrors::new();
        let empty = Map::new();

        for (name, node) in &self.fields {
            let item = document.get(name);

            match node {
                SchemaNode::Field(ty) => {
                    let result = ty.validate(item, is_update);
                    if let Some(validated) = result.value {
                        value.insert(name.clone(), validated);
                    }
                    errors.add_errors(name.clone(), result.errors);
                }
                SchemaNode::Nested(schema) => {
                    let sub_document = match item {
                        None | Some(Value::Null) => &empty,
                        Some(Value::Object(sub_document)) => sub_document,
                        Some(_) => {
                            errors.add_error(name.clone(), "Must be an object");
                            continue;
                        }
                    };

                    let (nested_value, nested_errors) =
                        schema.validate_partial(sub_document, is_update);
                    errors.merge_nested(name, nested_errors);

                    if !nested_value.is_empty() {
                        value.insert(name.clone(), Value::Object(nested_value));
                    }
                }
            }
        }

        (value, errors)
    }
}
