//! Model instances - attribute maps bound to a definition
//!
//! Setters run whenever a value enters the attribute map (including
//! hydration from the store), getters whenever one is read back out.
//! Hydration never validates. Eager-loaded relations are hydrated with the
//! related model's definition and kept apart from the attributes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::definition::{ModelDefinition, DELETED_AT};
use super::events::ModelEvent;
use crate::backends::{get_path, set_path, to_document, Document};
use crate::database::Database;
use crate::error::{ModelError, ModelResult, RelationshipError};
use crate::identity::MODEL_KEY;
use crate::query::{Query, RelatedQuery};
use elif_validation::types::date;

/// Rows of an eager-loaded relation
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<ModelInstance>),
    Many(Vec<ModelInstance>),
}

impl Related {
    /// Every loaded row; a single relation yields zero or one
    pub fn many(&self) -> &[ModelInstance] {
        match self {
            Related::Many(rows) => rows,
            Related::One(Some(row)) => std::slice::from_ref(row),
            Related::One(None) => &[],
        }
    }

    /// The loaded row of a single relation, or the first of a list
    pub fn one(&self) -> Option<&ModelInstance> {
        match self {
            Related::One(row) => row.as_ref(),
            Related::Many(rows) => rows.first(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Related::One(Some(row)) => row.to_json(),
            Related::One(None) => Value::Null,
            Related::Many(rows) => Value::Array(rows.iter().map(ModelInstance::to_json).collect()),
        }
    }
}

/// One model row
#[derive(Clone)]
pub struct ModelInstance {
    db: Database,
    definition: Arc<ModelDefinition>,
    attributes: Document,
    relations: HashMap<String, Related>,
    is_new: bool,
}

impl ModelInstance {
    /// New, unsaved instance
    pub fn new(db: Database, definition: Arc<ModelDefinition>) -> Self {
        Self {
            db,
            definition,
            attributes: Document::new(),
            relations: HashMap::new(),
            is_new: true,
        }
    }

    /// Instance for a stored row, model-form document
    pub(crate) fn hydrate(db: Database, definition: Arc<ModelDefinition>, mut document: Document) -> Self {
        let mut relations = HashMap::new();
        for relation in definition.relations() {
            let Some(value) = document.remove(relation.name()) else {
                continue;
            };
            match db.models().get(relation.related()) {
                Ok(target) => {
                    let related = Self::hydrate_related(&db, &target, value);
                    relations.insert(relation.name().to_string(), related);
                }
                Err(err) => {
                    tracing::warn!("Keeping relation '{}' unhydrated: {}", relation.name(), err);
                    document.insert(relation.name().to_string(), value);
                }
            }
        }

        let accessors = definition.accessors();
        let attributes = document
            .into_iter()
            .map(|(field, value)| {
                let value = accessors.set(&field, value);
                (field, value)
            })
            .collect();

        Self {
            db,
            definition,
            attributes,
            relations,
            is_new: false,
        }
    }

    fn hydrate_related(db: &Database, target: &Arc<ModelDefinition>, value: Value) -> Related {
        let row = |document| Self::hydrate(db.clone(), Arc::clone(target), document);
        match value {
            Value::Array(items) => Related::Many(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(document) => Some(row(document)),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::Object(document) => Related::One(Some(row(document))),
            _ => Related::One(None),
        }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// True until the instance has been stored
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Identity as a hex string
    pub fn id(&self) -> Option<&str> {
        self.attributes.get(MODEL_KEY).and_then(Value::as_str)
    }

    /// Raw attributes, as stored on the instance
    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    /// Rows of an eager-loaded relation, `None` when it was not loaded
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub(crate) fn put_raw(&mut self, field: &str, value: Value) {
        set_path(&mut self.attributes, field, value);
    }

    /// Attribute at a dotted path, through its getter; virtual attributes are
    /// computed and loaded relations serialized
    pub fn get_attribute(&self, path: &str) -> Option<Value> {
        let accessors = self.definition.accessors();
        if let Some(compute) = accessors.virtual_attribute(path) {
            return Some(compute(&self.attributes));
        }
        if let Some(related) = self.relations.get(path) {
            return Some(related.to_json());
        }

        get_path(&self.attributes, path).map(|value| accessors.get(path, value))
    }

    /// Set an attribute at a dotted path, through its setter
    pub fn set_attribute(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        let value = self.definition.accessors().set(path, value.into());
        set_path(&mut self.attributes, path, value);
        self
    }

    /// Set every top-level field of `attributes`
    pub fn fill<T: Serialize>(&mut self, attributes: T) -> ModelResult<&mut Self> {
        for (field, value) in to_document(attributes)? {
            self.set_attribute(&field, value);
        }
        Ok(self)
    }

    /// Serialized form: every attribute through its getter, virtual attributes
    /// and loaded relations
    pub fn to_json(&self) -> Value {
        let accessors = self.definition.accessors();
        let mut output: Document = self
            .attributes
            .iter()
            .map(|(field, value)| (field.clone(), accessors.get(field, value)))
            .collect();

        for (name, compute) in accessors.virtuals() {
            output.insert(name.to_string(), compute(&self.attributes));
        }

        for (name, related) in &self.relations {
            output.insert(name.clone(), related.to_json());
        }

        Value::Object(output)
    }

    /// Deserialize the serialized form into a typed struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    fn query(&self) -> Query {
        Query::new(self.db.clone(), Arc::clone(&self.definition))
    }

    fn stored_id(&self) -> ModelResult<String> {
        match (self.is_new, self.id()) {
            (false, Some(id)) => Ok(id.to_string()),
            _ => Err(ModelError::NotFound(self.definition.collection_name().to_string())),
        }
    }

    /// Insert or update this instance
    pub async fn save(&mut self) -> ModelResult<()> {
        self.save_with(&Document::new()).await
    }

    /// Save, writing `pinned` fields past validation
    pub(crate) async fn save_with(&mut self, pinned: &Document) -> ModelResult<()> {
        if self.is_new {
            let mut validated = self.definition.validate(&self.attributes, false)?;
            validated.extend(pinned.clone());
            let id = self.query().write_insert(validated.clone()).await?;

            validated.insert(MODEL_KEY.to_string(), id);
            self.attributes.extend(validated);
            self.is_new = false;
            self.db.emit(ModelEvent::Created, self);
            return Ok(());
        }

        let id = self.stored_id()?;
        let mut validated = self.definition.validate(&self.attributes, true)?;
        validated.remove(MODEL_KEY);
        validated.extend(pinned.clone());

        self.query()
            .with_trashed()
            .where_eq(MODEL_KEY, id.as_str())
            .write_update(validated.clone())
            .await?;
        self.attributes.extend(validated);
        self.db.emit(ModelEvent::Updated, self);
        Ok(())
    }

    /// Delete this instance; soft-delete models are stamped unless `force`
    pub async fn delete(&mut self, force: bool) -> ModelResult<()> {
        let id = self.stored_id()?;
        let query = self.query().with_trashed().where_eq(MODEL_KEY, id.as_str());

        if self.definition.uses_soft_deletes() && !force {
            let stamp = date::now_value();
            let mut update = Document::new();
            update.insert(DELETED_AT.to_string(), stamp.clone());
            query.write_update(update).await?;
            self.attributes.insert(DELETED_AT.to_string(), stamp);
        } else {
            query.delete(true).await?;
            self.is_new = true;
        }
        self.db.emit(ModelEvent::Deleted, self);
        Ok(())
    }

    /// Clear the deletion stamp; no effect on models without soft delete
    pub async fn restore(&mut self) -> ModelResult<()> {
        if !self.definition.uses_soft_deletes() {
            return Ok(());
        }

        let id = self.stored_id()?;
        self.query().where_eq(MODEL_KEY, id.as_str()).restore().await?;
        self.attributes.insert(DELETED_AT.to_string(), Value::Null);
        self.db.emit(ModelEvent::Restored, self);
        Ok(())
    }

    pub fn is_trashed(&self) -> bool {
        self.attributes
            .get(DELETED_AT)
            .map_or(false, |value| !value.is_null())
    }

    /// Query scoped to one of this instance's relations
    pub fn relation(&mut self, name: &str) -> ModelResult<RelatedQuery<'_>> {
        if self.is_new {
            return Err(RelationshipError::UnsavedOwner {
                relation: name.to_string(),
            }
            .into());
        }
        RelatedQuery::new(self, name)
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model", &self.definition.name())
            .field("is_new", &self.is_new)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}
