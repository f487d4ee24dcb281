//! Relation-scoped queries from a saved owner instance
//!
//! Reads are plain queries over the target model scoped to the owner.
//! Writes pin the foreign key (and the morph type) on related rows, or for
//! embedded references append the related identities to the owner's list.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::Query;
use crate::backends::{to_document, Document};
use crate::error::{ModelResult, RelationshipError};
use crate::filter::Filter;
use crate::identity::MODEL_KEY;
use crate::model::{ModelDefinition, ModelInstance};
use crate::relationships::{RelationDescriptor, RelationKind};

/// Query over one relation of a saved owner
pub struct RelatedQuery<'a> {
    owner: &'a mut ModelInstance,
    relation: RelationDescriptor,
    target: Arc<ModelDefinition>,
}

impl<'a> RelatedQuery<'a> {
    pub(crate) fn new(owner: &'a mut ModelInstance, name: &str) -> ModelResult<Self> {
        let relation = owner.definition().require_relation(name)?.clone();
        let target = owner.database().models().get(relation.related())?;
        Ok(Self {
            owner,
            relation,
            target,
        })
    }

    pub fn relation(&self) -> &RelationDescriptor {
        &self.relation
    }

    fn unsaved(&self) -> RelationshipError {
        RelationshipError::UnsavedOwner {
            relation: self.relation.name().to_string(),
        }
    }

    /// Owner-side key value
    fn local_value(&self) -> ModelResult<Value> {
        let key = self.relation.get_local_key();
        match (self.relation.kind(), self.owner.attributes().get(&key)) {
            (RelationKind::EmbedMany, None) => Ok(Value::Array(Vec::new())),
            (_, Some(value)) if !value.is_null() => Ok(value.clone()),
            _ => Err(self.unsaved().into()),
        }
    }

    /// Fields written on every related row
    fn pinned(&self) -> ModelResult<Document> {
        let mut pinned = Document::new();
        pinned.insert(self.relation.get_foreign_key(), self.local_value()?);
        if let Some((field, owner)) = self.relation.type_discriminator() {
            pinned.insert(field, Value::String(owner));
        }
        Ok(pinned)
    }

    /// Query over the related rows
    pub fn query(&self) -> ModelResult<Query> {
        let mut query = Query::new(self.owner.database().clone(), Arc::clone(&self.target));

        query = match self.relation.kind() {
            RelationKind::EmbedMany => {
                let ids = match self.local_value()? {
                    Value::Array(ids) => ids,
                    single => vec![single],
                };
                query.where_in(&self.relation.get_foreign_key(), ids)
            }
            _ => {
                let mut scoped = query;
                for (field, value) in self.pinned()? {
                    scoped = scoped.where_eq(&field, value);
                }
                scoped
            }
        };

        if let Some(attached) = self.relation.attached_filter() {
            query = query.where_filter(attached(Filter::new()));
        }
        Ok(query)
    }

    pub async fn get(&self) -> ModelResult<Vec<ModelInstance>> {
        self.query()?.get().await
    }

    pub async fn first(&self) -> ModelResult<Option<ModelInstance>> {
        self.query()?.first().await
    }

    pub async fn exists(&self) -> ModelResult<bool> {
        self.query()?.exists().await
    }

    pub async fn count(&self) -> ModelResult<u64> {
        self.query()?.count().await
    }

    /// Fail when a one-to-one relation already resolves to a row other than `except`
    async fn ensure_vacant(&self, except: Option<&str>) -> ModelResult<()> {
        if !self.relation.kind().is_single() {
            return Ok(());
        }

        if let Some(existing) = self.first().await? {
            if except.is_none() || existing.id() != except {
                return Err(RelationshipError::AlreadyHasOne {
                    relation: self.relation.name().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Append identities to the owner's id list and store it
    async fn attach(&mut self, ids: Vec<Value>) -> ModelResult<()> {
        let key = self.relation.get_local_key();
        let mut list = match self.local_value()? {
            Value::Array(list) => list,
            single => vec![single],
        };
        for id in ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }

        let owner_id = self
            .owner
            .id()
            .map(str::to_string)
            .ok_or_else(|| self.unsaved())?;

        let mut update = Document::new();
        update.insert(key.clone(), Value::Array(list.clone()));
        Query::new(self.owner.database().clone(), Arc::clone(self.owner.definition()))
            .with_trashed()
            .where_eq(MODEL_KEY, owner_id.as_str())
            .write_update(update)
            .await?;

        self.owner.put_raw(&key, Value::Array(list));
        Ok(())
    }

    fn target_query(&self) -> Query {
        Query::new(self.owner.database().clone(), Arc::clone(&self.target))
    }

    /// Create a related row
    pub async fn create<T: Serialize>(&mut self, attributes: T) -> ModelResult<ModelInstance> {
        let attributes = to_document(attributes)?;

        if self.relation.kind() == RelationKind::EmbedMany {
            let created = self.target_query().create_with(attributes, &Document::new()).await?;
            if let Some(id) = created.id() {
                self.attach(vec![Value::String(id.to_string())]).await?;
            }
            return Ok(created);
        }

        let pinned = self.pinned()?;
        self.ensure_vacant(None).await?;
        self.target_query().create_with(attributes, &pinned).await
    }

    /// Save an instance as a related row
    pub async fn save(&mut self, related: &mut ModelInstance) -> ModelResult<()> {
        if self.relation.kind() == RelationKind::EmbedMany {
            related.save().await?;
            if let Some(id) = related.id() {
                self.attach(vec![Value::String(id.to_string())]).await?;
            }
            return Ok(());
        }

        let pinned = self.pinned()?;
        self.ensure_vacant(related.id()).await?;
        for (field, value) in &pinned {
            related.put_raw(field, value.clone());
        }
        related.save_with(&pinned).await
    }

    /// Insert related rows, returning how many were written
    pub async fn insert<T: Serialize>(&mut self, rows: Vec<T>) -> ModelResult<u64> {
        let rows = rows.into_iter().map(to_document).collect::<ModelResult<Vec<_>>>()?;

        if self.relation.kind().is_single() && rows.len() > 1 {
            return Err(RelationshipError::MultipleInsertNotAllowed {
                relation: self.relation.name().to_string(),
            }
            .into());
        }

        if self.relation.kind() == RelationKind::EmbedMany {
            let validated = rows
                .iter()
                .map(|row| self.target.validate(row, false))
                .collect::<ModelResult<Vec<_>>>()?;

            let target = self.target_query();
            let mut ids = Vec::with_capacity(validated.len());
            for document in validated {
                ids.push(target.write_insert(document).await?);
            }
            let count = ids.len() as u64;
            self.attach(ids).await?;
            return Ok(count);
        }

        let pinned = self.pinned()?;
        self.ensure_vacant(None).await?;
        self.target_query().insert_documents(rows, &pinned).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;
    use crate::database::Database;
    use crate::error::ModelError;
    use elif_validation::{types, Schema};
    use serde_json::json;

    async fn database() -> Database {
        Database::builder()
            .driver("default", Arc::new(MemoryDriver::new()))
            .define(
                ModelDefinition::new("User")
                    .has_one("profile", "Profile")
                    .has_many("chats", "Chat")
                    .morph_many("comments", "Comment")
                    .embed_many("tags", "Tag"),
            )
            .define(ModelDefinition::new("Profile").schema(Schema::new().field("bio", types::string())))
            .define(ModelDefinition::new("Chat").schema(Schema::new().field("name", types::string())))
            .define(ModelDefinition::new("Comment").schema(Schema::new().field("body", types::string())))
            .define(ModelDefinition::new("Tag").schema(Schema::new().field("label", types::string())))
            .connect()
            .await
            .unwrap()
    }

    async fn owner(db: &Database) -> ModelInstance {
        db.table("User").unwrap().create(json!({})).await.unwrap()
    }

    #[tokio::test]
    async fn test_has_many_pins_foreign_key() {
        let db = database().await;
        let mut user = owner(&db).await;
        let user_id = user.id().unwrap().to_string();

        let chat = user.relation("chats").unwrap().create(json!({ "name": "general" })).await.unwrap();
        assert_eq!(chat.get_attribute("user_id"), Some(json!(user_id)));

        let inserted = user
            .relation("chats")
            .unwrap()
            .insert(vec![json!({ "name": "a" }), json!({ "name": "b" })])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(user.relation("chats").unwrap().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_has_one_guards() {
        let db = database().await;
        let mut user = owner(&db).await;

        let err = user
            .relation("profile")
            .unwrap()
            .insert(vec![json!({ "bio": "a" }), json!({ "bio": "b" })])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidRelationOperation(RelationshipError::MultipleInsertNotAllowed { .. })
        ));

        let mut profile = user.relation("profile").unwrap().create(json!({ "bio": "a" })).await.unwrap();
        let err = user.relation("profile").unwrap().create(json!({ "bio": "b" })).await.unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidRelationOperation(RelationshipError::AlreadyHasOne { .. })
        ));

        profile.set_attribute("bio", "updated");
        user.relation("profile").unwrap().save(&mut profile).await.unwrap();

        let mut other = ModelInstance::new(db.clone(), db.models().get("Profile").unwrap());
        other.set_attribute("bio", "other");
        assert!(user.relation("profile").unwrap().save(&mut other).await.is_err());
    }

    #[tokio::test]
    async fn test_morph_many_sets_type() {
        let db = database().await;
        let mut user = owner(&db).await;

        let comment = user.relation("comments").unwrap().create(json!({ "body": "hi" })).await.unwrap();
        assert_eq!(comment.get_attribute("commentable_type"), Some(json!("User")));
        assert_eq!(comment.get_attribute("commentable_id"), user.get_attribute("id"));
        assert!(user.relation("comments").unwrap().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_embed_many_appends_ids() {
        let db = database().await;
        let mut user = owner(&db).await;

        let tag = user.relation("tags").unwrap().create(json!({ "label": "rust" })).await.unwrap();
        let inserted = user
            .relation("tags")
            .unwrap()
            .insert(vec![json!({ "label": "odm" })])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let ids = user.attributes()["tag_ids"].as_array().unwrap().clone();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], json!(tag.id().unwrap()));

        let tags = user.relation("tags").unwrap().get().await.unwrap();
        assert_eq!(tags.len(), 2);

        let stored = db.table("User").unwrap().find(user.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.attributes()["tag_ids"].as_array().unwrap().len(), 2);
    }
}
