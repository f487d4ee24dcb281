//! Query Methods - model-level entry points
//!
//! Every method starts a fresh [`Query`] over the model; the terminal ones
//! run it right away.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::database::Database;
use crate::error::ModelResult;
use crate::filter::{Filter, Operator};
use crate::model::core_trait::Model;
use crate::model::events::ModelEvent;
use crate::model::instance::ModelInstance;
use crate::query::Query;

/// Trait providing query operations for model collections
#[async_trait]
pub trait QueryMethods: Model + Sized {
    /// Get a query builder for this model
    fn query(db: &Database) -> Query {
        db.query::<Self>()
    }

    /// Query eager loading the given relation paths
    fn with<S: AsRef<str>>(db: &Database, paths: &[S]) -> Query {
        Self::query(db).with(paths)
    }

    /// Query keeping rows with at least one related row along `path`
    fn has(db: &Database, path: &str) -> Query {
        Self::query(db).has(path)
    }

    /// Query keeping rows whose related rows along `path` satisfy `constraint`
    fn where_has<F>(db: &Database, path: &str, constraint: F) -> Query
    where
        F: Fn(Filter) -> Filter + Send + Sync + 'static,
    {
        Self::query(db).where_has(path, constraint)
    }

    /// Query keeping rows whose related row count along `path` satisfies `operator count`
    fn has_count(db: &Database, path: &str, operator: Operator, count: u64) -> Query {
        Self::query(db).has_count(path, operator, count)
    }

    /// Call `listener` after every `event` on a row of this model
    fn on<F>(db: &Database, event: ModelEvent, listener: F)
    where
        F: Fn(&ModelInstance) + Send + Sync + 'static,
    {
        db.on::<Self, F>(event, listener);
    }

    /// Stream every row of this model
    fn iterate(db: &Database) -> BoxStream<'static, ModelResult<ModelInstance>> {
        Self::query(db).iterate()
    }

    async fn all(db: &Database) -> ModelResult<Vec<ModelInstance>> {
        Self::query(db).get().await
    }

    async fn count(db: &Database) -> ModelResult<u64> {
        Self::query(db).count().await
    }

    async fn find(db: &Database, id: &str) -> ModelResult<Option<ModelInstance>> {
        Self::query(db).find(id).await
    }

    async fn find_by<V>(db: &Database, field: &str, value: V) -> ModelResult<Option<ModelInstance>>
    where
        V: Into<Value> + Send,
    {
        Self::query(db).find_by(field, value).await
    }

    async fn find_many(db: &Database, ids: &[&str]) -> ModelResult<Vec<ModelInstance>> {
        Self::query(db).find_many(ids).await
    }

    /// Validate, insert and return the stored model
    async fn create<T: Serialize + Send>(db: &Database, attributes: T) -> ModelResult<ModelInstance> {
        Self::query(db).create(attributes).await
    }

    async fn insert<T: Serialize + Send>(db: &Database, rows: Vec<T>) -> ModelResult<u64> {
        Self::query(db).insert(rows).await
    }

    /// Delete the rows with the given identities
    async fn destroy(db: &Database, ids: &[&str], force: bool) -> ModelResult<u64> {
        Self::query(db)
            .where_in("id", ids.to_vec())
            .delete(force)
            .await
    }
}

impl<M: Model> QueryMethods for M {}
