//! Query Execution - composing and running queries
//!
//! Composition order: the filter tree with the trashed scope, ad-hoc joins,
//! relation count constraints, sort/skip/limit, the eager-load lookups and
//! finally the projection. The result is one pipeline and one driver request.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use futures::TryFutureExt;
use serde::Serialize;
use serde_json::Value;

use super::{Query, TrashedScope};
use crate::backends::{to_document, Aggregate, Document, DriverHandle, Pipeline};
use crate::database::Database;
use crate::error::{ModelError, ModelResult, QueryError};
use crate::filter::Filter;
use crate::identity::{normalize_key, prepare_to_read, prepare_to_store, reveal_identity};
use crate::model::{ModelDefinition, ModelEvent, ModelInstance, DELETED_AT};
use crate::relationships::count_constraint;
use elif_validation::types::date;

/// Row types a query can produce
pub trait FromDocument: Sized + Send {
    /// Build a row from a model-form document (identity as `id`, hex strings)
    fn from_document(db: &Database, definition: &Arc<ModelDefinition>, document: Document) -> Self;
}

impl FromDocument for Document {
    fn from_document(_: &Database, _: &Arc<ModelDefinition>, document: Document) -> Self {
        document
    }
}

impl FromDocument for ModelInstance {
    fn from_document(db: &Database, definition: &Arc<ModelDefinition>, document: Document) -> Self {
        ModelInstance::hydrate(db.clone(), Arc::clone(definition), document)
    }
}

impl<R> Query<R> {
    fn driver(&self) -> ModelResult<DriverHandle> {
        self.db.driver(self.definition.connection_name())
    }

    fn collection(&self) -> &str {
        self.definition.collection_name()
    }

    /// Accumulated filter plus the trashed scope, checked for malformed input
    pub(crate) fn scoped_filter(&self) -> ModelResult<Filter> {
        if let Some(err) = &self.pending {
            return Err(err.clone());
        }

        let mut filter = self.filter.clone();
        if self.definition.uses_soft_deletes() {
            filter = match self.trashed {
                TrashedScope::Exclude => filter.where_null(DELETED_AT),
                TrashedScope::Include => filter,
                TrashedScope::Only => filter.where_not_null(DELETED_AT),
            };
        }

        filter.check_patterns()?;
        Ok(filter)
    }

    /// Compose the request; eager-load lookups only when `expand` is set
    pub fn to_pipeline(&self, expand: bool) -> ModelResult<Pipeline> {
        let models = self.db.models();
        let with_trashed = self.trashed == TrashedScope::Include;

        let mut pipeline = Pipeline::select_collection(self.collection())
            .apply_filter(self.scoped_filter()?)
            .extend(self.joins.iter().cloned());

        for clause in &self.has {
            let (first, rest) = clause.segments.split_first().ok_or_else(|| {
                ModelError::unknown_relation(String::new(), self.definition.name())
            })?;
            let relation = self.definition.require_relation(first)?;

            pipeline = pipeline
                .extend(relation.load_count(models, rest, with_trashed, clause.constraint.as_ref())?)
                .extend(count_constraint(clause.operator, clause.count)?);
        }

        pipeline = pipeline.sort(self.order.clone());
        if let Some(skip) = self.skip {
            pipeline = pipeline.skip(skip);
        }
        if let Some(limit) = self.limit {
            pipeline = pipeline.limit(limit);
        }

        if expand {
            for node in &self.relations {
                let relation = self.definition.require_relation(&node.name)?;
                pipeline = pipeline.extend(relation.load(models, &node.children, with_trashed, None)?);
            }
            pipeline = pipeline.project(self.projection.clone());
        }

        Ok(pipeline)
    }

    fn log(&self, operation: &str, pipeline: &Pipeline) {
        tracing::debug!(
            "{} on '{}' ({} stages, {} lookups)",
            operation,
            pipeline.collection(),
            pipeline.stages().len(),
            pipeline.lookup_count()
        );
    }

    pub async fn count(self) -> ModelResult<u64> {
        let pipeline = self.to_pipeline(false)?;
        self.log("count", &pipeline);
        self.driver()?.count(&pipeline).await
    }

    pub async fn exists(self) -> ModelResult<bool> {
        let pipeline = self.to_pipeline(false)?;
        self.log("exists", &pipeline);
        self.driver()?.exists(&pipeline).await
    }

    /// Values of `field` for every matching row
    pub async fn value(self, field: &str) -> ModelResult<Vec<Value>> {
        let pipeline = self.to_pipeline(false)?;
        self.log("value", &pipeline);
        let values = self.driver()?.value(&pipeline, &normalize_key(field)).await?;
        Ok(values.into_iter().map(reveal_identity).collect())
    }

    pub async fn pluck(self, field: &str) -> ModelResult<Vec<Value>> {
        self.value(field).await
    }

    async fn aggregate(self, field: &str, aggregate: Aggregate) -> ModelResult<Option<Value>> {
        let pipeline = self.to_pipeline(false)?;
        self.log(&aggregate.to_string(), &pipeline);
        let value = self
            .driver()?
            .aggregate(&pipeline, &normalize_key(field), aggregate)
            .await?;
        Ok(value.map(reveal_identity))
    }

    pub async fn max(self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(field, Aggregate::Max).await
    }

    pub async fn min(self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(field, Aggregate::Min).await
    }

    pub async fn avg(self, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(field, Aggregate::Avg).await
    }

    /// Validate and insert rows, returning how many were written
    pub async fn insert<T: Serialize>(self, rows: Vec<T>) -> ModelResult<u64> {
        let rows = rows.into_iter().map(to_document).collect::<ModelResult<Vec<_>>>()?;
        self.insert_documents(rows, &Document::new()).await
    }

    pub(crate) async fn insert_documents(self, rows: Vec<Document>, pinned: &Document) -> ModelResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut validated = self.definition.validate(row, false)?;
            validated.extend(pinned.clone());
            documents.push(prepare_to_store(validated));
        }

        tracing::debug!("insert {} rows into '{}'", documents.len(), self.collection());
        self.driver()?.insert(self.collection(), documents).await
    }

    /// Validate and insert one row, returning its identity
    pub async fn insert_get_id<T: Serialize>(self, attributes: T) -> ModelResult<Value> {
        let document = to_document(attributes)?;
        let validated = self.definition.validate(&document, false)?;
        self.write_insert(validated).await
    }

    /// Insert an already validated model-form document
    pub(crate) async fn write_insert(&self, document: Document) -> ModelResult<Value> {
        tracing::debug!("insert one row into '{}'", self.collection());
        let id = self
            .driver()?
            .insert_get_id(self.collection(), prepare_to_store(document))
            .await?;
        Ok(reveal_identity(id))
    }

    /// Validated update of every matching row
    pub async fn update<T: Serialize>(self, attributes: T) -> ModelResult<u64> {
        let document = to_document(attributes)?;
        let mut validated = self.definition.validate(&document, true)?;
        validated.remove("id");
        self.write_update(validated).await
    }

    /// Unvalidated update of every matching row
    pub(crate) async fn write_update(&self, document: Document) -> ModelResult<u64> {
        let filter = self.scoped_filter()?;
        tracing::debug!("update {} fields on '{}'", document.len(), self.collection());
        self.driver()?
            .update(self.collection(), filter.root(), prepare_to_store(document))
            .await
    }

    pub async fn increment(self, field: &str, amount: f64) -> ModelResult<u64> {
        let filter = self.scoped_filter()?;
        tracing::debug!("increment '{}' by {} on '{}'", field, amount, self.collection());
        self.driver()?
            .increment(self.collection(), filter.root(), &normalize_key(field), amount)
            .await
    }

    /// Delete matching rows; soft-delete models are stamped unless `force`.
    ///
    /// A forced delete also reaches rows that are already trashed.
    pub async fn delete(mut self, force: bool) -> ModelResult<u64> {
        if self.definition.uses_soft_deletes() && !force {
            let mut stamp = Document::new();
            stamp.insert(DELETED_AT.to_string(), date::now_value());
            return self.write_update(stamp).await;
        }

        if self.trashed == TrashedScope::Exclude {
            self.trashed = TrashedScope::Include;
        }

        let filter = self.scoped_filter()?;
        tracing::debug!("delete from '{}'", self.collection());
        self.driver()?.delete(self.collection(), filter.root()).await
    }

    /// Clear the deletion stamp of matching soft-deleted rows
    pub async fn restore(mut self) -> ModelResult<u64> {
        if !self.definition.uses_soft_deletes() {
            return Ok(0);
        }

        self.trashed = TrashedScope::Only;
        let mut clear = Document::new();
        clear.insert(DELETED_AT.to_string(), Value::Null);
        self.write_update(clear).await
    }
}

impl<R: FromDocument> Query<R> {
    /// Run the query and return every row
    pub async fn get(self) -> ModelResult<Vec<R>> {
        let pipeline = self.to_pipeline(true)?;
        self.log("get", &pipeline);

        let rows = self.driver()?.execute(&pipeline).await?;
        Ok(rows
            .into_iter()
            .map(|row| R::from_document(&self.db, &self.definition, prepare_to_read(row)))
            .collect())
    }

    /// Stream the rows one at a time instead of collecting them
    pub fn iterate(self) -> BoxStream<'static, ModelResult<R>>
    where
        R: 'static,
    {
        let rows = async move {
            let pipeline = self.to_pipeline(true)?;
            self.log("iterate", &pipeline);
            let cursor = self.driver()?.cursor(&pipeline).await?;

            let (db, definition) = (self.db, self.definition);
            Ok::<_, ModelError>(
                cursor.map_ok(move |row| R::from_document(&db, &definition, prepare_to_read(row))),
            )
        };
        rows.try_flatten_stream().boxed()
    }

    pub async fn first(self) -> ModelResult<Option<R>> {
        Ok(self.limit(1).get().await?.into_iter().next())
    }

    pub async fn find(self, id: &str) -> ModelResult<Option<R>> {
        self.where_eq("id", id).first().await
    }

    /// First row whose `field` equals `value`, or is one of `value` when it is an array
    pub async fn find_by(self, field: &str, value: impl Into<Value>) -> ModelResult<Option<R>> {
        match value.into() {
            Value::Array(values) => self.where_in(field, values).first().await,
            value => self.where_eq(field, value).first().await,
        }
    }

    pub async fn find_many(self, ids: &[&str]) -> ModelResult<Vec<R>> {
        self.where_in("id", ids.to_vec()).get().await
    }

    /// Validate, insert and read back the stored row
    pub async fn create<T: Serialize>(self, attributes: T) -> ModelResult<R> {
        self.create_with(to_document(attributes)?, &Document::new()).await
    }

    pub(crate) async fn create_with(self, attributes: Document, pinned: &Document) -> ModelResult<R> {
        let mut validated = self.definition.validate(&attributes, false)?;
        validated.extend(pinned.clone());
        let id = self.write_insert(validated).await?;

        let id = id
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| QueryError::UnsupportedOperation(format!("non-string identity {}", id)))?;

        let mut fetch = self.clone().lean();
        fetch.filter = Filter::new();
        fetch.has.clear();
        fetch.joins.clear();
        fetch.order.clear();
        fetch.projection.clear();
        fetch.skip = None;
        fetch.limit = None;
        let document = fetch
            .with_trashed()
            .find(&id)
            .await?
            .ok_or_else(|| ModelError::NotFound(self.collection().to_string()))?;

        if self.db.events().has_listeners(self.definition.name(), ModelEvent::Created) {
            let created = ModelInstance::hydrate(self.db.clone(), Arc::clone(&self.definition), document.clone());
            self.db.emit(ModelEvent::Created, &created);
        }
        Ok(R::from_document(&self.db, &self.definition, document))
    }
}
