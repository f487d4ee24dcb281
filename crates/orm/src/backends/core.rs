//! Core Storage Driver Traits
//!
//! The driver is the only component that talks to the store. The core hands it
//! composed [`Pipeline`]s and store-shaped documents (identity under `_id` in
//! its native form) and gets store-shaped documents back.

use super::pipeline::Pipeline;
use crate::error::{ModelError, ModelResult};
use crate::filter::FilterNode;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A stored document
pub type Document = Map<String, Value>;

/// Read a dotted path out of a document
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a dotted path, creating intermediate objects
pub fn set_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !slot.is_object() {
                *slot = Value::Object(Document::new());
            }
            if let Value::Object(child) = slot {
                set_path(child, rest, value);
            }
        }
    }
}

/// Serialize a value into a document; anything but an object is rejected
pub fn to_document<T: Serialize>(value: T) -> ModelResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(document) => Ok(document),
        other => Err(ModelError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Single-value aggregates over a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Max,
    Min,
    Avg,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Max => write!(f, "max"),
            Aggregate::Min => write!(f, "min"),
            Aggregate::Avg => write!(f, "avg"),
        }
    }
}

/// Storage driver contract
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Driver kind, for logging
    fn name(&self) -> &str;

    /// Check the store is reachable
    async fn ping(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Run a pipeline and return the resulting rows
    async fn execute(&self, pipeline: &Pipeline) -> ModelResult<Vec<Document>>;

    /// Run a pipeline and stream its rows
    async fn cursor(&self, pipeline: &Pipeline) -> ModelResult<RowStream> {
        let rows = self.execute(pipeline).await?;
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    /// Number of rows a pipeline produces
    async fn count(&self, pipeline: &Pipeline) -> ModelResult<u64>;

    /// Whether a pipeline produces at least one row
    async fn exists(&self, pipeline: &Pipeline) -> ModelResult<bool> {
        Ok(self.count(pipeline).await? > 0)
    }

    /// Aggregate `field` over the pipeline's rows; `None` when nothing qualifies
    async fn aggregate(
        &self,
        pipeline: &Pipeline,
        field: &str,
        aggregate: Aggregate,
    ) -> ModelResult<Option<Value>>;

    async fn max(&self, pipeline: &Pipeline, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(pipeline, field, Aggregate::Max).await
    }

    async fn min(&self, pipeline: &Pipeline, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(pipeline, field, Aggregate::Min).await
    }

    async fn avg(&self, pipeline: &Pipeline, field: &str) -> ModelResult<Option<Value>> {
        self.aggregate(pipeline, field, Aggregate::Avg).await
    }

    /// Values of `field` for every row, missing values as null
    async fn value(&self, pipeline: &Pipeline, field: &str) -> ModelResult<Vec<Value>>;

    /// Insert documents, returning how many were written
    async fn insert(&self, collection: &str, documents: Vec<Document>) -> ModelResult<u64>;

    /// Insert one document and return its identity
    async fn insert_get_id(&self, collection: &str, document: Document) -> ModelResult<Value>;

    /// Set the given fields on every matching row
    async fn update(&self, collection: &str, filter: &FilterNode, update: Document) -> ModelResult<u64>;

    /// Add `amount` to a numeric field on every matching row
    async fn increment(
        &self,
        collection: &str,
        filter: &FilterNode,
        field: &str,
        amount: f64,
    ) -> ModelResult<u64>;

    /// Remove every matching row
    async fn delete(&self, collection: &str, filter: &FilterNode) -> ModelResult<u64>;
}

/// Shared driver handle
pub type DriverHandle = Arc<dyn StorageDriver>;

/// Rows of a pipeline, produced one at a time
pub type RowStream = BoxStream<'static, ModelResult<Document>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_path_creates_objects() {
        let mut document = Document::new();
        set_path(&mut document, "name.first", json!("Ardalan"));
        assert_eq!(Value::Object(document.clone()), json!({ "name": { "first": "Ardalan" } }));
        assert_eq!(get_path(&document, "name.first"), Some(&json!("Ardalan")));
        assert_eq!(get_path(&document, "name.last"), None);
    }

    #[test]
    fn test_to_document_rejects_non_objects() {
        assert_eq!(to_document(json!({ "a": 1 })).unwrap().len(), 1);
        assert!(matches!(to_document(json!([1, 2])), Err(ModelError::Serialization(_))));
    }
}
