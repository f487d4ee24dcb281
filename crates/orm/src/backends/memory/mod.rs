//! In-memory Storage Driver
//!
//! Executes composed pipelines (matches, nested lookups with outer references,
//! flatten, count, unset, project, sort, skip, limit) against collections held in
//! memory. Every public driver call counts as one request.

pub mod eval;

use super::core::*;
use super::pipeline::Pipeline;
use crate::error::ModelResult;
use crate::filter::FilterNode;
use crate::identity::{ObjectId, STORE_KEY};
use async_trait::async_trait;
use eval::{compare_values, Evaluator};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage driver
#[derive(Debug, Default)]
pub struct MemoryDriver {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    requests: AtomicU64,
}

impl MemoryDriver {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of driver requests served so far
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Raw contents of a collection, in store representation
    pub async fn dump(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn record_request(&self, operation: &str, collection: &str) {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("memory driver request #{}: {} on '{}'", n, operation, collection);
    }

    async fn run(&self, pipeline: &Pipeline) -> ModelResult<Vec<Document>> {
        let collections = self.collections.read().await;
        Evaluator::new(&collections).run(pipeline, None)
    }

    async fn modify<F>(&self, collection: &str, filter: &FilterNode, mut change: F) -> ModelResult<u64>
    where
        F: FnMut(&mut Document),
    {
        let mut collections = self.collections.write().await;
        let matched = {
            let mut evaluator = Evaluator::new(&collections);
            evaluator.filter_rows(collection, filter)?
        };
        if matched.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Value> = matched
            .iter()
            .filter_map(|row| row.get(STORE_KEY).cloned())
            .collect();

        let mut affected = 0;
        if let Some(rows) = collections.get_mut(collection) {
            for row in rows.iter_mut() {
                if row.get(STORE_KEY).map_or(false, |id| ids.contains(id)) {
                    change(row);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, pipeline: &Pipeline) -> ModelResult<Vec<Document>> {
        self.record_request("execute", pipeline.collection());
        self.run(pipeline).await
    }

    async fn cursor(&self, pipeline: &Pipeline) -> ModelResult<RowStream> {
        self.record_request("cursor", pipeline.collection());
        let rows = self.run(pipeline).await?;
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn count(&self, pipeline: &Pipeline) -> ModelResult<u64> {
        self.record_request("count", pipeline.collection());
        Ok(self.run(pipeline).await?.len() as u64)
    }

    async fn aggregate(
        &self,
        pipeline: &Pipeline,
        field: &str,
        aggregate: Aggregate,
    ) -> ModelResult<Option<Value>> {
        self.record_request(&aggregate.to_string(), pipeline.collection());
        let rows = self.run(pipeline).await?;
        let values: Vec<&Value> = rows
            .iter()
            .filter_map(|row| get_path(row, field))
            .filter(|value| !value.is_null())
            .collect();

        let result = match aggregate {
            Aggregate::Max => values
                .into_iter()
                .max_by(|a, b| compare_values(a, b))
                .cloned(),
            Aggregate::Min => values
                .into_iter()
                .min_by(|a, b| compare_values(a, b))
                .cloned(),
            Aggregate::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if numbers.is_empty() {
                    None
                } else {
                    let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                    serde_json::Number::from_f64(avg).map(Value::Number)
                }
            }
        };
        Ok(result)
    }

    async fn value(&self, pipeline: &Pipeline, field: &str) -> ModelResult<Vec<Value>> {
        self.record_request("value", pipeline.collection());
        let rows = self.run(pipeline).await?;
        Ok(rows
            .iter()
            .map(|row| get_path(row, field).cloned().unwrap_or(Value::Null))
            .collect())
    }

    async fn insert(&self, collection: &str, documents: Vec<Document>) -> ModelResult<u64> {
        self.record_request("insert", collection);
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.to_string()).or_default();

        let count = documents.len() as u64;
        for mut document in documents {
            document
                .entry(STORE_KEY.to_string())
                .or_insert_with(|| ObjectId::new().to_value());
            rows.push(document);
        }
        Ok(count)
    }

    async fn insert_get_id(&self, collection: &str, mut document: Document) -> ModelResult<Value> {
        self.record_request("insert_get_id", collection);
        let id = document
            .entry(STORE_KEY.to_string())
            .or_insert_with(|| ObjectId::new().to_value())
            .clone();

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn update(&self, collection: &str, filter: &FilterNode, update: Document) -> ModelResult<u64> {
        self.record_request("update", collection);
        self.modify(collection, filter, |row| {
            for (field, value) in &update {
                set_path(row, field, value.clone());
            }
        })
        .await
    }

    async fn increment(
        &self,
        collection: &str,
        filter: &FilterNode,
        field: &str,
        amount: f64,
    ) -> ModelResult<u64> {
        self.record_request("increment", collection);
        self.modify(collection, filter, |row| {
            let current = get_path(row, field);
            let next = match current.and_then(Value::as_i64) {
                Some(n) if amount.fract() == 0.0 => Value::from(n + amount as i64),
                _ => {
                    let base = current.and_then(Value::as_f64).unwrap_or(0.0);
                    serde_json::Number::from_f64(base + amount)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            };
            set_path(row, field, next);
        })
        .await
    }

    async fn delete(&self, collection: &str, filter: &FilterNode) -> ModelResult<u64> {
        self.record_request("delete", collection);
        let mut collections = self.collections.write().await;
        let matched = Evaluator::new(&collections).filter_rows(collection, filter)?;
        let ids: Vec<Value> = matched
            .iter()
            .filter_map(|row| row.get(STORE_KEY).cloned())
            .collect();

        let mut removed = 0;
        if let Some(rows) = collections.get_mut(collection) {
            let before = rows.len();
            rows.retain(|row| !row.get(STORE_KEY).map_or(false, |id| ids.contains(id)));
            removed = (before - rows.len()) as u64;
        }
        Ok(removed)
    }
}

/// Factory used by the connection registry for the built-in `memory` driver
pub fn memory_driver() -> DriverHandle {
    Arc::new(MemoryDriver::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_identity() {
        let driver = MemoryDriver::new();
        let id = driver
            .insert_get_id("users", doc(json!({ "name": "a" })))
            .await
            .unwrap();

        assert!(ObjectId::from_value(&id).is_some());
        assert_eq!(driver.dump("users").await[0]["_id"], id);
        assert_eq!(driver.request_count(), 1);
    }

    #[tokio::test]
    async fn test_update_increment_delete() {
        let driver = MemoryDriver::new();
        driver
            .insert(
                "items",
                vec![doc(json!({ "n": 1, "tag": "a" })), doc(json!({ "n": 5, "tag": "b" }))],
            )
            .await
            .unwrap();

        let only_a = Filter::new().where_eq("tag", "a").into_root();
        assert_eq!(driver.update("items", &only_a, doc(json!({ "meta.seen": true }))).await.unwrap(), 1);
        assert_eq!(driver.increment("items", &only_a, "n", 2.0).await.unwrap(), 1);

        let rows = driver.dump("items").await;
        assert_eq!(rows[0]["n"], json!(3));
        assert_eq!(rows[0]["meta"], json!({ "seen": true }));

        assert_eq!(driver.delete("items", &only_a).await.unwrap(), 1);
        assert_eq!(driver.dump("items").await.len(), 1);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let driver = MemoryDriver::new();
        driver
            .insert(
                "items",
                vec![doc(json!({ "n": 1 })), doc(json!({ "n": 4 })), doc(json!({}))],
            )
            .await
            .unwrap();

        let all = Pipeline::select_collection("items");
        assert_eq!(driver.max(&all, "n").await.unwrap(), Some(json!(4)));
        assert_eq!(driver.min(&all, "n").await.unwrap(), Some(json!(1)));
        assert_eq!(driver.avg(&all, "n").await.unwrap(), Some(json!(2.5)));
        assert_eq!(driver.max(&all, "missing").await.unwrap(), None);
        assert_eq!(
            driver.value(&all, "n").await.unwrap(),
            vec![json!(1), json!(4), Value::Null]
        );
    }

    #[tokio::test]
    async fn test_project_and_cursor() {
        let driver = MemoryDriver::new();
        driver
            .insert(
                "items",
                vec![
                    doc(json!({ "n": 1, "meta": { "tag": "a", "seen": true } })),
                    doc(json!({ "n": 2 })),
                ],
            )
            .await
            .unwrap();

        let projected = Pipeline::select_collection("items").project(vec!["meta.tag".into()]);
        let mut rows = driver.cursor(&projected).await.unwrap();

        let first = rows.next().await.unwrap().unwrap();
        assert_eq!(Value::Object(first), json!({ "meta": { "tag": "a" } }));
        assert_eq!(Value::Object(rows.next().await.unwrap().unwrap()), json!({}));
        assert!(rows.next().await.is_none());
        assert_eq!(driver.request_count(), 2);
    }

    #[tokio::test]
    async fn test_nested_lookup_single_request() {
        let driver = MemoryDriver::new();
        let user = ObjectId::new();
        let chat = ObjectId::new();
        driver
            .insert("users", vec![doc(json!({ "_id": user.to_value() }))])
            .await
            .unwrap();
        driver
            .insert("chats", vec![doc(json!({ "_id": chat.to_value(), "user_id": user.to_value() }))])
            .await
            .unwrap();
        driver
            .insert(
                "messages",
                vec![
                    doc(json!({ "chat_id": chat.to_value(), "message": "1" })),
                    doc(json!({ "chat_id": chat.to_value(), "message": "2" })),
                ],
            )
            .await
            .unwrap();
        let before = driver.request_count();

        let messages = Pipeline::select_collection("messages");
        let chats = Pipeline::select_collection("chats").join(
            Filter::new().where_outer("chat_id", crate::filter::Operator::Eq, "_id"),
            messages,
            "messages",
        );
        let users = Pipeline::select_collection("users").join(
            Filter::new().where_outer("user_id", crate::filter::Operator::Eq, "_id"),
            chats,
            "chats",
        );

        let rows = driver.execute(&users).await.unwrap();
        assert_eq!(driver.request_count() - before, 1);
        assert_eq!(rows[0]["chats"][0]["messages"].as_array().unwrap().len(), 2);
    }
}
