//! Pipeline - the request handle a storage driver executes
//!
//! A pipeline names a collection and lists stages. Relation expansion
//! appends lookups whose sub-pipelines may nest further lookups, so an
//! arbitrarily deep eager load is still a single request.

use crate::filter::{Filter, FilterNode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl std::str::FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            _ => Err(format!("Unsupported order direction: {}", s)),
        }
    }
}

/// One step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Keep rows matching the filter
    Match(FilterNode),
    /// Attach the rows of a sub-pipeline matching `on` as an array under `alias`.
    /// `on` and the sub-pipeline's match stages may reference the current row
    /// through outer operands.
    Lookup {
        on: FilterNode,
        pipeline: Pipeline,
        alias: String,
    },
    /// Replace an array field with its first element, or null
    Flatten { field: String },
    /// Store the length of the array at `field` under `into`
    Count { field: String, into: String },
    /// Remove fields from every row
    Unset(Vec<String>),
    /// Keep only the given (dotted) fields of every row
    Project(Vec<String>),
    Sort(Vec<(String, OrderDirection)>),
    Skip(u64),
    Limit(u64),
}

/// A composed request against one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    collection: String,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Start a pipeline over `collection`
    pub fn select_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            stages: Vec::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn extend(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Add a match stage; empty filters add nothing
    pub fn apply_filter(self, filter: Filter) -> Self {
        if filter.is_empty() {
            return self;
        }
        self.push(Stage::Match(filter.into_root()))
    }

    /// Join the rows of `pipeline` matching `on` under `alias`
    pub fn join(self, on: Filter, pipeline: Pipeline, alias: impl Into<String>) -> Self {
        self.push(Stage::Lookup {
            on: on.into_root(),
            pipeline,
            alias: alias.into(),
        })
    }

    pub fn sort(self, keys: Vec<(String, OrderDirection)>) -> Self {
        if keys.is_empty() {
            return self;
        }
        self.push(Stage::Sort(keys))
    }

    /// Keep only `fields`; an empty list adds nothing
    pub fn project(self, fields: Vec<String>) -> Self {
        if fields.is_empty() {
            return self;
        }
        self.push(Stage::Project(fields))
    }

    pub fn skip(self, n: u64) -> Self {
        self.push(Stage::Skip(n))
    }

    pub fn limit(self, n: u64) -> Self {
        self.push(Stage::Limit(n))
    }

    /// Number of lookups, counting nested ones
    pub fn lookup_count(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| match stage {
                Stage::Lookup { pipeline, .. } => 1 + pipeline.lookup_count(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_adds_no_stage() {
        let pipeline = Pipeline::select_collection("users").apply_filter(Filter::new());
        assert!(pipeline.stages().is_empty());
    }

    #[test]
    fn test_lookup_count_includes_nested() {
        let messages = Pipeline::select_collection("messages");
        let chats = Pipeline::select_collection("chats").join(Filter::new(), messages, "messages");
        let users = Pipeline::select_collection("users")
            .join(Filter::new(), chats, "chats")
            .limit(10);

        assert_eq!(users.lookup_count(), 2);
        assert_eq!(users.stages().len(), 2);
    }

    #[test]
    fn test_order_direction_parsing() {
        assert_eq!("DESC".parse::<OrderDirection>().unwrap(), OrderDirection::Desc);
        assert!("sideways".parse::<OrderDirection>().is_err());
    }
}
