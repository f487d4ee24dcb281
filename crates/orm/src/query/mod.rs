//! Query Builder - fluent per-model queries
//!
//! A [`Query`] accumulates a filter tree, relation paths to eager load,
//! relation count constraints, ad-hoc joins, ordering, pagination and a
//! trashed scope. Nothing is expanded until a terminal call (see
//! [`execution`]) composes the whole tree into one driver request.
//!
//! Builder calls never fail; malformed input is recorded and reported by the
//! terminal call, so a failed chain never returns a partial result.

pub mod execution;
pub mod related;

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::backends::{Document, OrderDirection, Pipeline, Stage};
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::filter::{Filter, Operator};
use crate::identity::normalize_key;
use crate::model::{ModelDefinition, ModelInstance, ModelRegistry};
use crate::relationships::path::{merge_into, RelationPathNode};
use crate::relationships::FilterFn;

pub use execution::FromDocument;
pub use related::RelatedQuery;

/// Which soft-deleted rows a query sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedScope {
    /// Only rows that are not soft deleted
    #[default]
    Exclude,
    /// Every row
    Include,
    /// Only soft-deleted rows
    Only,
}

/// Deferred `has` / `where_has` constraint
#[derive(Clone)]
pub(crate) struct HasClause {
    pub(crate) segments: Vec<String>,
    pub(crate) constraint: Option<FilterFn>,
    pub(crate) operator: Operator,
    pub(crate) count: u64,
}

/// Query over one model.
///
/// `R` is what rows come back as: hydrated [`ModelInstance`]s by default, or
/// plain documents after [`Query::lean`].
pub struct Query<R = ModelInstance> {
    pub(crate) db: Database,
    pub(crate) definition: Arc<ModelDefinition>,
    pub(crate) filter: Filter,
    pub(crate) relations: Vec<RelationPathNode>,
    pub(crate) has: Vec<HasClause>,
    pub(crate) joins: Vec<Stage>,
    pub(crate) order: Vec<(String, OrderDirection)>,
    pub(crate) skip: Option<u64>,
    pub(crate) limit: Option<u64>,
    pub(crate) projection: Vec<String>,
    pub(crate) trashed: TrashedScope,
    pub(crate) pending: Option<ModelError>,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            definition: Arc::clone(&self.definition),
            filter: self.filter.clone(),
            relations: self.relations.clone(),
            has: self.has.clone(),
            joins: self.joins.clone(),
            order: self.order.clone(),
            skip: self.skip,
            limit: self.limit,
            projection: self.projection.clone(),
            trashed: self.trashed,
            pending: self.pending.clone(),
            _row: PhantomData,
        }
    }
}

impl Query {
    /// New query over `definition`
    pub fn new(db: Database, definition: Arc<ModelDefinition>) -> Self {
        Self {
            db,
            definition,
            filter: Filter::new(),
            relations: Vec::new(),
            has: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            skip: None,
            limit: None,
            projection: Vec::new(),
            trashed: TrashedScope::default(),
            pending: None,
            _row: PhantomData,
        }
    }
}

impl<R> Query<R> {
    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn trashed_scope(&self) -> TrashedScope {
        self.trashed
    }

    /// Return raw documents instead of model instances
    pub fn lean(self) -> Query<Document> {
        Query {
            db: self.db,
            definition: self.definition,
            filter: self.filter,
            relations: self.relations,
            has: self.has,
            joins: self.joins,
            order: self.order,
            skip: self.skip,
            limit: self.limit,
            projection: self.projection,
            trashed: self.trashed,
            pending: self.pending,
            _row: PhantomData,
        }
    }

    fn record(mut self, result: ModelResult<()>) -> Self {
        if let Err(err) = result {
            self.pending.get_or_insert(err);
        }
        self
    }

    fn filtered<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Filter) -> Filter,
    {
        self.filter = build(std::mem::take(&mut self.filter));
        self
    }

    pub fn where_op<T: Into<Value>>(self, field: &str, operator: Operator, value: T) -> Self {
        self.filtered(|f| f.where_op(field, operator, value))
    }

    pub fn or_where_op<T: Into<Value>>(self, field: &str, operator: Operator, value: T) -> Self {
        self.filtered(|f| f.or_where_op(field, operator, value))
    }

    /// WHERE with an operator string; unknown operators fail the terminal call
    pub fn where_str<T: Into<Value>>(self, field: &str, operator: &str, value: T) -> Self {
        match operator.parse::<Operator>() {
            Ok(operator) => self.where_op(field, operator, value),
            Err(err) => self.record(Err(err.into())),
        }
    }

    pub fn or_where_str<T: Into<Value>>(self, field: &str, operator: &str, value: T) -> Self {
        match operator.parse::<Operator>() {
            Ok(operator) => self.or_where_op(field, operator, value),
            Err(err) => self.record(Err(err.into())),
        }
    }

    pub fn where_eq<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.where_eq(field, value))
    }

    pub fn or_where_eq<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.or_where_eq(field, value))
    }

    pub fn where_ne<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.where_ne(field, value))
    }

    pub fn where_gt<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.where_gt(field, value))
    }

    pub fn where_gte<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.where_gte(field, value))
    }

    pub fn where_lt<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.where_lt(field, value))
    }

    pub fn where_lte<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filtered(|f| f.where_lte(field, value))
    }

    pub fn where_in<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        self.filtered(|f| f.where_in(field, values))
    }

    pub fn where_not_in<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        self.filtered(|f| f.where_not_in(field, values))
    }

    pub fn where_between<T: Into<Value>>(self, field: &str, start: T, end: T) -> Self {
        self.filtered(|f| f.where_between(field, start, end))
    }

    pub fn where_not_between<T: Into<Value>>(self, field: &str, start: T, end: T) -> Self {
        self.filtered(|f| f.where_not_between(field, start, end))
    }

    pub fn where_null(self, field: &str) -> Self {
        self.filtered(|f| f.where_null(field))
    }

    pub fn or_where_null(self, field: &str) -> Self {
        self.filtered(|f| f.or_where_null(field))
    }

    pub fn where_not_null(self, field: &str) -> Self {
        self.filtered(|f| f.where_not_null(field))
    }

    pub fn where_like(self, field: &str, pattern: &str) -> Self {
        self.filtered(|f| f.where_like(field, pattern))
    }

    pub fn or_where_like(self, field: &str, pattern: &str) -> Self {
        self.filtered(|f| f.or_where_like(field, pattern))
    }

    pub fn where_not_like(self, field: &str, pattern: &str) -> Self {
        self.filtered(|f| f.where_not_like(field, pattern))
    }

    /// Nested group, ANDed with the current tree
    pub fn where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(Filter) -> Filter,
    {
        self.filtered(|f| f.where_group(build))
    }

    /// Nested group, ORed with the current tree
    pub fn or_where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(Filter) -> Filter,
    {
        self.filtered(|f| f.or_where_group(build))
    }

    pub fn where_filter(self, sub: Filter) -> Self {
        self.filtered(|f| f.where_filter(sub))
    }

    /// Replace the sort order
    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Self {
        self.order = vec![(normalize_key(field), direction)];
        self
    }

    pub fn order_by_desc(self, field: &str) -> Self {
        self.order_by(field, OrderDirection::Desc)
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn offset(self, n: u64) -> Self {
        self.skip(n)
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    /// Fetch only `fields` (dotted paths allowed); the identity is dropped
    /// unless `id` is listed
    pub fn select<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.projection = fields.iter().map(|field| normalize_key(field.as_ref())).collect();
        self
    }

    /// 1-based page of `per_page` rows; page 0 is treated as page 1
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        if page == 0 {
            tracing::warn!("paginate called with page 0 on '{}', using page 1", self.definition.name());
        }
        self.skip(page.saturating_sub(1).saturating_mul(per_page))
            .limit(per_page)
    }

    /// Include soft-deleted rows, here and in eager-loaded relations
    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Include;
        self
    }

    /// Only soft-deleted rows
    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Only;
        self
    }

    /// Eager load relation paths such as `"chats.messages"`
    pub fn with<S: AsRef<str>>(mut self, paths: &[S]) -> Self {
        let owner = self.definition.name().to_string();
        let result = merge_into(&mut self.relations, paths, &owner)
            .and_then(|_| validate_tree(self.db.models(), &self.definition, &self.relations));
        self.record(result)
    }

    /// Keep rows with at least one related row along `path`
    pub fn has(self, path: &str) -> Self {
        self.has_clause(path, None, Operator::Gte, 1)
    }

    /// Keep rows whose related row count along `path` satisfies `operator count`
    pub fn has_count(self, path: &str, operator: Operator, count: u64) -> Self {
        self.has_clause(path, None, operator, count)
    }

    /// Keep rows with at least one related row along `path` matching `constraint`
    pub fn where_has<F>(self, path: &str, constraint: F) -> Self
    where
        F: Fn(Filter) -> Filter + Send + Sync + 'static,
    {
        self.has_clause(path, Some(Arc::new(constraint)), Operator::Gte, 1)
    }

    pub fn where_has_count<F>(self, path: &str, constraint: F, operator: Operator, count: u64) -> Self
    where
        F: Fn(Filter) -> Filter + Send + Sync + 'static,
    {
        self.has_clause(path, Some(Arc::new(constraint)), operator, count)
    }

    fn has_clause(
        mut self,
        path: &str,
        constraint: Option<FilterFn>,
        operator: Operator,
        count: u64,
    ) -> Self {
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(String::is_empty) {
            let err = ModelError::unknown_relation(path, self.definition.name());
            return self.record(Err(err));
        }

        self.has.push(HasClause {
            segments,
            constraint,
            operator,
            count,
        });
        self
    }

    /// Join rows of `collection` matching `on` under `alias`.
    ///
    /// `on` references the current row through [`Filter::where_outer`].
    pub fn join(mut self, collection: &str, on: Filter, alias: &str) -> Self {
        self.joins.push(Stage::Lookup {
            on: on.into_root(),
            pipeline: Pipeline::select_collection(collection),
            alias: alias.to_string(),
        });
        self
    }
}

fn validate_tree(
    models: &ModelRegistry,
    definition: &ModelDefinition,
    nodes: &[RelationPathNode],
) -> ModelResult<()> {
    for node in nodes {
        let relation = definition.require_relation(&node.name)?;
        if !node.children.is_empty() {
            let target = models.get(relation.related())?;
            validate_tree(models, &target, &node.children)?;
        }
    }
    Ok(())
}
