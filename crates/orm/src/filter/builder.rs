//! Filter Builder - accumulates AND/OR predicate trees
//!
//! The root is always a group. Pushing a node with the root's combinator
//! appends it; pushing with the other combinator wraps the current root as
//! the first child of a new group (an empty root simply switches combinator).

use super::types::*;
use crate::error::QueryError;
use crate::identity::{coerce_identity, is_identity_field, normalize_key};
use regex::RegexBuilder;
use serde_json::Value;

/// Backend independent predicate tree
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: FilterNode,
}

impl Filter {
    pub fn new() -> Self {
        Self {
            root: FilterNode::empty_group(Combinator::And),
        }
    }

    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    pub fn into_root(self) -> FilterNode {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn push(&mut self, combinator: Combinator, node: FilterNode) {
        if let FilterNode::Group {
            combinator: current,
            children,
        } = &mut self.root
        {
            if children.is_empty() {
                *current = combinator;
            }

            if *current == combinator {
                children.push(node);
                return;
            }
        }

        let previous = std::mem::replace(&mut self.root, FilterNode::empty_group(combinator));
        self.root = FilterNode::Group {
            combinator,
            children: vec![previous, node],
        };
    }

    fn predicate(field: &str, operator: Operator, value: Value) -> FilterNode {
        let field = normalize_key(field);
        let value = if is_identity_field(&field) {
            coerce_identity(value)
        } else {
            value
        };

        FilterNode::Predicate {
            field,
            operator,
            operand: Operand::Value(value),
        }
    }

    /// Add WHERE condition with an explicit operator
    pub fn where_op<T: Into<Value>>(mut self, field: &str, operator: Operator, value: T) -> Self {
        self.push(Combinator::And, Self::predicate(field, operator, value.into()));
        self
    }

    /// Add OR WHERE condition with an explicit operator
    pub fn or_where_op<T: Into<Value>>(mut self, field: &str, operator: Operator, value: T) -> Self {
        self.push(Combinator::Or, Self::predicate(field, operator, value.into()));
        self
    }

    /// Add WHERE condition with an operator given as a string (`"="`, `"<>"`, `">="`, ...)
    pub fn where_str<T: Into<Value>>(
        self,
        field: &str,
        operator: &str,
        value: T,
    ) -> Result<Self, QueryError> {
        Ok(self.where_op(field, operator.parse()?, value))
    }

    /// Add OR WHERE condition with an operator given as a string
    pub fn or_where_str<T: Into<Value>>(
        self,
        field: &str,
        operator: &str,
        value: T,
    ) -> Result<Self, QueryError> {
        Ok(self.or_where_op(field, operator.parse()?, value))
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.where_op(field, Operator::Eq, value)
    }

    /// Add OR WHERE condition with equality
    pub fn or_where_eq<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.or_where_op(field, Operator::Eq, value)
    }

    pub fn where_ne<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.where_op(field, Operator::Ne, value)
    }

    pub fn where_gt<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.where_op(field, Operator::Gt, value)
    }

    pub fn where_gte<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.where_op(field, Operator::Gte, value)
    }

    pub fn where_lt<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.where_op(field, Operator::Lt, value)
    }

    pub fn where_lte<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.where_op(field, Operator::Lte, value)
    }

    /// Add WHERE IN condition
    pub fn where_in<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.where_op(field, Operator::In, Value::Array(values))
    }

    /// Add WHERE NOT IN condition
    pub fn where_not_in<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.where_op(field, Operator::NotIn, Value::Array(values))
    }

    /// `field >= start AND field <= end`
    pub fn where_between<T: Into<Value>>(self, field: &str, start: T, end: T) -> Self {
        self.where_gte(field, start).where_lte(field, end)
    }

    /// `field < start OR field > end`, added as one group
    pub fn where_not_between<T: Into<Value>>(self, field: &str, start: T, end: T) -> Self {
        let outside = Filter::new()
            .or_where_op(field, Operator::Lt, start)
            .or_where_op(field, Operator::Gt, end);
        self.where_filter(outside)
    }

    /// Matches missing or null values
    pub fn where_null(self, field: &str) -> Self {
        self.where_op(field, Operator::Eq, Value::Null)
    }

    pub fn or_where_null(self, field: &str) -> Self {
        self.or_where_op(field, Operator::Eq, Value::Null)
    }

    pub fn where_not_null(self, field: &str) -> Self {
        self.where_op(field, Operator::Ne, Value::Null)
    }

    /// Case-insensitive regular expression match
    pub fn where_like(self, field: &str, pattern: &str) -> Self {
        self.where_op(field, Operator::Like, pattern)
    }

    pub fn or_where_like(self, field: &str, pattern: &str) -> Self {
        self.or_where_op(field, Operator::Like, pattern)
    }

    pub fn where_not_like(self, field: &str, pattern: &str) -> Self {
        self.where_op(field, Operator::NotLike, pattern)
    }

    /// Nested group built on an isolated filter, ANDed with the current tree
    pub fn where_group<F>(self, build: F) -> Self
    where
        F: FnOnce(Filter) -> Filter,
    {
        self.where_filter(build(Filter::new()))
    }

    /// Nested group built on an isolated filter, ORed with the current tree
    pub fn or_where_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Filter) -> Filter,
    {
        let sub = build(Filter::new());
        if !sub.is_empty() {
            self.push(Combinator::Or, sub.root);
        }
        self
    }

    /// AND an already built filter as one group; empty filters are a no-op
    pub fn where_filter(mut self, sub: Filter) -> Self {
        if !sub.is_empty() {
            self.push(Combinator::And, sub.root);
        }
        self
    }

    /// Join predicate against a field of the enclosing row
    pub fn where_outer(mut self, field: &str, operator: Operator, outer_field: &str) -> Self {
        self.push(
            Combinator::And,
            FilterNode::Predicate {
                field: normalize_key(field),
                operator,
                operand: Operand::Outer(normalize_key(outer_field)),
            },
        );
        self
    }

    /// Reject like patterns that are not valid regular expressions
    pub fn check_patterns(&self) -> Result<(), QueryError> {
        for (_, operator, operand) in self.root.predicates() {
            if !matches!(operator, Operator::Like | Operator::NotLike) {
                continue;
            }

            if let Operand::Value(Value::String(pattern)) = operand {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| QueryError::InvalidPattern(e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}
