//! Filter and pipeline evaluation over in-memory documents

use crate::backends::core::{get_path, set_path, Document};
use crate::backends::pipeline::{OrderDirection, Pipeline, Stage};
use crate::error::{ModelResult, QueryError};
use crate::filter::{Combinator, FilterNode, Operand, Operator};
use crate::identity::ObjectId;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

fn type_rank(value: &Value) -> u8 {
    if ObjectId::from_value(value).is_some() {
        return 6;
    }

    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 7,
    }
}

/// Total order used for sorting: null < numbers < strings < objects < arrays < ids < booleans
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    let (left_rank, right_rank) = (type_rank(left), type_rank(right));
    if left_rank != right_rank {
        return left_rank.cmp(&right_rank);
    }

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()),
        _ => match (ObjectId::from_value(left), ObjectId::from_value(right)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => left.to_string().cmp(&right.to_string()),
        },
    }
}

/// Equality with numeric widening (`1 == 1.0`)
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

/// Field equality: arrays match when they contain the operand
fn field_equals(field: Option<&Value>, operand: &Value) -> bool {
    match (field, operand) {
        (None, Value::Null) | (Some(Value::Null), Value::Null) => true,
        (None, _) => false,
        (Some(Value::Array(items)), operand) if !operand.is_array() => {
            items.iter().any(|item| values_equal(item, operand))
        }
        (Some(value), operand) => values_equal(value, operand),
    }
}

fn comparable(left: &Value, right: &Value) -> bool {
    let rank = type_rank(left);
    rank == type_rank(right) && matches!(rank, 1 | 2 | 6)
}

/// Compiled like patterns, shared across the rows of one request
#[derive(Default)]
pub struct PatternCache {
    patterns: HashMap<String, regex::Regex>,
}

impl PatternCache {
    fn is_match(&mut self, pattern: &str, text: &str) -> ModelResult<bool> {
        if !self.patterns.contains_key(pattern) {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| QueryError::InvalidPattern(e.to_string()))?;
            self.patterns.insert(pattern.to_string(), regex);
        }

        Ok(self
            .patterns
            .get(pattern)
            .map_or(false, |regex| regex.is_match(text)))
    }
}

/// Evaluate a filter tree against `row`, resolving outer operands against `outer`
pub fn matches(
    node: &FilterNode,
    row: &Document,
    outer: Option<&Document>,
    patterns: &mut PatternCache,
) -> ModelResult<bool> {
    match node {
        FilterNode::Group {
            combinator,
            children,
        } => {
            for child in children {
                let hit = matches(child, row, outer, patterns)?;
                match combinator {
                    Combinator::And if !hit => return Ok(false),
                    Combinator::Or if hit => return Ok(true),
                    _ => {}
                }
            }
            Ok(children.is_empty() || *combinator == Combinator::And)
        }
        FilterNode::Predicate {
            field,
            operator,
            operand,
        } => {
            let operand = match operand {
                Operand::Value(value) => value.clone(),
                Operand::Outer(path) => outer
                    .and_then(|outer| get_path(outer, path))
                    .cloned()
                    .unwrap_or(Value::Null),
            };
            let value = get_path(row, field);

            let hit = match operator {
                Operator::Eq => field_equals(value, &operand),
                Operator::Ne => !field_equals(value, &operand),
                Operator::In => operand
                    .as_array()
                    .map_or(false, |options| options.iter().any(|o| field_equals(value, o))),
                Operator::NotIn => !operand
                    .as_array()
                    .map_or(false, |options| options.iter().any(|o| field_equals(value, o))),
                Operator::Like | Operator::NotLike => {
                    let found = match (value.and_then(Value::as_str), operand.as_str()) {
                        (Some(text), Some(pattern)) => patterns.is_match(pattern, text)?,
                        _ => false,
                    };
                    found == (*operator == Operator::Like)
                }
                Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => match value {
                    Some(value) if comparable(value, &operand) => {
                        operator.compare(compare_values(value, &operand), Ordering::Equal)
                    }
                    _ => false,
                },
            };
            Ok(hit)
        }
    }
}

/// Pipeline runner over a snapshot of the collections
pub struct Evaluator<'a> {
    collections: &'a HashMap<String, Vec<Document>>,
    patterns: PatternCache,
}

impl<'a> Evaluator<'a> {
    pub fn new(collections: &'a HashMap<String, Vec<Document>>) -> Self {
        Self {
            collections,
            patterns: PatternCache::default(),
        }
    }

    pub fn filter_rows(&mut self, collection: &str, filter: &FilterNode) -> ModelResult<Vec<Document>> {
        let mut rows = Vec::new();
        for row in self.collections.get(collection).into_iter().flatten() {
            if matches(filter, row, None, &mut self.patterns)? {
                rows.push(row.clone());
            }
        }
        Ok(rows)
    }

    /// Run `pipeline`; `join` restricts the initial rows to those matching the
    /// join predicate against the enclosing row
    pub fn run(
        &mut self,
        pipeline: &Pipeline,
        join: Option<(&FilterNode, &Document)>,
    ) -> ModelResult<Vec<Document>> {
        let outer = join.map(|(_, row)| row);
        let mut rows = Vec::new();

        for row in self.collections.get(pipeline.collection()).into_iter().flatten() {
            let joined = match join {
                Some((on, outer_row)) => matches(on, row, Some(outer_row), &mut self.patterns)?,
                None => true,
            };
            if joined {
                rows.push(row.clone());
            }
        }

        for stage in pipeline.stages() {
            rows = self.apply(stage, rows, outer)?;
        }

        Ok(rows)
    }

    fn apply(
        &mut self,
        stage: &Stage,
        rows: Vec<Document>,
        outer: Option<&Document>,
    ) -> ModelResult<Vec<Document>> {
        match stage {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows {
                    if matches(filter, &row, outer, &mut self.patterns)? {
                        kept.push(row);
                    }
                }
                Ok(kept)
            }
            Stage::Lookup {
                on,
                pipeline,
                alias,
            } => {
                let mut joined = Vec::with_capacity(rows.len());
                for mut row in rows {
                    let related = self.run(pipeline, Some((on, &row)))?;
                    row.insert(
                        alias.clone(),
                        Value::Array(related.into_iter().map(Value::Object).collect()),
                    );
                    joined.push(row);
                }
                Ok(joined)
            }
            Stage::Flatten { field } => Ok(rows
                .into_iter()
                .map(|mut row| {
                    let first = match row.remove(field) {
                        Some(Value::Array(items)) => items.into_iter().next().unwrap_or(Value::Null),
                        Some(other) => other,
                        None => Value::Null,
                    };
                    row.insert(field.clone(), first);
                    row
                })
                .collect()),
            Stage::Count { field, into } => Ok(rows
                .into_iter()
                .map(|mut row| {
                    let count = get_path(&row, field)
                        .and_then(Value::as_array)
                        .map_or(0, Vec::len);
                    row.insert(into.clone(), Value::from(count as u64));
                    row
                })
                .collect()),
            Stage::Unset(fields) => Ok(rows
                .into_iter()
                .map(|mut row| {
                    for field in fields {
                        row.remove(field);
                    }
                    row
                })
                .collect()),
            Stage::Project(fields) => Ok(rows
                .into_iter()
                .map(|row| {
                    let mut projected = Document::new();
                    for field in fields {
                        if let Some(value) = get_path(&row, field) {
                            set_path(&mut projected, field, value.clone());
                        }
                    }
                    projected
                })
                .collect()),
            Stage::Sort(keys) => {
                let mut rows = rows;
                rows.sort_by(|a, b| {
                    for (field, direction) in keys {
                        let left = get_path(a, field).unwrap_or(&Value::Null);
                        let right = get_path(b, field).unwrap_or(&Value::Null);
                        let ordering = match direction {
                            OrderDirection::Asc => compare_values(left, right),
                            OrderDirection::Desc => compare_values(right, left),
                        };
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }
                    Ordering::Equal
                });
                Ok(rows)
            }
            Stage::Skip(n) => Ok(rows.into_iter().skip(*n as usize).collect()),
            Stage::Limit(n) => Ok(rows.into_iter().take(*n as usize).collect()),
        }
    }
}
