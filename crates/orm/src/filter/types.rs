//! Filter Types - operators, combinators and tree nodes

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Like,
    NotLike,
}

impl Operator {
    /// Evaluate a comparison between two orderable quantities
    pub fn compare<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Operator::Eq => left == right,
            Operator::Ne => left != right,
            Operator::Lt => left < right,
            Operator::Lte => left <= right,
            Operator::Gt => left > right,
            Operator::Gte => left >= right,
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "="),
            Operator::Ne => write!(f, "<>"),
            Operator::Lt => write!(f, "<"),
            Operator::Lte => write!(f, "<="),
            Operator::Gt => write!(f, ">"),
            Operator::Gte => write!(f, ">="),
            Operator::In => write!(f, "in"),
            Operator::NotIn => write!(f, "not in"),
            Operator::Like => write!(f, "like"),
            Operator::NotLike => write!(f, "not like"),
        }
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "<>" | "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "in" => Ok(Operator::In),
            "nin" | "not in" => Ok(Operator::NotIn),
            "like" => Ok(Operator::Like),
            "not like" => Ok(Operator::NotLike),
            _ => Err(QueryError::UnknownOperator(s.to_string())),
        }
    }
}

/// Branch combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    And,
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => write!(f, "AND"),
            Combinator::Or => write!(f, "OR"),
        }
    }
}

/// Right-hand side of a predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// A literal value
    Value(Value),
    /// A field of the enclosing (outer) row, used by relation joins
    Outer(String),
}

/// A node of the filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterNode {
    Predicate {
        field: String,
        operator: Operator,
        operand: Operand,
    },
    Group {
        combinator: Combinator,
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    pub fn empty_group(combinator: Combinator) -> Self {
        FilterNode::Group {
            combinator,
            children: Vec::new(),
        }
    }

    /// A group without children matches everything
    pub fn is_empty(&self) -> bool {
        matches!(self, FilterNode::Group { children, .. } if children.is_empty())
    }

    /// Visit every predicate in the tree
    pub fn predicates(&self) -> Vec<(&str, Operator, &Operand)> {
        let mut found = Vec::new();
        self.collect_predicates(&mut found);
        found
    }

    fn collect_predicates<'a>(&'a self, found: &mut Vec<(&'a str, Operator, &'a Operand)>) {
        match self {
            FilterNode::Predicate {
                field,
                operator,
                operand,
            } => found.push((field.as_str(), *operator, operand)),
            FilterNode::Group { children, .. } => {
                for child in children {
                    child.collect_predicates(found);
                }
            }
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterNode::Predicate {
                field,
                operator,
                operand,
            } => match operand {
                Operand::Value(value) => write!(f, "{} {} {}", field, operator, value),
                Operand::Outer(path) => write!(f, "{} {} $outer.{}", field, operator, path),
            },
            FilterNode::Group {
                combinator,
                children,
            } => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", combinator)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}
