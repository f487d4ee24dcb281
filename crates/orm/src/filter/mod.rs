//! Filter Builder - backend independent predicate trees

pub mod builder;
pub mod types;

pub use builder::Filter;
pub use types::{Combinator, FilterNode, Operand, Operator};
