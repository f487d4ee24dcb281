//! Relationships - declared relations and their expansion into joins

pub mod eager_loading;
pub mod inference;
pub mod metadata;
pub mod path;

pub use eager_loading::{count_constraint, COUNT_ALIAS, COUNT_FIELD};
pub use metadata::{FilterFn, RelationDescriptor, RelationKind};
pub use path::{resolve, RelationPathNode};
