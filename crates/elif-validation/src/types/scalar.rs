//! Any, Boolean and ObjectId validators

use super::{type_builder, TypeKind};

type_builder!(
    /// Validator without a base type check
    AnyType,
    TypeKind::Any
);

type_builder!(BooleanType, TypeKind::Boolean);

type_builder!(
    /// Validator for 24 hex-digit document identities
    ObjectIdType,
    TypeKind::ObjectId
);

/// Whether `s` is the hex form of a 12 byte object id
pub fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
