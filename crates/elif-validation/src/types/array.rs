//! Array and sub-document validators

use super::{type_builder, Type, TypeBuilder, TypeKind};
use crate::schema::Schema;
use serde_json::Value;

type_builder!(
    /// Validator for arrays, optionally typed per item
    ArrayType,
    TypeKind::Array(None)
);

type_builder!(
    /// Validator for a sub-document checked against a nested schema
    ObjectType,
    TypeKind::Object(Box::new(Schema::new()))
);

fn items_len(value: &Value) -> Option<usize> {
    value.as_array().map(Vec::len)
}

/// Per-item validator of an array, anchored where `of` was declared
#[derive(Debug, Clone)]
pub struct Items {
    pub(crate) item_type: Box<Type>,
    /// Casts declared before `of`; items are validated right after them
    pub(crate) after_casts: usize,
    /// Tests declared before `of`; the item error is reported right after them
    pub(crate) after_tests: usize,
}

impl Items {
    pub fn item_type(&self) -> &Type {
        &self.item_type
    }

    /// Validate and cast every item; returns the cast array and the first item error
    pub(crate) fn validate(&self, value: Value, is_update: bool) -> (Value, Option<String>) {
        let items = match value {
            Value::Array(items) => items,
            other => return (other, None),
        };

        let mut first_error = None;
        let items = items
            .iter()
            .map(|item| {
                let result = self.item_type.validate(Some(item), is_update);
                if first_error.is_none() {
                    first_error = result.errors.into_iter().next();
                }
                result.value.unwrap_or(Value::Null)
            })
            .collect();

        (Value::Array(items), first_error)
    }
}

impl ArrayType {
    /// Validate every item with `item_type`
    pub fn of(mut self, item_type: impl Into<Type>) -> Self {
        let items = Items {
            item_type: Box::new(item_type.into()),
            after_casts: self.0.casts.len(),
            after_tests: self.0.tests.len(),
        };
        self.0.kind = TypeKind::Array(Some(items));
        self
    }

    pub fn min(self, n: usize) -> Self {
        self.test(move |v| {
            items_len(v)
                .filter(|len| *len < n)
                .map(|_| format!("Must be at least {} items", n))
        })
    }

    pub fn max(self, n: usize) -> Self {
        self.test(move |v| {
            items_len(v)
                .filter(|len| *len > n)
                .map(|_| format!("Must be at most {} items", n))
        })
    }

    pub fn length(self, n: usize) -> Self {
        self.test(move |v| {
            items_len(v)
                .filter(|len| *len != n)
                .map(|_| format!("Must be exactly {} items", n))
        })
    }
}

impl ObjectType {
    pub fn keys(schema: Schema) -> Self {
        Self(Type::new(TypeKind::Object(Box::new(schema))))
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::Schema;
    use crate::types::{array, number, object, string, Type, TypeBuilder};
    use serde_json::{json, Value};

    #[test]
    fn test_item_count_bounds() {
        let ty: Type = array().min(1).max(2).into();

        assert!(ty.validate(Some(&json!([1])), false).is_valid());
        assert_eq!(
            ty.validate(Some(&json!([])), false).errors,
            vec!["Must be at least 1 items".to_string()]
        );
        assert_eq!(
            ty.validate(Some(&json!([1, 2, 3])), false).errors,
            vec!["Must be at most 2 items".to_string()]
        );
    }

    #[test]
    fn test_of_casts_items_and_reports_first_error() {
        let ty: Type = array().of(string().trim().min(2)).into();
        let result = ty.validate(Some(&json!([" ab ", "c", 4])), false);

        assert_eq!(result.value, Some(json!(["ab", "c", 4])));
        assert_eq!(result.errors, vec!["Must be at least 2 characters".to_string()]);
    }

    #[test]
    fn test_of_nested_arrays() {
        let ty: Type = array().of(array().of(number().integer())).into();
        assert!(ty.validate(Some(&json!([[1, 2], [3]])), false).is_valid());
        assert!(!ty.validate(Some(&json!([[1, 2.5]])), false).is_valid());
    }

    #[test]
    fn test_array_of_sub_documents() {
        let schema = Schema::new()
            .field("street", string().required())
            .field("zip", number());
        let ty: Type = array().of(object(schema)).into();

        let result = ty.validate(
            Some(&json!([{ "street": "Main", "zip": 1, "extra": true }, { "zip": 2 }])),
            false,
        );

        assert_eq!(result.value, Some(json!([{ "street": "Main", "zip": 1 }, { "zip": 2 }])));
        assert_eq!(result.errors, vec!["street: Must be provided".to_string()]);
    }

    #[test]
    fn test_of_passes_update_mode_to_items() {
        let schema = Schema::new().field("street", string().required());
        let ty: Type = array().of(object(schema)).into();

        assert!(ty.validate(Some(&json!([{}])), true).is_valid());
        assert_eq!(
            ty.validate(Some(&json!([{}])), false).errors,
            vec!["street: Must be provided".to_string()]
        );
    }

    #[test]
    fn test_of_runs_in_declaration_order() {
        let ty: Type = array()
            .cast(|v| match v {
                Value::Array(mut items) => {
                    items.retain(|item| !item.is_null());
                    Value::Array(items)
                }
                other => other,
            })
            .of(number().integer())
            .cast(|v| match v {
                Value::Array(items) => Value::Array(items.into_iter().rev().collect()),
                other => other,
            })
            .into();

        let result = ty.validate(Some(&json!([1, null, 2])), false);
        assert_eq!(result.value, Some(json!([2, 1])));
        assert!(result.is_valid());

        let ty: Type = array()
            .min(3)
            .of(string())
            .max(1)
            .into();
        assert_eq!(
            ty.validate(Some(&json!([1, 2])), false).errors,
            vec![
                "Must be at least 3 items".to_string(),
                "Must be a string".to_string(),
                "Must be at most 1 items".to_string(),
            ]
        );
    }

    #[test]
    fn test_not_an_array() {
        let ty: Type = array().required().into();
        assert_eq!(
            ty.validate(Some(&json!("nope")), false).errors,
            vec!["Must be an array".to_string()]
        );
    }
}
