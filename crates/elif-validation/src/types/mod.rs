//! Type validators - composable, recursive value validators
//!
//! A [`Type`] is a tagged variant ([`TypeKind`]) plus a pipeline: an optional
//! default producer, a required flag, ordered casts and ordered tests.
//! Kind-specific builders ([`StringType`], [`NumberType`], ...) extend the
//! pipeline through chained calls and convert into a plain [`Type`].

macro_rules! type_builder {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub(crate) $crate::types::Type);

        impl $name {
            pub fn new() -> Self {
                Self($crate::types::Type::new($kind))
            }
        }

        impl $crate::types::TypeBuilder for $name {
            fn as_type_mut(&mut self) -> &mut $crate::types::Type {
                &mut self.0
            }
        }

        impl From<$name> for $crate::types::Type {
            fn from(builder: $name) -> Self {
                builder.0
            }
        }
    };
}

pub(crate) use type_builder;

pub mod array;
pub mod date;
pub mod number;
pub mod scalar;
pub mod string;

use crate::error::{DeclarationError, REQUIRED_MESSAGE};
use crate::schema::Schema;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub use array::{ArrayType, Items, ObjectType};
pub use date::DateType;
pub use number::NumberType;
pub use scalar::{AnyType, BooleanType, ObjectIdType};
pub use string::StringType;

pub type CastFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type TestFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// The shape a value must have before casts and tests run
#[derive(Debug, Clone)]
pub enum TypeKind {
    Any,
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    /// Array, optionally with a validator applied to every item
    Array(Option<Items>),
    /// Sub-document validated against its own schema as a single value
    Object(Box<Schema>),
}

impl TypeKind {
    /// Human readable kind name
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Any => "Any",
            TypeKind::String => "String",
            TypeKind::Number => "Number",
            TypeKind::Boolean => "Boolean",
            TypeKind::Date => "Date",
            TypeKind::ObjectId => "ObjectId",
            TypeKind::Array(_) => "Array",
            TypeKind::Object(_) => "Object",
        }
    }

    /// Base type check, `Some(message)` when the value has the wrong shape
    pub fn check(&self, value: &Value) -> Option<String> {
        let valid = match self {
            TypeKind::Any => true,
            TypeKind::String => value.is_string(),
            TypeKind::Number => value.is_number(),
            TypeKind::Boolean => value.is_boolean(),
            TypeKind::Date => date::parse_date(value).is_some(),
            TypeKind::ObjectId => value.as_str().map_or(false, scalar::is_object_id),
            TypeKind::Array(_) => value.is_array(),
            TypeKind::Object(_) => value.is_object(),
        };

        if valid {
            return None;
        }

        let message = match self {
            TypeKind::Any => "Invalid type",
            TypeKind::String => "Must be a string",
            TypeKind::Number => "Must be a number",
            TypeKind::Boolean => "Must be a boolean",
            TypeKind::Date => "Must be a valid date",
            TypeKind::ObjectId => "Must be a valid object id",
            TypeKind::Array(_) => "Must be an array",
            TypeKind::Object(_) => "Must be an object",
        };
        Some(message.to_string())
    }

    /// Canonical form of a value that passed [`TypeKind::check`]
    fn normalize(&self, value: Value) -> Value {
        match self {
            TypeKind::Date => match date::parse_date(&value) {
                Some(parsed) => Value::String(date::format_date(&parsed)),
                None => value,
            },
            TypeKind::ObjectId => match value {
                Value::String(s) => Value::String(s.to_ascii_lowercase()),
                other => other,
            },
            _ => value,
        }
    }
}

/// Outcome of validating a single value
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// The (possibly cast) value, `None` when absent
    pub value: Option<Value>,
    /// Every failing test message in declaration order
    pub errors: Vec<String>,
}

impl Validated {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A complete value validator
#[derive(Clone)]
pub struct Type {
    pub(crate) kind: TypeKind,
    pub(crate) required: bool,
    pub(crate) default: Option<DefaultFn>,
    pub(crate) casts: Vec<CastFn>,
    pub(crate) tests: Vec<TestFn>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            casts: Vec::new(),
            tests: Vec::new(),
        }
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Validate a value.
    ///
    /// `None` and `Value::Null` both count as absent. Defaults are only
    /// substituted when not updating.
    pub fn validate(&self, value: Option<&Value>, is_update: bool) -> Validated {
        let mut value = value.filter(|v| !v.is_null()).cloned();

        if value.is_none() && !is_update {
            value = self
                .default
                .as_ref()
                .map(|produce| produce())
                .filter(|v| !v.is_null());
        }

        let mut value = match value {
            Some(value) => value,
            None if self.required => {
                return Validated {
                    value: None,
                    errors: vec![REQUIRED_MESSAGE.to_string()],
                }
            }
            None => {
                return Validated {
                    value: None,
                    errors: Vec::new(),
                }
            }
        };

        if let Some(message) = self.kind.check(&value) {
            return Validated {
                value: Some(value),
                errors: vec![message],
            };
        }

        value = self.kind.normalize(value);

        let mut errors = Vec::new();
        match &self.kind {
            TypeKind::Array(Some(items)) => {
                let split = items.after_casts.min(self.casts.len());
                for cast in &self.casts[..split] {
                    value = cast(value);
                }
                let (cast_items, item_error) = items.validate(value, is_update);
                value = cast_items;
                for cast in &self.casts[split..] {
                    value = cast(value);
                }

                let split = items.after_tests.min(self.tests.len());
                errors.extend(self.tests[..split].iter().filter_map(|test| test(&value)));
                errors.extend(item_error);
                errors.extend(self.tests[split..].iter().filter_map(|test| test(&value)));

                return Validated {
                    value: Some(value),
                    errors,
                };
            }
            TypeKind::Object(schema) => {
                if let Value::Object(document) = &value {
                    let (validated, nested) = schema.validate_partial(document, is_update);
                    for (path, messages) in nested.errors {
                        errors.extend(messages.into_iter().map(|m| format!("{}: {}", path, m)));
                    }
                    value = Value::Object(validated);
                }
            }
            _ => {}
        }

        for cast in &self.casts {
            value = cast(value);
        }

        errors.extend(self.tests.iter().filter_map(|test| test(&value)));

        Validated {
            value: Some(value),
            errors,
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("has_default", &self.default.is_some())
            .field("casts", &self.casts.len())
            .field("tests", &self.tests.len())
            .finish()
    }
}

/// Builder methods shared by every validator kind
pub trait TypeBuilder: Sized {
    fn as_type_mut(&mut self) -> &mut Type;

    /// Absent values fail with "Must be provided"
    fn required(mut self) -> Self {
        self.as_type_mut().required = true;
        self
    }

    /// Fixed default, checked against the validator's kind right away
    fn default(mut self, value: impl Into<Value>) -> Result<Self, DeclarationError> {
        let value = value.into();
        let ty = self.as_type_mut();
        if let Some(reason) = ty.kind.check(&value) {
            return Err(DeclarationError::DefaultTypeMismatch {
                kind: ty.kind.name().to_string(),
                reason,
            });
        }

        ty.default = Some(Arc::new(move || value.clone()));
        Ok(self)
    }

    /// Default computed on every validation (e.g. the current time)
    fn default_with<F>(mut self, produce: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.as_type_mut().default = Some(Arc::new(produce));
        self
    }

    /// Append a test; `Some(message)` marks a failure
    fn test<F>(mut self, test: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.as_type_mut().tests.push(Arc::new(test));
        self
    }

    /// Append a cast, run before any test
    fn cast<F>(mut self, cast: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.as_type_mut().casts.push(Arc::new(cast));
        self
    }
}

impl TypeBuilder for Type {
    fn as_type_mut(&mut self) -> &mut Type {
        self
    }
}

pub fn any() -> AnyType {
    AnyType::new()
}

pub fn string() -> StringType {
    StringType::new()
}

pub fn number() -> NumberType {
    NumberType::new()
}

pub fn boolean() -> BooleanType {
    BooleanType::new()
}

pub fn date() -> DateType {
    DateType::new()
}

pub fn object_id() -> ObjectIdType {
    ObjectIdType::new()
}

pub fn array() -> ArrayType {
    ArrayType::new()
}

/// Sub-document validator, mostly useful as `array().of(object(schema))`
pub fn object(schema: Schema) -> ObjectType {
    ObjectType::keys(schema)
}
