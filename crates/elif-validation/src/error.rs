//! Validation error types and handling

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// Message reported for absent required values
pub const REQUIRED_MESSAGE: &str = "Must be provided";

/// Path-keyed collection of validation messages
///
/// Keys are dotted field paths (`"name.first"`), values keep the order in
/// which the failing tests were declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub struct ValidationErrors {
    /// Map of field paths to their validation messages
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create a new empty validation errors collection
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    /// Add a single message for a field path
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Add multiple messages for a field path
    pub fn add_errors(&mut self, field: impl Into<String>, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }

        self.errors.entry(field.into()).or_default().extend(messages);
    }

    /// Check if there are any validation errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of field paths with errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Get total number of messages across all field paths
    pub fn total_errors(&self) -> usize {
        self.errors.values().map(|v| v.len()).sum()
    }

    /// Get messages for a specific field path
    pub fn get_field_errors(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    /// Check if a specific field path has errors
    pub fn has_field_errors(&self, field: &str) -> bool {
        self.errors.get(field).map_or(false, |errors| !errors.is_empty())
    }

    /// Merge another collection into this one, prefixing its paths with `prefix.`
    pub fn merge_nested(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, errors) in other.errors {
            self.add_errors(format!("{}.{}", prefix, field), errors);
        }
    }

    /// Merge another ValidationErrors into this one
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, errors) in other.errors {
            self.add_errors(field, errors);
        }
    }

    /// Drop every entry whose only message is the absence message.
    ///
    /// Partial documents are legal on update, so absence alone is not an error there.
    pub fn prune_absence(&mut self) {
        self.errors
            .retain(|_, errors| !(errors.len() == 1 && errors[0] == REQUIRED_MESSAGE));
    }

    /// Turn an empty collection into `Ok(value)` and anything else into `Err(self)`
    pub fn into_result<T>(self, value: T) -> ValidationResult<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Convert to a JSON-serializable format
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": "validation_failed",
                "message": "Validation failed",
                "fields": self.errors
            }
        })
    }
}

impl Default for ValidationErrors {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "No validation errors")
        } else {
            write!(f, "Validation failed for {} field(s):", self.errors.len())?;
            for (field, messages) in &self.errors {
                for message in messages {
                    write!(f, "\n  {}: {}", field, message)?;
                }
            }
            Ok(())
        }
    }
}

/// Errors raised while declaring a schema, before any document is validated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeclarationError {
    #[error("The default value for a {kind} field must be of {kind} type: {reason}")]
    DefaultTypeMismatch { kind: String, reason: String },

    #[error("Duplicate field '{0}' in schema")]
    DuplicateField(String),
}
