//! String validators and casts

use super::{type_builder, TypeBuilder, TypeKind};
use regex::Regex;
use serde_json::Value;

type_builder!(
    /// Validator for string values
    StringType,
    TypeKind::String
);

fn char_len(value: &Value) -> Option<usize> {
    value.as_str().map(|s| s.chars().count())
}

fn map_str(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

impl StringType {
    /// Set minimum length constraint (characters)
    pub fn min(self, n: usize) -> Self {
        self.test(move |v| {
            char_len(v)
                .filter(|len| *len < n)
                .map(|_| format!("Must be at least {} characters", n))
        })
    }

    /// Set maximum length constraint (characters)
    pub fn max(self, n: usize) -> Self {
        self.test(move |v| {
            char_len(v)
                .filter(|len| *len > n)
                .map(|_| format!("Must be at most {} characters", n))
        })
    }

    /// Set exact length requirement (characters)
    pub fn length(self, n: usize) -> Self {
        self.test(move |v| {
            char_len(v)
                .filter(|len| *len != n)
                .map(|_| format!("Must be exactly {} characters", n))
        })
    }

    pub fn alphanum(self) -> Self {
        self.test(|v| {
            v.as_str()
                .filter(|s| !s.chars().all(|c| c.is_ascii_alphanumeric()))
                .map(|_| "Must only contain alpha-numeric characters".to_string())
        })
    }

    /// Letters, digits and underscores only
    pub fn token(self) -> Self {
        self.test(|v| {
            v.as_str()
                .filter(|s| !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
                .map(|_| "Must only contain alpha-numeric and underscore characters".to_string())
        })
    }

    pub fn email(self) -> Self {
        self.test(|v| {
            v.as_str()
                .filter(|s| !is_email(s))
                .map(|_| "Must be a valid email address".to_string())
        })
    }

    pub fn matches(self, pattern: Regex) -> Self {
        self.test(move |v| {
            v.as_str()
                .filter(|s| !pattern.is_match(s))
                .map(|_| format!("Must match the pattern {}", pattern.as_str()))
        })
    }

    pub fn lowercase(self) -> Self {
        self.cast(|v| map_str(v, str::to_lowercase))
    }

    pub fn uppercase(self) -> Self {
        self.cast(|v| map_str(v, str::to_uppercase))
    }

    pub fn trim(self) -> Self {
        self.cast(|v| map_str(v, |s| s.trim().to_string()))
    }

    /// Cut the value down to `n` characters
    pub fn truncate(self, n: usize) -> Self {
        self.cast(move |v| map_str(v, |s| s.chars().take(n).collect()))
    }

    /// Replace every match of `pattern`
    pub fn replace(self, pattern: Regex, replacement: impl Into<String>) -> Self {
        let replacement = replacement.into();
        self.cast(move |v| map_str(v, |s| pattern.replace_all(s, replacement.as_str()).into_owned()))
    }
}
