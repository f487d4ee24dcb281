//! Date validators and the canonical date representation
//!
//! Dates travel as RFC 3339 strings and are normalized to UTC with millisecond
//! precision (`2018-03-05T10:22:31.000Z`).

use super::{type_builder, TypeBuilder, TypeKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

type_builder!(
    /// Validator for RFC 3339 date strings
    DateType,
    TypeKind::Date
);

/// Parse a JSON value holding an RFC 3339 date
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Canonical string form of a date
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time as a canonical date value
pub fn now_value() -> Value {
    Value::String(format_date(&Utc::now()))
}

impl DateType {
    /// Default to the time of validation
    pub fn default_now(self) -> Self {
        self.default_with(now_value)
    }

    pub fn min(self, bound: DateTime<Utc>) -> Self {
        self.test(move |v| {
            parse_date(v)
                .filter(|date| *date < bound)
                .map(|_| format!("Must be at or after {}", format_date(&bound)))
        })
    }

    pub fn max(self, bound: DateTime<Utc>) -> Self {
        self.test(move |v| {
            parse_date(v)
                .filter(|date| *date > bound)
                .map(|_| format!("Must be at or before {}", format_date(&bound)))
        })
    }
}
