//! Numeric validators

use super::{type_builder, TypeBuilder, TypeKind};
use serde_json::Value;

type_builder!(
    /// Validator for numeric values
    NumberType,
    TypeKind::Number
);

fn decimal_places(n: f64) -> usize {
    let repr = n.to_string();
    repr.split_once('.').map_or(0, |(_, fraction)| fraction.len())
}

impl NumberType {
    pub fn min(self, n: f64) -> Self {
        self.test(move |v| {
            v.as_f64()
                .filter(|x| *x < n)
                .map(|_| format!("Must be at least {}", n))
        })
    }

    pub fn max(self, n: f64) -> Self {
        self.test(move |v| {
            v.as_f64()
                .filter(|x| *x > n)
                .map(|_| format!("Must be at most {}", n))
        })
    }

    pub fn integer(self) -> Self {
        self.test(|v| {
            v.as_f64()
                .filter(|x| x.fract() != 0.0)
                .map(|_| "Must be an integer".to_string())
        })
    }

    pub fn positive(self) -> Self {
        self.test(|v| {
            v.as_f64()
                .filter(|x| *x <= 0.0)
                .map(|_| "Must be a positive number".to_string())
        })
    }

    pub fn negative(self) -> Self {
        self.test(|v| {
            v.as_f64()
                .filter(|x| *x >= 0.0)
                .map(|_| "Must be a negative number".to_string())
        })
    }

    pub fn multiple_of(self, n: f64) -> Self {
        self.test(move |v| {
            v.as_f64()
                .filter(|x| n != 0.0 && (x / n).fract() != 0.0)
                .map(|_| format!("Must be a multiple of {}", n))
        })
    }

    /// At most `n` digits after the decimal point
    pub fn precision(self, n: usize) -> Self {
        self.test(move |v: &Value| {
            v.as_f64()
                .filter(|x| decimal_places(*x) > n)
                .map(|_| format!("Must have at most {} decimal places", n))
        })
    }
}
