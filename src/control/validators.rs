//! Validators - opaque predicate functions over a control's value.
//!
//! A validator returns `None` (or an empty map) when the value is valid and
//! a map of named errors otherwise. A few common validators are provided;
//! anything else is a closure.

use std::fmt;
use std::rc::Rc;

use serde_json::json;

use super::stores::normalize_errors;
use crate::types::{ValidationErrors, Value};

/// Shared validator function.
#[derive(Clone)]
pub struct Validator(Rc<dyn Fn(&Value) -> Option<ValidationErrors>>);

impl Validator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Option<ValidationErrors> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Run the validator. Empty error maps come back as `None`.
    pub fn validate(&self, value: &Value) -> Option<ValidationErrors> {
        normalize_errors((self.0)(value))
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Fold validators into one. `None` when the list is empty.
pub fn compose(validators: impl IntoIterator<Item = Validator>) -> Option<Validator> {
    let mut validators: Vec<Validator> = validators.into_iter().collect();
    match validators.len() {
        0 => None,
        1 => validators.pop(),
        _ => Some(Validator::new(move |value| {
            let mut merged = ValidationErrors::new();
            for validator in &validators {
                if let Some(errors) = validator.validate(value) {
                    merged.extend(errors);
                }
            }
            Some(merged)
        })),
    }
}

fn error(key: &str, detail: Value) -> Option<ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.insert(key.to_string(), detail);
    Some(errors)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

// =============================================================================
// BUILT-IN VALIDATORS
// =============================================================================

/// Fails on null, empty strings, empty arrays and empty objects.
pub fn required() -> Validator {
    Validator::new(|value| {
        if is_empty_value(value) {
            error("required", Value::Bool(true))
        } else {
            None
        }
    })
}

/// Minimum string/array length. Empty values pass (pair with [`required`]).
pub fn min_length(min: usize) -> Validator {
    Validator::new(move |value| {
        if is_empty_value(value) {
            return None;
        }
        match length_of(value) {
            Some(len) if len < min => error(
                "minLength",
                json!({ "requiredLength": min, "actualLength": len }),
            ),
            _ => None,
        }
    })
}

/// Maximum string/array length.
pub fn max_length(max: usize) -> Validator {
    Validator::new(move |value| match length_of(value) {
        Some(len) if len > max => error(
            "maxLength",
            json!({ "requiredLength": max, "actualLength": len }),
        ),
        _ => None,
    })
}

/// Numeric lower bound. Non-numbers pass.
pub fn min(min: f64) -> Validator {
    Validator::new(move |value| match value.as_f64() {
        Some(n) if n < min => error("min", json!({ "min": min, "actual": n })),
        _ => None,
    })
}

/// Numeric upper bound. Non-numbers pass.
pub fn max(max: f64) -> Validator {
    Validator::new(move |value| match value.as_f64() {
        Some(n) if n > max => error("max", json!({ "max": max, "actual": n })),
        _ => None,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        let v = required();
        assert!(v.validate(&json!(null)).is_some());
        assert!(v.validate(&json!("")).is_some());
        assert!(v.validate(&json!([])).is_some());
        assert!(v.validate(&json!("x")).is_none());
        assert!(v.validate(&json!(0)).is_none());
    }

    #[test]
    fn test_length_validators() {
        let min = min_length(3);
        assert!(min.validate(&json!("")).is_none());
        assert!(min.validate(&json!("ab")).is_some());
        assert!(min.validate(&json!("abc")).is_none());

        let max = max_length(2);
        let errors = max.validate(&json!([1, 2, 3])).unwrap();
        assert_eq!(errors["maxLength"]["actualLength"], json!(3));
    }

    #[test]
    fn test_numeric_bounds() {
        assert!(min(1.0).validate(&json!(0)).is_some());
        assert!(min(1.0).validate(&json!("zero")).is_none());
        assert!(max(10.0).validate(&json!(10.5)).is_some());
        assert!(max(10.0).validate(&json!(10)).is_none());
    }

    #[test]
    fn test_compose() {
        assert!(compose(Vec::new()).is_none());

        let single = required();
        assert_eq!(compose(vec![single.clone()]), Some(single));

        let both = compose(vec![required(), min_length(3)]).unwrap();
        assert!(both.validate(&json!("")).unwrap().contains_key("required"));
        assert!(both.validate(&json!("ab")).unwrap().contains_key("minLength"));
        assert!(both.validate(&json!("abc")).is_none());
    }

    #[test]
    fn test_empty_map_is_valid() {
        let v = Validator::new(|_| Some(ValidationErrors::new()));
        assert!(v.validate(&Value::Null).is_none());
    }
}
