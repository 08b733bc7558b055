//! Structural validation of decoded entities against per-attribute rules.

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Ascii,
    Email,
}

#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    /// Missing, null, empty strings and zero numbers are rejected.
    pub required: bool,
    pub format: Option<Format>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let pointer = format!("/data/attributes/{}", err.field);
        ApiError::validation(Some(err.to_string())).with_pointer(pointer)
    }
}

pub struct Validator;

impl Validator {
    /// Check `attributes` against `rules` in rule order; the first violation wins.
    pub fn validate(
        attributes: &Map<String, Value>,
        rules: &[(&'static str, ValidationRule)],
    ) -> Result<(), ValidationError> {
        for (field, rule) in rules {
            let val = attributes.get(*field);
            if rule.required && val.map_or(true, is_blank) {
                return Err(ValidationError::new(field, "is required"));
            }
            if let Some(v) = val {
                validate_field(field, v, rule)?;
            }
        }
        Ok(())
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn validate_field(field: &str, v: &Value, rule: &ValidationRule) -> Result<(), ValidationError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = rule.format {
        validate_format(field, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max {
                return Err(ValidationError::new(field, format!("must be at most {max} characters")));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min {
                return Err(ValidationError::new(field, format!("must be at least {min} characters")));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern)
                .map_err(|_| ValidationError::new(field, "has an invalid pattern rule"))?;
            if !re.is_match(s) {
                return Err(ValidationError::new(field, "does not match required pattern"));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(ValidationError::new(
                field,
                format!("must be one of: {:?}", allowed.iter().take(5).collect::<Vec<_>>()),
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(ValidationError::new(field, format!("must be at least {min}")));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(ValidationError::new(field, format!("must be at most {max}")));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(field: &str, v: &Value, format: Format) -> Result<(), ValidationError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format {
        Format::Ascii => {
            if !s.is_ascii() {
                return Err(ValidationError::new(field, "must contain only ASCII characters"));
            }
        }
        Format::Email => {
            if !s.contains('@') || s.len() < 3 {
                return Err(ValidationError::new(field, "must be a valid email"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn rules() -> Vec<(&'static str, ValidationRule)> {
        vec![
            (
                "title",
                ValidationRule {
                    required: true,
                    format: Some(Format::Ascii),
                    max_length: Some(10),
                    ..Default::default()
                },
            ),
            (
                "year",
                ValidationRule {
                    required: true,
                    minimum: Some(1888.0),
                    ..Default::default()
                },
            ),
        ]
    }

    #[test]
    fn accepts_valid_attributes() {
        assert!(Validator::validate(&attrs(json!({"title": "Alien", "year": 1979})), &rules()).is_ok());
    }

    #[test]
    fn required_rejects_missing_empty_and_zero() {
        let err = Validator::validate(&attrs(json!({"year": 1979})), &rules()).unwrap_err();
        assert_eq!(err.field, "title");
        let err = Validator::validate(&attrs(json!({"title": "", "year": 1979})), &rules()).unwrap_err();
        assert_eq!(err.field, "title");
        let err = Validator::validate(&attrs(json!({"title": "Alien", "year": 0})), &rules()).unwrap_err();
        assert_eq!(err.field, "year");
    }

    #[test]
    fn format_length_and_range_rules() {
        let err = Validator::validate(&attrs(json!({"title": "Amélie", "year": 2001})), &rules()).unwrap_err();
        assert_eq!(err.message, "must contain only ASCII characters");
        let err = Validator::validate(&attrs(json!({"title": "Much too long", "year": 2001})), &rules()).unwrap_err();
        assert_eq!(err.message, "must be at most 10 characters");
        let err = Validator::validate(&attrs(json!({"title": "Early", "year": 1800})), &rules()).unwrap_err();
        assert_eq!(err.message, "must be at least 1888");
    }

    #[test]
    fn converts_to_validation_api_error() {
        let api: ApiError = ValidationError::new("title", "is required").into();
        assert_eq!(api.id, "validation-error");
        assert_eq!(api.source.pointer.as_deref(), Some("/data/attributes/title"));
        assert_eq!(api.detail.as_deref(), Some("title: is required"));
    }
}
