//! Checking submitted values against a [`FormSchema`]

use super::schema::{FieldKind, FieldSpec, FormSchema};
use crate::upload::FieldErrors;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// Submitted values after coercion, in field order. Keys not in the schema are dropped.
pub type FormValues = IndexMap<String, Value>;

/// Type name used in "Expected X, received Y" messages
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const NOT_A_NUMBER: &str = "Expected number, received nan";

/// Coerce to a finite number. Blank strings and `null` count as zero, booleans as 1/0.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Null => 0.0,
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Whole numbers come back as integers so `"42"` reads as `42`, not `42.0`
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn quote_options(options: &[String]) -> String {
    options
        .iter()
        .map(|o| format!("'{}'", o))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Validate one present value, returning the value to keep
fn check_field(field: &FieldSpec, value: &Value) -> Result<Value, String> {
    match &field.kind {
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            other => Err(format!("Expected boolean, received {}", type_name(other))),
        },
        FieldKind::Numeric => coerce_number(value)
            .map(number_value)
            .ok_or_else(|| NOT_A_NUMBER.to_string()),
        FieldKind::Choice(options) => match value {
            Value::String(s) if options.contains(s) => Ok(value.clone()),
            Value::String(s) => Err(format!(
                "Invalid enum value. Expected {}, received '{}'",
                quote_options(options),
                s
            )),
            other => Err(format!(
                "Expected {}, received {}",
                quote_options(options),
                type_name(other)
            )),
        },
        FieldKind::Text => match value {
            Value::String(s) if field.required && field.plain_string && s.is_empty() => {
                Err(format!("{} is required.", field.label))
            }
            Value::String(_) => Ok(value.clone()),
            other => Err(format!("Expected string, received {}", type_name(other))),
        },
    }
}

impl FormSchema {
    /// Validate a submission.
    ///
    /// `null` counts as absent except for numbers, where it coerces to zero.
    /// A missing required boolean becomes `false` and a missing required
    /// number fails coercion; any other missing required field is an error.
    pub fn validate(&self, submitted: &Map<String, Value>) -> Result<FormValues, FieldErrors> {
        let mut values = FormValues::new();
        let mut errors = FieldErrors::new();

        for field in &self.fields {
            let submitted_value = submitted
                .get(&field.key)
                .filter(|v| !v.is_null() || field.kind == FieldKind::Numeric);
            match submitted_value {
                Some(value) => match check_field(field, value) {
                    Ok(value) => {
                        values.insert(field.key.clone(), value);
                    }
                    Err(message) => errors.add(&field.key, message),
                },
                None if field.required && field.kind == FieldKind::Boolean => {
                    values.insert(field.key.clone(), Value::Bool(false));
                }
                None if field.required && field.kind == FieldKind::Numeric => {
                    errors.add(&field.key, NOT_A_NUMBER)
                }
                None if field.required => errors.add(&field.key, "Required"),
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> FormSchema {
        FormSchema::parse(
            r#"{
                "type": "object",
                "properties": {
                    "name": {"type": "string", "title": "Full Name"},
                    "nickname": {"type": "string"},
                    "age": {"type": "number"},
                    "subscribe": {"type": "boolean"},
                    "terms": {"type": "boolean"},
                    "plan": {"type": "string", "enum": ["Basic", "Pro"]}
                },
                "required": ["name", "age", "terms", "plan"]
            }"#,
        )
        .unwrap()
    }

    fn submit(values: Value) -> Result<FormValues, FieldErrors> {
        match values {
            Value::Object(map) => schema().validate(&map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_valid_submission_coerced_in_order() {
        let values = submit(json!({
            "plan": "Pro",
            "age": "42",
            "name": "Ada",
            "extra": "dropped"
        }))
        .unwrap();

        let keys: Vec<_> = values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "age", "terms", "plan"]);
        assert_eq!(values["age"], json!(42));
        assert_eq!(values["terms"], json!(false));
        assert!(!values.contains_key("subscribe"));
        assert!(!values.contains_key("extra"));
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = submit(json!({})).unwrap_err();
        assert_eq!(errors.first("name"), Some("Required"));
        assert_eq!(errors.first("age"), Some("Expected number, received nan"));
        assert_eq!(errors.first("plan"), Some("Required"));
        assert_eq!(errors.get("terms"), None);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_empty_required_string_uses_label() {
        let errors = submit(json!({"name": "", "age": 1, "plan": "Basic"})).unwrap_err();
        assert_eq!(errors.first("name"), Some("Full Name is required."));
    }

    #[test]
    fn test_empty_optional_string_kept() {
        let values = submit(json!({"name": "Ada", "nickname": "", "age": 1, "plan": "Basic"}))
            .unwrap();
        assert_eq!(values["nickname"], json!(""));
    }

    #[test]
    fn test_number_coercion() {
        let age = |v: Value| submit(json!({"name": "A", "plan": "Basic", "age": v}));

        assert_eq!(age(json!("")).unwrap()["age"], json!(0));
        assert_eq!(age(json!(" 2.5 ")).unwrap()["age"], json!(2.5));
        assert_eq!(age(json!(true)).unwrap()["age"], json!(1));
        assert_eq!(age(Value::Null).unwrap()["age"], json!(0));
        assert_eq!(
            age(json!("abc")).unwrap_err().first("age"),
            Some("Expected number, received nan")
        );
        assert!(age(json!([1])).is_err());
    }

    #[test]
    fn test_enum_mismatch_message() {
        let errors = submit(json!({"name": "A", "age": 1, "plan": "Gold"})).unwrap_err();
        assert_eq!(
            errors.first("plan"),
            Some("Invalid enum value. Expected 'Basic' | 'Pro', received 'Gold'")
        );

        let errors = submit(json!({"name": "A", "age": 1, "plan": 3})).unwrap_err();
        assert_eq!(
            errors.first("plan"),
            Some("Expected 'Basic' | 'Pro', received number")
        );
    }

    #[test]
    fn test_type_mismatches() {
        let errors = submit(json!({
            "name": 5,
            "age": 1,
            "plan": "Pro",
            "terms": "yes"
        }))
        .unwrap_err();
        assert_eq!(errors.first("name"), Some("Expected string, received number"));
        assert_eq!(errors.first("terms"), Some("Expected boolean, received string"));
    }

    #[test]
    fn test_null_treated_as_absent() {
        let values = submit(json!({
            "name": "A",
            "age": 1,
            "plan": "Pro",
            "nickname": null,
            "terms": null
        }))
        .unwrap();
        assert!(!values.contains_key("nickname"));
        assert_eq!(values["terms"], json!(false));
    }

    #[test]
    fn test_only_plain_strings_reject_empty() {
        let schema = FormSchema::parse(
            r#"{"properties": {
                "notes": {"type": "textarea", "title": "Notes"},
                "misc": {},
                "name": {"type": "string", "title": "Name"}
            }, "required": ["notes", "misc", "name"]}"#,
        )
        .unwrap();

        let submitted = json!({"notes": "", "misc": "", "name": ""});
        let errors = schema.validate(submitted.as_object().unwrap()).unwrap_err();
        assert_eq!(errors.first("name"), Some("Name is required."));
        assert_eq!(errors.get("notes"), None);
        assert_eq!(errors.get("misc"), None);

        let submitted = json!({"notes": "", "misc": "", "name": "Ada"});
        let values = schema.validate(submitted.as_object().unwrap()).unwrap();
        assert_eq!(values["notes"], json!(""));
        assert_eq!(values["misc"], json!(""));
    }

    #[test]
    fn test_optional_number_absent_or_null() {
        let schema = FormSchema::parse(r#"{"properties": {"count": {"type": "number"}}}"#).unwrap();

        let values = schema.validate(&Map::new()).unwrap();
        assert!(!values.contains_key("count"));

        let submitted = json!({"count": null});
        let values = schema.validate(submitted.as_object().unwrap()).unwrap();
        assert_eq!(values["count"], json!(0));
    }
}
