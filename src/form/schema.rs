//! Interpreting a JSON Schema-like form description
//!
//! Only the subset an image-to-form model is asked to produce is supported:
//! a top-level object with flat `properties` of type string, number,
//! integer or boolean, optional `enum` choices and a `required` list.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    properties: IndexMap<String, RawProperty>,
    #[serde(default)]
    required: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawProperty {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "enum", default)]
    options: Option<Vec<String>>,
}

/// What a field holds, which decides both validation and widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Coerced to a number on submission
    Numeric,
    Boolean,
    /// One of a fixed list of strings
    Choice(Vec<String>),
}

/// One form field, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    /// `title` when given, otherwise the key
    pub label: String,
    pub description: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    /// Declared exactly as `"string"` without choices; only these reject `""` when required
    pub plain_string: bool,
}

/// A parsed form description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSchema {
    pub title: Option<String>,
    pub fields: Vec<FieldSpec>,
}

/// Empty strings count as absent, as they do for display purposes
fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

impl FormSchema {
    /// Parse a schema string
    pub fn parse(schema: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(schema).map_err(|e| Error::FormSchema {
            reason: e.to_string(),
        })?;

        if let Some(kind) = raw.kind.as_deref() {
            if kind != "object" {
                return Err(Error::FormSchema {
                    reason: format!("top-level type must be \"object\", got \"{}\"", kind),
                });
            }
        }

        let fields = raw
            .properties
            .into_iter()
            .map(|(key, prop)| {
                let plain_string =
                    prop.kind.as_deref() == Some("string") && prop.options.is_none();
                let kind = match prop.kind.as_deref() {
                    Some("boolean") => FieldKind::Boolean,
                    Some("number") | Some("integer") => FieldKind::Numeric,
                    // strings and anything unrecognized
                    _ => match prop.options {
                        Some(options) if options.is_empty() => {
                            return Err(Error::FormSchema {
                                reason: format!("property \"{}\" has an empty enum", key),
                            })
                        }
                        Some(options) => FieldKind::Choice(options),
                        None => FieldKind::Text,
                    },
                };

                Ok(FieldSpec {
                    label: non_empty(prop.title).unwrap_or_else(|| key.clone()),
                    description: non_empty(prop.description),
                    required: raw.required.iter().any(|r| r == &key),
                    plain_string,
                    kind,
                    key,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title: non_empty(raw.title),
            fields,
        })
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INTAKE: &str = r#"{
        "title": "Patient Intake",
        "type": "object",
        "properties": {
            "fullName": {"type": "string", "title": "Full Name"},
            "age": {"type": "number", "description": "Age in years"},
            "smoker": {"type": "boolean", "title": "Smoker"},
            "visits": {"type": "integer"},
            "sex": {"type": "string", "enum": ["Female", "Male", "Other"]},
            "notes": {"type": "textarea"}
        },
        "required": ["fullName", "sex", "unknown"]
    }"#;

    #[test]
    fn test_parse_fields_in_order() {
        let schema = FormSchema::parse(INTAKE).unwrap();
        assert_eq!(schema.title.as_deref(), Some("Patient Intake"));

        let keys: Vec<_> = schema.fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["fullName", "age", "smoker", "visits", "sex", "notes"]);
    }

    #[test]
    fn test_kind_mapping() {
        let schema = FormSchema::parse(INTAKE).unwrap();
        let kind = |key: &str| schema.field(key).unwrap().kind.clone();

        assert_eq!(kind("fullName"), FieldKind::Text);
        assert_eq!(kind("age"), FieldKind::Numeric);
        assert_eq!(kind("smoker"), FieldKind::Boolean);
        assert_eq!(kind("visits"), FieldKind::Numeric);
        assert_eq!(
            kind("sex"),
            FieldKind::Choice(vec!["Female".into(), "Male".into(), "Other".into()])
        );
        assert_eq!(kind("notes"), FieldKind::Text);

        let plain = |key: &str| schema.field(key).unwrap().plain_string;
        assert!(plain("fullName"));
        assert!(!plain("notes"));
        assert!(!plain("sex"));
        assert!(!plain("age"));
    }

    #[test]
    fn test_labels_and_required() {
        let schema = FormSchema::parse(INTAKE).unwrap();
        let name = schema.field("fullName").unwrap();
        assert_eq!(name.label, "Full Name");
        assert!(name.required);

        let age = schema.field("age").unwrap();
        assert_eq!(age.label, "age");
        assert_eq!(age.description.as_deref(), Some("Age in years"));
        assert!(!age.required);
    }

    #[test]
    fn test_enum_ignored_for_non_string_types() {
        let schema = FormSchema::parse(
            r#"{"properties": {
                "rating": {"type": "number", "enum": ["1", "2"]},
                "agree": {"type": "boolean", "enum": []}
            }}"#,
        )
        .unwrap();
        assert_eq!(schema.fields[0].kind, FieldKind::Numeric);
        assert_eq!(schema.fields[1].kind, FieldKind::Boolean);
    }

    #[test]
    fn test_missing_type_and_blank_title() {
        let schema = FormSchema::parse(
            r#"{"title": " ", "properties": {"city": {"title": "", "enum": ["A"]}}}"#,
        )
        .unwrap();
        assert_eq!(schema.title, None);
        assert_eq!(schema.fields[0].label, "city");
        assert_eq!(schema.fields[0].kind, FieldKind::Choice(vec!["A".into()]));
    }

    #[test]
    fn test_parse_failures() {
        for bad in [
            "not json",
            "[]",
            r#"{"type": "object"}"#,
            r#"{"type": "array", "properties": {}}"#,
            r#"{"properties": []}"#,
            r#"{"properties": {"a": {"type": "string", "enum": []}}}"#,
            r#"{"properties": {"a": {"type": "string", "enum": [1, 2]}}}"#,
        ] {
            assert!(
                matches!(FormSchema::parse(bad), Err(Error::FormSchema { .. })),
                "expected failure for {}",
                bad
            );
        }
    }

    #[test]
    fn test_empty_properties_is_valid() {
        let schema = FormSchema::parse(r#"{"properties": {}}"#).unwrap();
        assert!(schema.fields.is_empty());
    }
}
