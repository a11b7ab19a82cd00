//! Turning a [`FormSchema`] into something a client can display

use super::schema::{FieldKind, FieldSpec, FormSchema};
use crate::error::{Error, Result};
use handlebars::Handlebars;
use schemars::JsonSchema;
use serde::Serialize;

pub const DEFAULT_FORM_TITLE: &str = "Generated Form";
pub const SUBMIT_LABEL: &str = "Submit Form";
pub const ERROR_TITLE: &str = "Error";

/// Choice fields with more options than this render as a select
const MAX_RADIO_OPTIONS: usize = 3;

const FORM_TEMPLATE: &str = include_str!("../../templates/form.hbs");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Number,
}

/// How a field is presented
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Widget {
    Checkbox {
        caption: Option<String>,
    },
    Radio {
        options: Vec<String>,
    },
    Select {
        placeholder: String,
        options: Vec<String>,
    },
    Input {
        input_type: InputType,
        placeholder: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub description: Option<String>,
    pub widget: Widget,
}

impl From<&FieldSpec> for FieldView {
    fn from(field: &FieldSpec) -> Self {
        let widget = match &field.kind {
            FieldKind::Boolean => Widget::Checkbox {
                caption: field.description.clone(),
            },
            FieldKind::Choice(options) if options.len() <= MAX_RADIO_OPTIONS => Widget::Radio {
                options: options.clone(),
            },
            FieldKind::Choice(options) => Widget::Select {
                placeholder: format!("Select {}", field.label),
                options: options.clone(),
            },
            FieldKind::Text | FieldKind::Numeric => Widget::Input {
                input_type: if field.kind == FieldKind::Numeric {
                    InputType::Number
                } else {
                    InputType::Text
                },
                placeholder: field
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Enter {}", field.label)),
            },
        };

        Self {
            name: field.key.clone(),
            label: field.label.clone(),
            required: field.required,
            description: field.description.clone(),
            widget,
        }
    }
}

/// A rendered form, or the error state shown in its place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FormView {
    Ready {
        title: String,
        submit_label: String,
        fields: Vec<FieldView>,
        /// HTML fragment of the whole form
        html: String,
    },
    Error {
        title: String,
        message: String,
    },
}

impl FormView {
    /// The error state for a schema that could not be used
    pub fn unparseable() -> Self {
        FormView::Error {
            title: ERROR_TITLE.to_string(),
            message: Error::FormSchema {
                reason: String::new(),
            }
            .client_message(),
        }
    }
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    title: &'a str,
    submit_label: &'a str,
    fields: &'a [FieldView],
}

/// Renders form views, holding the compiled HTML template
#[derive(Clone)]
pub struct FormRenderer {
    handlebars: Handlebars<'static>,
}

impl FormRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string("form", FORM_TEMPLATE)
            .map_err(|e| Error::Template {
                reason: e.to_string(),
            })?;
        Ok(Self { handlebars })
    }

    /// Build the view of a parsed schema
    pub fn view(&self, schema: &FormSchema) -> Result<FormView> {
        let title = schema
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_FORM_TITLE.to_string());
        let fields: Vec<FieldView> = schema.fields.iter().map(FieldView::from).collect();

        let html = self
            .handlebars
            .render(
                "form",
                &TemplateContext {
                    title: &title,
                    submit_label: SUBMIT_LABEL,
                    fields: &fields,
                },
            )
            .map_err(|e| Error::Template {
                reason: e.to_string(),
            })?;

        Ok(FormView::Ready {
            title,
            submit_label: SUBMIT_LABEL.to_string(),
            fields,
            html,
        })
    }

    /// Parse and view a schema string. Any failure yields the error state.
    pub fn render(&self, schema: &str) -> FormView {
        match FormSchema::parse(schema).and_then(|schema| self.view(&schema)) {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(error = %e, "form schema could not be rendered");
                FormView::unparseable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(kind: FieldKind, description: Option<&str>) -> FieldSpec {
        FieldSpec {
            key: "color".to_string(),
            label: "Color".to_string(),
            description: description.map(str::to_string),
            plain_string: kind == FieldKind::Text,
            kind,
            required: false,
        }
    }

    fn options(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("opt{}", i)).collect()
    }

    #[test]
    fn test_widget_for_choices() {
        let radio = FieldView::from(&field(FieldKind::Choice(options(3)), None));
        assert_eq!(radio.widget, Widget::Radio { options: options(3) });

        let select = FieldView::from(&field(FieldKind::Choice(options(4)), None));
        assert_eq!(
            select.widget,
            Widget::Select {
                placeholder: "Select Color".to_string(),
                options: options(4),
            }
        );
    }

    #[test]
    fn test_widget_for_inputs() {
        let text = FieldView::from(&field(FieldKind::Text, None));
        assert_eq!(
            text.widget,
            Widget::Input {
                input_type: InputType::Text,
                placeholder: "Enter Color".to_string(),
            }
        );

        let number = FieldView::from(&field(FieldKind::Numeric, Some("Favourite shade")));
        assert_eq!(
            number.widget,
            Widget::Input {
                input_type: InputType::Number,
                placeholder: "Favourite shade".to_string(),
            }
        );

        let checkbox = FieldView::from(&field(FieldKind::Boolean, Some("Tick if yes")));
        assert_eq!(
            checkbox.widget,
            Widget::Checkbox {
                caption: Some("Tick if yes".to_string()),
            }
        );
    }

    #[test]
    fn test_render_ready_view() {
        let renderer = FormRenderer::new().unwrap();
        let view = renderer.render(
            r#"{"properties": {
                "agree": {"type": "boolean", "title": "I agree"},
                "size": {"type": "string", "enum": ["S", "M", "L", "XL"]}
            }, "required": ["agree"]}"#,
        );

        match view {
            FormView::Ready {
                title,
                submit_label,
                fields,
                html,
            } => {
                assert_eq!(title, DEFAULT_FORM_TITLE);
                assert_eq!(submit_label, SUBMIT_LABEL);
                assert_eq!(fields.len(), 2);
                assert!(fields[0].required);
                assert!(html.contains(r#"type="checkbox""#));
                assert!(html.contains("<select"));
                assert!(html.contains("Select size"));
                assert!(html.contains("Submit Form"));
            }
            other => panic!("expected ready view, got {:?}", other),
        }
    }

    #[test]
    fn test_render_escapes_html() {
        let renderer = FormRenderer::new().unwrap();
        let view = renderer.render(
            r#"{"title": "<script>x</script>", "properties": {"q": {"type": "string", "enum": ["a<b"]}}}"#,
        );
        let FormView::Ready { html, .. } = view else {
            panic!("expected ready view");
        };
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains(r#"type="radio""#));
        assert!(html.contains("a&lt;b"));
    }

    #[test]
    fn test_render_error_state() {
        let renderer = FormRenderer::new().unwrap();
        let view = renderer.render("{ not json");
        assert_eq!(
            view,
            FormView::Error {
                title: "Error".to_string(),
                message: "Could not parse the form schema provided by the AI.".to_string(),
            }
        );
    }

    #[test]
    fn test_view_serializes_with_status_tag() {
        let json = serde_json::to_value(FormView::unparseable()).unwrap();
        assert_eq!(json["status"], "error");

        let renderer = FormRenderer::new().unwrap();
        let json = serde_json::to_value(renderer.render(r#"{"properties": {}}"#)).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["fields"], serde_json::json!([]));
    }
}
