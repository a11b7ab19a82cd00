//! Dynamic forms described by a JSON Schema-like document
//!
//! The schema decides the fields, how each is displayed, and how a
//! submission is validated.

mod schema;
mod validate;
mod view;

pub use schema::{FieldKind, FieldSpec, FormSchema};
pub use validate::FormValues;
pub use view::{
    FieldView, FormRenderer, FormView, InputType, Widget, DEFAULT_FORM_TITLE, ERROR_TITLE,
    SUBMIT_LABEL,
};

/// Toast title shown after a successful submission
pub const SUBMITTED_MESSAGE: &str = "Form Submitted!";
