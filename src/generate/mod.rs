//! AI generation of fillable forms from images of paper forms

mod gemini;

pub use gemini::GeminiFormGenerator;

use crate::error::{Error, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the model returns: a form schema as a JSON string plus usage notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedForm {
    #[serde(rename = "formSchema")]
    pub form_schema: String,
    #[serde(default)]
    pub instructions: String,
}

impl GeneratedForm {
    /// Reject replies that carry no schema at all
    pub fn ensure_schema(self) -> Result<Self> {
        if self.form_schema.trim().is_empty() {
            return Err(Error::FormGeneration {
                reason: "model returned an empty formSchema".to_string(),
                empty_schema: true,
            });
        }
        Ok(self)
    }
}

/// Produces a form description from an image given as a `data:` URI
#[async_trait]
pub trait FormGenerator: Send + Sync {
    async fn generate(&self, image_data_uri: &str) -> Result<GeneratedForm>;
}
