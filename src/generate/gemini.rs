//! Form generation through the Gemini `generateContent` REST endpoint

use super::{FormGenerator, GeneratedForm};
use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::source::data_uri;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const PROMPT: &str = "You are an expert at digitizing paper forms. \
Look at the image of a form and describe every field a person would fill in \
as a JSON Schema. The schema must be an object with a \"title\", \"type\": \"object\", \
\"properties\" and a \"required\" list. Each property needs a \"type\" of \"string\", \
\"number\" or \"boolean\", a human readable \"title\", and optionally a \"description\". \
Use \"enum\" for fields with a fixed set of choices such as checkbox groups. \
Keep the fields in the order they appear on the form. \
Return the schema serialized as a string in \"formSchema\", and short guidance \
for the person filling the form in \"instructions\".";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseSchema")]
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "formSchema": {
                "type": "STRING",
                "description": "JSON Schema of the form fields, serialized as a string"
            },
            "instructions": {
                "type": "STRING",
                "description": "Guidance for filling out the form"
            }
        },
        "required": ["formSchema", "instructions"]
    })
}

fn failed(reason: impl Into<String>) -> Error {
    Error::FormGeneration {
        reason: reason.into(),
        empty_schema: false,
    }
}

/// [`FormGenerator`] backed by a Gemini model
pub struct GeminiFormGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiFormGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::GeneratorUnavailable {
                reason: "no Gemini API key configured".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(mime_type: String, image: &[u8]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part {
                        text: Some(PROMPT.to_string()),
                        ..Default::default()
                    },
                    Part {
                        inline_data: Some(InlineData {
                            mime_type,
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        }),
                        ..Default::default()
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            },
        }
    }
}

/// Concatenated text of the first candidate
fn reply_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl FormGenerator for GeminiFormGenerator {
    async fn generate(&self, image_data_uri: &str) -> Result<GeneratedForm> {
        let (mime_type, image) = data_uri::decode(image_data_uri)?;
        let request = Self::build_request(mime_type, &image);

        tracing::debug!(
            model = %self.model,
            image_bytes = image.len(),
            "requesting form generation"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("status {}: {}", status, body)));
        }

        let response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("unreadable response: {}", e)))?;

        let text = reply_text(response).ok_or_else(|| failed("response had no text"))?;
        let form: GeneratedForm = serde_json::from_str(&text)
            .map_err(|e| failed(format!("reply is not a form description: {}", e)))?;

        form.ensure_schema()
    }
}
