//! HTTP transport to the classification endpoint
//!
//! Speaks the structured-responses wire shape: the request carries the
//! model id, system instructions, the user prompt, and a json_schema
//! response format; the reply's output text is extracted from either
//! the `output_text` convenience field or the first output message's
//! first content block. Retry decisions happen upstream; this client
//! only maps failures into transient/permanent classes.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::ModelSettings;
use crate::error::ClassifierError;
use crate::types::{ClassifierTransport, ClassifyRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    text: WireText<'a>,
}

#[derive(Serialize)]
struct WireText<'a> {
    format: WireFormat<'a>,
}

#[derive(Serialize)]
struct WireFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    schema: &'a serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ClassifierClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ClassifierClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
        })
    }
}

/// Pull the model's text out of a responses-API reply body
///
/// Prefers the flattened `output_text` field; falls back to
/// `output[0].content[0].text`.
pub fn extract_output_text(body: &str) -> Result<String, ClassifierError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ClassifierError::MissingOutput(format!("body is not JSON: {e}")))?;

    if let Some(text) = value.get("output_text").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            return Ok(text.to_string());
        }
    }
    if let Some(text) = value
        .pointer("/output/0/content/0/text")
        .and_then(|v| v.as_str())
    {
        if !text.is_empty() {
            return Ok(text.to_string());
        }
    }
    Err(ClassifierError::MissingOutput(
        "no output_text or output[0].content[0].text".to_string(),
    ))
}

#[async_trait::async_trait]
impl ClassifierTransport for ClassifierClient {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        let wire = WireRequest {
            model: &request.model,
            instructions: &request.system_instructions,
            input: &request.user_prompt,
            text: WireText {
                format: WireFormat {
                    kind: "json_schema",
                    schema: &request.response_schema,
                },
            },
        };

        let mut builder = self.client.post(&self.endpoint).json(&wire);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "classifier endpoint error");
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        extract_output_text(&body)
    }
}
