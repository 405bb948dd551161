use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::PlanError;
use crate::utils::http::build_http_client;
use crate::utils::text::truncate_for_log;

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiResponse {
    pub candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiContent {
    pub parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: GeminiInlineData,
    },
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiInlineData {
    #[serde(rename = "mimeType", alias = "mime_type", default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &GeminiPart> {
        self.candidates
            .iter()
            .flatten()
            .filter_map(|candidate| candidate.content.as_ref())
            .filter_map(|content| content.parts.as_ref())
            .flatten()
    }

    /// Concatenated non-thought text of the first candidate, if any.
    pub fn first_candidate_text(&self) -> Option<String> {
        let parts = self
            .candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?;
        let text: String = parts
            .iter()
            .filter_map(|part| match part {
                GeminiPart::Text {
                    text,
                    thought: false,
                } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// First inline payload with data, across all candidates.
    pub fn first_inline_data(&self) -> Option<&GeminiInlineData> {
        self.parts().find_map(|part| match part {
            GeminiPart::InlineData { inline_data } if !inline_data.data.trim().is_empty() => {
                Some(inline_data)
            }
            _ => None,
        })
    }
}

/// One `generateContent` call against some model. The HTTP client is the
/// production implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait GenerateContent: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        payload: Value,
        label: &str,
    ) -> Result<GeminiResponse, PlanError>;
}

pub fn build_endpoint(base_url: &str, model: &str, api_key: &str) -> Result<Url, PlanError> {
    let raw = format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model.trim()
    );
    let mut url = Url::parse(&raw)
        .map_err(|err| PlanError::Transport(format!("invalid endpoint {raw}: {err}")))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

pub fn normalize_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

/// Declared MIME type, or a sniffed one when the backend left it blank.
pub fn resolve_inline_mime(inline: &GeminiInlineData) -> String {
    let declared = normalize_mime_type(&inline.mime_type);
    if !declared.is_empty() {
        return declared;
    }
    general_purpose::STANDARD
        .decode(inline.data.trim())
        .ok()
        .and_then(|bytes| infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| "image/png".to_string())
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

pub fn summarize_payload(payload: &Value, label: &str) -> Value {
    let mut summary = Map::new();

    if payload.pointer("/systemInstruction").is_some() {
        summary.insert(
            "systemInstruction".to_string(),
            Value::String(label.to_string()),
        );
    }

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized = contents
            .iter()
            .map(|content| {
                let role = content
                    .get("role")
                    .and_then(|value| value.as_str())
                    .unwrap_or("user");
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_parts(parts))
                    .unwrap_or_default();
                json!({ "role": role, "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized));
    }

    if let Some(config) = payload.get("generationConfig") {
        let mut config = config.clone();
        if let Some(object) = config.as_object_mut() {
            if object.remove("responseSchema").is_some() {
                object.insert("responseSchema".to_string(), json!("<plan schema>"));
            }
        }
        summary.insert("generationConfig".to_string(), config);
    }

    Value::Object(summary)
}

pub fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for part in response.parts() {
        match part {
            GeminiPart::Text { text, .. } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if normalize_mime_type(&inline_data.mime_type).starts_with("image/") {
                    image_parts += 1;
                }
            }
            GeminiPart::Other(_) => {}
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

pub fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Single-attempt HTTP transport for the generateContent endpoint.
pub struct GeminiHttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiHttpClient {
    pub fn new(config: &Config) -> Result<Self, PlanError> {
        let client = build_http_client(config.request_timeout)
            .map_err(|err| PlanError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }
}

#[async_trait]
impl GenerateContent for GeminiHttpClient {
    async fn generate_content(
        &self,
        model: &str,
        payload: Value,
        label: &str,
    ) -> Result<GeminiResponse, PlanError> {
        let url = build_endpoint(&self.base_url, model, &self.api_key)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_payload(&payload, label);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let response = match self.client.post(url).json(&payload).send().await {
            Ok(response) => response,
            Err(err) => {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, model={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    model
                );
                return Err(PlanError::Transport(err_text));
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| PlanError::Transport(self.redact(&err.to_string())))?;

        if !status.is_success() {
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            return Err(PlanError::Http {
                status: status.as_u16(),
                message: message.unwrap_or(body_summary),
            });
        }

        let value = serde_json::from_str::<GeminiResponse>(&body).map_err(|err| {
            warn!(
                "Gemini response body could not be decoded: {} (body={})",
                err,
                truncate_for_log(&body, 500)
            );
            PlanError::Transport(format!("undecodable response body: {err}"))
        })?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_response(&value);
            debug!(target: "llm.gemini", model = model, response = %response_summary);
        }
        Ok(value)
    }
}
