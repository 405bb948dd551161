use serde_json::{json, Value};

use crate::config::{Config, TextBackendVariant};
use crate::llm::gemini::GeminiResponse;
use crate::plan::request::{contract_instructions, plan_schema, PlanRequest};

/// One way of talking to the text model. Both variants ask for the same
/// contract; they differ in how it is transmitted.
pub trait TextBackendClient: Send + Sync {
    fn variant(&self) -> TextBackendVariant;

    fn build_payload(&self, request: &PlanRequest) -> Value;

    /// The raw model text, or `None` when the model produced nothing.
    fn read_text(&self, response: &GeminiResponse) -> Option<String> {
        response.first_candidate_text()
    }
}

#[derive(Debug, Clone)]
struct GenerationSettings {
    temperature: f32,
    max_output_tokens: i32,
}

impl GenerationSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Sends the contract as `responseSchema` with JSON response mode.
#[derive(Debug, Clone)]
pub struct SchemaBackend {
    settings: GenerationSettings,
}

impl TextBackendClient for SchemaBackend {
    fn variant(&self) -> TextBackendVariant {
        TextBackendVariant::Schema
    }

    fn build_payload(&self, request: &PlanRequest) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "maxOutputTokens": self.settings.max_output_tokens,
                "responseMimeType": "application/json",
                "responseSchema": plan_schema(),
            },
        })
    }
}

/// Folds the contract into the prompt for backends without schema support.
#[derive(Debug, Clone)]
pub struct PromptBackend {
    settings: GenerationSettings,
}

impl TextBackendClient for PromptBackend {
    fn variant(&self) -> TextBackendVariant {
        TextBackendVariant::Prompt
    }

    fn build_payload(&self, request: &PlanRequest) -> Value {
        let prompt = format!("{}\n{}", request.prompt, contract_instructions());
        json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "maxOutputTokens": self.settings.max_output_tokens,
            },
        })
    }
}

pub fn backend_for(config: &Config) -> Box<dyn TextBackendClient> {
    let settings = GenerationSettings::from_config(config);
    match config.text_backend {
        TextBackendVariant::Schema => Box::new(SchemaBackend { settings }),
        TextBackendVariant::Prompt => Box::new(PromptBackend { settings }),
    }
}
