use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::gemini::{resolve_inline_mime, GeminiResponse, GenerateContent};
use crate::plan::types::{AspectRatio, PlanRecord};
use crate::utils::text::truncate_for_log;
use crate::utils::timing::log_llm_timing;

pub const SKETCH_STYLE_DIRECTIVE: &str = "Style: minimalist black and white line drawing sketch. No color, no shading, clean outlines, clear composition showing where the subject sits in the frame.";

/// `data:` URI for the first inline image in the response.
pub fn sketch_data_uri(response: &GeminiResponse) -> Option<String> {
    let inline = response.first_inline_data()?;
    let mime_type = resolve_inline_mime(inline);
    if !mime_type.starts_with("image/") {
        return None;
    }
    Some(format!("data:{};base64,{}", mime_type, inline.data.trim()))
}

pub fn build_sketch_payload(prompt: &str, ratio: AspectRatio) -> Value {
    let text = format!(
        "{}\n\n{}\nAspect ratio: {}.",
        prompt.trim(),
        SKETCH_STYLE_DIRECTIVE,
        ratio.as_str()
    );
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": ratio.as_str() },
        },
    })
}

/// Requests one composition sketch per plan. Every failure ends in `None`
/// for that plan only.
pub struct SketchDispatcher {
    config: Arc<Config>,
    transport: Arc<dyn GenerateContent>,
}

impl SketchDispatcher {
    pub fn new(config: Arc<Config>, transport: Arc<dyn GenerateContent>) -> Self {
        Self { config, transport }
    }

    pub async fn dispatch_for(&self, plan: &PlanRecord) -> Option<String> {
        self.dispatch(&plan.image_prompt, plan.target_aspect_ratio.as_str())
            .await
    }

    pub async fn dispatch(&self, prompt: &str, aspect_ratio: &str) -> Option<String> {
        if prompt.trim().is_empty() {
            warn!("Skipping sketch request with an empty prompt");
            return None;
        }

        let ratio = AspectRatio::coerce(aspect_ratio);
        let payload = build_sketch_payload(prompt, ratio);
        let model = self.config.image_model.as_str();
        let metadata = json!({ "aspectRatio": ratio.as_str() });

        let result = log_llm_timing("gemini", model, "generate_sketch", Some(metadata), || {
            self.transport
                .generate_content(model, payload, "sketch_prompt")
        })
        .await;

        match result {
            Ok(response) => {
                let uri = sketch_data_uri(&response);
                if uri.is_none() {
                    info!(
                        "Image model returned no inline image for prompt: {}",
                        truncate_for_log(prompt, 120)
                    );
                }
                uri
            }
            Err(err) => {
                warn!(
                    model = model,
                    "Sketch generation failed: {} (prompt={})",
                    err,
                    truncate_for_log(prompt, 120)
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::error::PlanError;
    use crate::llm::gemini::tests::{text_response, FakeTransport};

    fn dispatcher(transport: Arc<FakeTransport>) -> SketchDispatcher {
        SketchDispatcher::new(Arc::new(test_config()), transport)
    }

    fn image_response(mime: &str, data: &str) -> Value {
        json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here is your sketch" },
                { "inlineData": { "mimeType": mime, "data": data } }
            ] } }]
        })
    }

    #[tokio::test]
    async fn returns_data_uri_for_inline_image() {
        let transport = Arc::new(FakeTransport::with(vec![Ok(image_response(
            "image/png",
            "iVBORw0KGgo=",
        ))]));
        let uri = dispatcher(transport.clone())
            .dispatch("woman reading by the window", "16:9")
            .await;
        assert_eq!(uri.as_deref(), Some("data:image/png;base64,iVBORw0KGgo="));

        let calls = transport.calls.lock();
        let (model, payload) = &calls[0];
        assert_eq!(model, "gemini-2.5-flash-image");
        assert_eq!(payload["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        let text = payload["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("woman reading by the window"));
        assert!(text.contains("black and white line drawing"));
    }

    #[tokio::test]
    async fn renormalizes_unknown_ratio_to_portrait() {
        let transport = Arc::new(FakeTransport::with(vec![Ok(image_response(
            "image/png",
            "AAAA",
        ))]));
        dispatcher(transport.clone()).dispatch("prompt", "4:3").await;
        let calls = transport.calls.lock();
        assert_eq!(calls[0].1["generationConfig"]["imageConfig"]["aspectRatio"], "9:16");
    }

    #[tokio::test]
    async fn missing_inline_data_is_absence_not_error() {
        let transport = Arc::new(FakeTransport::with(vec![
            Ok(text_response("I can only describe it in words.")),
            Ok(image_response("image/webp", "UklGRg==")),
        ]));
        let dispatcher = dispatcher(transport.clone());

        let prompts = ["first", "second"];
        let mut results = Vec::new();
        for prompt in prompts {
            results.push(dispatcher.dispatch(prompt, "9:16").await);
        }
        assert_eq!(results[0], None);
        assert_eq!(results[1].as_deref(), Some("data:image/webp;base64,UklGRg=="));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn backend_errors_degrade_to_absence() {
        let transport = Arc::new(FakeTransport::with(vec![Err(PlanError::Http {
            status: 500,
            message: "internal".into(),
        })]));
        assert_eq!(dispatcher(transport).dispatch("prompt", "16:9").await, None);
    }

    #[tokio::test]
    async fn empty_prompt_skips_the_request() {
        let transport = Arc::new(FakeTransport::default());
        assert_eq!(dispatcher(transport.clone()).dispatch("  ", "16:9").await, None);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn ignores_non_image_inline_payloads() {
        let response: GeminiResponse =
            serde_json::from_value(image_response("text/plain", "aGVsbG8=")).unwrap();
        assert!(sketch_data_uri(&response).is_none());
    }
}
