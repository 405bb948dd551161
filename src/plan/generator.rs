use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PlanError;
use crate::llm::backend::{backend_for, TextBackendClient};
use crate::llm::gemini::GenerateContent;
use crate::plan::layout::check_layout;
use crate::plan::normalize::normalize_plans;
use crate::plan::records::PlanBatch;
use crate::plan::request::PlanRequestBuilder;
use crate::plan::types::UserInput;
use crate::utils::timing::log_llm_timing;

/// Turns a brief into a validated batch of plans with one text model call.
pub struct PlanGenerator {
    config: Arc<Config>,
    transport: Arc<dyn GenerateContent>,
    backend: Box<dyn TextBackendClient>,
}

impl PlanGenerator {
    pub fn new(config: Arc<Config>, transport: Arc<dyn GenerateContent>) -> Self {
        let backend = backend_for(&config);
        Self::with_backend(config, transport, backend)
    }

    pub fn with_backend(
        config: Arc<Config>,
        transport: Arc<dyn GenerateContent>,
        backend: Box<dyn TextBackendClient>,
    ) -> Self {
        Self {
            config,
            transport,
            backend,
        }
    }

    pub async fn generate(&self, input: UserInput) -> Result<PlanBatch, PlanError> {
        if input.total_count() == 0 {
            info!("No plans requested; skipping the text model");
            return Ok(PlanBatch::default());
        }
        input.validate()?;
        let Some(request) = PlanRequestBuilder::new(&self.config).build(&input) else {
            return Ok(PlanBatch::default());
        };

        let payload = self.backend.build_payload(&request);
        let model = self.config.text_model.as_str();
        let metadata = json!({
            "variant": self.backend.variant().as_str(),
            "portrait": request.portrait_count,
            "landscape": request.landscape_count,
        });

        let response = log_llm_timing("gemini", model, "generate_plans", Some(metadata), || {
            self.transport
                .generate_content(model, payload, "plan_system_instruction")
        })
        .await?;

        let raw = self
            .backend
            .read_text(&response)
            .ok_or(PlanError::EmptyResponse)?;
        let mut batch = normalize_plans(&raw)?;

        let report = check_layout(
            &request.expected_layout,
            &batch.plans,
            self.config.orientation_order.first(),
        );
        if !report.is_conformant() {
            warn!(
                "Returned plans do not match the requested layout: {}",
                report.issues().join("; ")
            );
        }
        info!(
            requested = request.total(),
            returned = batch.plans.len(),
            dropped = batch.dropped.len(),
            "Generated shooting plans"
        );
        batch.layout = Some(report);
        Ok(batch)
    }
}
