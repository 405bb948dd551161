use crate::plan::records::DroppedRecord;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A generation request is already in progress")]
    GenerationInProgress,

    #[error("Gemini request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Gemini request failed: {0}")]
    Transport(String),

    #[error("Model returned nothing")]
    EmptyResponse,

    #[error("Model response could not be parsed as JSON: {reason}")]
    MalformedResponse {
        raw: String,
        cleaned: String,
        reason: String,
    },

    #[error("All {} returned plan(s) were invalid", dropped.len())]
    Validation { dropped: Vec<DroppedRecord> },
}

impl PlanError {
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::InvalidInput(_) => "invalid_input",
            PlanError::GenerationInProgress => "in_progress",
            PlanError::Http { .. } => "http",
            PlanError::Transport(_) => "transport",
            PlanError::EmptyResponse => "empty_response",
            PlanError::MalformedResponse { .. } => "malformed_response",
            PlanError::Validation { .. } => "validation",
        }
    }
}
