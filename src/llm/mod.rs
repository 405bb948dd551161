pub mod backend;
pub mod gemini;
pub mod sketch;

pub use gemini::{GeminiHttpClient, GenerateContent};
pub use sketch::SketchDispatcher;
