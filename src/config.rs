use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::plan::types::AspectRatio;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is required")]
    MissingApiKey,
    #[error("Invalid GEMINI_BASE_URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// How the plan contract reaches the text model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBackendVariant {
    /// `responseSchema` + `responseMimeType` in the generation config.
    Schema,
    /// Contract folded into the prompt body as plain instructions.
    Prompt,
}

impl TextBackendVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            TextBackendVariant::Schema => "schema",
            TextBackendVariant::Prompt => "prompt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationOrder {
    PortraitFirst,
    LandscapeFirst,
}

impl OrientationOrder {
    pub fn first(self) -> AspectRatio {
        match self {
            OrientationOrder::PortraitFirst => AspectRatio::Portrait,
            OrientationOrder::LandscapeFirst => AspectRatio::Landscape,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub text_backend: TextBackendVariant,
    pub orientation_order: OrientationOrder,
    pub temperature: f32,
    pub max_output_tokens: i32,
    pub camera_body: String,
    pub camera_lens: String,
    pub guidance_language: String,
    pub request_timeout: Option<Duration>,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub export_dir: Option<PathBuf>,
    /// Fallback notices raised while loading, logged once logging is up.
    pub warnings: Vec<String>,
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_string(lookup: Lookup<'_>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional(lookup: Lookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_f32(lookup: Lookup<'_>, name: &str, default: f32) -> f32 {
    lookup(name)
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(lookup: Lookup<'_>, name: &str, default: i32) -> i32 {
    lookup(name)
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(lookup: Lookup<'_>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env_optional(lookup, name) {
        None => Ok(default),
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

fn normalize_base_url(value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/').to_string();
    let parsed = Url::parse(&trimmed).map_err(|err| ConfigError::InvalidBaseUrl {
        value: value.clone(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value,
            reason: "scheme must be http or https".to_string(),
        });
    }
    Ok(trimmed)
}

fn parse_text_backend(value: String, warnings: &mut Vec<String>) -> TextBackendVariant {
    match value.to_lowercase().as_str() {
        "schema" | "structured" => TextBackendVariant::Schema,
        "prompt" | "text" | "instructed" => TextBackendVariant::Prompt,
        _ => {
            warnings.push(format!(
                "Unknown TEXT_BACKEND_VARIANT value '{value}'; defaulting to schema."
            ));
            TextBackendVariant::Schema
        }
    }
}

fn parse_orientation_order(value: String, warnings: &mut Vec<String>) -> OrientationOrder {
    match value.to_lowercase().replace('_', "-").as_str() {
        "portrait-first" | "portrait" => OrientationOrder::PortraitFirst,
        "landscape-first" | "landscape" => OrientationOrder::LandscapeFirst,
        _ => {
            warnings.push(format!(
                "Unknown ORIENTATION_ORDER value '{value}'; defaulting to portrait-first."
            ));
            OrientationOrder::PortraitFirst
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(&|name| env::var(name).ok())
    }

    pub fn from_source(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let api_key = env_optional(lookup, "GEMINI_API_KEY")
            .or_else(|| env_optional(lookup, "API_KEY"))
            .ok_or(ConfigError::MissingApiKey)?;

        let base_url = normalize_base_url(env_string(lookup, "GEMINI_BASE_URL", DEFAULT_BASE_URL))?;
        let timeout_secs = env_u64(lookup, "REQUEST_TIMEOUT_SECONDS", 0)?;
        let mut warnings = Vec::new();
        let text_backend = parse_text_backend(
            env_string(lookup, "TEXT_BACKEND_VARIANT", "schema"),
            &mut warnings,
        );
        let orientation_order = parse_orientation_order(
            env_string(lookup, "ORIENTATION_ORDER", "portrait-first"),
            &mut warnings,
        );

        Ok(Config {
            api_key,
            base_url,
            text_model: env_string(lookup, "GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            image_model: env_string(lookup, "GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            text_backend,
            orientation_order,
            temperature: env_f32(lookup, "GEMINI_TEMPERATURE", 0.7),
            max_output_tokens: env_i32(lookup, "GEMINI_MAX_OUTPUT_TOKENS", 8192),
            camera_body: env_string(lookup, "CAMERA_BODY", "Sony A7R3"),
            camera_lens: env_string(lookup, "CAMERA_LENS", "24-70mm F4"),
            guidance_language: env_string(lookup, "GUIDANCE_LANGUAGE", "Simplified Chinese"),
            request_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            log_level: env_string(lookup, "LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string(lookup, "LOG_DIR", "logs")),
            export_dir: env_optional(lookup, "EXPORT_DIR").map(PathBuf::from),
            warnings,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_source(&|name| match name {
        "GEMINI_API_KEY" => Some("test-key".to_string()),
        "GEMINI_BASE_URL" => Some("http://127.0.0.1:9".to_string()),
        _ => None,
    })
    .expect("test config")
}
