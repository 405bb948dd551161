use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::plan::layout::expected_layout;
use crate::plan::types::{AspectRatio, PlanField, UserInput};

/// Everything a text backend needs to ask for a batch of plans.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub expected_layout: Vec<AspectRatio>,
    pub portrait_count: u32,
    pub landscape_count: u32,
}

impl PlanRequest {
    pub fn total(&self) -> usize {
        self.expected_layout.len()
    }
}

pub struct PlanRequestBuilder<'a> {
    config: &'a Config,
}

impl<'a> PlanRequestBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// `None` when no plans were asked for; the caller returns an empty
    /// collection without touching the network.
    pub fn build(&self, input: &UserInput) -> Option<PlanRequest> {
        let total = input.total_count();
        if total == 0 {
            return None;
        }

        let first = self.config.orientation_order.first();
        let layout = expected_layout(input.portrait_count, input.landscape_count, first);

        Some(PlanRequest {
            system_instruction: self.system_instruction(total),
            prompt: build_user_prompt(input, first),
            expected_layout: layout,
            portrait_count: input.portrait_count,
            landscape_count: input.landscape_count,
        })
    }

    fn system_instruction(&self, total: u32) -> String {
        let config = self.config;
        format!(
            r#"You are a top portrait photography mentor with 20 years of experience. You are coaching a complete beginner who shoots with a {body} and a {lens} lens.

Design exactly {total} step-by-step shooting plans from the user's brief.

Gear constraints:
1. Never suggest an aperture wider than the lens allows. When background blur is needed, recommend the long end of the zoom and moving closer.
2. Leave some room around the subject so the shot can be cropped later.
3. Rely on in-body stabilization for static shots; do not go slower than 1/60s.

Every instruction must be something a beginner can follow literally:
- compositionGuide: no abstract words. Say where to place the eyes on the grid lines, or where the horizon sits in the frame.
- lightingGuide: not just "front light" or "back light". Say where the model stands relative to the light and how the face turns.
- photographerPosition: describe the photographer's body, e.g. kneel on one knee with the camera at chest height.
- modelDirecting: give one exact line to say to the model.

imagePrompt is written in English and describes a minimalist black and white line drawing sketch of the composition.
All other guidance text is written in {language}, encouraging, clear and extremely concrete."#,
            body = config.camera_body,
            lens = config.camera_lens,
            total = total,
            language = config.guidance_language,
        )
    }
}

fn range_label(start: u32, end: u32) -> String {
    if start == end {
        format!("Plan {start}")
    } else {
        format!("Plans {start}-{end}")
    }
}

fn build_user_prompt(input: &UserInput, first: AspectRatio) -> String {
    let total = input.total_count();
    let mut prompt = format!(
        "Brief:\nSubject: {}\nLocation: {}\nEnvironment: {}\nDesired style: {}\n\nCreate exactly {} extremely detailed, beginner-friendly shooting plans.\n",
        input.subject.trim(),
        input.location.trim(),
        input.environment.trim(),
        input.style.trim(),
        total
    );

    let mut next = 1;
    for ratio in [first, first.other()] {
        let count = input.count_for(ratio);
        if count == 0 {
            continue;
        }
        prompt.push_str(&format!(
            "{}: {} {} composition (targetAspectRatio \"{}\").\n",
            range_label(next, next + count - 1),
            ratio.as_str(),
            ratio.label(),
            ratio.as_str()
        ));
        next += count;
    }

    if input.portrait_count > 0 && input.landscape_count > 0 {
        prompt.push_str(&format!(
            "List every {} plan before any {} plan. Do not interleave orientations.\n",
            first.as_str(),
            first.other().as_str()
        ));
    }

    prompt
}

/// Structured output schema in the generateContent `responseSchema` dialect.
pub fn plan_schema() -> Value {
    let mut properties = Map::new();
    for field in PlanField::ALL {
        let mut property = json!({
            "type": "STRING",
            "description": field.description(),
        });
        if field == PlanField::TargetAspectRatio {
            property["enum"] = json!(AspectRatio::ALL.map(AspectRatio::as_str));
        }
        properties.insert(field.key().to_string(), property);
    }
    let required: Vec<&str> = PlanField::ALL.iter().map(|field| field.key()).collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "plans": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": Value::Object(properties),
                    "required": required,
                }
            }
        },
        "required": ["plans"],
    })
}

/// The same contract as [`plan_schema`], spelled out for backends that
/// cannot take a schema.
pub fn contract_instructions() -> String {
    let mut text = String::from(
        "Output format:\nReturn ONLY one raw JSON object, no markdown fences, no comments, no text before or after it.\nThe object has a single key \"plans\" whose value is an array of plan objects.\nEvery plan object has exactly these keys, all required, all JSON strings, none empty:\n",
    );
    for field in PlanField::ALL {
        text.push_str(&format!("- \"{}\": {}\n", field.key(), field.description()));
    }
    text.push_str(&format!(
        "\"{}\" must be exactly \"{}\" or \"{}\"; no other value is allowed.\n",
        PlanField::TargetAspectRatio.key(),
        AspectRatio::Portrait.as_str(),
        AspectRatio::Landscape.as_str()
    ));
    text
}
