use serde::{Deserialize, Serialize};

use crate::error::PlanError;

pub const MAX_COUNT_PER_ORIENTATION: u32 = 5;

/// The two framings a plan can target. Anything else the model sends is
/// coerced to [`AspectRatio::Portrait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 2] = [AspectRatio::Portrait, AspectRatio::Landscape];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
        }
    }

    pub fn coerce(value: &str) -> Self {
        if value == "16:9" {
            AspectRatio::Landscape
        } else {
            AspectRatio::Portrait
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "vertical (portrait)",
            AspectRatio::Landscape => "horizontal (landscape)",
        }
    }

    pub fn other(self) -> Self {
        match self {
            AspectRatio::Portrait => AspectRatio::Landscape,
            AspectRatio::Landscape => AspectRatio::Portrait,
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    #[serde(alias = "person")]
    pub subject: String,
    pub location: String,
    pub environment: String,
    pub style: String,
    #[serde(default)]
    pub portrait_count: u32,
    #[serde(default)]
    pub landscape_count: u32,
}

impl UserInput {
    pub fn total_count(&self) -> u32 {
        self.portrait_count.saturating_add(self.landscape_count)
    }

    pub fn count_for(&self, ratio: AspectRatio) -> u32 {
        match ratio {
            AspectRatio::Portrait => self.portrait_count,
            AspectRatio::Landscape => self.landscape_count,
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let text_fields = [
            ("subject", &self.subject),
            ("location", &self.location),
            ("environment", &self.environment),
            ("style", &self.style),
        ];
        for (name, value) in text_fields {
            if value.trim().is_empty() {
                return Err(PlanError::InvalidInput(format!("{name} must not be empty")));
            }
        }

        for ratio in AspectRatio::ALL {
            let count = self.count_for(ratio);
            if count > MAX_COUNT_PER_ORIENTATION {
                return Err(PlanError::InvalidInput(format!(
                    "{} count must be between 0 and {}, got {}",
                    ratio.as_str(),
                    MAX_COUNT_PER_ORIENTATION,
                    count
                )));
            }
        }

        Ok(())
    }
}

/// Every field the plan contract requires, in contract order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanField {
    Title,
    TargetAspectRatio,
    ImagePrompt,
    FocalLength,
    Aperture,
    ShutterSpeed,
    Iso,
    WhiteBalance,
    ColorTint,
    Distance,
    Angle,
    LightingGuide,
    CompositionGuide,
    PhotographerPosition,
    PoseAction,
    PoseEyes,
    ModelDirecting,
    ExpertAdvice,
}

impl PlanField {
    pub const ALL: [PlanField; 18] = [
        PlanField::Title,
        PlanField::TargetAspectRatio,
        PlanField::ImagePrompt,
        PlanField::FocalLength,
        PlanField::Aperture,
        PlanField::ShutterSpeed,
        PlanField::Iso,
        PlanField::WhiteBalance,
        PlanField::ColorTint,
        PlanField::Distance,
        PlanField::Angle,
        PlanField::LightingGuide,
        PlanField::CompositionGuide,
        PlanField::PhotographerPosition,
        PlanField::PoseAction,
        PlanField::PoseEyes,
        PlanField::ModelDirecting,
        PlanField::ExpertAdvice,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PlanField::Title => "title",
            PlanField::TargetAspectRatio => "targetAspectRatio",
            PlanField::ImagePrompt => "imagePrompt",
            PlanField::FocalLength => "focalLength",
            PlanField::Aperture => "aperture",
            PlanField::ShutterSpeed => "shutterSpeed",
            PlanField::Iso => "iso",
            PlanField::WhiteBalance => "whiteBalance",
            PlanField::ColorTint => "colorTint",
            PlanField::Distance => "distance",
            PlanField::Angle => "angle",
            PlanField::LightingGuide => "lightingGuide",
            PlanField::CompositionGuide => "compositionGuide",
            PlanField::PhotographerPosition => "photographerPosition",
            PlanField::PoseAction => "poseAction",
            PlanField::PoseEyes => "poseEyes",
            PlanField::ModelDirecting => "modelDirecting",
            PlanField::ExpertAdvice => "expertAdvice",
        }
    }

    /// snake_case spelling some prompt-instructed backends return.
    pub fn snake_key(self) -> &'static str {
        match self {
            PlanField::Title => "title",
            PlanField::TargetAspectRatio => "target_aspect_ratio",
            PlanField::ImagePrompt => "image_prompt",
            PlanField::FocalLength => "focal_length",
            PlanField::Aperture => "aperture",
            PlanField::ShutterSpeed => "shutter_speed",
            PlanField::Iso => "iso",
            PlanField::WhiteBalance => "white_balance",
            PlanField::ColorTint => "color_tint",
            PlanField::Distance => "distance",
            PlanField::Angle => "angle",
            PlanField::LightingGuide => "lighting_guide",
            PlanField::CompositionGuide => "composition_guide",
            PlanField::PhotographerPosition => "photographer_position",
            PlanField::PoseAction => "pose_action",
            PlanField::PoseEyes => "pose_eyes",
            PlanField::ModelDirecting => "model_directing",
            PlanField::ExpertAdvice => "expert_advice",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PlanField::Title => "Plan name with an artistic feel",
            PlanField::TargetAspectRatio => "Framing, must be exactly '9:16' or '16:9'",
            PlanField::ImagePrompt => "English prompt for a composition sketch",
            PlanField::FocalLength => "Exact focal length (e.g. 55mm)",
            PlanField::Aperture => "Aperture (e.g. F4.0 - F11)",
            PlanField::ShutterSpeed => "Shutter speed (e.g. 1/125s)",
            PlanField::Iso => "ISO value",
            PlanField::WhiteBalance => "White balance mode or Kelvin value",
            PlanField::ColorTint => "Tint shift (e.g. M1 A2)",
            PlanField::Distance => "Exact distance to the model (e.g. 1.5 m)",
            PlanField::Angle => "Short description of the shooting angle (e.g. low angle)",
            PlanField::LightingGuide => {
                "Step-by-step lighting and positioning instruction a beginner can follow"
            }
            PlanField::CompositionGuide => {
                "Concrete framing instruction, e.g. where to place the eyes on the grid"
            }
            PlanField::PhotographerPosition => {
                "Photographer body posture, e.g. kneel so the lens is level with the knees"
            }
            PlanField::PoseAction => "What the model does",
            PlanField::PoseEyes => "Where and how the model looks",
            PlanField::ModelDirecting => "The exact line to say to the model",
            PlanField::ExpertAdvice => "One-sentence finishing touch or pitfall to avoid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub title: String,
    pub target_aspect_ratio: AspectRatio,
    pub image_prompt: String,
    pub focal_length: String,
    pub aperture: String,
    pub shutter_speed: String,
    pub iso: String,
    pub white_balance: String,
    pub color_tint: String,
    pub distance: String,
    pub angle: String,
    pub lighting_guide: String,
    pub composition_guide: String,
    pub photographer_position: String,
    pub pose_action: String,
    pub pose_eyes: String,
    pub model_directing: String,
    pub expert_advice: String,
}
