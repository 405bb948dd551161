use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PlanError;
use crate::plan::layout::LayoutReport;
use crate::plan::types::{AspectRatio, PlanField, PlanRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedRecord {
    pub index: usize,
    pub missing: Vec<&'static str>,
}

/// Validated plans in backend order, plus what was discarded on the way.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanBatch {
    pub plans: Vec<PlanRecord>,
    pub dropped: Vec<DroppedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutReport>,
}

fn lookup<'a>(object: &'a Map<String, Value>, field: PlanField) -> Option<&'a Value> {
    object
        .get(field.key())
        .or_else(|| object.get(field.snake_key()))
}

fn display_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn coerce_aspect_ratio(object: &Map<String, Value>, index: usize) -> AspectRatio {
    let raw = lookup(object, PlanField::TargetAspectRatio).and_then(Value::as_str);
    let ratio = AspectRatio::coerce(raw.unwrap_or_default());
    if raw != Some(ratio.as_str()) {
        debug!(
            index,
            received = ?raw,
            coerced = ratio.as_str(),
            "Coerced plan aspect ratio"
        );
    }
    ratio
}

fn record_from_value(value: &Value, index: usize) -> Result<PlanRecord, DroppedRecord> {
    let Some(object) = value.as_object() else {
        return Err(DroppedRecord {
            index,
            missing: vec!["<record is not an object>"],
        });
    };

    let mut missing = Vec::new();
    let mut take = |field: PlanField| match lookup(object, field).and_then(display_string) {
        Some(text) => text,
        None => {
            missing.push(field.key());
            String::new()
        }
    };

    let record = PlanRecord {
        title: take(PlanField::Title),
        target_aspect_ratio: AspectRatio::Portrait,
        image_prompt: take(PlanField::ImagePrompt),
        focal_length: take(PlanField::FocalLength),
        aperture: take(PlanField::Aperture),
        shutter_speed: take(PlanField::ShutterSpeed),
        iso: take(PlanField::Iso),
        white_balance: take(PlanField::WhiteBalance),
        color_tint: take(PlanField::ColorTint),
        distance: take(PlanField::Distance),
        angle: take(PlanField::Angle),
        lighting_guide: take(PlanField::LightingGuide),
        composition_guide: take(PlanField::CompositionGuide),
        photographer_position: take(PlanField::PhotographerPosition),
        pose_action: take(PlanField::PoseAction),
        pose_eyes: take(PlanField::PoseEyes),
        model_directing: take(PlanField::ModelDirecting),
        expert_advice: take(PlanField::ExpertAdvice),
    };

    if !missing.is_empty() {
        return Err(DroppedRecord { index, missing });
    }

    Ok(PlanRecord {
        target_aspect_ratio: coerce_aspect_ratio(object, index),
        ..record
    })
}

/// Validates the parsed payload's `plans` list. Invalid records are dropped
/// and reported; the batch only fails when every returned record is invalid.
pub fn records_from_payload(payload: Value, raw: &str) -> Result<PlanBatch, PlanError> {
    let plans = match payload.get("plans") {
        None => {
            warn!("Model payload has no `plans` key; treating as zero plans");
            return Ok(PlanBatch::default());
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(PlanError::MalformedResponse {
                raw: raw.to_string(),
                cleaned: payload.to_string(),
                reason: format!("`plans` must be an array, found {}", json_kind(other)),
            });
        }
    };

    let mut batch = PlanBatch::default();
    for (index, item) in plans.iter().enumerate() {
        match record_from_value(item, index) {
            Ok(record) => batch.plans.push(record),
            Err(dropped) => {
                warn!(
                    "Dropping plan {} with missing fields: {}",
                    index,
                    dropped.missing.join(", ")
                );
                batch.dropped.push(dropped);
            }
        }
    }

    if batch.plans.is_empty() && !batch.dropped.is_empty() {
        return Err(PlanError::Validation {
            dropped: batch.dropped,
        });
    }
    if !batch.dropped.is_empty() {
        warn!(
            "Plan shortfall: kept {} of {} returned plan(s)",
            batch.plans.len(),
            plans.len()
        );
    }

    Ok(batch)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub(crate) fn record_value(title: &str, ratio: &str) -> Value {
        json!({
            "title": title,
            "targetAspectRatio": ratio,
            "imagePrompt": format!("{title} sketch"),
            "focalLength": "55mm",
            "aperture": "F4.0",
            "shutterSpeed": "1/160s",
            "iso": "200",
            "whiteBalance": "5200K",
            "colorTint": "M1 A2",
            "distance": "1.5 m",
            "angle": "eye level",
            "lightingGuide": "Stand the model one metre from the window, face turned 45 degrees to it.",
            "compositionGuide": "Put the left eye on the upper-right grid intersection.",
            "photographerPosition": "Kneel on one knee, camera at chest height.",
            "poseAction": "Leans on the shelf",
            "poseEyes": "Looks past the lens",
            "modelDirecting": "Imagine you just found a letter addressed to you.",
            "expertAdvice": "Lock exposure on the face, not the window.",
        })
    }

    pub(crate) fn record_json(title: &str, ratio: &str) -> String {
        record_value(title, ratio).to_string()
    }

    pub(crate) fn sample_record(title: &str) -> PlanRecord {
        record_from_value(&record_value(title, "9:16"), 0).expect("sample record is valid")
    }

    #[test]
    fn keeps_order_and_fields() {
        let payload = json!({
            "plans": [
                record_value("First", "9:16"),
                record_value("Second", "9:16"),
                record_value("Third", "16:9"),
            ]
        });
        let batch = records_from_payload(payload.clone(), "").unwrap();
        assert_eq!(batch.plans.len(), 3);
        assert!(batch.dropped.is_empty());

        for (record, source) in batch.plans.iter().zip(payload["plans"].as_array().unwrap()) {
            let round_trip = serde_json::to_value(record).unwrap();
            assert_eq!(&round_trip, source);
        }
    }

    #[test]
    fn coerces_unknown_ratios_to_portrait() {
        let mut missing_ratio = record_value("Missing", "9:16");
        missing_ratio
            .as_object_mut()
            .unwrap()
            .remove("targetAspectRatio");
        let payload = json!({
            "plans": [
                record_value("A", "16x9"),
                record_value("B", "square"),
                missing_ratio,
                record_value("C", "16:9"),
            ]
        });
        let batch = records_from_payload(payload, "").unwrap();
        let ratios: Vec<&str> = batch
            .plans
            .iter()
            .map(|plan| plan.target_aspect_ratio.as_str())
            .collect();
        assert_eq!(ratios, vec!["9:16", "9:16", "9:16", "16:9"]);
    }

    #[test]
    fn drops_records_with_missing_or_blank_fields() {
        let mut blank_title = record_value("", "9:16");
        blank_title["title"] = json!("   ");
        let mut no_iso = record_value("No ISO", "16:9");
        no_iso.as_object_mut().unwrap().remove("iso");
        let payload = json!({
            "plans": [blank_title, record_value("Kept", "9:16"), no_iso, "text"]
        });

        let batch = records_from_payload(payload, "").unwrap();
        assert_eq!(batch.plans.len(), 1);
        assert_eq!(batch.plans[0].title, "Kept");
        assert_eq!(
            batch.dropped,
            vec![
                DroppedRecord {
                    index: 0,
                    missing: vec!["title"]
                },
                DroppedRecord {
                    index: 2,
                    missing: vec!["iso"]
                },
                DroppedRecord {
                    index: 3,
                    missing: vec!["<record is not an object>"]
                },
            ]
        );
    }

    #[test]
    fn fails_when_every_record_is_invalid() {
        let mut broken = record_value("Broken", "9:16");
        broken["poseEyes"] = Value::Null;
        let err = records_from_payload(json!({ "plans": [broken] }), "").unwrap_err();
        match err {
            PlanError::Validation { dropped } => {
                assert_eq!(dropped[0].missing, vec!["poseEyes"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepts_snake_case_and_numeric_values() {
        let mut value = record_value("Snake", "16:9");
        let object = value.as_object_mut().unwrap();
        let focal = object.remove("focalLength").unwrap();
        object.insert("focal_length".to_string(), focal);
        object.insert("iso".to_string(), json!(400));

        let batch = records_from_payload(json!({ "plans": [value] }), "").unwrap();
        assert_eq!(batch.plans[0].focal_length, "55mm");
        assert_eq!(batch.plans[0].iso, "400");
        assert_eq!(batch.plans[0].target_aspect_ratio, AspectRatio::Landscape);
    }

    #[test]
    fn empty_plan_list_is_valid() {
        let batch = records_from_payload(json!({ "plans": [] }), "").unwrap();
        assert!(batch.plans.is_empty());
        assert!(batch.dropped.is_empty());

        let batch = records_from_payload(json!({ "other": 1 }), "").unwrap();
        assert!(batch.plans.is_empty());
    }

    #[test]
    fn non_array_plans_is_malformed() {
        let err = records_from_payload(json!({ "plans": "none" }), "raw").unwrap_err();
        assert!(matches!(err, PlanError::MalformedResponse { reason, .. } if reason.contains("string")));
    }
}
