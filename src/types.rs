use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub llm: LlmConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub source_image_dir: String,
    pub description_dir: String,
    pub lane_detection_dir: String,
    pub obj_detection_dir: String,
    pub textual_ir_dir: String,
    pub visual_ir_dir: String,
    pub merged_ir_dir: String,
    pub class_vocabulary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub max_tries: u32,
    pub retry_delay_secs: u64,
    pub attach_reference_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Skip scenes whose output file already exists instead of regenerating.
    pub resume: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One lane-dividing boundary, sampled bottom-to-top in image coordinates.
///
/// Points are ordered by decreasing y (the image-bottom sample comes first).
#[derive(Debug, Clone)]
pub struct LaneBoundary {
    pub points: Vec<Point>,
}

impl LaneBoundary {
    /// X coordinate of the bottommost sample, used to order boundaries
    /// left-to-right across the image.
    pub fn bottom_x(&self) -> f32 {
        self.points.first().map(|p| p.x).unwrap_or(0.0)
    }
}

/// The two ground-contact corners of an actor's bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Footprint {
    pub left_bottom: Point,
    pub right_bottom: Point,
}

/// One object-detector hit, kept together with its native output line so the
/// visual record can carry the detection through unmodified.
#[derive(Debug, Clone)]
pub struct DetectedActor {
    pub class_id: usize,
    pub class_name: String,
    /// Normalized (x_center, y_center, width, height).
    pub bbox: [f32; 4],
    /// The detector's native line: "<class_id> <xc> <yc> <w> <h>".
    pub raw_line: String,
}

impl DetectedActor {
    /// Ground-contact corners of the box, denormalized against the image size.
    pub fn footprint(&self, img_w: f32, img_h: f32) -> Footprint {
        let [xc, yc, w, h] = self.bbox;
        let x1 = (xc - w / 2.0) * img_w;
        let x2 = (xc + w / 2.0) * img_w;
        let y2 = (yc + h / 2.0) * img_h;
        Footprint {
            left_bottom: Point::new(x1, y2),
            right_bottom: Point::new(x2, y2),
        }
    }
}

// ============================================================================
// SCENE RECORDS
// ============================================================================

/// Class name of the synthetic ego entry in the visual record.
pub const EGO_CLASS: &str = "ego";

/// Placeholder detection line carried by the synthetic ego entry.
pub const EGO_PLACEHOLDER_LINE: &str = "ego 0 0 0 0";

/// Key of the designated ego actor in the textual record.
pub const EGO_VEHICLE_KEY: &str = "ego_vehicle";

/// Vision-derived scene record: lane index -> actors observed in that lane,
/// in detector encounter order. Lane -1 is left of the leftmost boundary and
/// lane N (boundary count) is right of the rightmost one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualSceneRecord {
    pub lanes: BTreeMap<i32, Vec<(String, String)>>,
}

impl VisualSceneRecord {
    /// Total detections across all lanes, synthetic ego included.
    pub fn actor_count(&self) -> usize {
        self.lanes.values().map(|v| v.len()).sum()
    }
}

/// One actor as described by the language model. Fields the core never
/// interprets ride along as opaque YAML values; unknown keys are preserved
/// through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextualActor {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub actor_type: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_behavior: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_target: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_relation: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane_idx: Option<i32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl TextualActor {
    pub fn empty() -> Self {
        Self {
            actor_type: None,
            current_behavior: None,
            position_target: None,
            position_relation: None,
            speed: None,
            lane_idx: None,
            extra: BTreeMap::new(),
        }
    }

    /// The `position_relation` string, if it is a plain string and not the
    /// literal `None` the language model emits for "unspecified".
    pub fn relation_str(&self) -> Option<&str> {
        match &self.position_relation {
            Some(serde_yaml::Value::String(s)) if s != "None" => Some(s.as_str()),
            _ => None,
        }
    }
}

/// The language-model-derived scene description. The `environment` and
/// `road_network` blocks the model also emits live in `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextualSceneRecord {
    pub participant: IndexMap<String, TextualActor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane_number: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// The aligned output: the textual record with `lane_idx` stamped on every
/// actor, synthesized `other_vehicle_k` entries for unmatched detections, and
/// `lane_number` set from the visual record.
pub type MergedSceneRecord = TextualSceneRecord;
