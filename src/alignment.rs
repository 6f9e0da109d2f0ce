// src/alignment.rs
//
// Cross-modal alignment: merge one textual scene record with one visual
// scene record so every actor ends up with a lane index.
//
// Phases, in order (later phases depend on the claimed state of earlier
// ones):
//   1. mark every visual detection unclaimed
//   2. locate the ego entry in the visual record (fatal if absent)
//   3. resolve each textual actor's lane from its direction tokens
//   4. claim the nearest unclaimed visual detection in that lane
//   5. synthesize `other_vehicle_k` entries for whatever stays unclaimed
//   6. emit, annotated with the observed lane count

use crate::errors::ComposeError;
use crate::types::{
    MergedSceneRecord, TextualActor, TextualSceneRecord, VisualSceneRecord, EGO_CLASS,
    EGO_VEHICLE_KEY,
};
use serde_yaml::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Lane offset for a recognized direction token, relative to the ego lane.
/// The first recognized token wins; compound relations ("left behind") keep
/// only their first direction.
pub fn direction_offset(relation: &str) -> Option<i32> {
    let tokens: Vec<String> = relation
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    let mut idx = 0;
    while idx < tokens.len() {
        match tokens[idx].as_str() {
            "left" => return Some(-1),
            "right" => return Some(1),
            "ahead" | "behind" => return Some(0),
            "in" if tokens.get(idx + 1).map(String::as_str) == Some("front") => return Some(0),
            _ => idx += 1,
        }
    }
    None
}

/// Merge a textual and a visual record for the same image.
///
/// Pure: the same input pair always yields the same merged record. A missing
/// ego entry in either modality makes the image unalignable.
pub fn align(
    textual: &TextualSceneRecord,
    visual: &VisualSceneRecord,
) -> Result<MergedSceneRecord, ComposeError> {
    let mut merged = textual.clone();

    // Phase 1: claim list mirroring the visual record.
    let mut claimed: BTreeMap<i32, Vec<bool>> = visual
        .lanes
        .iter()
        .map(|(lane, actors)| (*lane, vec![false; actors.len()]))
        .collect();

    // Phase 2: locate the ego, scanning lanes in ascending order.
    let mut ego_lane = None;
    'search: for (lane, actors) in &visual.lanes {
        for (idx, (class, _)) in actors.iter().enumerate() {
            if class == EGO_CLASS {
                if let Some(flags) = claimed.get_mut(lane) {
                    flags[idx] = true;
                }
                ego_lane = Some(*lane);
                break 'search;
            }
        }
    }
    let ego_lane = ego_lane.ok_or(ComposeError::MissingEgo { modality: "visual" })?;

    let ego = merged
        .participant
        .get_mut(EGO_VEHICLE_KEY)
        .ok_or(ComposeError::MissingEgo { modality: "textual" })?;
    ego.lane_idx = Some(ego_lane);

    // Lanes outside what the camera saw cannot be claimed, so offsets are
    // clamped into the observed key range.
    let min_lane = visual.lanes.keys().next().copied().unwrap_or(ego_lane);
    let max_lane = visual.lanes.keys().next_back().copied().unwrap_or(ego_lane);

    // Phases 3 + 4: lane resolution and claiming per textual actor.
    for (name, actor) in merged.participant.iter_mut() {
        if name == EGO_VEHICLE_KEY {
            continue;
        }
        let offset = match actor.relation_str().and_then(direction_offset) {
            Some(offset) => offset,
            None => {
                warn!(
                    "actor `{}` has no recognized direction in position_relation {:?}; \
                     defaulting to the ego lane",
                    name, actor.position_relation
                );
                0
            }
        };
        let lane = (ego_lane + offset).clamp(min_lane, max_lane);
        actor.lane_idx = Some(lane);
        claim_nearest(&mut claimed, lane, name);
    }

    // Phase 5: every unclaimed detection becomes a synthesized actor.
    let mut next_idx = textual.participant.len();
    for (lane, flags) in claimed.iter_mut() {
        for (idx, flag) in flags.iter_mut().enumerate() {
            if *flag {
                continue;
            }
            let relation = match lane.cmp(&ego_lane) {
                Ordering::Less => "left",
                Ordering::Greater => "right",
                Ordering::Equal => "ahead",
            };
            let class = visual.lanes[lane][idx].0.clone();
            let mut actor = TextualActor::empty();
            actor.actor_type = Some(Value::String(class));
            actor.position_target = Some(Value::String(EGO_VEHICLE_KEY.to_string()));
            actor.position_relation = Some(Value::String(relation.to_string()));
            actor.lane_idx = Some(*lane);
            merged
                .participant
                .insert(format!("other_vehicle_{}", next_idx), actor);
            next_idx += 1;
            *flag = true;
        }
    }

    // Phase 6.
    merged.lane_number = Some(visual.lanes.len());
    Ok(merged)
}

/// Claim the bottommost (nearest) unclaimed detection in a lane. The ego
/// entry is already claimed by the time this runs, so it is never taken. An
/// empty or exhausted lane leaves the textual actor unmatched, which is fine.
fn claim_nearest(claimed: &mut BTreeMap<i32, Vec<bool>>, lane: i32, name: &str) {
    let Some(flags) = claimed.get_mut(&lane) else {
        debug!("no visual detections in lane {} for `{}`", lane, name);
        return;
    };
    for flag in flags.iter_mut().rev() {
        if !*flag {
            *flag = true;
            return;
        }
    }
    debug!("no unclaimed visual detection left in lane {} for `{}`", lane, name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn textual_actor(relation: Option<&str>) -> TextualActor {
        let mut actor = TextualActor::empty();
        actor.actor_type = Some(Value::String("car".to_string()));
        actor.position_target = Some(Value::String("ego vehicle".to_string()));
        actor.position_relation = relation.map(|r| Value::String(r.to_string()));
        actor
    }

    fn textual_record(others: &[(&str, Option<&str>)]) -> TextualSceneRecord {
        let mut participant = IndexMap::new();
        participant.insert(EGO_VEHICLE_KEY.to_string(), TextualActor::empty());
        for (name, relation) in others {
            participant.insert(name.to_string(), textual_actor(*relation));
        }
        TextualSceneRecord {
            participant,
            lane_number: None,
            extra: BTreeMap::new(),
        }
    }

    fn visual_record(lanes: &[(i32, &[&str])]) -> VisualSceneRecord {
        let mut record = VisualSceneRecord::default();
        for (lane, classes) in lanes {
            record.lanes.insert(
                *lane,
                classes
                    .iter()
                    .map(|c| (c.to_string(), format!("{} 0.5 0.5 0.1 0.1", c)))
                    .collect(),
            );
        }
        record
    }

    #[test]
    fn direction_tokens_resolve_first_match() {
        assert_eq!(direction_offset("left"), Some(-1));
        assert_eq!(direction_offset("right behind"), Some(1));
        assert_eq!(direction_offset("left front"), Some(-1));
        assert_eq!(direction_offset("ahead"), Some(0));
        assert_eq!(direction_offset("in front"), Some(0));
        assert_eq!(direction_offset("behind"), Some(0));
        assert_eq!(direction_offset("diagonally near"), None);
        assert_eq!(direction_offset(""), None);
    }

    #[test]
    fn textual_actor_on_the_left_claims_the_left_lane_detection() {
        // A 3-lane road seen as lanes 0 and 1: ego in lane 1, one car in
        // lane 0, and the textual record names one actor at "left front".
        let textual = textual_record(&[("other_actor_1", Some("left front"))]);
        let visual = visual_record(&[(0, &["car"]), (1, &["ego"])]);

        let merged = align(&textual, &visual).unwrap();
        assert_eq!(merged.participant[EGO_VEHICLE_KEY].lane_idx, Some(1));
        assert_eq!(merged.participant["other_actor_1"].lane_idx, Some(0));
        // The lane-0 car was claimed, so nothing is synthesized.
        assert_eq!(merged.participant.len(), 2);
        assert_eq!(merged.lane_number, Some(2));
    }

    #[test]
    fn unrecognized_direction_defaults_to_the_ego_lane() {
        let textual = textual_record(&[("other_actor_1", Some("diagonally near"))]);
        let visual = visual_record(&[(1, &["car"]), (2, &["ego"])]);

        let merged = align(&textual, &visual).unwrap();
        assert_eq!(merged.participant["other_actor_1"].lane_idx, Some(2));
    }

    #[test]
    fn absent_relation_defaults_to_the_ego_lane() {
        let textual = textual_record(&[("other_actor_1", None)]);
        let visual = visual_record(&[(0, &["ego"])]);
        let merged = align(&textual, &visual).unwrap();
        assert_eq!(merged.participant["other_actor_1"].lane_idx, Some(0));
    }

    #[test]
    fn missing_visual_ego_is_fatal_for_the_image() {
        let textual = textual_record(&[]);
        let visual = visual_record(&[(0, &["car"]), (1, &["truck"])]);
        assert!(matches!(
            align(&textual, &visual),
            Err(ComposeError::MissingEgo { modality: "visual" })
        ));
    }

    #[test]
    fn missing_textual_ego_is_fatal_for_the_image() {
        let mut textual = textual_record(&[]);
        textual.participant.shift_remove(EGO_VEHICLE_KEY);
        let visual = visual_record(&[(0, &["ego"])]);
        assert!(matches!(
            align(&textual, &visual),
            Err(ComposeError::MissingEgo { modality: "textual" })
        ));
    }

    #[test]
    fn unmatched_detections_are_synthesized_with_inferred_relations() {
        // Ego in lane 1; unclaimed cars left, same-lane and right.
        let textual = textual_record(&[]);
        let visual = visual_record(&[
            (0, &["truck"]),
            (1, &["car", "ego"]),
            (2, &["person"]),
        ]);

        let merged = align(&textual, &visual).unwrap();
        // Textual record had 1 participant, so numbering starts at 1.
        let left = &merged.participant["other_vehicle_1"];
        assert_eq!(left.actor_type, Some(Value::String("truck".to_string())));
        assert_eq!(
            left.position_relation,
            Some(Value::String("left".to_string()))
        );
        assert_eq!(left.lane_idx, Some(0));

        let same = &merged.participant["other_vehicle_2"];
        assert_eq!(same.actor_type, Some(Value::String("car".to_string())));
        assert_eq!(
            same.position_relation,
            Some(Value::String("ahead".to_string()))
        );

        let right = &merged.participant["other_vehicle_3"];
        assert_eq!(
            right.position_relation,
            Some(Value::String("right".to_string()))
        );
        assert_eq!(right.lane_idx, Some(2));
    }

    #[test]
    fn every_detection_lands_in_the_merged_record_exactly_once() {
        let textual = textual_record(&[
            ("other_actor_1", Some("left")),
            ("other_actor_2", Some("ahead")),
        ]);
        let visual = visual_record(&[
            (0, &["car", "truck"]),
            (1, &["car", "ego"]),
            (2, &["bus"]),
        ]);

        let merged = align(&textual, &visual).unwrap();
        // 5 non-ego detections: 2 claimed by textual actors, 3 synthesized.
        let synthesized = merged
            .participant
            .keys()
            .filter(|k| k.starts_with("other_vehicle_"))
            .count();
        assert_eq!(synthesized, visual.actor_count() - 1 - 2);
        assert_eq!(merged.participant.len(), 3 + synthesized);
    }

    #[test]
    fn same_lane_claim_skips_the_ego_entry() {
        // Lane 1 holds a car below the ego entry; "ahead" must claim the
        // car, not the ego, and leave nothing to synthesize in lane 1.
        let textual = textual_record(&[("other_actor_1", Some("ahead"))]);
        let visual = visual_record(&[(1, &["car", "ego"])]);

        let merged = align(&textual, &visual).unwrap();
        assert_eq!(merged.participant["other_actor_1"].lane_idx, Some(1));
        assert_eq!(merged.participant.len(), 2);
    }

    #[test]
    fn claims_on_exhausted_lanes_are_tolerated() {
        // Two textual actors point left but only one detection exists there.
        let textual = textual_record(&[
            ("other_actor_1", Some("left")),
            ("other_actor_2", Some("left")),
        ]);
        let visual = visual_record(&[(0, &["car"]), (1, &["ego"])]);

        let merged = align(&textual, &visual).unwrap();
        assert_eq!(merged.participant["other_actor_1"].lane_idx, Some(0));
        assert_eq!(merged.participant["other_actor_2"].lane_idx, Some(0));
        // Nothing left to synthesize.
        assert_eq!(merged.participant.len(), 3);
    }

    #[test]
    fn lane_offsets_are_clamped_to_the_observed_range() {
        // Ego in the leftmost observed lane; "left" cannot go below it.
        let textual = textual_record(&[("other_actor_1", Some("left"))]);
        let visual = visual_record(&[(0, &["ego", "car"])]);

        let merged = align(&textual, &visual).unwrap();
        assert_eq!(merged.participant["other_actor_1"].lane_idx, Some(0));
        assert_eq!(merged.participant.len(), 2);
    }

    #[test]
    fn alignment_is_idempotent() {
        let textual = textual_record(&[("other_actor_1", Some("right behind"))]);
        let visual = visual_record(&[(0, &["car"]), (1, &["ego"]), (2, &["truck"])]);

        let first = align(&textual, &visual).unwrap();
        let second = align(&textual, &visual).unwrap();
        assert_eq!(
            serde_yaml::to_string(&first).unwrap(),
            serde_yaml::to_string(&second).unwrap()
        );
    }
}
