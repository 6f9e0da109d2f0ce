// src/visual_ir.rs
//
// Visual IR stage: fuse the lane detector's boundary polylines with the
// object detector's labeled boxes into a per-image scene record mapping lane
// index -> actors in that lane. A synthetic ego entry is placed into whatever
// lane the bottom-center of the image resolves to.
//
// Input formats are the detectors' native ones:
//   - lane boundaries: one line per polyline, flattened "x y x y ..." pairs,
//     samples ordered bottom-to-top
//   - actors: YOLO label lines "<class_id> <xc> <yc> <w> <h>", normalized

use crate::errors::ComposeError;
use crate::lane_assignment::assign_lane;
use crate::pipeline::{file_stem, list_files, list_images, pair_by_position};
use crate::types::{
    Config, DetectedActor, Footprint, LaneBoundary, Point, VisualSceneRecord, EGO_CLASS,
    EGO_PLACEHOLDER_LINE,
};
use crate::vocabulary::ClassVocabulary;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ego footprint width as a fraction of image width.
const EGO_WIDTH_FRACTION: f32 = 0.1;

// ============================================================================
// PARSERS
// ============================================================================

/// Parse a lane-detection result file into polylines.
///
/// An empty file is a valid undivided road (no boundaries). A line with an
/// odd coordinate count or a non-numeric token is malformed input.
pub fn parse_lane_file(contents: &str) -> Result<Vec<LaneBoundary>, ComposeError> {
    let mut boundaries = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let coords: Vec<f32> = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f32>().map_err(|_| {
                    ComposeError::MalformedBoundary(format!("non-numeric coordinate `{}`", tok))
                })
            })
            .collect::<Result<_, _>>()?;
        if coords.len() % 2 != 0 {
            return Err(ComposeError::MalformedBoundary(format!(
                "odd coordinate count ({})",
                coords.len()
            )));
        }
        let points = coords
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0], xy[1]))
            .collect();
        boundaries.push(LaneBoundary { points });
    }
    Ok(boundaries)
}

/// Parse an object-detection label file, mapping class ids through the
/// vocabulary. The raw line is preserved verbatim for the scene record.
pub fn parse_detection_file(
    contents: &str,
    vocabulary: &ClassVocabulary,
) -> Result<Vec<DetectedActor>> {
    let mut actors = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            anyhow::bail!("detection line has {} fields, expected 5: `{}`", fields.len(), line);
        }
        let class_id: usize = fields[0]
            .parse()
            .with_context(|| format!("bad class id in `{}`", line))?;
        let mut bbox = [0.0f32; 4];
        for (slot, tok) in bbox.iter_mut().zip(&fields[1..5]) {
            *slot = tok
                .parse()
                .with_context(|| format!("bad coordinate in `{}`", line))?;
        }
        actors.push(DetectedActor {
            class_id,
            class_name: vocabulary.name(class_id),
            bbox,
            raw_line: line.to_string(),
        });
    }
    Ok(actors)
}

// ============================================================================
// BUILDER
// ============================================================================

/// Build the visual scene record for one image.
///
/// Boundaries are re-sorted left-to-right here, so callers can hand over the
/// detector's output order as-is. Actors with an unresolvable lane are
/// reported and excluded; an unresolvable ego means the boundary input is
/// unusable for the whole image.
pub fn build_visual_record(
    img_w: u32,
    img_h: u32,
    mut boundaries: Vec<LaneBoundary>,
    actors: &[DetectedActor],
) -> Result<VisualSceneRecord, ComposeError> {
    boundaries.sort_by(|a, b| a.bottom_x().total_cmp(&b.bottom_x()));

    let (img_w, img_h) = (img_w as f32, img_h as f32);
    let mut record = VisualSceneRecord::default();

    for actor in actors {
        let footprint = actor.footprint(img_w, img_h);
        match assign_lane(footprint, &boundaries) {
            Some(lane_idx) => {
                debug!(
                    "actor `{}` (class {}) -> lane {} (footprint {:.0}..{:.0})",
                    actor.class_name,
                    actor.class_id,
                    lane_idx,
                    footprint.left_bottom.x,
                    footprint.right_bottom.x
                );
                record
                    .lanes
                    .entry(lane_idx)
                    .or_default()
                    .push((actor.class_name.clone(), actor.raw_line.clone()));
            }
            None => {
                warn!(
                    "cannot resolve a lane for actor `{}` ({}); detection excluded",
                    actor.class_name, actor.raw_line
                );
            }
        }
    }

    // Synthetic ego: centered horizontally, bottom-aligned, one-tenth of the
    // image wide.
    let x_middle = img_w / 2.0;
    let half_width = img_w * EGO_WIDTH_FRACTION / 2.0;
    let ego = Footprint {
        left_bottom: Point::new(x_middle - half_width, img_h),
        right_bottom: Point::new(x_middle + half_width, img_h),
    };
    let ego_lane = assign_lane(ego, &boundaries).ok_or_else(|| {
        ComposeError::MalformedBoundary("cannot resolve the ego lane".to_string())
    })?;
    record
        .lanes
        .entry(ego_lane)
        .or_default()
        .push((EGO_CLASS.to_string(), EGO_PLACEHOLDER_LINE.to_string()));

    Ok(record)
}

// ============================================================================
// BATCH STAGE
// ============================================================================

pub struct VisualIrGenerator<'a> {
    config: &'a Config,
    vocabulary: &'a ClassVocabulary,
}

impl<'a> VisualIrGenerator<'a> {
    pub fn new(config: &'a Config, vocabulary: &'a ClassVocabulary) -> Self {
        Self { config, vocabulary }
    }

    /// Iterate all source images and write one visual IR file per image.
    /// Individual images may fail (and are skipped with a report); list
    /// misalignment aborts before anything is written.
    pub fn run(&self) -> Result<()> {
        let paths = &self.config.paths;
        let images = list_images(&paths.source_image_dir)?;
        let lane_files = list_files(&paths.lane_detection_dir, |n| n.ends_with(".lines.txt"))
            .with_context(|| format!("listing lane detections in {}", paths.lane_detection_dir))?;
        let obj_files = list_files(&paths.obj_detection_dir, |n| n.ends_with(".txt"))
            .with_context(|| format!("listing object detections in {}", paths.obj_detection_dir))?;

        let lane_files = pair_by_position(&images, &lane_files)?;
        let obj_files = pair_by_position(&images, &obj_files)?;

        fs::create_dir_all(&paths.visual_ir_dir)?;
        info!("visual IR stage: {} images", images.len());

        let mut written = 0usize;
        let mut skipped = 0usize;
        for ((image, lane_file), obj_file) in images.iter().zip(lane_files).zip(obj_files) {
            let stem = file_stem(image);
            let out_path = Path::new(&paths.visual_ir_dir).join(format!("{}.yaml", stem));
            if self.config.batch.resume && out_path.exists() {
                debug!("resume: {} already exists, skipping", out_path.display());
                continue;
            }

            match self.generate_for_image(image, lane_file, obj_file) {
                Ok(record) => {
                    let yaml = serde_yaml::to_string(&record)?;
                    fs::write(&out_path, yaml)
                        .with_context(|| format!("writing {}", out_path.display()))?;
                    written += 1;
                }
                Err(e) => {
                    warn!("visual IR stage failed for image `{}`: {:#}", stem, e);
                    skipped += 1;
                }
            }
        }

        info!("visual IR stage done: {} written, {} skipped", written, skipped);
        Ok(())
    }

    fn generate_for_image(
        &self,
        image: &Path,
        lane_file: &Path,
        obj_file: &Path,
    ) -> Result<VisualSceneRecord> {
        let (img_w, img_h) = image::image_dimensions(image)
            .with_context(|| format!("reading dimensions of {}", image.display()))?;

        let lane_contents = fs::read_to_string(lane_file)
            .with_context(|| format!("reading {}", lane_file.display()))?;
        let boundaries = parse_lane_file(&lane_contents)?;

        let obj_contents = fs::read_to_string(obj_file)
            .with_context(|| format!("reading {}", obj_file.display()))?;
        let actors = parse_detection_file(&obj_contents, self.vocabulary)?;

        Ok(build_visual_record(img_w, img_h, boundaries, &actors)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> ClassVocabulary {
        ClassVocabulary::from_names(&[(0, "person"), (2, "car"), (7, "truck")])
    }

    #[test]
    fn lane_file_parses_flattened_pairs() {
        let boundaries = parse_lane_file("300 720 310 550 320 400\n600 720 600 400\n").unwrap();
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].points.len(), 3);
        assert_eq!(boundaries[0].points[0], Point::new(300.0, 720.0));
        assert_eq!(boundaries[1].bottom_x(), 600.0);
    }

    #[test]
    fn lane_file_rejects_odd_coordinate_count() {
        assert!(matches!(
            parse_lane_file("300 720 310"),
            Err(ComposeError::MalformedBoundary(_))
        ));
    }

    #[test]
    fn empty_lane_file_is_an_undivided_road() {
        assert!(parse_lane_file("").unwrap().is_empty());
        assert!(parse_lane_file("\n\n").unwrap().is_empty());
    }

    #[test]
    fn detection_file_maps_class_names_and_keeps_raw_lines() {
        let actors =
            parse_detection_file("2 0.5 0.6 0.1 0.2\n7 0.25 0.5 0.08 0.1\n", &vocab()).unwrap();
        assert_eq!(actors.len(), 2);
        assert_eq!(actors[0].class_name, "car");
        assert_eq!(actors[0].raw_line, "2 0.5 0.6 0.1 0.2");
        assert_eq!(actors[1].class_name, "truck");
    }

    #[test]
    fn footprint_denormalizes_against_image_size() {
        let actor = DetectedActor {
            class_id: 2,
            class_name: "car".to_string(),
            bbox: [0.5, 0.5, 0.2, 0.4],
            raw_line: String::new(),
        };
        let fp = actor.footprint(900.0, 720.0);
        assert_eq!(fp.left_bottom, Point::new(360.0, 504.0));
        assert_eq!(fp.right_bottom, Point::new(540.0, 504.0));
    }

    fn two_boundary_scene() -> Vec<LaneBoundary> {
        parse_lane_file("300 720 300 400\n600 720 600 400\n").unwrap()
    }

    #[test]
    fn record_places_actors_and_ego_by_lane() {
        // Image 900x720, boundaries at x=300 and x=600. A car centered in
        // the middle lane and a truck entirely to the right.
        let actors = parse_detection_file(
            "2 0.5 0.8 0.1 0.2\n7 0.85 0.8 0.08 0.2\n",
            &vocab(),
        )
        .unwrap();
        let record = build_visual_record(900, 720, two_boundary_scene(), &actors).unwrap();

        // Middle lane (between the two boundaries) holds the car and the
        // ego entry; the truck overflows to the right of both boundaries.
        let middle = &record.lanes[&0];
        assert_eq!(middle.len(), 2);
        assert_eq!(middle[0].0, "car");
        assert_eq!(middle[1].0, EGO_CLASS);
        assert_eq!(middle[1].1, EGO_PLACEHOLDER_LINE);
        assert_eq!(record.lanes[&2][0].0, "truck");
        assert_eq!(record.actor_count(), 3);
    }

    #[test]
    fn record_with_no_boundaries_is_single_lane() {
        let actors = parse_detection_file("2 0.2 0.8 0.1 0.2\n", &vocab()).unwrap();
        let record = build_visual_record(900, 720, Vec::new(), &actors).unwrap();
        assert_eq!(record.lanes.len(), 1);
        assert_eq!(record.lanes[&0].len(), 2); // car + ego
    }

    #[test]
    fn boundaries_are_sorted_left_to_right_before_assignment() {
        // Same scene with the boundary lines in reversed file order.
        let boundaries = parse_lane_file("600 720 600 400\n300 720 300 400\n").unwrap();
        let actors = parse_detection_file("2 0.5 0.8 0.1 0.2\n", &vocab()).unwrap();
        let record = build_visual_record(900, 720, boundaries, &actors).unwrap();
        assert_eq!(record.lanes[&0][0].0, "car");
    }
}
