// src/composer.rs
//
// Compose stage: pair each source image's textual and visual IR files, run
// the aligner, and write one merged IR per image. A single unalignable image
// is reported and skipped; the rest of the batch keeps going.

use crate::alignment::align;
use crate::errors::ComposeError;
use crate::pipeline::{file_stem, list_files, list_images, pair_by_position};
use crate::types::{Config, MergedSceneRecord, TextualSceneRecord, VisualSceneRecord};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct ComposeRunner<'a> {
    config: &'a Config,
}

impl<'a> ComposeRunner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<()> {
        let paths = &self.config.paths;
        let images = list_images(&paths.source_image_dir)?;
        let textual_files = list_files(&paths.textual_ir_dir, |n| n.ends_with(".yaml"))
            .with_context(|| format!("listing textual IRs in {}", paths.textual_ir_dir))?;
        let visual_files = list_files(&paths.visual_ir_dir, |n| n.ends_with(".yaml"))
            .with_context(|| format!("listing visual IRs in {}", paths.visual_ir_dir))?;

        let textual_files = pair_by_position(&images, &textual_files)?;
        let visual_files = pair_by_position(&images, &visual_files)?;

        fs::create_dir_all(&paths.merged_ir_dir)?;
        info!("compose stage: {} images", images.len());

        let mut written = 0usize;
        let mut skipped = 0usize;
        for ((image, textual_file), visual_file) in
            images.iter().zip(textual_files).zip(visual_files)
        {
            let stem = file_stem(image);
            let out_path = Path::new(&paths.merged_ir_dir).join(format!("{}.yaml", stem));
            if self.config.batch.resume && out_path.exists() {
                debug!("resume: {} already exists, skipping", out_path.display());
                continue;
            }

            match compose_one(textual_file, visual_file) {
                Ok(merged) => {
                    let yaml = serde_yaml::to_string(&merged)?;
                    fs::write(&out_path, yaml)
                        .with_context(|| format!("writing {}", out_path.display()))?;
                    written += 1;
                }
                Err(e) => {
                    warn!("compose stage failed for image `{}`: {:#}", stem, e);
                    skipped += 1;
                }
            }
        }

        info!("compose stage done: {} written, {} skipped", written, skipped);
        Ok(())
    }
}

/// Align one image's pair of IR files.
pub fn compose_one(textual_path: &Path, visual_path: &Path) -> Result<MergedSceneRecord> {
    let textual = load_textual_record(textual_path)?;

    let visual_contents = fs::read_to_string(visual_path)
        .with_context(|| format!("reading {}", visual_path.display()))?;
    let visual: VisualSceneRecord = serde_yaml::from_str(&visual_contents)
        .with_context(|| format!("parsing {}", visual_path.display()))?;
    debug!(
        "visual record: {} detections across {} lanes",
        visual.actor_count(),
        visual.lanes.len()
    );

    align(&textual, &visual).map_err(|e: ComposeError| e.into())
}

fn load_textual_record(path: &Path) -> Result<TextualSceneRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_textual_record(&contents).with_context(|| format!("invalid textual IR in {}", path.display()))
}

/// Parse a textual IR document. Some language-model outputs arrive as a YAML
/// document that is itself a quoted YAML string; unwrap that one level.
pub fn parse_textual_record(contents: &str) -> Result<TextualSceneRecord> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
    let value = match value {
        serde_yaml::Value::String(inner) => {
            serde_yaml::from_str(&inner).context("parsing nested YAML document")?
        }
        other => other,
    };
    Ok(serde_yaml::from_value(value)?)
}
