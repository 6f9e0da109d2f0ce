// src/textual_ir.rs
//
// Textual IR stage: one LLM call per scenario description file, followed by
// two local post-processing passes on the model's output:
//   - cut the YAML document out of the <YAML>...</YAML> markers
//   - normalize position references so every actor that is (transitively)
//     positioned against the ego vehicle ends up targeting it directly, with
//     the chained relations concatenated

use crate::llm_client::{ChatMessage, LlmClient};
use crate::pipeline::{file_stem, is_image_file, list_files};
use crate::prompt::scene_prompt;
use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const YAML_START: &str = "<YAML>";
const YAML_END: &str = "</YAML>";

/// Names the language model uses for the ego vehicle as a position target.
const EGO_TARGET_NAMES: [&str; 2] = ["ego vehicle", "ego_vehicle"];

// ============================================================================
// POST-PROCESSING
// ============================================================================

/// Content between the <YAML> and </YAML> markers, if both are present and
/// in order.
pub fn extract_yaml_block(content: &str) -> Option<&str> {
    let start = content.find(YAML_START)? + YAML_START.len();
    let len = content[start..].find(YAML_END)?;
    Some(content[start..start + len].trim())
}

fn str_field<'v>(entry: &'v serde_yaml::Value, key: &str) -> Option<&'v str> {
    entry.get(key).and_then(serde_yaml::Value::as_str)
}

fn is_ego_target(target: &str) -> bool {
    EGO_TARGET_NAMES.contains(&target)
}

/// Normalize the `position_target` / `position_relation` pairs of all
/// participants.
///
/// Actors positioned against another actor that is itself ego-relative are
/// retargeted to the ego vehicle, with both relations concatenated (e.g.
/// "left" against an actor that is "front" of the ego becomes "left front").
/// Actors with no usable relation get the literal `None`.
pub fn fix_position_references(yaml_text: &str) -> Result<String> {
    let mut root: serde_yaml::Value =
        serde_yaml::from_str(yaml_text).context("parsing extracted YAML")?;

    let Some(participants) = root
        .get_mut("participant")
        .and_then(serde_yaml::Value::as_mapping_mut)
    else {
        anyhow::bail!("extracted YAML has no `participant` mapping");
    };

    // Pass 1: relations of actors positioned directly against the ego.
    let mut ego_relative: Vec<(String, String)> = Vec::new();
    for (name, entry) in participants.iter() {
        let (Some(name), Some(target)) = (name.as_str(), str_field(entry, "position_target"))
        else {
            continue;
        };
        if !is_ego_target(target) {
            continue;
        }
        if let Some(relation) = str_field(entry, "position_relation").filter(|r| *r != "None") {
            ego_relative.push((name.to_string(), relation.to_string()));
        }
    }

    // Pass 2: retarget chained references, stamp `None` on missing relations.
    for (_, entry) in participants.iter_mut() {
        let target = str_field(entry, "position_target").map(str::to_string);
        let chained = target
            .as_deref()
            .and_then(|t| ego_relative.iter().find(|(name, _)| name == t))
            .map(|(_, relation)| relation.clone());

        let Some(entry) = entry.as_mapping_mut() else {
            continue;
        };
        if let Some(chained) = chained {
            let current = entry
                .get("position_relation")
                .and_then(serde_yaml::Value::as_str)
                .filter(|r| *r != "None");
            let merged = match current {
                Some(current) if current != chained => format!("{} {}", current, chained),
                _ => chained,
            };
            entry.insert("position_relation".into(), merged.into());
            entry.insert("position_target".into(), "ego vehicle".into());
        } else if str_field_missing(entry) {
            entry.insert("position_relation".into(), "None".into());
        }
    }

    serde_yaml::to_string(&root).context("serializing fixed YAML")
}

fn str_field_missing(entry: &serde_yaml::Mapping) -> bool {
    !matches!(
        entry.get("position_relation"),
        Some(serde_yaml::Value::String(_))
    )
}

// ============================================================================
// BATCH STAGE
// ============================================================================

pub struct TextualIrGenerator<'a> {
    config: &'a Config,
    client: &'a LlmClient,
}

impl<'a> TextualIrGenerator<'a> {
    pub fn new(config: &'a Config, client: &'a LlmClient) -> Self {
        Self { config, client }
    }

    /// Iterate all scenario descriptions and write one textual IR per file.
    pub async fn run(&self) -> Result<()> {
        let paths = &self.config.paths;
        let descriptions = list_files(&paths.description_dir, |n| n.ends_with(".txt"))
            .with_context(|| format!("listing descriptions in {}", paths.description_dir))?;

        fs::create_dir_all(&paths.textual_ir_dir)?;
        info!("textual IR stage: {} descriptions", descriptions.len());

        let mut written = 0usize;
        let mut skipped = 0usize;
        for description_path in &descriptions {
            let stem = file_stem(description_path);
            let out_path = Path::new(&paths.textual_ir_dir).join(format!("{}.yaml", stem));
            if self.config.batch.resume && out_path.exists() {
                debug!("resume: {} already exists, skipping", out_path.display());
                continue;
            }

            match self.generate_for_description(description_path, &stem).await {
                Ok(yaml) => {
                    fs::write(&out_path, yaml)
                        .with_context(|| format!("writing {}", out_path.display()))?;
                    written += 1;
                }
                Err(e) => {
                    warn!("textual IR stage failed for `{}`: {:#}", stem, e);
                    skipped += 1;
                }
            }
        }

        info!(
            "textual IR stage done: {} written, {} skipped",
            written, skipped
        );
        Ok(())
    }

    async fn generate_for_description(&self, path: &Path, stem: &str) -> Result<String> {
        let description =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        if description.trim().is_empty() {
            anyhow::bail!("description file is empty");
        }

        let mut messages = scene_prompt(&description);
        if self.config.llm.attach_reference_image {
            if let Some(image) = self.find_reference_image(stem)? {
                let bytes = fs::read(&image)
                    .with_context(|| format!("reading reference image {}", image.display()))?;
                let mime = image_mime(&image);
                // Replace the plain-text final turn with text + image.
                messages.pop();
                messages.push(ChatMessage::with_image("user", &description, &bytes, mime));
                debug!("attached reference image {}", image.display());
            }
        }

        let completion = self.client.complete(&messages).await?;
        let block = extract_yaml_block(&completion)
            .context("completion has no <YAML>...</YAML> block")?;
        fix_position_references(block)
    }

    /// The source image sharing this description's basename, if any.
    fn find_reference_image(&self, stem: &str) -> Result<Option<PathBuf>> {
        let prefix = format!("{}.", stem);
        let dir = &self.config.paths.source_image_dir;
        if !Path::new(dir).is_dir() {
            return Ok(None);
        }
        let images = list_files(dir, |n| is_image_file(n) && n.starts_with(&prefix));
        match images {
            Ok(mut found) => Ok(Some(found.remove(0))),
            Err(_) => Ok(None),
        }
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}
