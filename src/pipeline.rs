// src/pipeline.rs
//
// Directory iteration and the file-matching contract shared by all batch
// stages: per-image artifacts are located by sorted-order positional
// correspondence with the source image list, and every pairing is validated
// by basename prefix BEFORE any item is processed. A mismatch anywhere means
// the lists are misaligned, so nothing is written.

use crate::errors::ComposeError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_image_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Files directly inside `dir` whose names satisfy `keep`, sorted by name.
pub fn list_files<F>(dir: &str, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if keep(name) {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();
    if files.is_empty() {
        anyhow::bail!("no matching files found in {}", dir);
    }
    Ok(files)
}

pub fn list_images(dir: &str) -> Result<Vec<PathBuf>> {
    list_files(dir, is_image_file).with_context(|| format!("listing source images in {}", dir))
}

/// Basename with the last extension stripped ("scene_01.png" -> "scene_01").
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Validate the positional correspondence between the source image list and
/// one per-image artifact list. Every candidate must share its image's
/// basename prefix; the first offender fails the whole pairing.
pub fn pair_by_position<'a>(
    images: &[PathBuf],
    candidates: &'a [PathBuf],
) -> Result<Vec<&'a PathBuf>, ComposeError> {
    if images.len() != candidates.len() {
        return Err(ComposeError::FileCountMismatch {
            images: images.len(),
            candidates: candidates.len(),
        });
    }

    let mut paired = Vec::with_capacity(images.len());
    for (image, candidate) in images.iter().zip(candidates) {
        let stem = file_stem(image);
        let candidate_name = candidate
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if !candidate_name.starts_with(&format!("{}.", stem)) {
            return Err(ComposeError::FileCorrespondence {
                image: stem,
                candidate: candidate_name.to_string(),
            });
        }
        paired.push(candidate);
    }
    Ok(paired)
}
