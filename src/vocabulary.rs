// src/vocabulary.rs
//
// The object detector reports class ids; scene records carry class names.
// The id -> name table (COCO-style `names` map) is loaded once and passed by
// reference wherever detections are parsed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    names: BTreeMap<usize, String>,
}

#[derive(Debug, Clone)]
pub struct ClassVocabulary {
    names: BTreeMap<usize, String>,
}

impl ClassVocabulary {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading class vocabulary {}", path))?;
        let file: VocabularyFile = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing class vocabulary {}", path))?;
        Ok(Self { names: file.names })
    }

    #[cfg(test)]
    pub fn from_names(names: &[(usize, &str)]) -> Self {
        Self {
            names: names.iter().map(|(id, n)| (*id, n.to_string())).collect(),
        }
    }

    /// Class name for a detector class id. Unknown ids get a placeholder
    /// name rather than failing the whole image.
    pub fn name(&self, class_id: usize) -> String {
        match self.names.get(&class_id) {
            Some(name) => name.clone(),
            None => {
                warn!("class id {} not in vocabulary", class_id);
                format!("class_{}", class_id)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
