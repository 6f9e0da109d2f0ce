use thiserror::Error;

/// Failures the batch runner needs to tell apart: an image-local
/// inconsistency is skipped, a file-correspondence mismatch aborts the run
/// before anything is written.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// No ego entry exists in one of the two modality records; the image
    /// cannot be aligned.
    #[error("no ego entry found in {modality} scene record")]
    MissingEgo { modality: &'static str },

    /// Sorted file lists across modalities disagree in basename prefix.
    #[error("file correspondence mismatch: `{candidate}` does not belong to image `{image}`")]
    FileCorrespondence { image: String, candidate: String },

    /// A per-image artifact list has a different length than the image list.
    #[error("modality file count mismatch: {images} source images vs {candidates} artifacts")]
    FileCountMismatch { images: usize, candidates: usize },

    /// Lane-boundary input that cannot degrade to the single-lane fallback.
    #[error("malformed lane boundary input: {0}")]
    MalformedBoundary(String),
}
