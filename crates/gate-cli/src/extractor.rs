//! File-backed capture for the CLI.
//!
//! A "frame" is the path of a JSON file holding the descriptor produced by an
//! external face pipeline: an array of numbers, or `null` / `[]` when the
//! camera saw no face.

use std::path::PathBuf;

use gate_core::{CaptureError, Descriptor, Extractor, FrameSource};

/// Reads a descriptor from the JSON file named by the frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDescriptorExtractor;

impl Extractor for JsonDescriptorExtractor {
    type Frame = PathBuf;

    async fn extract(&self, frame: PathBuf) -> Result<Option<Descriptor>, CaptureError> {
        let bytes = tokio::fs::read(&frame)
            .await
            .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", frame.display())))?;
        parse_descriptor(&bytes)
    }
}

pub fn parse_descriptor(bytes: &[u8]) -> Result<Option<Descriptor>, CaptureError> {
    let values: Option<Vec<f32>> = serde_json::from_slice(bytes)
        .map_err(|e| CaptureError::Extraction(e.to_string()))?;
    match values {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => Descriptor::new(v)
            .map(Some)
            .map_err(|e| CaptureError::Extraction(e.to_string())),
    }
}

/// Hands out the same descriptor file on every tick, as a camera daemon
/// overwriting its latest capture would.
#[derive(Debug, Clone)]
pub struct LatestFrameFile {
    path: PathBuf,
}

impl LatestFrameFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for LatestFrameFile {
    type Frame = PathBuf;

    async fn capture(&mut self) -> Result<PathBuf, CaptureError> {
        match tokio::fs::try_exists(&self.path).await {
            Ok(true) => Ok(self.path.clone()),
            Ok(false) => Err(CaptureError::Unavailable(format!(
                "no frame at {}",
                self.path.display()
            ))),
            Err(e) => Err(CaptureError::Unavailable(e.to_string())),
        }
    }
}
