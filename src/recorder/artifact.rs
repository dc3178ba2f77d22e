//! Final recorded artifact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use super::encoder::EncodedChunk;
use super::format::EncodingFormat;

/// Immutable recorded media blob, ready for upload or download.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Concatenate chunks in their stored order into one blob.
    pub fn from_chunks(chunks: &[EncodedChunk], format: EncodingFormat) -> Self {
        let mut data = Vec::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
        for chunk in chunks {
            data.extend_from_slice(&chunk.data);
        }

        let created_at = Utc::now();
        let file_name = format!(
            "telecue-recording-{}.{}",
            created_at.format("%Y-%m-%dT%H-%M-%S"),
            format.extension()
        );

        Self {
            data,
            mime_type: format.mime_type().to_string(),
            file_name,
            created_at,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the blob under `dir`, returning the full path.
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {:?}", dir))?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.data)
            .await
            .with_context(|| format!("Failed to write artifact to {:?}", path))?;
        info!("Artifact saved: {:?} ({} bytes)", path, self.data.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::format::PREFERENCE_ORDER;

    fn chunk(seq: u64, data: &[u8]) -> EncodedChunk {
        EncodedChunk {
            seq,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_concatenation_preserves_order() {
        let chunks = [chunk(0, b"aa"), chunk(1, b"bb"), chunk(2, b"c")];
        let artifact = Artifact::from_chunks(&chunks, PREFERENCE_ORDER[0]);
        assert_eq!(artifact.data, b"aabbc");
        assert_eq!(artifact.mime_type, "video/mp4");
        assert!(artifact.file_name.starts_with("telecue-recording-"));
        assert!(artifact.file_name.ends_with(".mp4"));
    }

    #[test]
    fn test_empty_chunks_give_empty_artifact() {
        let artifact = Artifact::from_chunks(&[], PREFERENCE_ORDER[4]);
        assert!(artifact.is_empty());
        assert!(artifact.file_name.ends_with(".webm"));
    }

    #[tokio::test]
    async fn test_save_to_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::from_chunks(&[chunk(0, b"xyz")], PREFERENCE_ORDER[0]);
        let path = artifact.save_to(dir.path()).await.unwrap();
        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"xyz");
    }
}
