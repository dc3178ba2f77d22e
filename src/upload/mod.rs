//! Upload gateway: pushes finished artifacts to the video storage API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::recorder::Artifact;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload transport failed: {0}")]
    Transport(String),
    #[error("upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("artifact unavailable: {0}")]
    Io(String),
}

/// Optional correlating metadata sent alongside the artifact.
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    pub script_id: Option<String>,
    pub script_title: Option<String>,
    pub script_topic: Option<String>,
}

/// Response from the storage API: a persisted id and access URL.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedVideo {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub url: String,
    pub filename: String,
}

/// Trait for pushing artifacts to storage.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload an in-memory artifact.
    async fn upload_bytes(
        &self,
        artifact: &Artifact,
        metadata: Option<&UploadMetadata>,
    ) -> Result<UploadedVideo, UploadError>;

    /// Upload a saved artifact by streaming it from disk.
    async fn upload_file(
        &self,
        path: &Path,
        file_name: &str,
        mime_type: &str,
        metadata: Option<&UploadMetadata>,
    ) -> Result<UploadedVideo, UploadError>;
}

pub struct UploadClient {
    client: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a server-relative access path.
    pub fn media_url(&self, access_path: &str) -> String {
        if access_path.starts_with("http") {
            return access_path.to_string();
        }
        let origin = self
            .base_url
            .strip_suffix("/api")
            .unwrap_or(&self.base_url);
        format!("{}{}", origin, access_path)
    }

    fn apply_metadata(mut form: Form, metadata: Option<&UploadMetadata>) -> Form {
        if let Some(meta) = metadata {
            if let Some(id) = &meta.script_id {
                form = form.text("scriptId", id.clone());
            }
            if let Some(title) = &meta.script_title {
                form = form.text("scriptTitle", title.clone());
            }
            if let Some(topic) = &meta.script_topic {
                form = form.text("scriptTopic", topic.clone());
            }
        }
        form
    }

    async fn send(&self, form: Form) -> Result<UploadedVideo, UploadError> {
        let url = format!("{}/videos/save", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| UploadError::Transport(format!(
            "unexpected upload response: {e}"
        )))
    }
}

#[async_trait]
impl ArtifactUploader for UploadClient {
    async fn upload_bytes(
        &self,
        artifact: &Artifact,
        metadata: Option<&UploadMetadata>,
    ) -> Result<UploadedVideo, UploadError> {
        let digest = hex_digest(&artifact.data);
        debug!(
            "Uploading artifact {} ({} bytes, sha256 {})",
            artifact.file_name,
            artifact.len(),
            digest
        );

        let part = Part::bytes(artifact.data.clone())
            .file_name(artifact.file_name.clone())
            .mime_str(&artifact.mime_type)
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let mut form = Form::new().part("video", part).text("checksum", digest);
        form = Self::apply_metadata(form, metadata);

        let uploaded = self.send(form).await?;
        info!(
            "Artifact uploaded: id {} at {}",
            uploaded.video_id, uploaded.url
        );
        Ok(uploaded)
    }

    async fn upload_file(
        &self,
        path: &Path,
        file_name: &str,
        mime_type: &str,
        metadata: Option<&UploadMetadata>,
    ) -> Result<UploadedVideo, UploadError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?
            .len();

        debug!("Streaming artifact upload from {:?} ({} bytes)", path, size);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let mut form = Form::new().part("video", part);
        form = Self::apply_metadata(form, metadata);

        let uploaded = self.send(form).await?;
        info!(
            "Artifact uploaded: id {} at {}",
            uploaded.video_id, uploaded.url
        );
        Ok(uploaded)
    }
}

fn hex_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
