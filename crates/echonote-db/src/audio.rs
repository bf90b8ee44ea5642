//! Filesystem-backed audio object store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use echonote_core::{AudioObject, AudioStore, Error, Result};

/// Audio store reading objects from a base directory. `audio_ref` values
/// are relative keys under the base path.
pub struct FsAudioStore {
    base_path: PathBuf,
}

impl FsAudioStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a reference, rejecting absolute paths and traversal.
    fn resolve(&self, audio_ref: &str) -> Result<PathBuf> {
        let rel = Path::new(audio_ref);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::InvalidInput(format!(
                "unsafe audio reference: {audio_ref}"
            )));
        }
        Ok(self.base_path.join(rel))
    }

    /// Sniff the MIME type from magic bytes, falling back to the extension.
    fn detect_mime(path: &Path, bytes: &[u8]) -> String {
        if let Some(kind) = infer::get(bytes) {
            return kind.mime_type().to_string();
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("mp3") => "audio/mpeg",
            Some("wav") => "audio/wav",
            Some("ogg") => "audio/ogg",
            Some("flac") => "audio/flac",
            Some("aac") => "audio/aac",
            Some("webm") => "audio/webm",
            Some("m4a") => "audio/mp4",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

#[async_trait]
impl AudioStore for FsAudioStore {
    async fn fetch(&self, audio_ref: &str) -> Result<AudioObject> {
        let path = self.resolve(audio_ref)?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("failed to read {}: {e}", path.display())))?;

        let mime_type = Self::detect_mime(&path, &bytes);
        Ok(AudioObject { bytes, mime_type })
    }
}
