//! Media kind detection for stored recordings.
//!
//! Video uploads are demuxed to audio upstream by an external collaborator;
//! by the time the pipeline sees a reference it expects audio, but the MIME
//! type is still inspected so unprocessable payloads fail with a
//! media_processing category instead of a confusing transcription error.

/// Broad classification of a stored media object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    /// Video container; the audio track was extracted upstream.
    Video,
    Other,
}

/// Classify a MIME type string.
pub fn detect_media_kind(mime_type: &str) -> MediaKind {
    let mime = mime_type.to_ascii_lowercase();
    if mime.starts_with("audio/") {
        MediaKind::Audio
    } else if mime.starts_with("video/") {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

/// File extension used when handing audio bytes to the transcription
/// service as a multipart upload.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/aac" => "aac",
        "audio/webm" | "video/webm" => "webm",
        "audio/mp4" | "video/mp4" => "m4a",
        _ => "wav",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_audio() {
        assert_eq!(detect_media_kind("audio/ogg"), MediaKind::Audio);
        assert_eq!(detect_media_kind("AUDIO/MPEG"), MediaKind::Audio);
    }

    #[test]
    fn test_detect_video() {
        assert_eq!(detect_media_kind("video/mp4"), MediaKind::Video);
    }

    #[test]
    fn test_detect_other() {
        assert_eq!(detect_media_kind("application/pdf"), MediaKind::Other);
        assert_eq!(detect_media_kind(""), MediaKind::Other);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for_mime("audio/mpeg"), "mp3");
        assert_eq!(extension_for_mime("audio/flac"), "flac");
        assert_eq!(extension_for_mime("video/mp4"), "m4a");
        // unknown types fall back to wav
        assert_eq!(extension_for_mime("audio/unknown"), "wav");
    }
}
