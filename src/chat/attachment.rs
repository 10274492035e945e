//! Picks an image file to attach to a message and inlines it as a
//! `data:` URL so the message is self-contained.

use std::fs;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

use super::models::Attachment;

/// 10MB
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

const ACCEPTED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Unsupported file type for {0}. Supports PNG, JPG, GIF, WebP")]
    UnsupportedType(String),

    #[error("File is too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Failed to read attachment: {0}")]
    Io(#[from] std::io::Error),
}

/// MIME type for an accepted image file name, by extension.
pub fn image_content_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    ACCEPTED_IMAGE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

impl Attachment {
    pub fn from_bytes(content_type: &str, bytes: &[u8]) -> Self {
        Self {
            content_type: content_type.to_string(),
            url: format!("data:{};base64,{}", content_type, STANDARD.encode(bytes)),
        }
    }

    /// Read an image from disk. Files that are not an accepted image
    /// type or are larger than [`MAX_ATTACHMENT_BYTES`] are rejected
    /// before they are read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AttachmentError> {
        let path = path.as_ref();
        let content_type = image_content_type(path)
            .ok_or_else(|| AttachmentError::UnsupportedType(path.display().to_string()))?;

        let size = fs::metadata(path)?.len();
        if size > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge {
                size,
                max: MAX_ATTACHMENT_BYTES,
            });
        }

        let bytes = fs::read(path)?;
        tracing::debug!("Attached {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(content_type, &bytes))
    }
}
