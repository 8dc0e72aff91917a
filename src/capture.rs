//! Captured images

use base64::Engine;

use crate::{Error, Result};

/// Photo handed to recognition
#[derive(Clone, PartialEq, Eq)]
pub struct ImageCapture {
    bytes: Vec<u8>,
    mime_type: String,
}

impl std::fmt::Debug for ImageCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCapture")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl ImageCapture {
    /// Validate and wrap a captured image
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImage`] if the bytes are empty, larger than
    /// `max_bytes`, or the MIME type is not an image type
    pub fn new(bytes: Vec<u8>, mime_type: &str, max_bytes: usize) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidImage("empty image".to_string()));
        }

        if bytes.len() > max_bytes {
            return Err(Error::InvalidImage(format!(
                "image is {} bytes, limit is {max_bytes}",
                bytes.len()
            )));
        }

        let mime_type = normalize_mime_type(mime_type)
            .ok_or_else(|| Error::InvalidImage(format!("unsupported MIME type: {mime_type}")))?;

        Ok(Self { bytes, mime_type })
    }

    /// Read an image file, guessing the MIME type from its extension
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or fails validation
    pub fn from_path(path: &std::path::Path, max_bytes: usize) -> Result<Self> {
        let mime_type = mime_from_extension(path).ok_or_else(|| {
            Error::InvalidImage(format!("cannot tell image type of {}", path.display()))
        })?;
        let bytes = std::fs::read(path)?;
        Self::new(bytes, mime_type, max_bytes)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 body for inline upload
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Normalize an image MIME type, rejecting non-image types
fn normalize_mime_type(mime_type: &str) -> Option<String> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => Some("image/jpeg".to_string()),
        s if s.starts_with("image/") && s.len() > "image/".len() => Some(essence),
        _ => None,
    }
}

/// Guess an image MIME type from a file extension
#[must_use]
pub fn mime_from_extension(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
