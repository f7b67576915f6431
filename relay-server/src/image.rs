//! Decoding of images attached to prompts.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::Serialize;

/// Image formats the model endpoint accepts inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Identify the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image data is empty")]
    Empty,

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Unsupported image format (expected png, jpeg, gif or webp)")]
    UnsupportedFormat,
}

/// A decoded image ready to be inlined into a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Decode a base64 image, optionally wrapped in a `data:` URL.
pub fn decode_image(data: &str) -> Result<InlineImage, ImageError> {
    let payload = strip_data_url(data.trim());
    if payload.is_empty() {
        return Err(ImageError::Empty);
    }

    let bytes = match STANDARD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => STANDARD_NO_PAD.decode(payload).map_err(|_| e)?,
    };

    let format = ImageFormat::sniff(&bytes).ok_or(ImageError::UnsupportedFormat)?;
    Ok(InlineImage { format, bytes })
}

fn strip_data_url(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some((_, payload)) = data.split_once(";base64,") {
            return payload;
        }
    }
    data
}
