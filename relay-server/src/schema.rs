//! Prompt message validation.
//!
//! An inbound prompt frame must match one of two shapes:
//!
//! | Shape | Required keys            |
//! |-------|--------------------------|
//! | Image | `image_data`, `prompt`   |
//! | Text  | `prompt`                 |
//!
//! The image shape is tried first, so a frame carrying both keys is always an
//! image prompt. Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which accepted shape a frame matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptShape {
    Text,
    Image,
}

impl std::fmt::Display for PromptShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text prompt"),
            Self::Image => write!(f, "image prompt"),
        }
    }
}

/// `{"prompt": string}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextPrompt {
    pub prompt: String,
}

/// `{"image_data": string, "prompt": string}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImagePrompt {
    /// Base64-encoded image bytes
    pub image_data: String,
    pub prompt: String,
}

/// A frame that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedPrompt {
    Text(TextPrompt),
    Image(ImagePrompt),
}

impl ValidatedPrompt {
    pub fn shape(&self) -> PromptShape {
        match self {
            Self::Text(_) => PromptShape::Text,
            Self::Image(_) => PromptShape::Image,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Text(p) => &p.prompt,
            Self::Image(p) => &p.prompt,
        }
    }

    pub fn image_data(&self) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::Image(p) => Some(&p.image_data),
        }
    }
}

/// Neither shape matched. Carries the reason each shape was rejected.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "Message does not match any accepted shape. Text prompt: {text_reason}. Image prompt: {image_reason}."
)]
pub struct SchemaError {
    pub text_reason: String,
    pub image_reason: String,
}

/// Classify a frame as an image prompt or a text prompt.
pub fn validate_prompt(value: &Value) -> Result<ValidatedPrompt, SchemaError> {
    let image_reason = match ImagePrompt::deserialize(value) {
        Ok(image) => return Ok(ValidatedPrompt::Image(image)),
        Err(e) => e.to_string(),
    };

    let text_reason = match TextPrompt::deserialize(value) {
        Ok(text) => return Ok(ValidatedPrompt::Text(text)),
        Err(e) => e.to_string(),
    };

    Err(SchemaError {
        text_reason,
        image_reason,
    })
}
