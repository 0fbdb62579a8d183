//! Feed Codec
//!
//! Decodes inbound text frames into [`PricePayload`]s. The feed sends one
//! JSON object per frame; anything else is a decode failure and the frame is
//! dropped by the caller.

use crate::domain::payload::PricePayload;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("expected JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// JSON codec for the live-prices feed.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn decode(&self, text: &str) -> Result<PricePayload, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = json_kind(&value);
        PricePayload::from_value(value).ok_or(CodecError::NotAnObject(kind))
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
