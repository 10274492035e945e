//! Errors from the completion service and the fixed messages shown to
//! users for them.

use thiserror::Error;

pub const MISSING_API_KEY_MESSAGE: &str =
    "OpenAI API key is not configured. Please add OPENAI_API_KEY to your environment variables.";
pub const INVALID_API_KEY_MESSAGE: &str = "Invalid or missing OpenAI API key";
pub const QUOTA_EXCEEDED_MESSAGE: &str = "OpenAI API quota exceeded";
pub const RATE_LIMITED_MESSAGE: &str = "OpenAI API rate limit exceeded";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    /// An error reported by the provider, either as a non-success
    /// response or as an error event inside the stream.
    #[error("{message}")]
    Provider { status: Option<u16>, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Malformed completion stream: {0}")]
    Decode(String),

    /// A failure that came with no description at all.
    #[error("")]
    Unknown,
}

impl CompletionError {
    /// The single string surfaced to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            CompletionError::MissingApiKey => MISSING_API_KEY_MESSAGE.to_string(),
            CompletionError::Unknown => UNEXPECTED_ERROR_MESSAGE.to_string(),
            CompletionError::Provider { status, message } => {
                match (classify(message), status) {
                    (Some(fixed), _) => fixed.to_string(),
                    (None, Some(401)) => INVALID_API_KEY_MESSAGE.to_string(),
                    (None, Some(429)) => RATE_LIMITED_MESSAGE.to_string(),
                    (None, _) => user_facing_message(message),
                }
            }
            other => user_facing_message(&other.to_string()),
        }
    }
}

fn classify(description: &str) -> Option<&'static str> {
    let lowered = description.to_lowercase();
    if lowered.contains("api key") {
        Some(INVALID_API_KEY_MESSAGE)
    } else if lowered.contains("quota") {
        Some(QUOTA_EXCEEDED_MESSAGE)
    } else if lowered.contains("rate limit") {
        Some(RATE_LIMITED_MESSAGE)
    } else {
        None
    }
}

/// Map any error description onto the user-facing taxonomy. Known
/// provider failures get a fixed message, other descriptions pass
/// through and an empty description becomes the generic fallback.
pub fn user_facing_message(description: &str) -> String {
    if description.trim().is_empty() {
        return UNEXPECTED_ERROR_MESSAGE.to_string();
    }
    classify(description)
        .map(str::to_string)
        .unwrap_or_else(|| description.to_string())
}
