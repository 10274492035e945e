//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::openai::Usage;

// {
//     "messages": [
//         {"role": "user", "content": "Hello"},
//         {"role": "assistant", "content": "Hi there!"},
//         {"role": "user", "content": "How can you help me?"}
//     ]
// }
#[derive(Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// Data of the `finish` event sent once the reply is complete.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatFinish {
    pub text: String,
    pub usage: Option<Usage>,
}

pub use crate::api::public::ErrorResponse;

/// Names of the server-sent events in a reply stream.
pub mod events {
    pub const TEXT: &str = "text";
    pub const FINISH: &str = "finish";
    pub const ERROR: &str = "error";
}
