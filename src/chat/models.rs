//! The core models for a conversation with the model.
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a message for as long as it is in view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

/// An image attached to a message, carried inline as a `data:` URL.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Attachment {
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub url: String,
}

// {
//     "role": "user",
//     "content": "What is in this image?",
//     "experimental_attachments": [
//         {"contentType": "image/png", "url": "data:image/png;base64,iVBORw0KGg..."}
//     ]
// }
/// A message in the conversation. Messages are never changed once
/// created so the fields are only readable.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatMessage {
    #[serde(default)]
    id: MessageId,
    role: Role,
    content: String,
    #[serde(
        rename = "experimental_attachments",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    attachments: Vec<Attachment>,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.to_string(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn user_with_attachment(content: &str, attachment: Attachment) -> Self {
        Self {
            attachments: vec![attachment],
            ..Self::user(content)
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant reply that keeps the identity it had while it was
    /// being streamed.
    pub fn assistant_with_id(id: MessageId, content: &str) -> Self {
        Self {
            id,
            ..Self::assistant(content)
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}
