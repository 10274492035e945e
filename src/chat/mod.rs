mod attachment;
mod conversation;
mod models;
mod request;

pub use attachment::{AttachmentError, MAX_ATTACHMENT_BYTES, image_content_type};
pub use conversation::{Conversation, ConversationObserver, IMAGE_PLACEHOLDER, SubmitOutcome};
pub use models::{Attachment, ChatMessage, MessageId, Role};
pub use request::{ModelConfig, SYSTEM_PROMPT, build_request, select_model, to_provider_message};
