//! Turns a conversation into a completion request: picks the model,
//! reshapes messages into the provider's content format and adds the
//! system prompt that defines the thinking transcript format.

use crate::core::AppConfig;
use crate::openai::{self, CompletionRequest, ContentPart};

use super::models::{ChatMessage, Role};

pub const SYSTEM_PROMPT: &str = r"You are a helpful AI assistant. For complex questions, show your reasoning process step by step before providing your final answer.

Format your response like this:
<thinking>
Step 1: [Brief title]
[Detailed reasoning for this step]

Step 2: [Brief title]
[Detailed reasoning for this step]

[Continue with more steps as needed]
</thinking>

[Your final answer here]

Always include the <thinking> tags when showing your reasoning process.";

#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    pub text_model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text_model: "gpt-4".to_string(),
            vision_model: "gpt-4o".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
        }
    }
}

impl From<&AppConfig> for ModelConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// The vision model is used for the whole request as soon as any
/// message in the conversation carries an attachment.
pub fn select_model<'a>(messages: &[ChatMessage], config: &'a ModelConfig) -> &'a str {
    if messages.iter().any(ChatMessage::has_attachments) {
        &config.vision_model
    } else {
        &config.text_model
    }
}

/// Messages with attachments become a text part followed by one image
/// part per attachment, everything else is sent as plain text.
pub fn to_provider_message(message: &ChatMessage) -> openai::Message {
    let role = match message.role() {
        Role::User => openai::Role::User,
        Role::Assistant => openai::Role::Assistant,
    };

    if !message.has_attachments() {
        return openai::Message::new(role, message.content());
    }

    let parts = std::iter::once(ContentPart::text(message.content()))
        .chain(
            message
                .attachments()
                .iter()
                .map(|attachment| ContentPart::image(&attachment.url)),
        )
        .collect();
    openai::Message::new_with_parts(role, parts)
}

pub fn build_request(messages: &[ChatMessage], config: &ModelConfig) -> CompletionRequest {
    let model = select_model(messages, config).to_string();
    let messages: Vec<openai::Message> = messages.iter().map(to_provider_message).collect();

    let user_text = messages
        .last()
        .map(|msg| msg.content.text().unwrap_or("Image message"))
        .unwrap_or_default();
    tracing::debug!("System Prompt: {}", SYSTEM_PROMPT);
    tracing::debug!("User Message: {}", user_text);
    tracing::info!("Requesting completion from {} for {} messages", model, messages.len());

    CompletionRequest {
        model,
        system_prompt: SYSTEM_PROMPT.to_string(),
        messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Attachment;
    use serde_json::json;

    fn image() -> Attachment {
        Attachment {
            content_type: "image/png".to_string(),
            url: "data:image/png;base64,iVBORw0KGg...".to_string(),
        }
    }

    #[test]
    fn test_text_only_uses_text_model() {
        let messages = vec![ChatMessage::user("Hello, how are you?")];
        let request = build_request(&messages, &ModelConfig::default());

        assert_eq!(request.model, "gpt-4");
        assert!(request.system_prompt.contains("<thinking>"));
        assert_eq!(request.max_tokens, 4000);
        assert_eq!(
            serde_json::to_value(&request.messages).unwrap(),
            json!([{"role": "user", "content": "Hello, how are you?"}])
        );
    }

    #[test]
    fn test_any_attachment_uses_vision_model() {
        let messages = vec![
            ChatMessage::user_with_attachment("What is this?", image()),
            ChatMessage::assistant("A cat."),
            ChatMessage::user("Thanks"),
        ];
        let config = ModelConfig::default();
        assert_eq!(select_model(&messages, &config), "gpt-4o");
        assert_eq!(select_model(&messages[1..], &config), "gpt-4");
    }

    #[test]
    fn test_attachments_become_content_parts() {
        let request = build_request(
            &[ChatMessage::user_with_attachment("What is in this image?", image())],
            &ModelConfig::default(),
        );
        assert_eq!(
            serde_json::to_value(&request.messages).unwrap(),
            json!([{
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is in this image?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBORw0KGg..."}}
                ]
            }])
        );
    }

    #[test]
    fn test_empty_text_part_is_kept() {
        let message = to_provider_message(&ChatMessage::user_with_attachment("", image()));
        match message.content {
            openai::Content::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], ContentPart::text(""));
            }
            openai::Content::Text(_) => panic!("Expected content parts"),
        }
    }

    #[test]
    fn test_conversation_order_is_preserved() {
        let messages = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there!"),
            ChatMessage::user("How can you help me?"),
        ];
        let request = build_request(&messages, &ModelConfig::default());
        assert_eq!(
            serde_json::to_value(&request.messages).unwrap(),
            json!([
                {"role": "user", "content": "Hello"},
                {"role": "assistant", "content": "Hi there!"},
                {"role": "user", "content": "How can you help me?"}
            ])
        );
    }
}
