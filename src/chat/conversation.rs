//! A stateful conversation with the model.
//!
//! The conversation owns the ordered message list, turns user input
//! into messages, sends the whole list to the completion service and
//! re-parses the reply as it streams in so the thinking steps can be
//! revealed while the answer is still arriving.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use super::models::{Attachment, ChatMessage, MessageId};
use super::request::{ModelConfig, build_request};
use crate::openai::{CompletionError, CompletionRequest, CompletionService, StreamEvent};
use crate::thinking::{RevealScheduler, StreamingTranscript};

/// Text used for a message that only carries an image.
pub const IMAGE_PLACEHOLDER: &str = "What do you see in this image?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing to send, no message was created.
    Ignored,
    /// The reply was appended with this id.
    Completed(MessageId),
    /// The request failed. The user's message stays in the
    /// conversation and the string is what should be shown.
    Failed(String),
}

/// Receives the trailing reply every time it grows.
pub trait ConversationObserver {
    fn on_reply(&mut self, id: MessageId, reply: &StreamingTranscript, reveal: &RevealScheduler);
}

impl ConversationObserver for () {
    fn on_reply(&mut self, _id: MessageId, _reply: &StreamingTranscript, _reveal: &RevealScheduler) {
    }
}

pub struct Conversation {
    service: Arc<dyn CompletionService>,
    config: ModelConfig,
    messages: Vec<ChatMessage>,
    reveal: RevealScheduler,
}

impl Conversation {
    pub fn new(
        service: Arc<dyn CompletionService>,
        config: ModelConfig,
        reveal_interval: Duration,
    ) -> Self {
        Self {
            service,
            config,
            messages: Vec::new(),
            reveal: RevealScheduler::new(reveal_interval),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn reveal(&self) -> &RevealScheduler {
        &self.reveal
    }

    /// Remove every message from view, cancelling their reveals.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.reveal.clear();
    }

    /// Send the user's input and stream the reply.
    ///
    /// Taking `&mut self` means a conversation can only have one
    /// request in flight, replies never interleave.
    pub async fn submit(
        &mut self,
        input: &str,
        attachment: Option<Attachment>,
        observer: &mut impl ConversationObserver,
    ) -> SubmitOutcome {
        let message = match attachment {
            None if input.trim().is_empty() => return SubmitOutcome::Ignored,
            None => ChatMessage::user(input),
            Some(attachment) if input.trim().is_empty() => {
                ChatMessage::user_with_attachment(IMAGE_PLACEHOLDER, attachment)
            }
            Some(attachment) => ChatMessage::user_with_attachment(input, attachment),
        };
        self.messages.push(message);

        let request = build_request(&self.messages, &self.config);
        let reply_id = MessageId::new();

        match self.stream_reply(reply_id, request, observer).await {
            Ok(text) => {
                self.messages
                    .push(ChatMessage::assistant_with_id(reply_id, &text));
                SubmitOutcome::Completed(reply_id)
            }
            Err(e) => {
                tracing::error!("Chat error: {}", e);
                // The partial reply is discarded along with its reveal
                self.reveal.remove(reply_id);
                SubmitOutcome::Failed(e.user_message())
            }
        }
    }

    async fn stream_reply(
        &mut self,
        id: MessageId,
        request: CompletionRequest,
        observer: &mut impl ConversationObserver,
    ) -> Result<String, CompletionError> {
        let mut events = self.service.stream(request).await?;
        let mut reply = StreamingTranscript::new();

        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Delta(delta) => {
                    reply.push(&delta);
                    if reply.is_closed() {
                        self.reveal.observe(id, reply.thinking().len());
                    }
                    observer.on_reply(id, &reply, &self.reveal);
                }
                StreamEvent::Finished { text, usage } => {
                    if let Some(usage) = usage {
                        tracing::debug!("Usage: {:?}", usage);
                    }
                    return Ok(text);
                }
            }
        }

        Ok(reply.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use crate::chat::Role;
    use crate::openai::{self, TextStream};

    enum Script {
        Reply(Vec<&'static str>),
        Reject(&'static str),
        FailAfter(Vec<&'static str>, &'static str),
    }

    struct ScriptedService {
        script: Script,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedService {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    fn provider_error(message: &str) -> CompletionError {
        CompletionError::Provider {
            status: None,
            message: message.to_string(),
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedService {
        async fn stream(&self, request: CompletionRequest) -> Result<TextStream, CompletionError> {
            self.requests.lock().unwrap().push(request);
            let (deltas, failure) = match &self.script {
                Script::Reply(deltas) => (deltas.clone(), None),
                Script::Reject(message) => return Err(provider_error(message)),
                Script::FailAfter(deltas, message) => (deltas.clone(), Some(*message)),
            };

            let text = deltas.concat();
            let mut events: Vec<Result<StreamEvent, CompletionError>> = deltas
                .into_iter()
                .map(|delta| Ok(StreamEvent::Delta(delta.to_string())))
                .collect();
            match failure {
                Some(message) => events.push(Err(provider_error(message))),
                None => events.push(Ok(StreamEvent::Finished { text, usage: None })),
            }
            Ok(Box::pin(stream::iter(events)))
        }
    }

    #[derive(Default)]
    struct Recorder {
        answers: Vec<String>,
        step_counts: Vec<usize>,
        reveal_started: bool,
    }

    impl ConversationObserver for Recorder {
        fn on_reply(&mut self, id: MessageId, reply: &StreamingTranscript, reveal: &RevealScheduler) {
            self.answers.push(reply.answer().to_string());
            self.step_counts.push(reply.thinking().len());
            self.reveal_started |= reveal.state(id).is_some();
        }
    }

    fn conversation(service: Arc<ScriptedService>) -> Conversation {
        Conversation::new(service, ModelConfig::default(), Duration::from_millis(300))
    }

    fn image() -> Attachment {
        Attachment::from_bytes("image/png", b"png")
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let service = ScriptedService::new(Script::Reply(vec!["unused"]));
        let mut chat = conversation(service.clone());

        let outcome = chat.submit("   \n", None, &mut ()).await;

        assert_eq!(outcome, SubmitOutcome::Ignored);
        assert!(chat.messages().is_empty());
        assert!(service.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attachment_without_text_uses_placeholder() {
        let service = ScriptedService::new(Script::Reply(vec!["A cat."]));
        let mut chat = conversation(service.clone());

        let outcome = chat.submit("", Some(image()), &mut ()).await;

        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        let user = &chat.messages()[0];
        assert_eq!(user.content(), IMAGE_PLACEHOLDER);
        assert_eq!(user.attachments().len(), 1);
        assert_eq!(service.last_request().model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_vision_model_sticks_for_the_conversation() {
        let service = ScriptedService::new(Script::Reply(vec!["ok"]));
        let mut chat = conversation(service.clone());

        chat.submit("Look", Some(image()), &mut ()).await;
        chat.submit("And now?", None, &mut ()).await;

        assert_eq!(service.last_request().model, "gpt-4o");
        assert_eq!(service.last_request().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_streams_and_appends_reply() {
        let service = ScriptedService::new(Script::Reply(vec![
            "<thinking>Step 1: A\n",
            "foo</thinking>",
            "final",
        ]));
        let mut chat = conversation(service.clone());
        let mut recorder = Recorder::default();

        let outcome = chat.submit("Hello", None, &mut recorder).await;

        let SubmitOutcome::Completed(id) = outcome else {
            panic!("Expected a completed reply, got {:?}", outcome);
        };
        assert_eq!(recorder.answers, vec!["", "", "final"]);
        assert_eq!(recorder.step_counts, vec![0, 1, 1]);
        assert!(recorder.reveal_started);

        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id(), id);
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[1].content(), "<thinking>Step 1: A\nfoo</thinking>final");
        assert_eq!(chat.reveal().state(id).map(|state| state.total()), Some(1));
        assert_eq!(service.last_request().model, "gpt-4");
    }

    #[tokio::test]
    async fn test_reply_without_thinking_has_no_reveal() {
        let service = ScriptedService::new(Script::Reply(vec!["Just ", "an answer"]));
        let mut chat = conversation(service);

        let outcome = chat.submit("Hi", None, &mut ()).await;

        let SubmitOutcome::Completed(id) = outcome else {
            panic!("Expected a completed reply");
        };
        assert!(chat.reveal().state(id).is_none());
        assert!(chat.reveal().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_request_keeps_user_message() {
        let service = ScriptedService::new(Script::Reject("quota exceeded"));
        let mut chat = conversation(service);

        let outcome = chat.submit("Test", None, &mut ()).await;

        assert_eq!(
            outcome,
            SubmitOutcome::Failed("OpenAI API quota exceeded".to_string())
        );
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.messages()[0].content(), "Test");
    }

    #[tokio::test]
    async fn test_failure_mid_stream_discards_partial_reply() {
        let service = ScriptedService::new(Script::FailAfter(
            vec!["<thinking>Step 1: A\nfoo</thinking>", "par"],
            "Something went wrong",
        ));
        let mut chat = conversation(service.clone());

        let outcome = chat.submit("Test", None, &mut ()).await;

        assert_eq!(
            outcome,
            SubmitOutcome::Failed("Something went wrong".to_string())
        );
        assert_eq!(chat.messages().len(), 1);
        assert!(chat.reveal().is_empty());

        // The conversation is still usable
        let outcome = chat.submit("Again", None, &mut ()).await;
        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert_eq!(chat.messages().len(), 2);
        assert_eq!(service.last_request().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_cancels_reveals() {
        let service = ScriptedService::new(Script::Reply(vec![
            "<thinking>Step 1: A\nfoo\nStep 2: B\nbar</thinking>done",
        ]));
        let mut chat = conversation(service);
        let SubmitOutcome::Completed(id) = chat.submit("Hi", None, &mut ()).await else {
            panic!("Expected a completed reply");
        };
        assert!(chat.reveal().is_running(id));

        chat.clear();

        assert!(chat.messages().is_empty());
        assert!(!chat.reveal().is_running(id));
        assert!(chat.reveal().is_empty());
    }

    #[test]
    fn test_provider_message_roles() {
        let message = crate::chat::to_provider_message(&ChatMessage::assistant("x"));
        assert_eq!(message.role(), &openai::Role::Assistant);
    }
}
