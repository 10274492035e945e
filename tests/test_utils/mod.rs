//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use axum::{Router, body::Body};
use futures::stream;

use thinkchat::api::AppState;
use thinkchat::api::app;
use thinkchat::core::AppConfig;
use thinkchat::openai::{
    CompletionError, CompletionRequest, CompletionService, StreamEvent, TextStream, Usage,
};

/// What the fake completion service does with the next request.
#[derive(Clone)]
pub enum Script {
    /// Stream these deltas and finish.
    Reply(Vec<String>),
    /// Fail before streaming.
    Reject(Option<u16>, String),
    /// Stream these deltas and then fail.
    FailAfter(Vec<String>, String),
}

impl Script {
    pub fn reply(deltas: &[&str]) -> Self {
        Self::Reply(deltas.iter().map(|delta| delta.to_string()).collect())
    }

    pub fn reject(status: Option<u16>, message: &str) -> Self {
        Self::Reject(status, message.to_string())
    }

    pub fn fail_after(deltas: &[&str], message: &str) -> Self {
        Self::FailAfter(
            deltas.iter().map(|delta| delta.to_string()).collect(),
            message.to_string(),
        )
    }
}

/// A completion service that follows a script and records every
/// request it receives.
pub struct FakeCompletionService {
    script: Script,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletionService {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests().pop().expect("No request was sent")
    }
}

fn provider_error(status: Option<u16>, message: &str) -> CompletionError {
    CompletionError::Provider {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl CompletionService for FakeCompletionService {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, CompletionError> {
        self.requests.lock().unwrap().push(request);

        let (deltas, failure) = match &self.script {
            Script::Reply(deltas) => (deltas.clone(), None),
            Script::Reject(status, message) => return Err(provider_error(*status, message)),
            Script::FailAfter(deltas, message) => (deltas.clone(), Some(message.clone())),
        };

        let text = deltas.concat();
        let mut events: Vec<Result<StreamEvent, CompletionError>> =
            deltas.into_iter().map(|delta| Ok(StreamEvent::Delta(delta))).collect();
        match failure {
            Some(message) => events.push(Err(provider_error(None, &message))),
            None => events.push(Ok(StreamEvent::Finished {
                text,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 20,
                    total_tokens: 30,
                }),
            })),
        }
        Ok(Box::pin(stream::iter(events)))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        openai_api_hostname: String::from("http://localhost:1"),
        openai_api_key: Some(String::from("test-api-key")),
        text_model: String::from("gpt-4"),
        vision_model: String::from("gpt-4o"),
        max_tokens: 4000,
        temperature: 0.7,
        reveal_interval_ms: 300,
        web_ui_path: String::from("./web-ui"),
    }
}

/// Creates a test application router backed by a fake completion
/// service.
pub fn test_app(service: Arc<FakeCompletionService>) -> Router {
    let app_state = AppState::with_completion_service(test_config(), service);
    app(Arc::new(RwLock::new(app_state)))
}

/// Creates a test application router that talks to the OpenAI API at
/// `config.openai_api_hostname`.
pub fn test_app_with_config(config: AppConfig) -> Router {
    app(Arc::new(RwLock::new(AppState::new(config))))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Split a server-sent events body into `(event, data)` pairs,
/// skipping keep-alive comments.
pub fn sse_events(body: &str) -> Vec<(String, String)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event: ") {
                    event = Some(value.to_string());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data = Some(value.to_string());
                }
            }
            Some((event?, data?))
        })
        .collect()
}
