//! Router for the chat API

use std::convert::Infallible;
use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, sse::Event, sse::KeepAlive, sse::Sse},
    routing::post,
};
use futures_util::StreamExt as _;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public::{self, events};
use crate::api::public::{ApiError, ErrorResponse};
use crate::api::state::AppState;
use crate::chat::{ModelConfig, build_request};
use crate::openai::{StreamEvent, TextStream};

type SharedState = Arc<RwLock<AppState>>;

fn text_event(delta: &str) -> Event {
    Event::default().event(events::TEXT).data(json!(delta).to_string())
}

fn finish_event(finish: &public::ChatFinish) -> Event {
    Event::default()
        .event(events::FINISH)
        .data(json!(finish).to_string())
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event(events::ERROR)
        .data(json!(ErrorResponse::new(message)).to_string())
}

/// Forward the completion stream to the client until it finishes,
/// fails, or the client goes away.
async fn forward_events(mut stream: TextStream, tx: mpsc::UnboundedSender<Event>) {
    while let Some(event) = stream.next().await {
        let sse_event = match event {
            Ok(StreamEvent::Delta(delta)) => text_event(&delta),
            Ok(StreamEvent::Finished { text, usage }) => {
                finish_event(&public::ChatFinish { text, usage })
            }
            Err(e) => {
                tracing::error!("Chat stream error: {}", e);
                let _ = tx.send(error_event(&e.user_message()));
                return;
            }
        };

        if tx.send(sse_event).is_err() {
            tracing::info!("Client disconnected before the reply finished");
            return;
        }
    }
}

/// Send the conversation to the model and stream the reply
async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (completion, model_config) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            Arc::clone(&shared_state.completion),
            ModelConfig::from(&shared_state.config),
        )
    };

    let request = build_request(&payload.messages, &model_config);

    // Anything that fails before the first byte is a plain error response
    let stream = completion.stream(request).await?;

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    tokio::spawn(forward_events(stream, tx));

    let sse_stream = UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(chat_handler))
}
