//! HTTP routes: start a story run, and stream its progress over SSE.
//!
//! The progress subscription is a separate read-only request from the one that
//! starts the run; the two meet only through the caller-supplied stream id.
//! Closing a subscription never affects the underlying run.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use storyforge_pipeline::{Frame, Graph, ProgressBroker, Subscription};
use storyforge_story::{Story, StoryState};
use storyforge_types::ForgeError;

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<Graph<StoryState>>,
    pub broker: ProgressBroker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/stream/:stream_id", get(stream_events))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /api/generate
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    prompt: String,
    theme: String,
    stream_id: Option<String>,
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Response {
    let prompt = body.prompt.trim();
    let theme = body.theme.trim();
    if prompt.is_empty() || theme.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "prompt and theme must be non-empty" })),
        )
            .into_response();
    }
    let stream_id = body.stream_id.filter(|s| !s.trim().is_empty());

    tracing::info!(theme = %theme, streaming = stream_id.is_some(), "starting story run");
    let initial = StoryState::new(prompt, theme, stream_id);
    match state.graph.invoke(initial).await {
        Ok(final_state) => {
            let passages = final_state.passages.unwrap_or_default();
            if passages.is_empty() {
                return error_response(&ForgeError::Other(
                    "story graph did not produce any passages".into(),
                ));
            }
            let story = Story::new(passages);
            (
                StatusCode::OK,
                Json(json!({
                    "title": story.title(),
                    "start_passage": story.start_passage().map(|p| p.name.clone()),
                    "passage_count": story.passages.len(),
                    "twee": story.to_twee(),
                })),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &ForgeError) -> Response {
    let status = err
        .http_status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::error!(%err, "story run failed");
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

// ---------------------------------------------------------------------------
// GET /api/stream/:stream_id
// ---------------------------------------------------------------------------

async fn stream_events(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Response {
    let stream_id = stream_id.trim().to_string();
    if stream_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing stream id" })),
        )
            .into_response();
    }

    tracing::info!(stream = %stream_id, "progress subscription opened");
    let subscription = state.broker.subscribe(&stream_id);
    // Keep-alives come from the broker's per-subscriber heartbeat, so no
    // transport-level keep-alive is layered on top.
    Sse::new(FrameStream(subscription)).into_response()
}

/// Adapts a broker subscription into the SSE event stream. Dropping the
/// stream (client disconnect) unregisters the subscriber.
struct FrameStream(Subscription);

impl tokio_stream::Stream for FrameStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.0.poll_frame(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame_to_event(frame)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn frame_to_event(frame: Frame) -> Event {
    match frame {
        Frame::Connected => Event::default().comment("connected"),
        Frame::Heartbeat => Event::default().comment("keepalive"),
        Frame::Event(payload) => Event::default()
            .event("graph")
            .json_data(&payload)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "progress event failed to serialize");
                Event::default().comment("dropped event")
            }),
    }
}
