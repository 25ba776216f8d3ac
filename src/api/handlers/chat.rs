//! `/chat` and `/chat/stream` handlers.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;

use crate::rag::pipeline::{QueryOptions, StreamingQueryResult};
use crate::types::{AppError, ChatRequest, ChatResponse, Result, MAX_QUESTION_LEN};
use crate::AppState;

fn validate(request: &ChatRequest) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(AppError::InvalidInput("question must not be empty".into()));
    }
    if request.question.chars().count() > MAX_QUESTION_LEN {
        return Err(AppError::InvalidInput(format!(
            "question exceeds the maximum length of {MAX_QUESTION_LEN} characters"
        )));
    }
    if let Some(top_k) = request.top_k {
        if !(1..=20).contains(&top_k) {
            return Err(AppError::InvalidInput("top_k must be between 1 and 20".into()));
        }
    }
    if let Some(min_score) = request.min_score {
        if !(0.0..=1.0).contains(&min_score) {
            return Err(AppError::InvalidInput("min_score must be between 0 and 1".into()));
        }
    }
    Ok(())
}

/// `POST /api/chat` — answer a question grounded in the ingested corpus.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses((status = 200, description = "Answer with cited sources", body = ChatResponse)),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    validate(&request)?;

    let options = QueryOptions {
        party_filter: request.party_filter,
        top_k: request.top_k,
        min_score: request.min_score,
    };
    let response = state.pipeline.query(&request.question, options).await?;
    Ok(Json(response))
}

/// `POST /api/chat/stream` — same as `chat`, as server-sent events.
///
/// Event types: `token` (text delta), `sources` (once, JSON payload),
/// `done` (terminal), `error` (terminal with message). The `sources`
/// event may arrive before or after the first `token`; clients must not
/// assume ordering between them.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    validate(&request)?;

    let options = QueryOptions {
        party_filter: request.party_filter,
        top_k: request.top_k,
        min_score: request.min_score,
    };

    let outcome = state.pipeline.query_streaming(&request.question, options).await?;

    let events: std::pin::Pin<Box<dyn Stream<Item = std::result::Result<Event, Infallible>> + Send>> =
        match outcome {
            StreamingQueryResult::Cached(response) => {
                let sources_event = Event::default()
                    .event("sources")
                    .json_data(&response.sources)
                    .unwrap_or_else(|_| Event::default().event("sources").data("[]"));
                let token_event = Event::default().event("token").data(response.answer);
                let done_event = Event::default()
                    .event("done")
                    .json_data(&response.metadata)
                    .unwrap_or_else(|_| Event::default().event("done").data("{}"));
                Box::pin(stream::iter(vec![Ok(sources_event), Ok(token_event), Ok(done_event)]))
            }
            StreamingQueryResult::Live { sources, model, stream: deltas } => {
                let sources_event = Event::default()
                    .event("sources")
                    .json_data(&sources)
                    .unwrap_or_else(|_| Event::default().event("sources").data("[]"));

                let token_events = deltas.map(move |delta| match delta {
                    Ok(text) => Ok(Event::default().event("token").data(text)),
                    Err(e) => Ok(Event::default().event("error").data(e.to_string())),
                });

                let done_event = stream::once(async move {
                    Ok(Event::default()
                        .event("done")
                        .data(serde_json::json!({ "model": model }).to_string()))
                });

                Box::pin(
                    stream::once(async move { Ok(sources_event) })
                        .chain(token_events)
                        .chain(done_event),
                )
            }
        };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
