//! A stand-in chat backend for local runs.
//!
//! Serves `POST /v1/chat/stream`. Requests that accept `text/event-stream` get
//! three message parts and a terminal record, spaced out in time; all others
//! get a single JSON document.

use std::{convert::Infallible, net::SocketAddr, time::Duration};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::{StreamExt, stream};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    base::types::{BackendRequest, SingleDocument, StreamEvent, StreamEventKind, Void},
    service::backend::http::EVENT_STREAM,
};

/// Path the mock backend answers on.
pub const CHAT_PATH: &str = "/v1/chat/stream";

/// Delay between streamed records.
pub const RECORD_DELAY: Duration = Duration::from_millis(300);

/// Build the mock backend router, pausing `record_delay` between streamed records.
pub fn router(record_delay: Duration) -> Router {
    Router::new().route(CHAT_PATH, post(handle_chat)).with_state(record_delay)
}

/// Serve the mock backend on all interfaces at `port` until cancelled.
pub async fn serve(port: u16, cancel: CancellationToken) -> Void {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;

    serve_on(listener, RECORD_DELAY, cancel).await
}

/// Serve the mock backend on an already bound listener until cancelled.
pub async fn serve_on(listener: TcpListener, record_delay: Duration, cancel: CancellationToken) -> Void {
    info!("Mock backend listening on {}{CHAT_PATH}", listener.local_addr()?);

    axum::serve(listener, router(record_delay)).with_graceful_shutdown(cancel.cancelled_owned()).await?;

    info!("Mock backend stopped.");

    Ok(())
}

#[instrument(skip_all)]
async fn handle_chat(State(record_delay): State<Duration>, headers: HeaderMap, body: Bytes) -> Response {
    let request: BackendRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!("Rejecting malformed request: {err}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    info!(user.id = %request.user_id, channel.id = %request.channel_id, "Mock backend received: {}", request.query);

    let wants_stream = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(EVENT_STREAM));

    if !wants_stream {
        let document = SingleDocument {
            full_response: format!("Complete response to '{}': Streaming keeps replies responsive. Chunks arrive as they are ready.", request.query),
        };

        return axum::Json(document).into_response();
    }

    let frames = stream_records(&request.query).into_iter().map(|record| frame(&record)).enumerate();

    let body = stream::iter(frames).then(move |(index, frame)| async move {
        if index > 0 {
            tokio::time::sleep(record_delay).await;
        }

        Ok::<_, Infallible>(Bytes::from(frame))
    });

    ([(header::CONTENT_TYPE, EVENT_STREAM)], Body::from_stream(body)).into_response()
}

/// The canned reply streamed for `query`.
fn stream_records(query: &str) -> Vec<StreamEvent> {
    let parts = [format!("Processing: {query}"), "Replies are streamed in parts".to_string(), "Each part is posted as it arrives".to_string()];

    let mut records = parts
        .into_iter()
        .zip(1..)
        .map(|(text, id)| StreamEvent {
            id,
            event: StreamEventKind::MessagePart,
            text_chunk: Some(text),
            status: None,
        })
        .collect::<Vec<_>>();

    records.push(StreamEvent {
        id: records.len() as u64 + 1,
        event: StreamEventKind::StreamEnd,
        text_chunk: None,
        status: Some("done".to_string()),
    });

    records
}

/// Encode one record as an `id`/`event`/`data` frame.
fn frame(record: &StreamEvent) -> String {
    let kind = match record.event {
        StreamEventKind::MessagePart => "message_part",
        StreamEventKind::StreamEnd => "stream_end",
        StreamEventKind::Unknown => "unknown",
    };
    let data = serde_json::to_string(record).unwrap_or_default();

    format!("id: {}\nevent: {kind}\ndata: {data}\n\n", record.id)
}

// Tests.
