//! Error taxonomy of the relay pipeline.
//!
//! Application plumbing (startup, configuration, the chat sink) uses `anyhow`
//! via [`Res`](super::types::Res). The relay itself classifies its failures
//! here, since each variant is handled differently by the task that hits it.

use thiserror::Error;

/// Why the dispatcher refused an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidEvent {
    #[error("mention event carries no bot identifier")]
    MissingBotIdentifier,
    #[error("query is empty after stripping the mention")]
    EmptyQuery,
    #[error("message was authored by a bot")]
    BotActor,
    #[error("message is not from a direct conversation")]
    NotDirectChannel,
}

/// Failures of the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Every connection attempt failed.
    #[error("backend unreachable after {attempts} attempts: {source}")]
    BackendUnreachable {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-2xx status.
    #[error("backend rejected the request with status {status}: {body}")]
    BackendRejected { status: u16, body: String },
    /// The backend answered, but the body is not a valid document.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
    /// A single `data:` record of a stream could not be decoded.
    #[error("malformed stream record: {0}")]
    MalformedStreamRecord(#[from] serde_json::Error),
    /// The outbound sink refused a fragment.
    #[error("failed to send to channel {channel_id}: {source}")]
    SinkSendFailure {
        channel_id: String,
        #[source]
        source: anyhow::Error,
    },
    /// The shared cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
    /// A task was submitted after the pool began shutting down.
    #[error("task pool is closed")]
    PoolClosed,
    /// The backend request could not be built.
    #[error("invalid backend request: {0}")]
    InvalidRequest(#[source] reqwest::Error),
}
