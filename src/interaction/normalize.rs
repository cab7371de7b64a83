//! Turns a backend response into outbound fragments.
//!
//! Single documents are split into sentence-like chunks after every `". "`.
//! This is a heuristic, not sentence-boundary detection. Streams yield one
//! fragment per `message_part` record and stop at `stream_end`.

use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use tracing::{debug, warn};

use crate::{
    base::{
        error::RelayError,
        types::{OutboundFragment, StreamEvent, StreamEventKind},
    },
    service::backend::{BackendResponse, LineStream},
};

/// Prefix of a data record line in a streamed response.
const DATA_PREFIX: &str = "data:";

/// Delimiter after which a single document is split.
const CHUNK_DELIMITER: &str = ". ";

/// Normalize a response into an ordered, single-pass fragment stream for `channel_id`.
pub fn normalize(channel_id: &str, response: BackendResponse) -> BoxStream<'static, OutboundFragment> {
    match response {
        BackendResponse::Single { full_text } => {
            let fragments = split_chunks(&full_text)
                .into_iter()
                .map(|text| OutboundFragment {
                    channel_id: channel_id.to_string(),
                    text,
                })
                .collect::<Vec<_>>();

            stream::iter(fragments).boxed()
        }
        BackendResponse::Stream(lines) => stream_fragments(channel_id.to_string(), lines),
    }
}

/// Split after each `". "`, keeping the delimiter's period, and drop blank chunks.
pub fn split_chunks(full_text: &str) -> Vec<String> {
    full_text
        .split_inclusive(CHUNK_DELIMITER)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode one transport line.
///
/// Returns `Ok(None)` for lines that are not data records (`id:`, `event:`,
/// blank separators, comments).
pub fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>, RelayError> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let record = serde_json::from_str(payload.trim_start())?;

    Ok(Some(record))
}

/// Lazily map stream lines to fragments, ending at the terminal record or at transport closure.
fn stream_fragments(channel_id: String, lines: LineStream) -> BoxStream<'static, OutboundFragment> {
    stream::unfold(lines, move |mut lines| {
        let channel_id = channel_id.clone();

        async move {
            loop {
                let line = match lines.next().await {
                    Some(Ok(line)) => line,
                    Some(Err(err)) => {
                        warn!("Backend stream broke off: {err}");
                        return None;
                    }
                    None => {
                        debug!("Backend stream closed without a terminal record.");
                        return None;
                    }
                };

                let record = match parse_stream_line(&line) {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!("Skipping stream record: {err}");
                        continue;
                    }
                };

                match record.event {
                    StreamEventKind::MessagePart => match record.text_chunk {
                        Some(text) if !text.trim().is_empty() => {
                            let fragment = OutboundFragment { channel_id, text };
                            return Some((fragment, lines));
                        }
                        _ => debug!("Skipping empty message part {}.", record.id),
                    },
                    StreamEventKind::StreamEnd => {
                        debug!("Backend stream ended with status {:?}.", record.status);
                        return None;
                    }
                    StreamEventKind::Unknown => debug!("Skipping stream record {} of unknown kind.", record.id),
                }
            }
        }
    })
    .boxed()
}

// Tests.
