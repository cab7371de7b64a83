//! HTTP backend integration.
//!
//! Posts each query as JSON, asking for an event stream, and accepts whichever
//! transport the backend actually answers with. Connection failures are retried
//! with a linear backoff; HTTP error statuses are not.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    io::StreamReader,
    sync::CancellationToken,
};
use tracing::{error, info, instrument, warn};

use crate::base::{
    config::Config,
    error::RelayError,
    types::{BackendRequest, Res, SingleDocument},
};

use super::{BackendClient, BackendResponse, GenericBackendClient, LineStream};

/// Content type of a streamed backend response.
pub const EVENT_STREAM: &str = "text/event-stream";

// Extra methods on `BackendClient` applied by the http implementation.

impl BackendClient {
    pub fn http(config: &Config) -> Res<Self> {
        let client = HttpBackendClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// HTTP backend client implementation.
#[derive(Clone)]
pub struct HttpBackendClient {
    client: reqwest::Client,
    config: Config,
}

impl HttpBackendClient {
    /// Create a new HTTP backend client.
    #[instrument(name = "HttpBackendClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.backend_connect_timeout())
            .read_timeout(config.backend_read_timeout())
            .build()?;

        Ok(Self { client, config: config.clone() })
    }

    /// Turn a connected response into a [`BackendResponse`].
    async fn classify(&self, response: reqwest::Response) -> Result<BackendResponse, RelayError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::BackendRejected { status: status.as_u16(), body });
        }

        if is_event_stream(&response) {
            return Ok(BackendResponse::Stream(line_stream(response)));
        }

        let document: SingleDocument = response.json().await.map_err(|err| RelayError::MalformedResponse(err.to_string()))?;

        Ok(BackendResponse::Single { full_text: document.full_response })
    }
}

#[async_trait]
impl GenericBackendClient for HttpBackendClient {
    #[instrument(name = "HttpBackendClient::send", skip_all, fields(user.id = %request.user_id, channel.id = %request.channel_id))]
    async fn send(&self, cancel: &CancellationToken, request: &BackendRequest) -> Result<BackendResponse, RelayError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            let call = self.client.post(&self.config.backend_url).header(ACCEPT, EVENT_STREAM).json(request).send();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                result = call => result,
            };

            match result {
                Ok(response) => {
                    info!("Backend answered with status {} on attempt {attempt}.", response.status());

                    // Body reads are part of the call.
                    return tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(RelayError::Cancelled),
                        result = self.classify(response) => result,
                    };
                }
                Err(err) if err.is_builder() => return Err(RelayError::InvalidRequest(err)),
                Err(err) if attempt >= attempts => {
                    error!("Backend unreachable after {attempts} attempts: {err}");
                    return Err(RelayError::BackendUnreachable { attempts, source: err });
                }
                Err(err) => {
                    let delay = self.config.retry_backoff() * attempt;
                    warn!("Backend call failed, retrying {attempt}/{attempts} in {delay:?}: {err}");

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }
}

// Helpers.

/// Whether the declared content type (ignoring parameters) is an event stream.
fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|base| base.trim().eq_ignore_ascii_case(EVENT_STREAM))
}

/// Read the body lazily, one line at a time.
fn line_stream(response: reqwest::Response) -> LineStream {
    let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));

    FramedRead::new(StreamReader::new(body), LinesCodec::new())
        .map_err(|err| RelayError::MalformedResponse(err.to_string()))
        .boxed()
}

// Tests.

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        time::{Duration, Instant},
    };

    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method},
    };

    use super::*;
    use crate::base::config::ConfigInner;

    fn create_test_config(backend_url: &str, retry_backoff_ms: u64) -> Config {
        Config::from(ConfigInner {
            backend_url: backend_url.to_string(),
            retry_backoff_ms,
            ..Default::default()
        })
    }

    /// A backend that answers every connection with `response` and then goes silent.
    fn stalled_backend_url(response: &'static str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };

                std::thread::spawn(move || {
                    let mut request = [0u8; 4096];
                    let _ = stream.read(&mut request);
                    let _ = stream.write_all(response.as_bytes());
                    let _ = stream.flush();

                    std::thread::sleep(Duration::from_secs(10));
                });
            }
        });

        format!("http://127.0.0.1:{port}/v1/chat/stream")
    }

    fn create_test_request() -> BackendRequest {
        BackendRequest {
            user_id: "U1".to_string(),
            query: "What is Rust?".to_string(),
            channel_id: "C1".to_string(),
        }
    }

    /// A local address nothing listens on.
    fn closed_backend_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        format!("http://127.0.0.1:{port}/v1/chat/stream")
    }

    #[tokio::test]
    async fn test_single_document_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("accept", EVENT_STREAM))
            .and(body_json(serde_json::json!({ "user_id": "U1", "query": "What is Rust?", "channel_id": "C1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "full_response": "Sentence one. Sentence two." })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::http(&create_test_config(&server.uri(), 10)).unwrap();
        let response = client.send(&CancellationToken::new(), &create_test_request()).await.unwrap();

        match response {
            BackendResponse::Single { full_text } => assert_eq!(full_text, "Sentence one. Sentence two."),
            other => panic!("expected a single document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_stream_response_is_read_as_lines() {
        let server = MockServer::start().await;
        let body = "id: 1\nevent: message_part\ndata: {\"id\":1,\"event\":\"message_part\",\"text_chunk\":\"part1\"}\n\nid: 2\nevent: stream_end\ndata: {\"id\":2,\"event\":\"stream_end\",\"status\":\"done\"}\n\n";

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream; charset=utf-8"))
            .mount(&server)
            .await;

        let client = BackendClient::http(&create_test_config(&server.uri(), 10)).unwrap();
        let response = client.send(&CancellationToken::new(), &create_test_request()).await.unwrap();

        let BackendResponse::Stream(lines) = response else {
            panic!("expected a stream");
        };
        let lines = lines.try_collect::<Vec<_>>().await.unwrap();

        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "id: 1");
        assert_eq!(lines[2], "data: {\"id\":1,\"event\":\"message_part\",\"text_chunk\":\"part1\"}");
        assert_eq!(lines[3], "");
    }

    #[tokio::test]
    async fn test_error_status_is_rejected_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::http(&create_test_config(&server.uri(), 10)).unwrap();
        let result = client.send(&CancellationToken::new(), &create_test_request()).await;

        match result {
            Err(RelayError::BackendRejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_document_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "application/json"))
            .mount(&server)
            .await;

        let client = BackendClient::http(&create_test_config(&server.uri(), 10)).unwrap();
        let result = client.send(&CancellationToken::new(), &create_test_request()).await;

        assert!(matches!(result, Err(RelayError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_connection_failure_is_retried_then_unreachable() {
        let client = BackendClient::http(&create_test_config(&closed_backend_url(), 20)).unwrap();

        let started = Instant::now();
        let result = client.send(&CancellationToken::new(), &create_test_request()).await;

        match result {
            Err(RelayError::BackendUnreachable { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected unreachable, got {other:?}"),
        }

        // Two backoff waits: 20ms then 40ms.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_any_attempt() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "full_response": "unused" })))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = BackendClient::http(&create_test_config(&server.uri(), 10)).unwrap();
        let result = client.send(&cancel, &create_test_request()).await;

        assert!(matches!(result, Err(RelayError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let client = BackendClient::http(&create_test_config(&closed_backend_url(), 10_000)).unwrap();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), client.send(&cancel, &create_test_request())).await;

        assert!(matches!(result, Ok(Err(RelayError::Cancelled))));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_a_stalled_body() {
        let url = stalled_backend_url("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"full_");
        let client = BackendClient::http(&create_test_config(&url, 10)).unwrap();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(3), client.send(&cancel, &create_test_request())).await;

        assert!(matches!(result, Ok(Err(RelayError::Cancelled))));
    }

    #[tokio::test]
    async fn test_stalled_stream_ends_after_read_timeout() {
        let url = stalled_backend_url(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\ndata: {\"id\":1,\"event\":\"message_part\",\"text_chunk\":\"part1\"}\n\n",
        );
        let config = Config::from(ConfigInner {
            backend_url: url,
            backend_read_timeout_secs: 1,
            ..Default::default()
        });

        let client = BackendClient::http(&config).unwrap();
        let response = client.send(&CancellationToken::new(), &create_test_request()).await.unwrap();

        let texts = tokio::time::timeout(
            Duration::from_secs(5),
            crate::interaction::normalize::normalize("C1", response).map(|fragment| fragment.text).collect::<Vec<_>>(),
        )
        .await;

        assert_eq!(texts.unwrap(), vec!["part1"]);
    }
}
