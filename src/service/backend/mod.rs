pub mod http;

use std::{fmt, ops::Deref, sync::Arc};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::base::{error::RelayError, types::BackendRequest};

// Types.

/// Lines of a streamed response body, read lazily from the transport.
pub type LineStream = BoxStream<'static, Result<String, RelayError>>;

/// A backend answer, classified by its transport.
pub enum BackendResponse {
    /// A single JSON document carrying the whole reply.
    Single { full_text: String },
    /// A line-delimited event stream; consumed once.
    Stream(LineStream),
}

impl fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single { full_text } => f.debug_struct("Single").field("full_text", full_text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// Traits.

/// Generic backend client trait that clients must implement.
///
/// Implementations own the retry policy: the relay task calls `send` once per
/// query and never retries on its own.
#[async_trait]
pub trait GenericBackendClient: Send + Sync + 'static {
    /// Send a query to the backend.
    ///
    /// The cancellation token governs every attempt and every backoff wait;
    /// once it fires the call returns [`RelayError::Cancelled`].
    async fn send(&self, cancel: &CancellationToken, request: &BackendRequest) -> Result<BackendResponse, RelayError>;
}

// Structs.

/// Backend client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<dyn GenericBackendClient>,
}

impl Deref for BackendClient {
    type Target = dyn GenericBackendClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl BackendClient {
    pub fn new(inner: Arc<dyn GenericBackendClient>) -> Self {
        Self { inner }
    }
}
