pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{base::types::Void, interaction::dispatch::Dispatcher};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// A chat client is both the inbound event source (it feeds the dispatcher
/// once started) and the outbound sink. Implementations must tolerate
/// concurrent `send_message` calls from every relay worker.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Returns the unique identifier for the bot in the chat platform,
    /// which is used to strip the bot's mention from queries.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// Turns platform events into inbound events for the dispatcher until the
    /// cancellation token fires.
    async fn start(&self, dispatcher: Dispatcher, cancel: CancellationToken) -> Void;

    /// Send a message to a channel.
    ///
    /// One call per outbound fragment; failures are reported, never retried here.
    async fn send_message(&self, channel_id: &str, text: &str) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
