//! Slack integration for the relay bot.
//!
//! Events arrive over Socket Mode and are reduced to [`InboundEvent`]s for the
//! dispatcher. Replies go out through `chat.postMessage` with the bot token.

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{InboundEvent, Res, Void},
    },
    interaction::dispatch::{DispatchOutcome, Dispatcher},
};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    dispatcher: Dispatcher,
    bot_user_id: String,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self, dispatcher: Dispatcher, cancel: CancellationToken) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            dispatcher,
            bot_user_id: self.bot_user_id.clone(),
        }));

        let socket_mode_listener = SlackClientSocketModeListener::new(&SlackClientSocketModeConfig::new(), listener_environment, socket_mode_callbacks);

        // Register the app token, then hold the connections open until cancelled.

        socket_mode_listener.listen_for(&self.app_token).await?;
        socket_mode_listener.start().await;

        info!("Listening for Slack events ...");

        cancel.cancelled().await;

        info!("Closing Slack socket mode connections ...");
        socket_mode_listener.shutdown().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

// Socket mode listener callbacks for Slack.

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (dispatcher, bot_user_id) = {
        let states = states.read().await;
        let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

        (user_state.dispatcher.clone(), user_state.bot_user_id.clone())
    };

    let Some(event) = inbound_event(event_callback.event, &bot_user_id) else {
        return Ok(());
    };

    // Waits here while the relay queue is full.
    match dispatcher.dispatch(event).await {
        Ok(DispatchOutcome::Enqueued) => debug!("Event enqueued."),
        Ok(DispatchOutcome::Dropped(reason)) => debug!("Event dropped: {reason}."),
        Err(err) => warn!("Failed to dispatch event: {err}"),
    }

    Ok(())
}

/// Reduce a Slack push event to an inbound event.
///
/// Returns `None` for event kinds the bot does not answer, and for message
/// subtypes (edits, deletions, joins, and the like).
fn inbound_event(body: SlackEventCallbackBody, bot_user_id: &str) -> Option<InboundEvent> {
    match body {
        SlackEventCallbackBody::AppMention(mention) => {
            info!("Received app mention event ...");

            Some(InboundEvent::mention(
                mention.user.0,
                mention.channel.0,
                mention.content.text.unwrap_or_default(),
                Some(bot_user_id.to_string()),
            ))
        }
        SlackEventCallbackBody::Message(message) => {
            if message.subtype.is_some() {
                debug!("Skipping message event with subtype {:?}.", message.subtype);
                return None;
            }

            let (Some(user), Some(channel)) = (message.sender.user, message.origin.channel) else {
                debug!("Skipping message event without a user or channel.");
                return None;
            };

            info!("Received message event ...");

            Some(InboundEvent::direct_message(
                user.0,
                channel.0,
                message.content.and_then(|content| content.text).unwrap_or_default(),
                message.origin.channel_type.map(|channel_type| channel_type.0),
                message.sender.bot_id.map(|bot_id| bot_id.0),
            ))
        }
        _ => {
            debug!("Received unhandled push event.");
            None
        }
    }
}

// Tests.
