use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Slack's channel type tag for a 1:1 conversation.
pub const DIRECT_CHANNEL_TYPE: &str = "im";

/// How an inbound event reached the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// The bot was referenced in a shared channel.
    Mention,
    /// A message in a conversation the bot is part of.
    DirectMessage,
}

/// A platform event, reduced to what the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: String,
    pub channel_id: String,
    pub raw_text: String,
    pub origin_kind: OriginKind,
    /// The bot's own user id (mentions only); used to strip `<@BOT_ID>`.
    pub bot_identifier: Option<String>,
    /// The platform's channel type tag (e.g., `im`, `channel`).
    pub channel_type: Option<String>,
    /// Set when the message was authored by a bot.
    pub bot_actor: Option<String>,
}

impl InboundEvent {
    /// Build a mention event addressed to `bot_identifier`.
    pub fn mention(user_id: impl Into<String>, channel_id: impl Into<String>, raw_text: impl Into<String>, bot_identifier: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            raw_text: raw_text.into(),
            origin_kind: OriginKind::Mention,
            bot_identifier,
            channel_type: None,
            bot_actor: None,
        }
    }

    /// Build a direct-message shaped event.
    pub fn direct_message(user_id: impl Into<String>, channel_id: impl Into<String>, raw_text: impl Into<String>, channel_type: Option<String>, bot_actor: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            raw_text: raw_text.into(),
            origin_kind: OriginKind::DirectMessage,
            bot_identifier: None,
            channel_type,
            bot_actor,
        }
    }
}

/// A validated user query. The text is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
}

/// The body posted to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub user_id: String,
    pub query: String,
    pub channel_id: String,
}

impl From<&Query> for BackendRequest {
    fn from(query: &Query) -> Self {
        Self {
            user_id: query.user_id.clone(),
            query: query.text.clone(),
            channel_id: query.channel_id.clone(),
        }
    }
}

/// A single-document backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleDocument {
    pub full_response: String,
}

/// The kind of a streamed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    MessagePart,
    StreamEnd,
    #[serde(other)]
    Unknown,
}

/// One decoded `data:` record of a streamed backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub id: u64,
    pub event: StreamEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One unit of outbound text; one sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFragment {
    pub channel_id: String,
    pub text: String,
}
