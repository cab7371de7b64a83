//! Turns inbound chat events into queued relay tasks.

use tracing::{Span, debug, field, info, instrument};

use crate::{
    base::{
        error::{InvalidEvent, RelayError},
        types::{DIRECT_CHANNEL_TYPE, InboundEvent, OriginKind, Query},
    },
    interaction::relay::{RelayContext, RelayTask},
    service::pool::TaskPool,
};

/// What the dispatcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A relay task was handed to the pool.
    Enqueued,
    /// The event was refused; no task was created.
    Dropped(InvalidEvent),
}

/// Event dispatcher for the application.
///
/// It is designed to be trivially cloneable, so the chat listener can hold one
/// in its callback state.
#[derive(Clone)]
pub struct Dispatcher {
    pool: TaskPool<RelayTask>,
    context: RelayContext,
}

impl Dispatcher {
    pub fn new(pool: TaskPool<RelayTask>, context: RelayContext) -> Self {
        Self { pool, context }
    }

    /// Validate an event and, if it carries a query, queue a relay task for it.
    ///
    /// Returns once the task is queued; waits only while the queue is full.
    #[instrument(
        name = "Dispatcher::dispatch",
        skip_all,
        fields(user.id = %event.user_id, channel.id = %event.channel_id, origin = ?event.origin_kind, query = field::Empty, outcome = field::Empty)
    )]
    pub async fn dispatch(&self, event: InboundEvent) -> Result<DispatchOutcome, RelayError> {
        let span = Span::current();

        let query = match extract_query(&event) {
            Ok(query) => query,
            Err(reason) => {
                span.record("query", event.raw_text.trim());
                span.record("outcome", "dropped");
                debug!("Dropping event: {reason}.");
                return Ok(DispatchOutcome::Dropped(reason));
            }
        };

        span.record("query", query.text.as_str());
        info!("Received query: {}", query.text);

        let task = RelayTask {
            query,
            context: self.context.clone(),
            origin: span.id(),
        };

        if let Err(err) = self.pool.submit(task).await {
            span.record("outcome", "closed");
            return Err(err);
        }

        span.record("outcome", "enqueued");

        Ok(DispatchOutcome::Enqueued)
    }
}

/// Derive the query from an event, or say why there is none.
///
/// Mentions have every `<@BOT_ID>` token removed. Direct messages are only
/// accepted from people in 1:1 conversations.
pub fn extract_query(event: &InboundEvent) -> Result<Query, InvalidEvent> {
    let text = match event.origin_kind {
        OriginKind::Mention => {
            let bot_id = event.bot_identifier.as_deref().filter(|id| !id.is_empty()).ok_or(InvalidEvent::MissingBotIdentifier)?;

            event.raw_text.replace(&format!("<@{bot_id}>"), "")
        }
        OriginKind::DirectMessage => {
            if event.bot_actor.as_deref().is_some_and(|bot| !bot.is_empty()) {
                return Err(InvalidEvent::BotActor);
            }

            if event.channel_type.as_deref() != Some(DIRECT_CHANNEL_TYPE) {
                return Err(InvalidEvent::NotDirectChannel);
            }

            event.raw_text.clone()
        }
    };

    let text = text.trim();

    if text.is_empty() {
        return Err(InvalidEvent::EmptyQuery);
    }

    Ok(Query {
        user_id: event.user_id.clone(),
        channel_id: event.channel_id.clone(),
        text: text.to_string(),
    })
}

// Tests.
