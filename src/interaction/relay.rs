//! The relay task: one query, from backend request to paced outbound messages.

use futures::{StreamExt, stream::BoxStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::{
    base::{
        config::Config,
        error::RelayError,
        types::{BackendRequest, OutboundFragment, Query},
    },
    interaction::normalize::normalize,
    service::{backend::BackendClient, chat::ChatClient, pool::Task},
};

/// Everything a relay task needs besides its query.
///
/// It is designed to be trivially cloneable; every task gets its own copy of
/// the same shared handles.
#[derive(Clone)]
pub struct RelayContext {
    /// The configuration for the application.
    pub config: Config,
    /// The backend client instance.
    pub backend: BackendClient,
    /// The chat client instance, used as the outbound sink.
    pub chat: ChatClient,
    /// Process-wide cancellation, observed by backend calls.
    pub cancel: CancellationToken,
}

/// A queued unit of work: relay one query back to its channel.
pub struct RelayTask {
    pub query: Query,
    pub context: RelayContext,
    /// The dispatch span this task originated from.
    pub origin: Option<tracing::Id>,
}

impl Task for RelayTask {
    async fn run(self) {
        let span = info_span!("relay_task", user.id = %self.query.user_id, channel.id = %self.query.channel_id);
        span.follows_from(self.origin.clone());

        relay(&self.query, &self.context).instrument(span).await;
    }
}

/// Send the query to the backend and deliver its reply.
///
/// Failures end here: they are logged, and where the user should know about
/// them, answered with one fallback message.
#[instrument(skip_all)]
pub async fn relay(query: &Query, context: &RelayContext) {
    let request = BackendRequest::from(query);

    match context.backend.send(&context.cancel, &request).await {
        Ok(response) => {
            let sent = emit(context, normalize(&query.channel_id, response)).await;
            info!("Relayed {sent} fragments to {}.", query.channel_id);
        }
        Err(err @ RelayError::BackendUnreachable { .. }) => {
            error!("{err}");
            send_notice(context, &query.channel_id, &context.config.unavailable_message).await;
        }
        Err(err @ RelayError::BackendRejected { .. }) => {
            warn!("{err}");
            send_notice(context, &query.channel_id, &context.config.rejected_message).await;
        }
        Err(RelayError::Cancelled) => info!("Relay cancelled before the backend answered."),
        Err(err) => error!("Relay failed: {err}"),
    }
}

/// Deliver fragments in order, pausing between consecutive sends.
///
/// Returns the number of fragments the sink accepted.
async fn emit(context: &RelayContext, mut fragments: BoxStream<'static, OutboundFragment>) -> usize {
    let pacing = context.config.pacing_delay();
    let mut attempted = 0;
    let mut sent = 0;

    while let Some(fragment) = fragments.next().await {
        if attempted > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
        attempted += 1;

        match deliver(&context.chat, &fragment.channel_id, &fragment.text).await {
            Ok(()) => sent += 1,
            Err(err) => warn!("{err}"),
        }
    }

    sent
}

async fn send_notice(context: &RelayContext, channel_id: &str, text: &str) {
    if let Err(err) = deliver(&context.chat, channel_id, text).await {
        warn!("{err}");
    }
}

async fn deliver(chat: &ChatClient, channel_id: &str, text: &str) -> Result<(), RelayError> {
    chat.send_message(channel_id, text).await.map_err(|source| RelayError::SinkSendFailure {
        channel_id: channel_id.to_string(),
        source,
    })
}

// Tests.
