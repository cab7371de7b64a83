//! Library root for `chat-relay-bot`.
//!
//! The relay bot forwards Slack questions to a chat backend and posts the
//! answers back:
//! - @-mentions in channels and direct messages become queries
//! - A bounded worker pool bounds how many relays run at once
//! - Backend replies arrive as one JSON document or as an event stream
//! - Replies are posted in order, one paced message per fragment
//!
//! The architecture is built around extensible traits that allow for
//! different implementations of the chat platform and the backend.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use anyhow::anyhow;
use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the relay runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the backend and chat clients
/// - Runs until a shutdown signal, then drains queued work
pub async fn start(config: Config) -> Void {
    info!("Starting chat-relay-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install the rustls crypto provider"))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
