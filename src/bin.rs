//! Binary entry point for `chat-relay-bot`.
//!
//! This module provides the command-line interface with options for the
//! configuration file path, logging verbosity, and the built-in mock backend.
//! It initializes tracing, loads configuration, and starts the service.

use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};
use chat_relay::base::{config::{Config, ConfigInner}, types::Void};

/// Chat-relay-bot: answers Slack mentions and direct messages from a chat backend.
///
/// Configuration can come from `config.toml` or `CHAT_RELAY_*` environment
/// variables. Replies are streamed back to the channel the question came from.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Serve the built-in mock backend alongside the bot.
    ///
    /// Same as setting `CHAT_RELAY_MOCK_BACKEND=true`; the default backend URL
    /// already points at it.
    #[arg(long)]
    mock_backend: bool,
}

/// Main entry point for the chat-relay-bot binary.
///
/// Sets up logging based on verbosity, loads configuration, and starts the bot.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
    let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("chat-relay-bot");
    let otel = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    let mut config = Config::load(args.config.as_deref())?;

    if args.mock_backend && !config.mock_backend {
        config = Config::from(ConfigInner {
            mock_backend: true,
            ..(*config.inner).clone()
        });
    }

    chat_relay::start(config).await
}
