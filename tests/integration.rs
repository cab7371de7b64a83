#![cfg(test)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chat_relay::{
    base::{
        config::{Config, ConfigInner},
        error::{InvalidEvent, RelayError},
        types::{InboundEvent, Void},
    },
    interaction::dispatch::{DispatchOutcome, Dispatcher},
    runtime::Runtime,
    service::{
        backend::BackendClient,
        chat::{ChatClient, GenericChatClient},
        mock_backend,
    },
};
use mockall::mock;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_user_id(&self) -> &str;
        async fn start(&self, dispatcher: Dispatcher, cancel: CancellationToken) -> Void;
        async fn send_message(&self, channel_id: &str, text: &str) -> Void;
    }
}

type Sent = Arc<Mutex<Vec<(String, String)>>>;

fn get_mock_chat(sent: &Sent) -> MockChat {
    let mut mock = MockChat::new();
    let sent = sent.clone();

    mock.expect_bot_user_id().return_const("B456".to_string());
    mock.expect_start().returning(|_, _| Ok(()));
    mock.expect_send_message().returning(move |channel_id, text| {
        sent.lock().unwrap().push((channel_id.to_string(), text.to_string()));
        Ok(())
    });

    mock
}

/// Start the built-in mock backend on a free port; returns its chat URL.
async fn start_mock_backend(cancel: &CancellationToken) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(mock_backend::serve_on(listener, Duration::from_millis(10), cancel.clone()));

    format!("http://{addr}{}", mock_backend::CHAT_PATH)
}

/// A local URL nothing listens on.
fn closed_backend_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    format!("http://127.0.0.1:{port}/v1/chat/stream")
}

/// Helper function to setup the test environment.
fn setup_test_environment(backend_url: &str, sent: &Sent) -> Runtime {
    let config = Config {
        inner: Arc::new(ConfigInner {
            slack_app_token: "xapp-test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            backend_url: backend_url.to_string(),
            worker_count: 4,
            pacing_delay_ms: 5,
            retry_backoff_ms: 10,
            ..Default::default()
        }),
    };

    let backend = BackendClient::http(&config).unwrap();
    let chat = ChatClient::new(Arc::new(get_mock_chat(sent)));

    Runtime::with_clients(config, backend, chat)
}

fn texts(sent: &Sent) -> Vec<String> {
    sent.lock().unwrap().iter().map(|(_, text)| text.clone()).collect()
}

// Tests.

#[tokio::test]
async fn test_mention_is_answered_from_a_streaming_backend() {
    let backend_cancel = CancellationToken::new();
    let url = start_mock_backend(&backend_cancel).await;
    let sent = Sent::default();
    let runtime = setup_test_environment(&url, &sent);

    let outcome = runtime
        .dispatcher()
        .dispatch(InboundEvent::mention("U123", "C123", "<@B456>   What is Rust?", Some("B456".to_string())))
        .await
        .unwrap();
    runtime.pool.shutdown().await;
    backend_cancel.cancel();

    assert_eq!(outcome, DispatchOutcome::Enqueued);
    assert_eq!(
        *sent.lock().unwrap(),
        vec![
            ("C123".to_string(), "Processing: What is Rust?".to_string()),
            ("C123".to_string(), "Replies are streamed in parts".to_string()),
            ("C123".to_string(), "Each part is posted as it arrives".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_direct_message_is_answered_from_a_single_document() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "full_response": "Sentence one. Sentence two." })))
        .expect(1)
        .mount(&server)
        .await;

    let sent = Sent::default();
    let runtime = setup_test_environment(&server.uri(), &sent);

    runtime
        .dispatcher()
        .dispatch(InboundEvent::direct_message("U1", "D1", "  hello  ", Some("im".to_string()), None))
        .await
        .unwrap();
    runtime.pool.shutdown().await;

    assert_eq!(
        *sent.lock().unwrap(),
        vec![("D1".to_string(), "Sentence one.".to_string()), ("D1".to_string(), "Sentence two.".to_string())]
    );
}

#[tokio::test]
async fn test_invalid_events_never_reach_the_backend() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "full_response": "unused" })))
        .expect(0)
        .mount(&server)
        .await;

    let sent = Sent::default();
    let runtime = setup_test_environment(&server.uri(), &sent);
    let dispatcher = runtime.dispatcher();

    let empty = dispatcher
        .dispatch(InboundEvent::mention("U1", "C1", "<@B456>   ", Some("B456".to_string())))
        .await
        .unwrap();
    let from_bot = dispatcher
        .dispatch(InboundEvent::direct_message("U1", "D1", "hello", Some("im".to_string()), Some("B1".to_string())))
        .await
        .unwrap();
    let in_channel = dispatcher
        .dispatch(InboundEvent::direct_message("U1", "C1", "hello", Some("channel".to_string()), None))
        .await
        .unwrap();
    runtime.pool.shutdown().await;

    assert_eq!(empty, DispatchOutcome::Dropped(InvalidEvent::EmptyQuery));
    assert_eq!(from_bot, DispatchOutcome::Dropped(InvalidEvent::BotActor));
    assert_eq!(in_channel, DispatchOutcome::Dropped(InvalidEvent::NotDirectChannel));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_sends_one_fallback() {
    let sent = Sent::default();
    let runtime = setup_test_environment(&closed_backend_url(), &sent);

    runtime
        .dispatcher()
        .dispatch(InboundEvent::mention("U1", "C1", "<@B456> anyone there?", Some("B456".to_string())))
        .await
        .unwrap();
    runtime.pool.shutdown().await;

    assert_eq!(texts(&sent), vec![runtime.config.unavailable_message.clone()]);
}

#[tokio::test]
async fn test_rejected_request_sends_one_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let sent = Sent::default();
    let runtime = setup_test_environment(&server.uri(), &sent);

    runtime
        .dispatcher()
        .dispatch(InboundEvent::mention("U1", "C1", "<@B456> hi", Some("B456".to_string())))
        .await
        .unwrap();
    runtime.pool.shutdown().await;

    assert_eq!(texts(&sent), vec![runtime.config.rejected_message.clone()]);
}

#[tokio::test]
async fn test_replies_to_many_queries_stay_ordered_per_channel() {
    let backend_cancel = CancellationToken::new();
    let url = start_mock_backend(&backend_cancel).await;
    let sent = Sent::default();
    let runtime = setup_test_environment(&url, &sent);
    let dispatcher = runtime.dispatcher();

    for index in 0..10 {
        let event = InboundEvent::mention("U1", format!("C{index}"), format!("<@B456> question {index}"), Some("B456".to_string()));
        dispatcher.dispatch(event).await.unwrap();
    }
    runtime.pool.shutdown().await;
    backend_cancel.cancel();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 30);

    for index in 0..10 {
        let channel = format!("C{index}");
        let replies = sent.iter().filter(|(channel_id, _)| *channel_id == channel).map(|(_, text)| text.as_str()).collect::<Vec<_>>();

        assert_eq!(
            replies,
            vec![format!("Processing: question {index}").as_str(), "Replies are streamed in parts", "Each part is posted as it arrives"]
        );
    }
}

#[tokio::test]
async fn test_runtime_start_drains_and_closes_the_pool() {
    let sent = Sent::default();
    let runtime = setup_test_environment(&closed_backend_url(), &sent);

    // The mock chat listener returns at once, which ends the run.
    runtime.start().await.unwrap();

    assert!(runtime.cancel.is_cancelled());
    assert!(runtime.pool.is_closed());

    let result = runtime
        .dispatcher()
        .dispatch(InboundEvent::mention("U1", "C1", "<@B456> too late", Some("B456".to_string())))
        .await;

    assert!(matches!(result, Err(RelayError::PoolClosed)));
}
