mod fixtures;

use fixtures::HrMockServer;
use hrconnect_conversation::{
    ChatSession, ChatStorage, LoadOutcome, MemoryStore, SendOutcome, SessionOptions,
};
use hrconnect_core::{ConversationId, Sender, APOLOGY_TEXT, TIMEOUT_TEXT};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn session(backend: hrconnect_client::HttpBackend) -> ChatSession {
    ChatSession::open(
        Arc::new(backend),
        ChatStorage::new(Arc::new(MemoryStore::new())),
        SessionOptions::default(),
    )
}

#[tokio::test]
async fn test_conversation_id_is_carried_forward() {
    let mock = HrMockServer::new().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chatbot/query"))
        .and(body_json(json!({ "question": "How many vacation days do I have?", "conversation_id": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "You have 12 vacation days remaining.",
            "conversation_id": 7
        })))
        .expect(1)
        .mount(mock.server())
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chatbot/query"))
        .and(body_json(json!({ "question": "And sick days?", "conversation_id": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "You have 6 sick days remaining.",
            "conversation_id": 7
        })))
        .expect(1)
        .mount(mock.server())
        .await;

    let (backend, _) = mock.backend(true);
    let chat = session(backend);

    assert!(matches!(
        chat.send("How many vacation days do I have?").await,
        SendOutcome::Replied(_)
    ));
    assert!(matches!(chat.send("And sick days?").await, SendOutcome::Replied(_)));

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.conversation_id, Some(ConversationId(7)));
    assert_eq!(snapshot.messages.len(), 4);
}

#[tokio::test]
async fn test_server_error_becomes_transcript_message() {
    let mock = HrMockServer::new().await;
    mock.mock_json("POST", "/v1/chatbot/query", 500, json!({ "detail": "LLM unavailable" }))
        .await;

    let (backend, _) = mock.backend(true);
    let chat = session(backend);

    assert!(matches!(chat.send("hello").await, SendOutcome::Failed(_)));
    let last = chat.snapshot().messages.last().cloned().unwrap();
    assert_eq!(last.text, APOLOGY_TEXT);
    assert!(last.is_error);
}

#[tokio::test]
async fn test_switch_maps_untagged_history() {
    let mock = HrMockServer::new().await;
    mock.mock_json(
        "GET",
        "/v1/chatbot/history/3",
        200,
        json!({ "messages": [
            { "content": "Can I view my payslips online?", "created_at": "2024-05-01T10:00:00" },
            { "content": "Yes, under My Payslips.", "created_at": "2024-05-01T10:00:04" }
        ] }),
    )
    .await;

    let (backend, _) = mock.backend(true);
    let chat = session(backend);

    let outcome = chat.switch_conversation(ConversationId(3)).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Fetched(_)));

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.messages[0].sender, Sender::User);
    assert_eq!(snapshot.messages[1].sender, Sender::Assistant);
    assert_eq!(snapshot.messages[1].text, "Yes, under My Payslips.");
}

#[tokio::test]
async fn test_slow_backend_reports_timeout() {
    let mock = HrMockServer::new().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chatbot/query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "answer": "Too late.", "conversation_id": 2 }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(mock.server())
        .await;

    let (backend, _) =
        mock.backend_with_timeouts(true, Duration::from_millis(500), Duration::from_secs(1));
    let chat = session(backend);

    match chat.send("hello").await {
        SendOutcome::Failed(message) => {
            assert_eq!(message.text, TIMEOUT_TEXT);
            assert!(message.is_error);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!chat.snapshot().is_typing());
}
