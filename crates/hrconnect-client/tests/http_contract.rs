mod fixtures;

use fixtures::{HrMockServer, TOKEN};
use hrconnect_core::{
    AuthBackend, ChatBackend, ConversationId, HrError, LeaveBackend, LeaveRequest, LeaveType,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_login_stores_token() {
    let mock = HrMockServer::new().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({ "email": "jane@example.com", "password": "pw" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "fresh", "token_type": "bearer" })),
        )
        .expect(1)
        .mount(mock.server())
        .await;

    let (backend, auth) = mock.backend(false);
    let response = backend.login("jane@example.com", "pw").await.unwrap();

    assert_eq!(response.access_token, "fresh");
    assert_eq!(auth.token(), Some("fresh".to_string()));
    assert!(auth.login_id().is_some());
}

#[tokio::test]
async fn test_failed_login_reports_detail() {
    let mock = HrMockServer::new().await;
    mock.mock_json(
        "POST",
        "/v1/auth/login",
        401,
        json!({ "detail": "Invalid email or password" }),
    )
    .await;

    let (backend, auth) = mock.backend(false);
    let err = backend.login("jane@example.com", "wrong").await.unwrap_err();

    match err {
        HrError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn test_query_sends_zero_for_new_conversation() {
    let mock = HrMockServer::new().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chatbot/query"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .and(body_json(json!({
            "question": "How many vacation days do I have?",
            "conversation_id": 0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "You have 12 vacation days remaining.",
            "conversation_id": 7
        })))
        .expect(1)
        .mount(mock.server())
        .await;

    let (backend, _) = mock.backend(true);
    let response = backend
        .query("How many vacation days do I have?", None)
        .await
        .unwrap();

    assert_eq!(response.conversation_id, Some(ConversationId(7)));
    assert!(response.answer.contains("12 vacation days"));
}

#[tokio::test]
async fn test_unauthorized_response_clears_token() {
    let mock = HrMockServer::new().await;
    mock.mock_json("GET", "/v1/chatbot/history", 401, json!({ "detail": "Token expired" }))
        .await;

    let (backend, auth) = mock.backend(true);
    let expired = Arc::new(AtomicUsize::new(0));
    let seen = expired.clone();
    auth.on_unauthorized(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let err = backend.history().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(!auth.is_authenticated());
    assert_eq!(expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_login_keeps_session_quiet() {
    let mock = HrMockServer::new().await;
    mock.mock_json(
        "POST",
        "/v1/auth/login",
        401,
        json!({ "detail": "Invalid email or password" }),
    )
    .await;

    let (backend, auth) = mock.backend(true);
    let expired = Arc::new(AtomicUsize::new(0));
    let seen = expired.clone();
    auth.on_unauthorized(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let err = backend.login("jane@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, HrError::Api { status: 401, .. }));
    assert_eq!(expired.load(Ordering::SeqCst), 0);
    assert_eq!(auth.token(), Some(TOKEN.to_string()));

    let requests = mock.server().received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_query_outlives_request_timeout() {
    let mock = HrMockServer::new().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chatbot/query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "answer": "Slow but sure.", "conversation_id": 4 }))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(mock.server())
        .await;

    let (backend, _) =
        mock.backend_with_timeouts(true, Duration::from_millis(500), Duration::from_secs(5));
    let response = backend.query("hello", None).await.unwrap();
    assert_eq!(response.answer, "Slow but sure.");
}

#[tokio::test]
async fn test_validate_without_token_stays_local() {
    let mock = HrMockServer::new().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(mock.server())
        .await;

    let (backend, _) = mock.backend(false);
    assert!(matches!(backend.validate().await, Err(HrError::Unauthorized(_))));
}

#[tokio::test]
async fn test_validate_returns_user() {
    let mock = HrMockServer::new().await;
    mock.mock_json(
        "GET",
        "/v1/auth/me",
        200,
        json!({ "email": "jane@example.com", "user_id": 3 }),
    )
    .await;

    let (backend, _) = mock.backend(true);
    let user = backend.validate().await.unwrap();
    assert_eq!(user.user_id, 3);
}

#[tokio::test]
async fn test_logout_clears_token_on_failure() {
    let mock = HrMockServer::new().await;
    mock.mock_json("POST", "/v1/auth/logout", 500, json!({ "message": "Server down" }))
        .await;

    let (backend, auth) = mock.backend(true);
    let err = backend.logout().await.unwrap_err();

    assert!(err.to_string().contains("Server down"));
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn test_no_content_is_accepted() {
    let mock = HrMockServer::new().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/chatbot/history/12"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(mock.server())
        .await;

    let (backend, _) = mock.backend(true);
    backend.delete_conversation(ConversationId(12)).await.unwrap();
}

#[tokio::test]
async fn test_plain_text_error_body() {
    let mock = HrMockServer::new().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chatbot/history/5"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(mock.server())
        .await;

    let (backend, _) = mock.backend(true);
    match backend.get_conversation(ConversationId(5)).await {
        Err(HrError::Api { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "Bad Gateway");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_leave_endpoints() {
    let mock = HrMockServer::new().await;
    mock.mock_json(
        "GET",
        "/v1/sick-leave/balance",
        200,
        json!({ "total_days": 10, "used_days": 4 }),
    )
    .await;
    mock.mock_json(
        "GET",
        "/v1/emergency-leave/history",
        200,
        json!({ "history": [{ "used_days": 1, "reason": "Family", "created_at": "2024-03-01T09:00:00" }] }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/vacation-leave"))
        .and(body_json(json!({ "used_days": 2, "reason": "Trip" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(mock.server())
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/vacation-leave"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(mock.server())
        .await;

    let (backend, _) = mock.backend(true);

    let balance = backend.balance(LeaveType::Sick).await.unwrap();
    assert_eq!(balance.remaining(), 6.0);

    let history = backend.leave_history(LeaveType::Emergency).await.unwrap();
    assert_eq!(history.history.len(), 1);
    assert_eq!(history.history[0].reason, "Family");

    let request = LeaveRequest {
        used_days: 2,
        reason: "Trip".into(),
    };
    backend.create_leave(LeaveType::Vacation, &request).await.unwrap();
    backend.update_leave(LeaveType::Vacation, &request).await.unwrap();
}
