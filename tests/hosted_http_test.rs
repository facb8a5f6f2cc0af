//! Hosted backend clients against a `wiremock` server
//!
//! Covers the auth API, the session context built on it, and the REST
//! store's query shapes.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_journal::alert::Alert;
use voice_journal::auth::{
    AuthClient, AuthSession, AuthUser, BearerToken, MemorySessionStore, SessionContext,
    SessionPersistence,
};
use voice_journal::error::JournalError;
use voice_journal::ids::new_id;
use voice_journal::models::{ConversationPatch, Message};
use voice_journal::storage::{
    ConversationStore, MessageStore, MessageWindow, RestStore, UserStore,
};

const ANON: &str = "anon-key";

fn auth_user(id: uuid::Uuid, confirmed: bool) -> serde_json::Value {
    json!({
        "id": id,
        "email": "me@example.com",
        "email_confirmed_at": if confirmed { json!("2025-01-01T00:00:00Z") } else { json!(null) },
        "user_metadata": {"full_name": "Me Myself"}
    })
}

fn token_body(id: uuid::Uuid, confirmed: bool) -> serde_json::Value {
    json!({
        "access_token": "access-1",
        "refresh_token": "refresh-1",
        "expires_in": 3600,
        "token_type": "bearer",
        "user": auth_user(id, confirmed)
    })
}

fn rest_store(server: &MockServer, token: BearerToken) -> RestStore {
    RestStore::new(&server.uri(), ANON, token, 5).expect("store")
}

fn hosted(server: &MockServer) -> (SessionContext, Arc<MemorySessionStore>) {
    let persistence = Arc::new(MemorySessionStore::default());
    let auth = AuthClient::new(&server.uri(), ANON, 5).expect("auth client");
    (SessionContext::hosted(auth, persistence.clone()), persistence)
}

#[tokio::test]
async fn test_password_sign_in_installs_session_and_upserts_user() {
    let server = MockServer::start().await;
    let id = new_id();
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON))
        .and(body_json(json!({"email": "me@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(id, true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .and(query_param("on_conflict", "id"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (session, persistence) = hosted(&server);
    let store = rest_store(&server, session.token());
    let user = session
        .sign_in_with_password("me@example.com", "pw", &store)
        .await
        .unwrap();

    assert_eq!(user.id, id);
    assert_eq!(user.name_or_unknown(), "Me Myself");
    assert_eq!(session.user_id().unwrap(), id);
    assert_eq!(session.token().get().as_deref(), Some("access-1"));
    assert_eq!(persistence.load().unwrap().unwrap().refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_identity_token_sign_in() {
    let server = MockServer::start().await;
    let id = new_id();
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "id_token"))
        .and(body_json(json!({"provider": "apple", "id_token": "eyJ.apple"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(id, true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (session, _) = hosted(&server);
    let store = rest_store(&server, session.token());
    let user = session
        .sign_in_with_id_token("apple", "eyJ.apple", &store)
        .await
        .unwrap();
    assert_eq!(user.email, "me@example.com");
}

#[tokio::test]
async fn test_unconfirmed_email_is_rejected() {
    let server = MockServer::start().await;
    let id = new_id();
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(id, false)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let (session, persistence) = hosted(&server);
    let store = rest_store(&server, session.token());
    let err = session
        .sign_in_with_password("me@example.com", "pw", &store)
        .await
        .unwrap_err();

    assert_eq!(
        Alert::from_error(&err, "Failed to sign in").message,
        "Verify your email before signing in."
    );
    assert!(session.current_user().is_none());
    assert!(persistence.load().unwrap().is_none());
}

#[tokio::test]
async fn test_bad_credentials_are_auth_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let (session, _) = hosted(&server);
    let store = rest_store(&server, session.token());
    let err = session
        .sign_in_with_password("me@example.com", "wrong", &store)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<JournalError>(),
        Some(JournalError::Auth(msg)) if msg == "Invalid login credentials"
    ));
}

#[tokio::test]
async fn test_init_refreshes_expired_session() {
    let server = MockServer::start().await;
    let id = new_id();
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "old-refresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(id, true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_user(id, true)))
        .expect(1)
        .mount(&server)
        .await;

    let (session, persistence) = hosted(&server);
    let stale: AuthUser = serde_json::from_value(auth_user(id, true)).unwrap();
    persistence
        .save(&AuthSession {
            access_token: "old-access".to_string(),
            refresh_token: "old-refresh".to_string(),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
            user: stale,
        })
        .unwrap();

    let user = session.init().await.unwrap().expect("restored user");
    assert_eq!(user.id, id);
    assert_eq!(session.token().get().as_deref(), Some("access-1"));
    assert_eq!(persistence.load().unwrap().unwrap().access_token, "access-1");
}

#[tokio::test]
async fn test_init_discards_unrefreshable_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"msg": "expired"})))
        .mount(&server)
        .await;

    let (session, persistence) = hosted(&server);
    let user: AuthUser = serde_json::from_value(auth_user(new_id(), true)).unwrap();
    persistence
        .save(&AuthSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
            user,
        })
        .unwrap();

    assert!(session.init().await.unwrap().is_none());
    assert!(persistence.load().unwrap().is_none());
    assert!(session.require_user().is_err());
}

#[tokio::test]
async fn test_sign_up_sends_full_name() {
    let server = MockServer::start().await;
    let id = new_id();
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_json(json!({
            "email": "new@example.com",
            "password": "pw",
            "data": {"full_name": "New Person"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_user(id, false)))
        .expect(1)
        .mount(&server)
        .await;

    let (session, _) = hosted(&server);
    let user = session
        .sign_up("new@example.com", "pw", "New Person")
        .await
        .unwrap();
    assert_eq!(user.id, id);
    assert!(!user.is_confirmed());
    assert!(session.current_user().is_none());
}

#[tokio::test]
async fn test_password_reset_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/recover"))
        .and(body_json(json!({"email": "me@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthClient::new(&server.uri(), ANON, 5).unwrap();
    auth.reset_password_for_email("me@example.com").await.unwrap();
}

#[tokio::test]
async fn test_rest_insert_message_returns_representation() {
    let server = MockServer::start().await;
    let message = Message::new(new_id(), new_id(), "hello");
    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .and(header("prefer", "return=representation"))
        .and(header("authorization", "Bearer anon-key"))
        .and(body_json(serde_json::to_value(&message).unwrap()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([message])))
        .expect(1)
        .mount(&server)
        .await;

    let stored = rest_store(&server, BearerToken::new())
        .insert_message(&message)
        .await
        .unwrap();
    assert_eq!(stored, message);
}

#[tokio::test]
async fn test_rest_message_page_query() {
    let server = MockServer::start().await;
    let conversation_id = new_id();
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("conversationId", format!("eq.{}", conversation_id)))
        .and(query_param("order", "createdAt.desc"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = rest_store(&server, BearerToken::new())
        .list_messages_desc(conversation_id, MessageWindow::page(2, 20))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_rest_count_uses_content_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(header("prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-range", "0-2/3")
                .set_body_json(json!([{"id": 1}, {"id": 2}, {"id": 3}])),
        )
        .mount(&server)
        .await;

    let count = rest_store(&server, BearerToken::new())
        .count_messages(new_id())
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_rest_update_missing_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/conversations"))
        .and(body_json(json!({"lastMessage": "hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let patch = ConversationPatch {
        last_message: Some("hi".to_string()),
        ..Default::default()
    };
    let err = rest_store(&server, BearerToken::new())
        .update_conversation(new_id(), &patch)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<JournalError>(),
        Some(JournalError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rest_error_message_is_extracted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "PGRST301",
            "message": "JWT expired"
        })))
        .mount(&server)
        .await;

    let err = rest_store(&server, BearerToken::new())
        .find_user_by_email("me@example.com")
        .await
        .unwrap_err();
    match err.downcast_ref::<JournalError>() {
        Some(JournalError::Api { status, message }) => {
            assert_eq!(*status, 401);
            assert_eq!(message, "JWT expired");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
