//! Integration tests for the GoTrue-compatible auth provider.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fragtime_core::auth::{
    AuthProvider, ProviderSession, RestAuthProvider, SignUpOutcome, AUTH_SESSION_KEY,
};
use fragtime_core::error::AuthError;
use fragtime_core::session::User;
use fragtime_core::storage::{KeyValueStore, MemoryStore};
use mockito::Matcher;
use serde_json::json;

fn token_body(id: &str) -> String {
    json!({
        "access_token": format!("at-{id}"),
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": format!("rt-{id}"),
        "user": {
            "id": id,
            "email": format!("{id}@example.com"),
            "user_metadata": {"name": "Robin"}
        }
    })
    .to_string()
}

#[tokio::test]
async fn sign_in_stores_session() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .match_header("apikey", "anon")
        .match_body(Matcher::Json(json!({"email": "r@example.com", "password": "pw"})))
        .with_status(200)
        .with_body(token_body("u1"))
        .create_async()
        .await;

    let kv = Arc::new(MemoryStore::new());
    let provider = RestAuthProvider::new(&server.url(), "anon", kv.clone()).unwrap();
    let session = provider.sign_in("r@example.com", "pw").await.unwrap();
    assert_eq!(session.user.id, "u1");
    assert_eq!(session.user.name.as_deref(), Some("Robin"));
    assert!(kv.get(AUTH_SESSION_KEY).unwrap().is_some());

    let current = provider.current_session().await.unwrap().unwrap();
    assert_eq!(current.access_token, "at-u1");
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_credentials_map_to_sign_in_failed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(
            json!({"error": "invalid_grant", "error_description": "Invalid login credentials"})
                .to_string(),
        )
        .create_async()
        .await;

    let provider =
        RestAuthProvider::new(&server.url(), "anon", Arc::new(MemoryStore::new())).unwrap();
    match provider.sign_in("r@example.com", "bad").await {
        Err(AuthError::SignInFailed(message)) => assert_eq!(message, "Invalid login credentials"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn sign_up_without_session_needs_verification() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/v1/signup")
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({
            "email": "new@example.com",
            "data": {"name": "new"}
        })))
        .with_status(200)
        .with_body(json!({"id": "u7", "email": "new@example.com"}).to_string())
        .create_async()
        .await;

    let kv = Arc::new(MemoryStore::new());
    let provider = RestAuthProvider::new(&server.url(), "anon", kv.clone()).unwrap();
    let outcome = provider.sign_up("new@example.com", "pw", None).await.unwrap();
    match outcome {
        SignUpOutcome::NeedsVerification { user } => assert_eq!(user.unwrap().id, "u7"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(kv.get(AUTH_SESSION_KEY).unwrap().is_none());
}

#[tokio::test]
async fn sign_out_revokes_and_forgets() {
    let mut server = mockito::Server::new_async().await;
    let _login = server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(token_body("u1"))
        .create_async()
        .await;
    let logout = server
        .mock("POST", "/auth/v1/logout")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer at-u1")
        .with_status(204)
        .create_async()
        .await;

    let kv = Arc::new(MemoryStore::new());
    let provider = RestAuthProvider::new(&server.url(), "anon", kv.clone()).unwrap();
    provider.sign_in("r@example.com", "pw").await.unwrap();
    provider.sign_out().await.unwrap();

    assert!(kv.get(AUTH_SESSION_KEY).unwrap().is_none());
    assert!(provider.current_session().await.unwrap().is_none());
    logout.assert_async().await;
}

#[tokio::test]
async fn expired_session_is_refreshed() {
    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
        .match_body(Matcher::Json(json!({"refresh_token": "rt-old"})))
        .with_status(200)
        .with_body(token_body("u1"))
        .create_async()
        .await;

    let kv = Arc::new(MemoryStore::new());
    let stale = ProviderSession {
        user: User {
            id: "u1".into(),
            email: None,
            name: None,
        },
        access_token: "at-old".into(),
        refresh_token: Some("rt-old".into()),
        expires_at: Some(Utc::now() - Duration::minutes(5)),
    };
    kv.set(AUTH_SESSION_KEY, &serde_json::to_string(&stale).unwrap())
        .unwrap();

    let provider = RestAuthProvider::new(&server.url(), "anon", kv.clone()).unwrap();
    let session = provider.current_session().await.unwrap().unwrap();
    assert_eq!(session.access_token, "at-u1");
    refresh.assert_async().await;
}

#[tokio::test]
async fn expired_session_without_refresh_token_is_dropped() {
    let kv = Arc::new(MemoryStore::new());
    let stale = ProviderSession {
        user: User {
            id: "u1".into(),
            email: None,
            name: None,
        },
        access_token: "at-old".into(),
        refresh_token: None,
        expires_at: Some(Utc::now() - Duration::minutes(5)),
    };
    kv.set(AUTH_SESSION_KEY, &serde_json::to_string(&stale).unwrap())
        .unwrap();

    let provider = RestAuthProvider::new("http://127.0.0.1:9", "anon", kv.clone()).unwrap();
    assert!(provider.current_session().await.unwrap().is_none());
    assert!(kv.is_empty());
}
