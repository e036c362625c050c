//! End-to-end session flows against a mocked dashboard backend.
//!
//! Covers the refresh coordinator's single-flight guarantee, the 401 rules of
//! the request executor, and login/logout/rehydrate through the public client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dash_api::storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
use dash_api::{ApiClient, CallbackNavigator, ClientConfig, Error, LoginRedirect, Result, Session};

struct Harness {
    client: Arc<ApiClient>,
    storage: MemorySessionStorage,
    redirects: Arc<Mutex<Vec<LoginRedirect>>>,
    /// Whether the persisted session was already gone when each redirect fired.
    cleared_at_redirect: Arc<Mutex<Vec<bool>>>,
}

fn harness(server: &MockServer, session: Option<Session>) -> Harness {
    let storage = match session {
        Some(session) => MemorySessionStorage::with_session("default", session),
        None => MemorySessionStorage::new(),
    };

    let redirects = Arc::new(Mutex::new(Vec::new()));
    let cleared_at_redirect = Arc::new(Mutex::new(Vec::new()));
    let navigator = {
        let redirects = Arc::clone(&redirects);
        let cleared = Arc::clone(&cleared_at_redirect);
        let storage = storage.clone();
        CallbackNavigator::new(move |reason| {
            cleared.lock().unwrap().push(storage.is_empty());
            redirects.lock().unwrap().push(reason);
        })
    };

    let client = ApiClient::builder()
        .config(ClientConfig::with_base_url(server.uri()))
        .storage(Arc::new(storage.clone()))
        .navigator(Arc::new(navigator))
        .build()
        .unwrap();

    Harness {
        client: Arc::new(client),
        storage,
        redirects,
        cleared_at_redirect,
    }
}

fn signed_in() -> Option<Session> {
    Some(Session::new("T1".into(), Some("R1".into()), None))
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "R1"})))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Refresh coordination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_valid_token_requests_never_refresh() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(10)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let h = harness(&server, signed_in());
    let calls = (0..10).map(|i| {
        let client = Arc::clone(&h.client);
        async move { client.get::<serde_json::Value>(&format!("/metrics/org-1/{i}")).await }
    });

    for result in futures::future::join_all(calls).await {
        assert_eq!(result?["ok"], true);
    }
    assert_eq!(h.client.refresh_coordinator().exchanges(), 0);
    Ok(())
}

#[tokio::test]
async fn test_three_widgets_share_one_refresh() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Token expired"})))
        .expect(3)
        .mount(&server)
        .await;
    for widget in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/metrics/org-1/{widget}")))
            .and(header("authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"widget": widget})))
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"token": "T2"}))
            .set_delay(Duration::from_millis(100)),
        1,
    )
    .await;

    let h = harness(&server, signed_in());
    let calls = ["a", "b", "c"].map(|widget| {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move {
            client
                .get::<serde_json::Value>(&format!("/metrics/org-1/{widget}"))
                .await
        })
    });

    for (widget, handle) in ["a", "b", "c"].into_iter().zip(calls) {
        let body = handle.await.unwrap()?;
        assert_eq!(body["widget"], widget);
    }

    assert_eq!(h.client.refresh_coordinator().exchanges(), 1);
    assert_eq!(h.client.store().access_token().as_deref(), Some("T2"));
    assert_eq!(h.client.store().refresh_token().as_deref(), Some("R1"));
    assert!(h.redirects.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_many_concurrent_401s_single_refresh() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .expect(25)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"token": "T2", "refreshToken": "R2"}))
            .set_delay(Duration::from_millis(50)),
        1,
    )
    .await;

    let h = harness(&server, signed_in());
    let handles: Vec<_> = (0..25)
        .map(|i| {
            let client = Arc::clone(&h.client);
            tokio::spawn(async move { client.get::<Vec<u32>>(&format!("/series/{i}")).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap()?, vec![1, 2, 3]);
    }
    assert_eq!(h.client.refresh_coordinator().exchanges(), 1);

    let persisted = h.storage.load("default")?.unwrap();
    assert_eq!(persisted.access_token, "T2");
    assert_eq!(persisted.refresh_token.as_deref(), Some("R2"));
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_clears_before_redirect() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401)
            .set_body_json(json!({"error": "Invalid refresh token"}))
            .set_delay(Duration::from_millis(50)),
        1,
    )
    .await;

    let h = harness(&server, signed_in());
    h.client.store().set_user(dash_api::User {
        id: "u-1".into(),
        username: "ada".into(),
        role: "viewer".into(),
        organization_id: Some("org-1".into()),
        person_id: None,
    });

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|widget| {
            let client = Arc::clone(&h.client);
            tokio::spawn(async move {
                client
                    .get::<serde_json::Value>(&format!("/metrics/org-1/{widget}"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)), "unexpected: {err:?}");
        assert!(err.requires_reauth());
    }

    assert_eq!(*h.redirects.lock().unwrap(), vec![LoginRedirect::SessionExpired]);
    assert_eq!(*h.cleared_at_redirect.lock().unwrap(), vec![true]);
    assert!(h.client.store().snapshot().is_none());
    assert!(h.client.store().organization_id().is_none());
    Ok(())
}

#[tokio::test]
async fn test_unreadable_refresh_response_ends_session() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200).set_body_string("not json"), 1).await;

    let h = harness(&server, signed_in());
    let err = h.client.get::<serde_json::Value>("/metrics").await.unwrap_err();

    assert!(matches!(err, Error::SessionExpired(_)));
    assert_eq!(h.redirects.lock().unwrap().len(), 1);
    assert!(h.storage.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_second_401_after_refresh_is_rejected() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics/broken"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"token": "T2"})),
        1,
    )
    .await;

    let h = harness(&server, signed_in());
    let err = h
        .client
        .get::<serde_json::Value>("/metrics/broken")
        .await
        .unwrap_err();

    match err {
        Error::ReplayRejected { path, replays } => {
            assert_eq!(path, "/metrics/broken");
            assert_eq!(replays, 1);
        }
        other => panic!("unexpected: {other:?}"),
    }
    // A misbehaving endpoint does not end the session.
    assert_eq!(h.client.store().access_token().as_deref(), Some("T2"));
    assert!(h.redirects.lock().unwrap().is_empty());
    Ok(())
}

// ---------------------------------------------------------------------------
// Executor 401 rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_anonymous_401_is_not_authenticated() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics/org-1/a"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let h = harness(&server, None);
    let err = h
        .client
        .get::<serde_json::Value>("/metrics/org-1/a")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotAuthenticated));
    assert_eq!(err.to_string(), "Not authenticated");
    assert!(h.redirects.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_auth_endpoints_never_trigger_refresh() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in());

    let err = h.client.login("ada", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, ref message } if message == "Invalid credentials"));

    let err = h
        .client
        .post::<serde_json::Value, _>("/auth/refresh", &json!({"refreshToken": "R1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }));

    assert_eq!(h.client.refresh_coordinator().exchanges(), 0);
    assert_eq!(h.client.store().access_token().as_deref(), Some("T1"));
    Ok(())
}

#[tokio::test]
async fn test_server_errors_are_not_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/dashboards/7"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Read-only dashboard"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/dashboards/8"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in());

    let err = h
        .client
        .put::<serde_json::Value, _>("/dashboards/7", &json!({"title": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 403, ref message } if message == "Read-only dashboard"));

    let err = h
        .client
        .delete::<serde_json::Value>("/dashboards/8")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, ref message } if message == "Service Unavailable"));
    Ok(())
}

// ---------------------------------------------------------------------------
// Session controller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login_stores_server_session() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"username": "ada", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "T1",
            "refreshToken": "R1",
            "user": {
                "id": "u-1",
                "username": "ada",
                "role": "admin",
                "organizationId": "org-1",
                "personId": "p-1"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let user = h.client.login("ada", "secret").await?.unwrap();
    assert!(user.is_admin());

    let store = h.client.store();
    assert_eq!(store.access_token().as_deref(), Some("T1"));
    assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    assert_eq!(store.user(), Some(user));
    assert_eq!(store.organization_id().as_deref(), Some("org-1"));
    assert!(h.redirects.lock().unwrap().is_empty());

    let status = h.client.status();
    assert!(status.authenticated);
    assert_eq!(status.username.as_deref(), Some("ada"));
    Ok(())
}

#[tokio::test]
async fn test_logout_clears_even_when_server_fails() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(body_json(json!({"refreshToken": "R1"})))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "db down"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in());
    h.client.logout().await;

    assert!(h.client.store().snapshot().is_none());
    assert!(h.storage.is_empty());
    assert_eq!(*h.redirects.lock().unwrap(), vec![LoginRedirect::Logout]);
    assert_eq!(*h.cleared_at_redirect.lock().unwrap(), vec![true]);
    Ok(())
}

#[tokio::test]
async fn test_logout_is_idempotent() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in());
    h.client.logout().await;
    assert!(h.client.store().snapshot().is_none());
    h.client.logout().await;
    assert!(h.client.store().snapshot().is_none());

    assert_eq!(
        *h.redirects.lock().unwrap(),
        vec![LoginRedirect::Logout, LoginRedirect::Logout]
    );
    Ok(())
}

#[tokio::test]
async fn test_relogin_during_refresh_keeps_new_session() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics/a"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"token": "OLD_USER_T2", "refreshToken": "OLD_USER_R2"}))
            .set_delay(Duration::from_millis(300)),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "NEW_USER_T",
            "refreshToken": "NEW_USER_R",
            "user": {"id": "u-2", "username": "bob", "role": "viewer"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in());
    let pending = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move { client.get::<serde_json::Value>("/metrics/a").await })
    };
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(h.client.refresh_coordinator().is_refreshing());

    h.client.logout().await;
    h.client.login("bob", "secret").await?;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(Error::SessionExpired(_))), "{result:?}");

    let store = h.client.store();
    assert_eq!(store.access_token().as_deref(), Some("NEW_USER_T"));
    assert_eq!(store.refresh_token().as_deref(), Some("NEW_USER_R"));
    assert_eq!(
        h.storage.load("default")?.map(|s| s.access_token).as_deref(),
        Some("NEW_USER_T")
    );
    assert_eq!(*h.redirects.lock().unwrap(), vec![LoginRedirect::Logout]);
    Ok(())
}

#[tokio::test]
async fn test_logout_with_unreachable_server() -> Result<()> {
    let server = MockServer::start().await;
    let h = harness(&server, signed_in());
    drop(server);

    h.client.logout().await;
    assert!(h.client.store().snapshot().is_none());
    Ok(())
}

#[tokio::test]
async fn test_rehydrate_without_session_makes_no_calls() -> Result<()> {
    let server = MockServer::start().await;
    let h = harness(&server, None);

    assert!(h.client.rehydrate().await?.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rehydrate_refreshes_expired_token() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": "u-1", "username": "ada", "organizationId": "org-9"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"token": "T2"})),
        1,
    )
    .await;

    let h = harness(&server, signed_in());
    let user = h.client.rehydrate().await?.unwrap();

    assert_eq!(user.username, "ada");
    assert_eq!(h.client.store().organization_id().as_deref(), Some("org-9"));
    assert_eq!(h.client.store().access_token().as_deref(), Some("T2"));
    Ok(())
}

#[tokio::test]
async fn test_session_survives_client_restart() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "T1",
            "refreshToken": "R1",
            "user": {"id": "u-1", "username": "ada"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"points": []})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let build = || {
        ApiClient::builder()
            .config(ClientConfig::with_base_url(server.uri()))
            .storage(Arc::new(FileSessionStorage::new(dir.path())))
            .build()
    };

    build()?.login("ada", "secret").await?;

    let restarted = build()?;
    assert!(restarted.status().authenticated);
    let body: serde_json::Value = restarted.get("/metrics").await?;
    assert_eq!(body, json!({"points": []}));
    Ok(())
}
