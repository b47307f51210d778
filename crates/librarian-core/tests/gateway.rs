use std::time::{Duration, Instant};

use librarian_core::api::{ApiClient, ApiError, RequestOptions, SessionEvent};
use librarian_core::auth::{FileTokenStore, MemoryTokenStore, Session, TokenStore};
use librarian_core::config::{ClientConfig, RetryPolicy};
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE_DELAY_MS: u64 = 50;

fn client_for(server: &MockServer, session: Session) -> ApiClient {
    let config = ClientConfig {
        base_url: server.uri(),
        request_timeout_secs: 5,
        retry: RetryPolicy {
            auth_max_attempts: 3,
            max_attempts: 2,
            base_delay_ms: BASE_DELAY_MS,
        },
        ..ClientConfig::default()
    };
    ApiClient::new(config, session).expect("client")
}

fn signed_in(token: &str) -> Session {
    Session::open(Box::new(MemoryTokenStore::with_token(token)))
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({ "success": false, "error": "Token expired" }))
}

async fn authorization_headers(server: &MockServer, route: &str) -> Vec<Option<String>> {
    server
        .received_requests()
        .await
        .expect("request recording")
        .iter()
        .filter(|r| r.url.path() == route)
        .map(|r| {
            r.headers
                .get("authorization")
                .map(|v| v.to_str().unwrap().to_string())
        })
        .collect()
}

async fn get(client: &ApiClient, route: &str) -> Result<librarian_core::ApiResponse<Value>, ApiError> {
    client
        .send(Method::GET, route, None::<&()>, RequestOptions::default())
        .await
}

#[tokio::test]
async fn attaches_stored_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("tok-1"));
    let response = get(&client, "/titles").await.unwrap();
    assert!(response.is_success());

    assert_eq!(
        authorization_headers(&server, "/titles").await,
        vec![Some("Bearer tok-1".to_string())]
    );
}

#[tokio::test]
async fn no_token_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, Session::in_memory());
    get(&client, "/titles").await.unwrap();

    assert_eq!(authorization_headers(&server, "/titles").await, vec![None]);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_call_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ok(json!({ "accessToken": "new" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ok(json!([{ "id": "t1", "title": "Dune", "author": "Frank Herbert" }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("old"));
    let mut events = client.subscribe();

    let response = get(&client, "/titles").await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.status, 200);
    assert_eq!(response.data().unwrap()[0]["title"], "Dune");

    assert_eq!(client.session().token().as_deref(), Some("new"));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::TokenRefreshed);

    // the refresh relies on the cookie, not the expired bearer
    assert_eq!(authorization_headers(&server, "/auth/refresh").await, vec![None]);
}

#[tokio::test]
async fn refreshed_token_is_persisted_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ok(json!({ "accessToken": "new" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path().to_path_buf());
    store
        .save(&librarian_core::auth::StoredToken::new("old"))
        .unwrap();

    let client = client_for(&server, Session::open(Box::new(store)));
    get(&client, "/titles").await.unwrap();
    let libraries = get(&client, "/libraries").await.unwrap();
    assert!(libraries.is_success());

    assert_eq!(
        authorization_headers(&server, "/libraries").await,
        vec![Some("Bearer new".to_string())]
    );

    let reopened = FileTokenStore::new(dir.path().to_path_buf());
    assert_eq!(reopened.load().unwrap().unwrap().token, "new");
}

#[tokio::test]
async fn second_unauthorized_is_surfaced_without_another_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ok(json!({ "accessToken": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("old"));
    let response = get(&client, "/titles").await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.status, 401);
    assert_eq!(response.error_message().as_deref(), Some("Token expired"));
    assert_eq!(
        authorization_headers(&server, "/titles").await,
        vec![Some("Bearer old".to_string()), Some("Bearer new".to_string())]
    );
}

#[tokio::test]
async fn failed_refresh_clears_session_and_signals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/libraries"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("old"));
    let mut events = client.subscribe();

    let err = get(&client, "/titles").await.unwrap_err();
    assert!(matches!(err, ApiError::SessionInvalid));
    assert!(err.requires_login());
    assert!(!client.session().is_authenticated());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::SessionInvalidated);

    // next call goes out unauthenticated
    get(&client, "/libraries").await.unwrap();
    assert_eq!(authorization_headers(&server, "/libraries").await, vec![None]);
}

#[tokio::test]
async fn refresh_without_token_in_body_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(unauthorized())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ok(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("old"));
    let err = get(&client, "/titles").await.unwrap_err();
    assert!(matches!(err, ApiError::SessionInvalid));
    assert!(client.session().token().is_none());
}

#[tokio::test]
async fn concurrent_unauthorized_calls_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ok(json!({ "accessToken": "new" })).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ok(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("old"));
    let (a, b) = tokio::join!(get(&client, "/titles"), get(&client, "/titles"));
    assert!(a.unwrap().is_success());
    assert!(b.unwrap().is_success());
}

#[tokio::test]
async fn transient_failures_exhaust_general_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(ok(json!([])).set_delay(Duration::from_millis(1000)))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("tok"));
    let options = RequestOptions::new().timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = client
        .send(Method::GET, "/titles", None::<&()>, options)
        .await
        .unwrap_err();

    match err {
        ApiError::Transport { attempts, ref source } => {
            assert_eq!(attempts, 2);
            assert!(source.is_timeout());
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    // two timeouts plus one backoff of the base delay
    assert!(started.elapsed() >= Duration::from_millis(200 + BASE_DELAY_MS));
}

#[tokio::test]
async fn transient_failures_on_auth_endpoint_get_larger_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ok(json!({ "accessToken": "tok" })).set_delay(Duration::from_millis(1000)))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, Session::in_memory());
    let options = RequestOptions::new().timeout(Duration::from_millis(100));
    let started = Instant::now();
    let body = json!({ "email": "ada@example.org", "password": "secret" });
    let err = client
        .send(Method::POST, "/auth/login", Some(&body), options)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Transport { attempts: 3, .. }));
    // backoff of base then 2 * base between the three attempts
    assert!(started.elapsed() >= Duration::from_millis(300 + 3 * BASE_DELAY_MS));
}

#[tokio::test]
async fn transient_failure_then_success_is_transparent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(ok(json!([])).set_delay(Duration::from_millis(1000)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/titles"))
        .respond_with(ok(json!([{ "id": "t1" }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("tok"));
    let options = RequestOptions::new().timeout(Duration::from_millis(200));
    let response = client
        .send(Method::GET, "/titles", None::<&()>, options)
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.data().unwrap()[0]["id"], "t1");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ClientConfig {
        base_url: format!("http://127.0.0.1:{}", port),
        retry: RetryPolicy {
            auth_max_attempts: 3,
            max_attempts: 2,
            base_delay_ms: 1,
        },
        ..ClientConfig::default()
    };
    let client = ApiClient::new(config, Session::in_memory()).unwrap();

    let err = client
        .send(Method::GET, "/titles", None::<&()>, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport { attempts: 2, .. }));
    assert_eq!(
        err.user_message(),
        "Unable to reach the server. Check your connection and try again."
    );
}

#[tokio::test]
async fn structured_errors_are_returned_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/titles/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "success": false, "message": "Title not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>Service Unavailable</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("tok"));

    let missing = get(&client, "/titles/missing").await.unwrap();
    assert!(!missing.is_success());
    assert_eq!(missing.status, 404);
    assert_eq!(missing.error_message().as_deref(), Some("Title not found"));

    let down = get(&client, "/reports").await.unwrap();
    assert!(!down.is_success());
    assert_eq!(
        down.error_message().as_deref(),
        Some("The server encountered an error. Please try again later.")
    );
}

#[tokio::test]
async fn invalid_path_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let client = client_for(&server, Session::in_memory());

    let err = get(&client, "http://elsewhere.example.org/titles").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidPath(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn per_call_headers_and_body_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/titles"))
        .and(header("x-library-id", "main"))
        .and(wiremock::matchers::body_json(json!({ "title": "Emma", "author": "Jane Austen" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "success": true, "data": { "id": "t9" }, "message": "Created" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in("tok"));
    let options = RequestOptions::new().header(
        reqwest::header::HeaderName::from_static("x-library-id"),
        reqwest::header::HeaderValue::from_static("main"),
    );
    let body = json!({ "title": "Emma", "author": "Jane Austen" });
    let response = client
        .send(Method::POST, "/titles", Some(&body), options)
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.envelope.message.as_deref(), Some("Created"));
}
