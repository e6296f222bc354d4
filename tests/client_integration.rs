use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use apicall_http::{
    ApiCallError, ApiClient, BearerAuth, CallOptions, CallSnapshot, ClientConfig, ProgressMode,
    ProgressOptions, RetryOptions,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use tokio::sync::watch;

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug, Default)]
struct SeenRequest {
    method: String,
    uri: String,
    headers: BTreeMap<String, String>,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    hits: Arc<AtomicUsize>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: axum::http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .seen
        .lock()
        .expect("seen mutex must not be poisoned")
        .push(SeenRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_owned(), value.to_owned()))
                })
                .collect(),
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen mutex must not be poisoned").clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        seen: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/v1/*rest", any(api_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}/v1"),
        hits: state.hits,
        seen: state.seen,
        task,
    }
}

async fn wait_until<F>(rx: &mut watch::Receiver<CallSnapshot>, predicate: F) -> CallSnapshot
where
    F: FnMut(&CallSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("state change must arrive in time")
        .expect("controller must stay alive")
        .clone()
}

#[tokio::test]
async fn get_merges_defaults_and_returns_payload() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({"items": [1, 2, 3]}),
    )])
    .await;
    let client = ApiClient::new(
        ClientConfig::new(&server.base_url)
            .default_header("x-client", "default")
            .default_header("accept", "application/json")
            .default_query_param("lang", "en")
            .default_query_param("page", "1"),
    );
    let call = client.call(
        CallOptions::get("/items")
            .header("x-client", "call")
            .query("page", "2"),
    );

    call.fetch().await;

    let response = call.response().expect("fetch must succeed");
    assert_eq!(response.status, 200);
    let body: JsonValue = response.json().expect("body must be json");
    assert_eq!(body, json!({"items": [1, 2, 3]}));
    assert!(call.error().is_none());
    assert!(!call.loading());

    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].uri, "/v1/items?lang=en&page=2");
    assert_eq!(seen[0].headers["x-client"], "call");
    assert_eq!(seen[0].headers["accept"], "application/json");
}

#[tokio::test]
async fn post_sends_json_body_through_interceptors() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::CREATED,
        json!({"id": 42}),
    )])
    .await;
    let client = ApiClient::new(
        ClientConfig::new(&server.base_url).request_interceptor(BearerAuth::new("token")),
    );
    let call = client.call(CallOptions::post("/items", json!({"name": "kit"})));

    call.fetch().await;

    assert_eq!(call.response().expect("post must succeed").status, 201);
    let seen = server.seen();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].headers["authorization"], "Bearer token");
    assert_eq!(seen[0].headers["content-type"], "application/json");
    let sent: JsonValue = serde_json::from_str(&seen[0].body).expect("body must be json");
    assert_eq!(sent, json!({"name": "kit"}));
}

#[tokio::test]
async fn http_error_surfaces_and_reaches_on_exception() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"error": "missing"}),
    )])
    .await;
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    let client = ApiClient::new(ClientConfig::new(&server.base_url).on_exception(move |err| {
        sink.lock()
            .expect("reported mutex must not be poisoned")
            .push(err.status());
    }));
    let call = client.call(CallOptions::get("/missing"));

    call.fetch().await;

    let err = call.error().expect("error must be stored");
    match err.as_ref() {
        ApiCallError::Http { status, body } => {
            assert_eq!(*status, 404);
            assert!(body.contains("missing"));
        }
        other => panic!("expected http error, got {other:?}"),
    }
    assert!(call.response().is_none());
    assert_eq!(
        *reported.lock().expect("reported mutex must not be poisoned"),
        vec![Some(404)]
    );
}

#[tokio::test]
async fn retries_on_failure_then_succeeds() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        MockResponse::json(StatusCode::OK, json!({"ok": true})),
    ])
    .await;
    let client = ApiClient::new(
        ClientConfig::new(&server.base_url)
            .with_retry(RetryOptions::enabled(2).with_interval(Duration::from_millis(5))),
    );
    let call = client.call(CallOptions::get("/flaky"));
    let mut rx = call.subscribe();

    call.fetch().await;
    let snapshot = wait_until(&mut rx, |state| state.response.is_some()).await;

    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.retry_count, 0);
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))
        .with_delay(Duration::from_millis(150))])
    .await;
    let client = ApiClient::new(ClientConfig::new(&server.base_url));
    let call = client.call(CallOptions::get("/slow").timeout(Duration::from_millis(20)));

    call.fetch().await;

    match call.error().as_deref() {
        Some(ApiCallError::Transport(inner)) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_aborts_in_flight_request_without_error() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))
        .with_delay(Duration::from_millis(500))])
    .await;
    let client = ApiClient::new(
        ClientConfig::new(&server.base_url).with_retry(RetryOptions::enabled(3)),
    );
    let call = client.call(CallOptions::get("/slow"));
    let mut rx = call.subscribe();

    let task = call.trigger();
    wait_until(&mut rx, |state| state.loading).await;
    call.cancel();
    task.await.expect("fetch task must not panic");

    assert!(!call.loading());
    assert!(call.error().is_none());
    assert!(call.response().is_none());
    assert_eq!(call.retry_count(), 0);
}

#[tokio::test]
async fn download_progress_reaches_one_hundred() {
    let payload = json!({"data": "x".repeat(64 * 1024)});
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, payload)]).await;
    let downloads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&downloads);
    let client = ApiClient::new(
        ClientConfig::new(&server.base_url).with_progress(
            ProgressOptions::sampled(ProgressMode::Download, Duration::from_millis(1)).on_download(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            ),
        ),
    );
    let call = client.call(CallOptions::get("/blob"));

    call.fetch().await;

    assert!(call.response().is_some());
    assert_eq!(call.download_progress(), 100);
    assert!(downloads.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn invalid_base_url_fails_at_fetch_time() {
    let client = ApiClient::new(ClientConfig::new("not a url"));
    let call = client.call(CallOptions::get("/items"));

    call.fetch().await;

    assert!(matches!(
        call.error().as_deref(),
        Some(ApiCallError::InvalidUrl(_))
    ));
}
