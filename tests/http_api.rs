// HTTP API tests: guard status mapping and budget warnings end to end.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use household_budget::server::{self, AppState, USER_ID_HEADER};
use household_budget::{
    ChannelManager, Household, HouseholdRole, HouseholdStore, ServerEvent, SqliteHouseholdStore,
};

const ORIGIN: &str = "http://localhost:5173";

struct TestApp {
    router: Router,
    channels: Arc<ChannelManager>,
}

async fn setup() -> TestApp {
    setup_with(false).await
}

/// h1 = [{u1, OWNER}, {u2, VIEWER}, {u3, MEMBER}], limit 1000
async fn setup_with(allow_missing_origin: bool) -> TestApp {
    let store = SqliteHouseholdStore::open_in_memory().unwrap();
    let mut household = Household::create("Home", "u1", 1000.0).unwrap();
    household.id = "h1".to_string();
    household.add_member("u2", HouseholdRole::Viewer).unwrap();
    household.add_member("u3", HouseholdRole::Member).unwrap();
    store.insert_household(&household).await.unwrap();

    let channels = Arc::new(ChannelManager::new());
    let state = AppState::builder(Arc::new(store))
        .channels(channels.clone())
        .allowed_origins(vec![ORIGIN.to_string()])
        .allow_missing_origin(allow_missing_origin)
        .build()
        .unwrap();

    TestApp {
        router: server::router(state),
        channels,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_status_codes_follow_guard_outcome() {
    let app = setup().await;

    let (status, body) = send(&app, "GET", "/api/households/h1", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, "GET", "/api/households/nope", Some("u1"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/households/h1", Some("stranger"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "GET", "/api/households/h1", Some("u2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "h1");
}

#[tokio::test]
async fn test_viewer_cannot_record_expense() {
    let app = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/expenses/h1",
        Some("u2"),
        Some(json!({"amount": 50.0, "description": "snacks"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden: requires MEMBER role or higher");
}

#[tokio::test]
async fn test_only_owner_sets_limit() {
    let app = setup().await;

    let (status, _) = send(&app, "PUT", "/api/budget/limit/h1", Some("u3"), Some(json!({"budgetLimit": 5.0}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "PUT", "/api/budget/limit/h1", Some("u1"), Some(json!({"budgetLimit": -5.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "PUT", "/api/budget/limit/h1", Some("u1"), Some(json!({"budgetLimit": 2000.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["budgetLimit"], 2000.0);
}

#[tokio::test]
async fn test_overspend_pushes_warning_to_every_joined_connection() {
    let app = setup().await;
    let mut c1 = app.channels.connect();
    let mut c2 = app.channels.connect();
    app.channels.join(c1.id, "h1");
    app.channels.join(c2.id, "h1");

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/expenses/h1",
        Some("u3"),
        Some(json!({"amount": 400.0, "description": "groceries"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"]["overBudget"], false);
    assert!(c1.events.try_recv().is_err());

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/expenses/h1",
        Some("u1"),
        Some(json!({"amount": 800.0, "description": "rent share"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"]["overBudget"], true);
    assert_eq!(body["data"]["status"]["remaining"], -200.0);

    for conn in [&mut c1, &mut c2] {
        match conn.events.try_recv().unwrap() {
            ServerEvent::BudgetWarning(warning) => {
                assert_eq!(warning.household_id, "h1");
                assert_eq!(warning.total_spent_this_month, 1200.0);
                assert_eq!(warning.percentage_used, 120.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_create_join_and_list() {
    let app = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/households/create",
        Some("u9"),
        Some(json!({"name": "Cabin", "budgetLimit": 300.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let invite_code = body["data"]["inviteCode"].as_str().unwrap().to_string();
    let household_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/households/join",
        Some("u10"),
        Some(json!({"inviteCode": invite_code})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);

    // One entry per user
    let (status, _) = send(
        &app,
        "POST",
        "/api/households/join",
        Some("u10"),
        Some(json!({"inviteCode": invite_code})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/households", Some("u10"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], household_id.as_str());

    let (status, _) = send(&app, "POST", "/api/households/create", None, Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_websocket_rejects_foreign_origin() {
    let app = setup().await;

    let request = Request::builder()
        .uri("/ws")
        .header(header::ORIGIN, "https://evil.example.com")
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_websocket_route_requires_upgrade() {
    let app = setup().await;

    let request = Request::builder()
        .uri("/ws")
        .header(header::ORIGIN, ORIGIN)
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

fn upgrade_request(origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/ws")
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_websocket_without_origin_rejected_by_default() {
    let app = setup().await;
    let response = app.router.clone().oneshot(upgrade_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Opted in: the origin check passes and only the missing upgrade remains.
    let app = setup_with(true).await;
    let request = Request::builder().uri("/ws").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if frame.is_text() {
            return serde_json::from_str(frame.to_text().unwrap()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_live_socket_receives_warning_and_leaves_groups_on_close() {
    let app = setup().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, served).await.unwrap();
    });

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request.headers_mut().insert("origin", HeaderValue::from_static(ORIGIN));
    request.headers_mut().insert(USER_ID_HEADER, HeaderValue::from_static("u2"));
    let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    client
        .send(WsMessage::text(r#"{"event":"join-household","data":"h1"}"#))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await, json!({"event": "joined-household", "data": "h1"}));
    assert_eq!(app.channels.group_size("h1"), 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/budget/expenses/h1",
        Some("u3"),
        Some(json!({"amount": 1200.0, "description": "boiler"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let warning = next_json(&mut client).await;
    assert_eq!(warning["event"], "budget-warning");
    assert_eq!(warning["data"]["householdId"], "h1");
    assert_eq!(warning["data"]["totalSpentThisMonth"], 1200.0);
    assert_eq!(warning["data"]["overBudget"], true);
    assert!(warning["data"]["timestamp"].is_string());

    client.close(None).await.unwrap();

    // Transport close is an implicit disconnect.
    let mut waited = 0;
    while app.channels.connection_count() > 0 && waited < 50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += 1;
    }
    assert_eq!(app.channels.connection_count(), 0);
    assert_eq!(app.channels.group_size("h1"), 0);
}

#[tokio::test]
async fn test_budget_check_raises_alerts_for_every_member() {
    let app = setup().await;
    let mut conn = app.channels.connect();
    app.channels.join(conn.id, "h1");

    let (status, _) = send(&app, "POST", "/api/alerts/check/h1", Some("u2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Within budget: nothing raised.
    let (status, body) = send(&app, "POST", "/api/alerts/check/h1", Some("u3"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alertsRaised"], 0);
    assert!(conn.events.try_recv().is_err());

    let (status, _) = send(&app, "PUT", "/api/budget/limit/h1", Some("u1"), Some(json!({"budgetLimit": 0.0}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "POST",
        "/api/budget/expenses/h1",
        Some("u3"),
        Some(json!({"amount": 10.0, "description": "milk"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(conn.events.try_recv().unwrap().name(), "budget-warning");

    let (status, body) = send(&app, "POST", "/api/alerts/check/h1", Some("u3"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"]["overBudget"], true);
    assert_eq!(body["data"]["alertsRaised"], 3);
    assert_eq!(body["data"]["delivered"], 1);
    assert_eq!(conn.events.try_recv().unwrap().name(), "budget-warning");

    // One from the expense, one from the explicit check.
    let (status, body) = send(&app, "GET", "/api/alerts", Some("u2"), None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["userId"], "u2");
    assert_eq!(alerts[0]["read"], false);

    let (status, _) = send(&app, "GET", "/api/alerts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_only_recipient_marks_alert_read() {
    let app = setup().await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/budget/expenses/h1",
        Some("u1"),
        Some(json!({"amount": 1500.0, "description": "roof"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, "GET", "/api/alerts", Some("u2"), None).await;
    let alert_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/alerts/{}/read", alert_id);

    let (status, body) = send(&app, "PUT", &uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden: not resource owner");

    let (status, _) = send(&app, "PUT", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "PUT", &uri, Some("u2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["read"], true);

    let (_, body) = send(&app, "GET", "/api/alerts", Some("u2"), None).await;
    assert_eq!(body["data"][0]["read"], true);

    let (status, _) = send(&app, "PUT", "/api/alerts/missing/read", Some("u2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
