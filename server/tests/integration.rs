//! Integration tests for the RC car server.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rccar_server::config::ServerConfig;
use rccar_server::session::SessionManager;
use rccar_server::sim_loop::run_sim_loop;
use rccar_server::ws::{ws_handler, AppState, MAX_MESSAGE_BYTES};
use rccar_server::SharedWorld;
use rccar_shared::protocol::{Input, Method, Output, RpcRequest, RpcResponse};
use rccar_shared::{Profile, VehicleProfile};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random available port and return the WebSocket URL.
async fn start_test_server(session_timeout: Duration) -> String {
    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // Release the port so the server can bind to it

    let config = ServerConfig {
        listen_addr: addr.to_string(),
        tick_rate_hz: 1000,
        session_timeout,
        ..Default::default()
    };

    let world: SharedWorld = Arc::new(Mutex::new(SessionManager::new(
        Arc::new(Profile::default()),
        config.session_timeout,
    )));

    // Start simulation loop
    let sim_world = world.clone();
    let sim_config = config.clone();
    tokio::spawn(async move {
        run_sim_loop(sim_world, sim_config).await;
    });

    // Start HTTP/WebSocket server
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(AppState { world });

    tokio::spawn(async move {
        let listener = TcpListener::bind(&config.listen_addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("ws://{}/ws", addr)
}

/// Connect to the server and return the WebSocket stream.
async fn connect(url: &str) -> Socket {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

/// Read the next text message and parse as RpcResponse.
async fn recv_response(ws: &mut Socket) -> RpcResponse {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return serde_json::from_str(&text).expect("Failed to parse response");
            }
            Ok(Some(Ok(_))) => continue, // Skip ping/pong
            Ok(Some(Err(e))) => panic!("WebSocket error: {}", e),
            Ok(None) => panic!("WebSocket closed unexpectedly"),
            Err(_) => panic!("Timed out waiting for response"),
        }
    }
}

async fn call(ws: &mut Socket, method: Method, param: serde_json::Value, id: u64) -> RpcResponse {
    let request = RpcRequest::new(method, param, id);
    let json = serde_json::to_string(&request).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
    let response = recv_response(ws).await;
    assert_eq!(response.id, json!(id));
    response
}

async fn update(ws: &mut Socket, name: &str, accel: f64, id: u64) -> Output {
    let input = Input {
        name: name.to_string(),
        steering: 0.0,
        accel,
        brake: 0.0,
    };
    let response = call(ws, Method::Update, serde_json::to_value(input).unwrap(), id).await;
    assert_eq!(response.error, None);
    serde_json::from_value(response.result).unwrap()
}

/// Wait until the server drops the connection.
async fn wait_for_disconnect(ws: &mut Socket) -> bool {
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match tokio::time::timeout(Duration::from_millis(100), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
            Err(_) => {
                // Timeout - try sending to check if connection is dead
                if ws.send(Message::Ping(vec![].into())).await.is_err() {
                    return true;
                }
            }
            _ => continue,
        }
    }
    false
}

#[tokio::test]
async fn test_join_returns_vehicle_profile() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws = connect(&url).await;

    let response = call(&mut ws, Method::Join, json!("p1"), 1).await;
    assert_eq!(response.error, None);
    let profile: VehicleProfile = serde_json::from_value(response.result).unwrap();
    assert_eq!(profile, VehicleProfile::default());
}

#[tokio::test]
async fn test_duplicate_join_is_rejected() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;

    assert_eq!(call(&mut ws1, Method::Join, json!("p1"), 1).await.error, None);
    let second = call(&mut ws2, Method::Join, json!("p1"), 1).await;
    assert_eq!(second.error.as_deref(), Some("duplicated name: p1"));
}

#[tokio::test]
async fn test_two_players_see_each_other() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;

    call(&mut ws1, Method::Join, json!("p1"), 1).await;
    call(&mut ws2, Method::Join, json!("p2"), 1).await;

    let out = update(&mut ws1, "p1", 0.5, 2).await;
    let me = out.self_vehicle.expect("self present");
    assert_eq!(me.name, "p1");
    assert_eq!(me.tires.len(), 4);
    assert_eq!(out.others.len(), 1);
    assert_eq!(out.others[0].name, "p2");

    let out = update(&mut ws2, "p2", 0.0, 2).await;
    assert_eq!(out.self_vehicle.unwrap().name, "p2");
    assert_eq!(out.others[0].name, "p1");
}

#[tokio::test]
async fn test_bye_removes_vehicle_from_others() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;

    call(&mut ws1, Method::Join, json!("p1"), 1).await;
    call(&mut ws2, Method::Join, json!("p2"), 1).await;

    let bye = call(&mut ws2, Method::Bye, json!("p2"), 2).await;
    assert_eq!(bye.error, None);

    let out = update(&mut ws1, "p1", 0.0, 2).await;
    assert!(out.others.is_empty());

    // Name is free again
    let rejoin = call(&mut ws2, Method::Join, json!("p2"), 3).await;
    assert_eq!(rejoin.error, None);
}

#[tokio::test]
async fn test_update_for_unknown_name_is_empty() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws = connect(&url).await;

    let out = update(&mut ws, "ghost", 1.0, 1).await;
    assert!(out.self_vehicle.is_none());
    assert!(out.others.is_empty());
}

#[tokio::test]
async fn test_unknown_method_gets_error_response() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws = connect(&url).await;

    let request = json!({"method": "World.Explode", "params": ["p1"], "id": 5});
    ws.send(Message::Text(request.to_string().into()))
        .await
        .unwrap();
    let response = recv_response(&mut ws).await;
    assert_eq!(response.id, json!(5));
    assert!(response.error.is_some());
}

#[tokio::test]
async fn test_silent_session_expires() {
    let url = start_test_server(Duration::from_millis(300)).await;
    let mut ws = connect(&url).await;

    call(&mut ws, Method::Join, json!("idle"), 1).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let out = update(&mut ws, "idle", 0.0, 2).await;
    assert!(out.self_vehicle.is_none());

    let rejoin = call(&mut ws, Method::Join, json!("idle"), 3).await;
    assert_eq!(rejoin.error, None);
}

#[tokio::test]
async fn test_disconnect_does_not_free_name_immediately() {
    let url = start_test_server(Duration::from_secs(5)).await;
    {
        let mut ws = connect(&url).await;
        call(&mut ws, Method::Join, json!("p1"), 1).await;
        let _ = ws.close(None).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = connect(&url).await;
    let response = call(&mut ws, Method::Join, json!("p1"), 1).await;
    assert_eq!(response.error.as_deref(), Some("duplicated name: p1"));
}

#[tokio::test]
async fn test_oversized_message_disconnects_client() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws = connect(&url).await;

    // Send an oversized message
    let huge_payload = "x".repeat(MAX_MESSAGE_BYTES * 2);
    let msg = format!(
        r#"{{"method":"World.Join","params":["{}"],"id":1}}"#,
        huge_payload
    );
    let _ = ws.send(Message::Text(msg.into())).await;

    assert!(
        wait_for_disconnect(&mut ws).await,
        "Client should be disconnected after oversized message"
    );
}

#[tokio::test]
async fn test_parse_spam_disconnects_client() {
    let url = start_test_server(Duration::from_secs(5)).await;
    let mut ws = connect(&url).await;

    // Send multiple invalid JSON messages (parse errors)
    for _ in 0..10 {
        let _ = ws.send(Message::Text("not valid json".into())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(
        wait_for_disconnect(&mut ws).await,
        "Client should be disconnected after too many parse errors"
    );
}
