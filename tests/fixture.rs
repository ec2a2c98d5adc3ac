#![allow(dead_code)]

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use hyper::{Body, Client, Method, Request, StatusCode};
use socketio_legacy::{config::SocketIoConfig, handler::SocketIoHandler, service::SocketIoService};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Start a server on an ephemeral loopback port and return the port.
pub fn create_server<H: SocketIoHandler>(handler: H, config: SocketIoConfig) -> u16 {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let svc = SocketIoService::with_config(handler, config).into_make_service();
    let server = hyper::Server::bind(&addr).serve(svc);
    let port = server.local_addr().port();
    tokio::spawn(async move {
        if let Err(e) = server.await {
            println!("test server error: {e:?}");
        }
    });
    port
}

/// Heartbeats far away: packet ordering tests without `2::` interleaving.
pub fn slow_heartbeat_config() -> SocketIoConfig {
    SocketIoConfig::builder()
        .heartbeat_interval(Duration::from_secs(20))
        .heartbeat_timeout(Duration::from_secs(30))
        .close_timeout(Duration::from_millis(300))
        .build()
}

/// Heartbeats in test time: timeout behavior within a second.
pub fn fast_heartbeat_config() -> SocketIoConfig {
    SocketIoConfig::builder()
        .heartbeat_interval(Duration::from_millis(100))
        .heartbeat_timeout(Duration::from_millis(300))
        .close_timeout(Duration::from_millis(200))
        .build()
}

pub async fn send_req(
    port: u16,
    path: &str,
    method: Method,
    body: Option<String>,
) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(format!("http://127.0.0.1:{port}{path}"))
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();
    let mut res = Client::new().request(req).await.unwrap();
    let status = res.status();
    let body = hyper::body::to_bytes(res.body_mut()).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Perform the handshake and return the whole record `SID:HB:CLOSE:TRANSPORTS`.
pub async fn handshake_record(port: u16) -> String {
    let (status, body) = send_req(port, "/socket.io/1/", Method::GET, None).await;
    assert_eq!(status, StatusCode::OK);
    body
}

/// Perform the handshake and return the sid.
pub async fn handshake(port: u16) -> String {
    let record = handshake_record(port).await;
    record.split(':').next().unwrap().to_string()
}

pub async fn xhr_get(port: u16, sid: &str) -> (StatusCode, String) {
    send_req(
        port,
        &format!("/socket.io/1/xhr-polling/{sid}"),
        Method::GET,
        None,
    )
    .await
}

pub async fn xhr_post(port: u16, sid: &str, payload: &str) -> (StatusCode, String) {
    send_req(
        port,
        &format!("/socket.io/1/xhr-polling/{sid}"),
        Method::POST,
        Some(payload.to_string()),
    )
    .await
}

pub async fn ws_connect(port: u16, sid: &str) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/socket.io/1/websocket/{sid}"))
        .await
        .unwrap()
        .0
}
