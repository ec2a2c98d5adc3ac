//! A Socket.IO v0.9 server core: the transport-agnostic session layer, the
//! packet codec and the four transport state machines (websocket,
//! flashsocket, xhr-polling, jsonp-polling), packaged as a tower service.
//!
//! The application side implements [`SocketIoHandler`] and gets sessions and
//! packets; everything protocol-side (handshake, heartbeats, close windows,
//! polling upgrades) is handled here. The server bootstrap, TLS termination
//! and the HTTP framing belong to the host:
//!
//! ```no_run
//! # use socketio_legacy::{Packet, Session, SocketIoHandler, DisconnectReason};
//! # use socketio_legacy::service::SocketIoService;
//! # use std::sync::Arc;
//! #[derive(Debug)]
//! struct EchoHandler;
//!
//! impl SocketIoHandler for EchoHandler {
//!     fn on_connect(&self, session: Arc<Session>) {}
//!     fn on_message(&self, session: Arc<Session>, packet: Packet) {
//!         session.send(packet).ok();
//!     }
//!     fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let svc = SocketIoService::new(EchoHandler).into_make_service();
//!     hyper::Server::bind(&"0.0.0.0:8080".parse().unwrap())
//!         .serve(svc)
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod config;
pub mod errors;
pub mod handler;
pub mod layer;
pub mod packet;
pub mod payload;
pub mod service;
pub mod session;
pub mod sid;
pub mod transport;

mod body;
mod engine;
mod heartbeat;

pub use config::SocketIoConfig;
pub use handler::SocketIoHandler;
pub use packet::{Packet, PacketType};
pub use session::{DisconnectReason, Session, SessionState};
pub use sid::Sid;
