//! The [`SocketIoHandler`] trait is the application-facing listener: it
//! receives sessions and packets and may send packets back.
//!
//! #### Example :
//! ```rust
//! # use socketio_legacy::{Packet, Session, SocketIoHandler, DisconnectReason};
//! # use socketio_legacy::service::SocketIoService;
//! # use std::sync::Arc;
//! # use std::sync::atomic::{AtomicUsize, Ordering};
//! #[derive(Debug, Default)]
//! struct EchoHandler {
//!     user_cnt: AtomicUsize,
//! }
//!
//! impl SocketIoHandler for EchoHandler {
//!     fn on_connect(&self, session: Arc<Session>) {
//!         self.user_cnt.fetch_add(1, Ordering::Relaxed);
//!     }
//!     fn on_message(&self, session: Arc<Session>, packet: Packet) {
//!         // echo everything back
//!         session.send(packet).ok();
//!     }
//!     fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason) {
//!         self.user_cnt.fetch_sub(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let svc = SocketIoService::new(EchoHandler::default());
//! ```

use std::sync::Arc;

use crate::{
    packet::Packet,
    session::{DisconnectReason, Session},
};

/// Listener for session events. Callbacks run on the executor that delivered
/// the packet and must not block it; hand heavy work to a task.
pub trait SocketIoHandler: Send + Sync + 'static {
    /// Called when a session binds its first transport.
    fn on_connect(&self, session: Arc<Session>);

    /// Called for every inbound MESSAGE/JSON/EVENT/ACK/ERROR packet.
    /// Protocol packets (heartbeats, connects, disconnects, noops) are
    /// handled by the session itself and never reach the listener.
    fn on_message(&self, session: Arc<Session>, packet: Packet);

    /// Called exactly once when a session reaches its terminal state.
    fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason);
}

impl<T: SocketIoHandler> SocketIoHandler for Arc<T> {
    fn on_connect(&self, session: Arc<Session>) {
        (**self).on_connect(session)
    }

    fn on_message(&self, session: Arc<Session>, packet: Packet) {
        (**self).on_message(session, packet)
    }

    fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason) {
        (**self).on_disconnect(session, reason)
    }
}
