use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex, RwLock},
};

use tokio::task::JoinHandle;

use crate::{
    config::SocketIoConfig,
    errors::Error,
    handler::SocketIoHandler,
    heartbeat,
    packet::{Packet, PacketType},
    service::TransportKind,
    session::{DisconnectReason, Session, SessionState},
    sid::Sid,
};

type SessionMap = RwLock<HashMap<Sid, Arc<Session>>>;

/// The [`SocketIo`] engine holds the session registry and drives the
/// lifecycle of every session: handshake creation, transport binds, inbound
/// packet dispatch and teardown. It is the only process-wide mutable table.
pub struct SocketIo<H: SocketIoHandler> {
    /// All live sessions by id. Inserted at handshake, removed at disconnect.
    sessions: SessionMap,

    /// The application listener, called on connect/message/disconnect
    pub handler: Arc<H>,

    pub config: SocketIoConfig,

    /// The process-wide heartbeat ticker, started with the first session
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl<H: SocketIoHandler> SocketIo<H> {
    pub fn new(handler: H, config: SocketIoConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            handler: Arc::new(handler),
            config,
            heartbeat: Mutex::new(None),
        }
    }

    /// Create a session in `Connecting` and register it. The handshake
    /// response must only be written after this returns, so a follow-up
    /// transport request always finds the sid.
    pub(crate) fn create_session(self: &Arc<Self>, remote_addr: Option<IpAddr>) -> Arc<Session> {
        let engine = Arc::downgrade(self);
        let close_fn = Arc::new(move |sid, reason| {
            if let Some(engine) = engine.upgrade() {
                engine.close_session(sid, reason);
            }
        });

        let mut sessions = self.sessions.write().unwrap();
        let mut sid = Sid::new();
        while sessions.contains_key(&sid) {
            sid = Sid::new();
        }
        let session = Arc::new(Session::new(sid, &self.config, remote_addr, close_fn));
        sessions.insert(sid, session.clone());
        drop(sessions);

        tracing::debug!(?sid, "session created");
        self.ensure_heartbeat();
        session
    }

    /// Get a session by its sid. Clones the ref to avoid holding the lock.
    pub fn get_session(&self, sid: Sid) -> Option<Arc<Session>> {
        self.sessions.read().unwrap().get(&sid).cloned()
    }

    pub(crate) fn sessions_snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().unwrap().values().cloned().collect()
    }

    /// Bind a transport to a session: the first bind takes it to `Connected`,
    /// emits the CONNECT ack and notifies the listener; later binds refresh
    /// the heartbeat clock and, within the close window, resume a dropped
    /// session. Returns whether this was the first bind.
    pub(crate) fn bind_transport(
        &self,
        session: &Arc<Session>,
        kind: TransportKind,
    ) -> Result<bool, Error> {
        match session.state() {
            SessionState::Disconnected => return Err(Error::SessionClosed),
            SessionState::Disconnecting => {
                if !session.try_resume() {
                    return Err(Error::SessionClosed);
                }
            }
            _ => {}
        }
        session.cancel_close_timer();
        session.set_transport(kind);
        session.ack_heartbeat();

        let first = session.transition(SessionState::Connected);
        if first {
            tracing::debug!(sid = ?session.sid, transport = kind.name(), "first transport bind");
            session.send(Packet::connect(""))?;
            self.handler.on_connect(session.clone());
        }
        Ok(first)
    }

    /// Dispatch one inbound packet against its session.
    pub(crate) fn handle_packet(&self, session: &Arc<Session>, packet: Packet) -> Result<(), Error> {
        tracing::trace!(sid = ?session.sid, ?packet, "inbound packet");
        match packet.ptype() {
            PacketType::Heartbeat => {
                session.ack_heartbeat();
                Ok(())
            }
            PacketType::Disconnect => {
                if packet.endpoint().is_empty() {
                    session.forbid_resume();
                    self.close_session(session.sid, DisconnectReason::ClientDisconnect);
                } else {
                    // namespace leave: endpoints are pass-through only
                    tracing::debug!(sid = ?session.sid, endpoint = packet.endpoint(), "namespace disconnect");
                }
                Ok(())
            }
            PacketType::Connect => {
                // acknowledge a namespace join by echoing it back
                if !packet.endpoint().is_empty() {
                    session.send(Packet::connect(packet.endpoint()))?;
                }
                Ok(())
            }
            PacketType::Noop => {
                if packet.data().is_some() {
                    Err(Error::ProtocolViolation("data on a NOOP packet"))
                } else {
                    Ok(())
                }
            }
            PacketType::Message
            | PacketType::Json
            | PacketType::Event
            | PacketType::Ack
            | PacketType::Error => {
                self.handler.on_message(session.clone(), packet);
                Ok(())
            }
        }
    }

    /// Close a session: remove it from the registry (the commit point -
    /// later references are no-ops), cancel its timers, abort any parked
    /// poll and notify the listener exactly once.
    pub fn close_session(&self, sid: Sid, reason: DisconnectReason) {
        let Some(session) = self.sessions.write().unwrap().remove(&sid) else {
            return;
        };
        let previous = session.set_disconnected();
        session.cancel_close_timer();

        // Wake whoever holds the outbound channel so it can terminate, then
        // close the receiver if nobody does (e.g. no poll in flight).
        session.push_close_signal();
        if let Ok(mut rx) = session.internal_rx.try_lock() {
            rx.close();
        }

        tracing::debug!(?sid, ?reason, "session closed");
        if previous >= SessionState::Connected && previous != SessionState::Disconnected {
            self.handler.on_disconnect(session, reason);
        }
    }

    fn ensure_heartbeat(self: &Arc<Self>) {
        let mut heartbeat = self.heartbeat.lock().unwrap();
        if heartbeat.is_none() {
            *heartbeat = Some(heartbeat::spawn_scheduler(self));
        }
    }
}

impl<H: SocketIoHandler> Drop for SocketIo<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingHandler {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
        messages: AtomicUsize,
    }

    impl SocketIoHandler for CountingHandler {
        fn on_connect(&self, _session: Arc<Session>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_message(&self, _session: Arc<Session>, _packet: Packet) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
        fn on_disconnect(&self, _session: Arc<Session>, _reason: DisconnectReason) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn create_engine() -> Arc<SocketIo<CountingHandler>> {
        Arc::new(SocketIo::new(
            CountingHandler::default(),
            SocketIoConfig::default(),
        ))
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let engine = create_engine();
        let session = engine.create_session(None);
        assert_eq!(session.state(), SessionState::Connecting);
        let found = engine.get_session(session.sid).unwrap();
        assert_eq!(found.sid, session.sid);
    }

    #[tokio::test]
    async fn first_bind_connects_and_acks() {
        let engine = create_engine();
        let session = engine.create_session(None);

        let first = engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();
        assert!(first);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(engine.handler.connected.load(Ordering::SeqCst), 1);

        let mut rx = session.internal_rx.try_lock().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Packet::connect(""));
        drop(rx);

        let again = engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();
        assert!(!again);
        assert_eq!(engine.handler.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_session_notifies_listener_once() {
        let engine = create_engine();
        let session = engine.create_session(None);
        engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();

        engine.close_session(session.sid, DisconnectReason::TransportClose);
        engine.close_session(session.sid, DisconnectReason::TransportClose);

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(engine.get_session(session.sid).is_none());
        assert_eq!(engine.handler.disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_before_bind_skips_listener() {
        let engine = create_engine();
        let session = engine.create_session(None);
        engine.close_session(session.sid, DisconnectReason::HeartbeatTimeout);
        assert_eq!(engine.handler.disconnected.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn heartbeat_packet_refreshes_ack() {
        let engine = create_engine();
        let session = engine.create_session(None);
        engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();

        engine
            .handle_packet(&session, Packet::heartbeat())
            .unwrap();
        assert!(session.since_last_heartbeat().as_millis() < 100);
        assert_eq!(engine.handler.messages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn message_packets_reach_listener() {
        let engine = create_engine();
        let session = engine.create_session(None);
        engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();

        engine
            .handle_packet(&session, Packet::message("hello"))
            .unwrap();
        assert_eq!(engine.handler.messages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_disconnect_closes_session() {
        let engine = create_engine();
        let session = engine.create_session(None);
        engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();

        engine
            .handle_packet(&session, Packet::disconnect(""))
            .unwrap();
        assert!(engine.get_session(session.sid).is_none());
        assert_eq!(engine.handler.disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn namespace_connect_is_echoed() {
        let engine = create_engine();
        let session = engine.create_session(None);
        engine
            .bind_transport(&session, TransportKind::XhrPolling)
            .unwrap();

        engine
            .handle_packet(&session, Packet::connect("/chat"))
            .unwrap();

        let mut rx = session.internal_rx.try_lock().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Packet::connect("")); // bind ack
        assert_eq!(rx.try_recv().unwrap(), Packet::connect("/chat"));
    }

    #[tokio::test]
    async fn noop_with_data_is_a_violation() {
        let engine = create_engine();
        let session = engine.create_session(None);
        let packet = Packet::new(PacketType::Noop, "", "", Some("x".into()));
        let err = engine.handle_packet(&session, packet).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
