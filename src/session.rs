//! A [`Session`] is a logical Socket.IO connection, independent of the
//! HTTP/WS transport currently carrying it.
//!
//! The outbound side is one bounded mpsc channel. Senders go through
//! [`Session::send`]; the consumer side is [`Session::internal_rx`], locked by
//! whoever currently owns the outbound transport:
//! * a polling transport locks it for the lifetime of one parked poll,
//! * a streaming transport locks it for the lifetime of the connection.
//!
//! Handing the lock over is the `rebind` of the session to a new transport:
//! packets buffered in the channel drain to the new owner in FIFO order, so
//! nothing is lost or reordered across an upgrade.

use std::{
    net::IpAddr,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::{
    sync::{
        Mutex,
        mpsc::{self, Receiver, error::TrySendError},
    },
    task::JoinHandle,
};

use crate::{
    config::SocketIoConfig, errors::Error, packet::Packet, service::TransportKind, sid::Sid,
};

/// Session lifecycle. Transitions only move forward (`Disconnected` is
/// terminal), with one exception: a session whose streaming transport dropped
/// may be resumed `Disconnecting -> Connected` by a new transport bind inside
/// the close window, unless the disconnect was explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Handshaken, no transport bound yet
    Connecting = 0,
    Connected = 1,
    /// Close pending: the close timer is running
    Disconnecting = 2,
    /// Terminal
    Disconnected = 3,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Connected,
            2 => SessionState::Disconnecting,
            _ => SessionState::Disconnected,
        }
    }
}

/// Why a [`Session`] reached [`SessionState::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a DISCONNECT packet
    ClientDisconnect,
    /// The server side called [`Session::disconnect`]
    ServerDisconnect,
    /// The transport connection ended
    TransportClose,
    /// An error occured in the transport layer
    TransportError,
    /// A dropped transport was not replaced within the close window
    CloseTimeout,
    /// No heartbeat ack within the heartbeat timeout
    HeartbeatTimeout,
    /// An inbound payload could not be parsed
    PacketParsingError,
    /// Two simultaneous polls on one session
    MultiplePollingError,
    /// The outbound queue saturated
    BackpressureOverflow,
}

pub(crate) type CloseFn = dyn Fn(Sid, DisconnectReason) + Send + Sync;

pub struct Session {
    /// The session id handed out at handshake
    pub sid: Sid,

    /// Bound transport as a bitflag so it fits an atomic; 0 until first bind
    transport: AtomicU8,

    state: AtomicU8,

    /// Explicit disconnects forbid the close-window resume
    no_resume: AtomicBool,

    remote_addr: Option<IpAddr>,

    /// Last client heartbeat ack (or bind), checked by the scheduler
    last_heartbeat: StdMutex<Instant>,

    /// Consumer half of the outbound channel; see the module docs for the
    /// locking discipline
    pub(crate) internal_rx: Mutex<Receiver<Packet>>,
    internal_tx: mpsc::Sender<Packet>,

    close_timeout: Duration,
    close_timer: StdMutex<Option<JoinHandle<()>>>,

    close_fn: Arc<CloseFn>,
}

impl Session {
    pub(crate) fn new(
        sid: Sid,
        config: &SocketIoConfig,
        remote_addr: Option<IpAddr>,
        close_fn: Arc<CloseFn>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(config.max_buffer_size);
        Self {
            sid,
            transport: AtomicU8::new(0),
            state: AtomicU8::new(SessionState::Connecting as u8),
            no_resume: AtomicBool::new(false),
            remote_addr,
            last_heartbeat: StdMutex::new(Instant::now()),
            internal_rx: Mutex::new(internal_rx),
            internal_tx,
            close_timeout: config.close_timeout,
            close_timer: StdMutex::new(None),
            close_fn,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// The transport currently bound, `None` before the first bind.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        TransportKind::from_bit(self.transport.load(Ordering::Relaxed))
    }

    pub fn remote_address(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// Send a packet to the client: written through on a streaming transport,
    /// enqueued for the next poll otherwise. Packets sent after the session
    /// started disconnecting are dropped silently.
    ///
    /// A saturated queue is fatal: the session is closed and
    /// [`Error::BackpressureOverflow`] returned.
    pub fn send(&self, packet: Packet) -> Result<(), Error> {
        if self.state() >= SessionState::Disconnecting {
            return Ok(());
        }
        tracing::debug!(sid = ?self.sid, ?packet, "sending packet");
        self.internal_tx.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => {
                (self.close_fn)(self.sid, DisconnectReason::BackpressureOverflow);
                Error::BackpressureOverflow
            }
            TrySendError::Closed(_) => Error::SessionClosed,
        })
    }

    /// Disconnect the session: a DISCONNECT packet goes out if the transport
    /// can still carry it, then the close timer runs down to destruction.
    /// A disconnected session cannot be resumed.
    pub fn disconnect(&self) {
        self.send(Packet::disconnect("")).ok();
        self.no_resume.store(true, Ordering::SeqCst);
        if self.transition(SessionState::Disconnecting) {
            self.start_close_timer(DisconnectReason::ServerDisconnect);
        }
    }

    /// The streaming transport dropped without an explicit disconnect: keep
    /// the session around for `close_timeout` so a reconnect can resume it.
    pub(crate) fn transport_dropped(&self) {
        if self.transition(SessionState::Disconnecting) {
            tracing::debug!(sid = ?self.sid, "transport dropped, close window started");
            self.start_close_timer(DisconnectReason::CloseTimeout);
        }
    }

    /// Try to take the session back to `Connected` after a transport drop.
    pub(crate) fn try_resume(&self) -> bool {
        if self.no_resume.load(Ordering::SeqCst) {
            return false;
        }
        let resumed = self
            .state
            .compare_exchange(
                SessionState::Disconnecting as u8,
                SessionState::Connected as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if resumed {
            tracing::debug!(sid = ?self.sid, "session resumed within close window");
            self.cancel_close_timer();
        }
        resumed
    }

    /// Forward-only state transition; returns whether it moved.
    pub(crate) fn transition(&self, to: SessionState) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current >= to as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Flip to the terminal state, returning what the session was before.
    pub(crate) fn set_disconnected(&self) -> SessionState {
        self.state
            .swap(SessionState::Disconnected as u8, Ordering::SeqCst)
            .into()
    }

    pub(crate) fn forbid_resume(&self) {
        self.no_resume.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_transport(&self, kind: TransportKind) {
        self.transport.store(kind as u8, Ordering::Relaxed);
    }

    pub(crate) fn ack_heartbeat(&self) {
        *self.last_heartbeat.lock().unwrap() = Instant::now();
    }

    pub(crate) fn since_last_heartbeat(&self) -> Duration {
        self.last_heartbeat.lock().unwrap().elapsed()
    }

    /// Push a packet down the channel regardless of state; used by the engine
    /// to wake a parked consumer at teardown.
    pub(crate) fn push_close_signal(&self) {
        self.internal_tx.try_send(Packet::disconnect("")).ok();
    }

    fn start_close_timer(&self, reason: DisconnectReason) {
        let close_fn = self.close_fn.clone();
        let sid = self.sid;
        let timeout = self.close_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            close_fn(sid, reason);
        });
        if let Some(old) = self.close_timer.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn cancel_close_timer(&self) {
        if let Some(handle) = self.close_timer.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sid", &self.sid)
            .field("state", &self.state())
            .field("transport", &self.transport_kind())
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            Sid::new(),
            &SocketIoConfig::default(),
            None,
            Arc::new(|_, _| {}),
        )
    }

    #[test]
    fn transitions_are_forward_only() {
        let s = session();
        assert_eq!(s.state(), SessionState::Connecting);
        assert!(s.transition(SessionState::Connected));
        assert!(!s.transition(SessionState::Connected));
        assert!(s.transition(SessionState::Disconnected));
        assert!(!s.transition(SessionState::Disconnecting));
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn disconnected_is_absorbing() {
        let s = session();
        assert_eq!(s.set_disconnected(), SessionState::Connecting);
        assert_eq!(s.set_disconnected(), SessionState::Disconnected);
        assert!(!s.try_resume());
    }

    #[tokio::test]
    async fn resume_only_after_transport_drop() {
        let s = session();
        s.transition(SessionState::Connected);
        s.transport_dropped();
        assert_eq!(s.state(), SessionState::Disconnecting);
        assert!(s.try_resume());
        assert_eq!(s.state(), SessionState::Connected);

        s.disconnect();
        assert_eq!(s.state(), SessionState::Disconnecting);
        assert!(!s.try_resume());
    }

    #[tokio::test]
    async fn send_drops_silently_once_disconnecting() {
        let s = session();
        s.transition(SessionState::Connected);
        s.send(Packet::message("kept")).unwrap();
        s.transition(SessionState::Disconnecting);
        s.send(Packet::message("dropped")).unwrap();

        let mut rx = s.internal_rx.try_lock().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Packet::message("kept"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_is_fatal() {
        let config = SocketIoConfig::builder().max_buffer_size(1).build();
        let closed = Arc::new(AtomicBool::new(false));
        let closed2 = closed.clone();
        let s = Session::new(
            Sid::new(),
            &config,
            None,
            Arc::new(move |_, reason| {
                assert_eq!(reason, DisconnectReason::BackpressureOverflow);
                closed2.store(true, Ordering::SeqCst);
            }),
        );
        s.transition(SessionState::Connected);
        s.send(Packet::message("a")).unwrap();
        let err = s.send(Packet::message("b")).unwrap_err();
        assert!(matches!(err, Error::BackpressureOverflow));
        assert!(closed.load(Ordering::SeqCst));
    }
}
