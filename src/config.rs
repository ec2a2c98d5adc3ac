use std::time::Duration;

use crate::service::TransportKind;

/// Margin subtracted from the heartbeat timeout when parking a poll, so the
/// NOOP keep-alive reaches the client before its own timer fires.
const PARK_SAFETY_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    /// The path prefix to listen for socket.io requests on.
    /// Defaults to "/socket.io".
    pub req_path: String,

    /// Maximum client silence (no heartbeat ack) before the session is
    /// considered dead. Advertised to the client in the handshake.
    /// Defaults to 30 seconds.
    pub heartbeat_timeout: Duration,

    /// Cadence of the server heartbeat ticker. Must be shorter than
    /// `heartbeat_timeout`. Defaults to 20 seconds.
    pub heartbeat_interval: Duration,

    /// Grace window during which a dropped streaming transport may be
    /// replaced before the session is destroyed. Advertised to the client in
    /// the handshake. Defaults to 25 seconds.
    pub close_timeout: Duration,

    /// Enabled transports as a [`TransportKind`] bitset. Defaults to all four.
    pub transports: u8,

    /// Emit `wss://` websocket locations regardless of the inbound scheme,
    /// for TLS-terminated reverse proxies.
    pub always_secure_ws_location: bool,

    /// Header carrying the client ip (e.g. `X-Forwarded-For`, first token).
    /// When unset the peer socket address is used.
    pub header_client_ip_address_name: Option<String>,

    /// Bound of the per-session outbound packet queue. A full queue is fatal
    /// to the session. Defaults to 64 packets.
    pub max_buffer_size: usize,

    /// Maximum number of bytes accepted per polling request body.
    /// Defaults to 100kb.
    pub max_payload: u64,
}

impl Default for SocketIoConfig {
    fn default() -> Self {
        Self {
            req_path: "/socket.io".to_string(),
            heartbeat_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(20),
            close_timeout: Duration::from_secs(25),
            transports: TransportKind::ALL,
            always_secure_ws_location: false,
            header_client_ip_address_name: None,
            max_buffer_size: 64,
            max_payload: 1e5 as u64, // 100kb
        }
    }
}

impl SocketIoConfig {
    pub fn builder() -> SocketIoConfigBuilder {
        SocketIoConfigBuilder::new()
    }

    pub fn allowed_transport(&self, transport: TransportKind) -> bool {
        self.transports & transport as u8 != 0
    }

    /// Comma list of the enabled transports, handshake order.
    pub(crate) fn transports_list(&self) -> String {
        let names: Vec<&str> = TransportKind::CANONICAL
            .iter()
            .filter(|t| self.allowed_transport(**t))
            .map(|t| t.name())
            .collect();
        names.join(",")
    }

    /// How long a poll may stay parked before a NOOP is emitted to keep the
    /// client side alive.
    pub(crate) fn poll_park_timeout(&self) -> Duration {
        self.heartbeat_timeout
            .saturating_sub(PARK_SAFETY_MARGIN)
            .max(Duration::from_secs(1))
    }
}

pub struct SocketIoConfigBuilder {
    config: SocketIoConfig,
}

impl SocketIoConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SocketIoConfig::default(),
        }
    }

    /// The path prefix to listen for socket.io requests on.
    /// Defaults to "/socket.io".
    pub fn req_path(mut self, req_path: impl Into<String>) -> Self {
        self.config.req_path = req_path.into();
        self
    }

    /// Maximum client silence before the session is considered dead.
    /// Defaults to 30 seconds.
    pub fn heartbeat_timeout(mut self, heartbeat_timeout: Duration) -> Self {
        self.config.heartbeat_timeout = heartbeat_timeout;
        self
    }

    /// Cadence of the server heartbeat ticker.
    /// Defaults to 20 seconds.
    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.config.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Grace window for replacing a dropped streaming transport.
    /// Defaults to 25 seconds.
    pub fn close_timeout(mut self, close_timeout: Duration) -> Self {
        self.config.close_timeout = close_timeout;
        self
    }

    /// Restrict the enabled transports.
    pub fn transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.config.transports = transports.into_iter().fold(0, |acc, t| acc | t as u8);
        self
    }

    /// Emit `wss://` websocket locations regardless of the inbound scheme.
    pub fn always_secure_ws_location(mut self, enabled: bool) -> Self {
        self.config.always_secure_ws_location = enabled;
        self
    }

    /// Resolve the client ip from this header (first comma token) instead of
    /// the peer address.
    pub fn header_client_ip_address_name(mut self, name: impl Into<String>) -> Self {
        self.config.header_client_ip_address_name = Some(name.into());
        self
    }

    /// Bound of the per-session outbound packet queue.
    /// Defaults to 64 packets.
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// Maximum number of bytes accepted per polling request body.
    /// Defaults to 100kb.
    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    /// Build the config.
    ///
    /// Panics when `heartbeat_interval >= heartbeat_timeout`: a ticker that
    /// cannot beat the timeout would kill every idle session.
    pub fn build(self) -> SocketIoConfig {
        assert!(
            self.config.heartbeat_interval < self.config.heartbeat_timeout,
            "heartbeat_interval must be shorter than heartbeat_timeout"
        );
        self.config
    }
}

impl Default for SocketIoConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
