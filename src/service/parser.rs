//! Parses the socket.io URL grammar and routes each request to its
//! transport framer.
//!
//! * `GET {prefix}/1/` — handshake
//! * `{GET|POST} {prefix}/1/{transport}/{sid}[?i=INDEX]` — transport traffic

use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use futures::Future;
use http::{Method, Request, Response, StatusCode};

use crate::{
    body::ResponseBody,
    config::SocketIoConfig,
    engine::SocketIo,
    errors::Error,
    handler::SocketIoHandler,
    service::futures::ResponseFuture,
    sid::Sid,
    transport::{jsonp, polling, ws},
};

/// The protocol revision segment of every socket.io v0.9 URL.
const PROTOCOL_REVISION: &str = "1";

/// The physical carrier of a session's packets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportKind {
    WebSocket = 0x01,
    FlashSocket = 0x02,
    XhrPolling = 0x04,
    JsonpPolling = 0x08,
}

impl TransportKind {
    /// Bitset of every transport.
    pub const ALL: u8 = 0x0f;

    /// Handshake advertisement order.
    pub const CANONICAL: [TransportKind; 4] = [
        TransportKind::WebSocket,
        TransportKind::FlashSocket,
        TransportKind::XhrPolling,
        TransportKind::JsonpPolling,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::FlashSocket => "flashsocket",
            TransportKind::XhrPolling => "xhr-polling",
            TransportKind::JsonpPolling => "jsonp-polling",
        }
    }

    /// Polling transports own an outbound channel only while a request is
    /// parked.
    pub fn is_polling(self) -> bool {
        matches!(self, TransportKind::XhrPolling | TransportKind::JsonpPolling)
    }

    pub fn is_streaming(self) -> bool {
        !self.is_polling()
    }

    pub(crate) fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0x01 => Some(TransportKind::WebSocket),
            0x02 => Some(TransportKind::FlashSocket),
            0x04 => Some(TransportKind::XhrPolling),
            0x08 => Some(TransportKind::JsonpPolling),
            _ => None,
        }
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "websocket" => Ok(TransportKind::WebSocket),
            "flashsocket" => Ok(TransportKind::FlashSocket),
            "xhr-polling" => Ok(TransportKind::XhrPolling),
            "jsonp-polling" => Ok(TransportKind::JsonpPolling),
            _ => Err(Error::UnsupportedTransport),
        }
    }
}

/// The request information extracted from the URI.
#[derive(Debug)]
pub(crate) struct RequestInfo {
    /// `None` for a handshake request.
    pub transport: Option<TransportKind>,
    pub sid: Option<Sid>,
    pub method: Method,
    /// `?i=` / `?jsonp=` callback index.
    pub jsonp: Option<u32>,
}

impl RequestInfo {
    fn parse<B>(req: &Request<B>, config: &SocketIoConfig) -> Result<Self, Error> {
        let path = req
            .uri()
            .path()
            .strip_prefix(&config.req_path)
            .ok_or(Error::HttpErrorResponse(StatusCode::NOT_FOUND))?;
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        if segments.next() != Some(PROTOCOL_REVISION) {
            return Err(Error::HttpErrorResponse(StatusCode::BAD_REQUEST));
        }

        let transport = segments
            .next()
            .map(TransportKind::from_str)
            .transpose()?;
        if let Some(kind) = transport {
            if !config.allowed_transport(kind) {
                return Err(Error::UnsupportedTransport);
            }
        }

        let sid = segments
            .next()
            .map(Sid::from_str)
            .transpose()
            .map_err(|_| Error::NotHandshaken)?;

        let jsonp = req.uri().query().unwrap_or("").split('&').find_map(|kv| {
            let (key, value) = kv.split_once('=')?;
            if key == "i" || key == "jsonp" {
                value.parse::<u32>().ok()
            } else {
                None
            }
        });

        Ok(RequestInfo {
            transport,
            sid,
            method: req.method().clone(),
            jsonp,
        })
    }
}

/// Resolve the client ip: the configured header wins (first comma token),
/// then whatever peer address the bootstrap stashed in request extensions.
fn client_ip<B>(req: &Request<B>, config: &SocketIoConfig) -> Option<IpAddr> {
    if let Some(name) = &config.header_client_ip_address_name {
        let from_header = req
            .headers()
            .get(name.as_str())
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        if from_header.is_some() {
            return from_header;
        }
    }
    req.extensions().get::<SocketAddr>().map(|addr| addr.ip())
}

/// Create a session and answer the handshake record:
/// `SID:HB_TIMEOUT:CLOSE_TIMEOUT:TRANSPORTS`. The session is registered
/// before the response is written.
fn handshake_req<H, B, R>(
    engine: Arc<SocketIo<H>>,
    req: &Request<R>,
    jsonp: Option<u32>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: SocketIoHandler,
    B: Send + 'static,
{
    let remote = client_ip(req, &engine.config);
    let session = engine.create_session(remote);
    let config = &engine.config;
    let record = format!(
        "{}:{}:{}:{}",
        session.sid,
        config.heartbeat_timeout.as_secs(),
        config.close_timeout.as_secs(),
        config.transports_list()
    );
    tracing::debug!(sid = ?session.sid, "handshake");

    match jsonp {
        Some(index) => {
            let script = jsonp::script_response(index, &record)?;
            Ok(polling::http_response(
                StatusCode::OK,
                "application/javascript",
                script,
            )?)
        }
        None => Ok(polling::http_response(
            StatusCode::OK,
            "text/plain; charset=UTF-8",
            record,
        )?),
    }
}

/// Dispatch a request to the handshake or the matching transport framer.
pub(crate) fn dispatch_req<F, H, ReqBody, ResBody>(
    req: Request<ReqBody>,
    engine: Arc<SocketIo<H>>,
) -> ResponseFuture<F, ResBody>
where
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: std::fmt::Debug,
    ResBody: Send + 'static,
    H: SocketIoHandler,
    F: Future,
{
    let info = match RequestInfo::parse(&req, &engine.config) {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!("error parsing request: {e:?}");
            return ResponseFuture::ready(Ok(e.into()));
        }
    };

    match info.transport {
        None if info.method == Method::GET => {
            ResponseFuture::ready(handshake_req(engine, &req, info.jsonp))
        }
        None => ResponseFuture::empty_response(400),
        Some(kind) => {
            let Some(sid) = info.sid else {
                return ResponseFuture::ready(Ok(Error::NotHandshaken.into()));
            };
            match kind {
                TransportKind::XhrPolling if info.method == Method::GET => {
                    ResponseFuture::async_response(Box::pin(polling::polling_req(engine, sid)))
                }
                TransportKind::XhrPolling if info.method == Method::POST => {
                    ResponseFuture::async_response(Box::pin(polling::post_req(engine, sid, req)))
                }
                TransportKind::JsonpPolling if info.method == Method::GET => {
                    ResponseFuture::async_response(Box::pin(jsonp::polling_req(
                        engine,
                        sid,
                        info.jsonp.unwrap_or(0),
                    )))
                }
                TransportKind::JsonpPolling if info.method == Method::POST => {
                    ResponseFuture::async_response(Box::pin(jsonp::post_req(engine, sid, req)))
                }
                TransportKind::WebSocket | TransportKind::FlashSocket
                    if info.method == Method::GET =>
                {
                    ResponseFuture::ready(ws::new_req(engine, kind, sid, req))
                }
                _ => ResponseFuture::empty_response(400),
            }
        }
    }
}
