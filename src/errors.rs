use http::{Response, StatusCode};
use tokio_tungstenite::tungstenite;

use crate::{body::ResponseBody, sid::Sid};

/// Wire body answered when a request names a session that was never
/// handshaken or is already gone: ERROR packet, reason 1 ("client not
/// handshaken"), advice 0 ("reconnect").
pub(crate) const NOT_HANDSHAKEN: &str = "7:::1+0";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed packet")]
    MalformedPacket,
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
    #[error("unknown session id: {0}")]
    UnknownSession(Sid),
    #[error("session not handshaken")]
    NotHandshaken,
    #[error("unsupported transport")]
    UnsupportedTransport,
    #[error("request transport does not match the session transport")]
    TransportMismatch,
    #[error("request payload too large")]
    PayloadTooLarge,
    #[error("outbound buffer saturated")]
    BackpressureOverflow,
    #[error("session closed")]
    SessionClosed,
    #[error("websocket upgrade error")]
    UpgradeError,
    #[error("error reading request body")]
    BodyRead,
    #[error("error serializing callback payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ws transport error: {0}")]
    WsTransport(#[from] tungstenite::Error),
    #[error("http transport error: {0}")]
    HttpTransport(#[from] hyper::Error),
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("http error response: {0:?}")]
    HttpErrorResponse(StatusCode),
}

/// Map an error onto its wire response. An unknown session is answered with
/// the `7:::1+0` ERROR packet and a 200, never a HTTP 5xx; malformed input is
/// a plain 400.
impl<B> From<Error> for Response<ResponseBody<B>> {
    fn from(err: Error) -> Self {
        use http::header::{CONTENT_LENGTH, CONTENT_TYPE};

        let status = |code: StatusCode| {
            Response::builder()
                .status(code)
                .body(ResponseBody::empty_response())
                .unwrap()
        };

        match err {
            Error::UnknownSession(_) | Error::NotHandshaken | Error::SessionClosed => {
                Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "text/plain; charset=UTF-8")
                    .header(CONTENT_LENGTH, NOT_HANDSHAKEN.len())
                    .body(ResponseBody::custom_response(NOT_HANDSHAKEN))
                    .unwrap()
            }
            Error::MalformedPacket
            | Error::ProtocolViolation(_)
            | Error::UnsupportedTransport
            | Error::TransportMismatch
            | Error::PayloadTooLarge
            | Error::BodyRead
            | Error::UpgradeError => status(StatusCode::BAD_REQUEST),
            Error::HttpErrorResponse(code) => status(code),
            _err => {
                tracing::debug!("uncaught error: {_err:?}");
                status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
