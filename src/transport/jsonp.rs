//! JSONP long-polling transport: same session semantics as XHR polling, but
//! responses are wrapped in a script callback and POST bodies arrive
//! form-encoded as `d=<string>`.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body::Body;

use crate::{
    body::ResponseBody,
    engine::SocketIo,
    errors::Error,
    handler::SocketIoHandler,
    payload,
    service::TransportKind,
    session::SessionState,
    sid::Sid,
    transport::polling,
};

/// Wrap a payload into the `io.j[INDEX]("…");` callback script. The quoted
/// payload is a JSON string literal, which escapes `\`, `"`, `\n` and `\r`.
pub(crate) fn script_response(index: u32, payload: &str) -> Result<String, Error> {
    Ok(format!(
        "io.j[{index}]({});",
        serde_json::to_string(payload)?
    ))
}

/// Handle a GET poll, answering with the callback script.
pub(crate) async fn polling_req<B, H>(
    engine: Arc<SocketIo<H>>,
    sid: Sid,
    index: u32,
) -> Result<Response<ResponseBody<B>>, Error>
where
    B: Send + 'static,
    H: SocketIoHandler,
{
    let batch = polling::take_payload(&engine, TransportKind::JsonpPolling, sid).await?;
    let data = payload::encode_payload(&batch);
    let script = script_response(index, &String::from_utf8_lossy(&data))?;
    tracing::debug!(?sid, len = script.len(), "flushing jsonp response");
    Ok(polling::http_response(
        StatusCode::OK,
        "application/javascript",
        script,
    )?)
}

/// Handle a POST: unwrap the `d=` form field (the 0.9 client JSON-stringifies
/// it) and deliver the packets.
pub(crate) async fn post_req<R, B, H>(
    engine: Arc<SocketIo<H>>,
    sid: Sid,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: SocketIoHandler,
    R: Body + Send + Unpin + 'static,
    R::Error: std::fmt::Debug,
    R::Data: Send,
    B: Send + 'static,
{
    let session = engine.get_session(sid).ok_or(Error::UnknownSession(sid))?;
    if let Some(bound) = session.transport_kind() {
        if bound.is_streaming() && session.state() != SessionState::Disconnecting {
            return Err(Error::TransportMismatch);
        }
    }
    engine.bind_transport(&session, TransportKind::JsonpPolling)?;

    let body = polling::aggregate(req.into_body(), engine.config.max_payload).await?;
    let data = decode_post_body(&body)?;
    polling::deliver(&engine, sid, data)?;
    Ok(polling::http_response(
        StatusCode::OK,
        "text/plain; charset=UTF-8",
        "1",
    )?)
}

fn decode_post_body(body: &[u8]) -> Result<Bytes, Error> {
    let value = form_urlencoded::parse(body)
        .find_map(|(key, value)| (key == "d").then(|| value.into_owned()))
        .ok_or(Error::ProtocolViolation("missing d= field in jsonp post"))?;

    if value.starts_with('"') {
        let unquoted: String = serde_json::from_str(&value).map_err(|_| Error::MalformedPacket)?;
        Ok(Bytes::from(unquoted))
    } else {
        Ok(Bytes::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_escapes_quotes_and_newlines() {
        let script = script_response(3, "3:::a\"b\\c\n\r").unwrap();
        assert_eq!(script, "io.j[3](\"3:::a\\\"b\\\\c\\n\\r\");");
    }

    #[test]
    fn post_body_plain() {
        let data = decode_post_body(b"d=3%3A%3A%3Ahello").unwrap();
        assert_eq!(data, "3:::hello");
    }

    #[test]
    fn post_body_json_quoted() {
        // d="3:::hi" with url encoding
        let data = decode_post_body(b"d=%223%3A%3A%3Ahi%22").unwrap();
        assert_eq!(data, "3:::hi");
    }

    #[test]
    fn post_body_missing_field() {
        let err = decode_post_body(b"x=1").unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
