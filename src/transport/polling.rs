//! XHR long-polling transport: GET parks a response until packets are
//! available (or a NOOP keep-alive fires), POST delivers inbound payloads.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode, header};
use http_body::Body;

use crate::{
    body::ResponseBody,
    engine::SocketIo,
    errors::Error,
    handler::SocketIoHandler,
    packet::Packet,
    payload,
    service::TransportKind,
    session::{DisconnectReason, SessionState},
    sid::Sid,
};

pub(crate) fn http_response<B, D>(
    code: StatusCode,
    content_type: &'static str,
    data: D,
) -> Result<Response<ResponseBody<B>>, http::Error>
where
    D: Into<Bytes>,
{
    let body: Bytes = data.into();
    Response::builder()
        .status(code)
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::CONTENT_TYPE, content_type)
        .body(ResponseBody::custom_response(body))
}

/// Read a request body whole, bounded by `max_payload`.
pub(crate) async fn aggregate<R>(body: R, max_payload: u64) -> Result<Bytes, Error>
where
    R: Body + Send + Unpin,
    R::Data: Send,
    R::Error: std::fmt::Debug,
{
    if body.size_hint().lower() > max_payload {
        return Err(Error::PayloadTooLarge);
    }
    let bytes = hyper::body::to_bytes(body).await.map_err(|_e| {
        tracing::debug!("error reading request body: {_e:?}");
        Error::BodyRead
    })?;
    if bytes.len() as u64 > max_payload {
        return Err(Error::PayloadTooLarge);
    }
    Ok(bytes)
}

/// Park on the session's outbound channel and return the next batch of
/// packets to flush. Shared by the XHR and JSONP framers.
///
/// The parked response owns the channel receiver for its lifetime; `send`
/// either wakes it or enqueues for the next poll. An empty park is completed
/// with a NOOP shortly before the client's heartbeat timeout would fire.
pub(crate) async fn take_payload<H: SocketIoHandler>(
    engine: &Arc<SocketIo<H>>,
    kind: TransportKind,
    sid: Sid,
) -> Result<Vec<Packet>, Error> {
    let session = engine.get_session(sid).ok_or(Error::UnknownSession(sid))?;
    // a live streaming session does not poll, but a dropped one may
    // reconnect here within the close window
    if let Some(bound) = session.transport_kind() {
        if bound.is_streaming() && session.state() != SessionState::Disconnecting {
            return Err(Error::TransportMismatch);
        }
    }

    // Two polls racing on one session is a protocol violation fatal to it
    let mut rx = match session.internal_rx.try_lock() {
        Ok(rx) => rx,
        Err(_) => {
            engine.close_session(sid, DisconnectReason::MultiplePollingError);
            return Err(Error::HttpErrorResponse(StatusCode::BAD_REQUEST));
        }
    };
    engine.bind_transport(&session, kind)?;

    tracing::debug!(?sid, "polling request parked");

    let mut batch = Vec::new();
    while let Ok(packet) = rx.try_recv() {
        batch.push(packet);
    }

    if batch.is_empty() {
        match tokio::time::timeout(engine.config.poll_park_timeout(), rx.recv()).await {
            Ok(Some(packet)) => {
                batch.push(packet);
                while let Ok(packet) = rx.try_recv() {
                    batch.push(packet);
                }
            }
            // channel closed under us: the session is gone
            Ok(None) => {}
            // nothing arrived: answer a NOOP so the client lives on
            Err(_elapsed) => batch.push(Packet::noop()),
        }
    }

    // A torn-down session aborts its parked poll with an empty 200
    if session.state() == SessionState::Disconnected {
        return Ok(Vec::new());
    }
    Ok(batch)
}

/// Handle a GET poll: flush immediately when packets are pending, park
/// otherwise.
pub(crate) async fn polling_req<B, H>(
    engine: Arc<SocketIo<H>>,
    sid: Sid,
) -> Result<Response<ResponseBody<B>>, Error>
where
    B: Send + 'static,
    H: SocketIoHandler,
{
    let batch = take_payload(&engine, TransportKind::XhrPolling, sid).await?;
    let data = payload::encode_payload(&batch);
    tracing::debug!(?sid, len = data.len(), "flushing polling response");
    Ok(http_response(
        StatusCode::OK,
        "text/plain; charset=UTF-8",
        data,
    )?)
}

/// Handle a POST: decode the (possibly framed) payload and deliver each
/// packet to the session. Responds `200` with the customary 1-byte body.
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
    engine.bind_transport(&session, TransportKind::XhrPolling)?;

    let body = aggregate(req.into_body(), engine.config.max_payload).await?;
    deliver(&engine, sid, body)?;
    Ok(http_response(
        StatusCode::OK,
        "text/plain; charset=UTF-8",
        "1",
    )?)
}

/// Decode an inbound polling body and feed its packets to the session.
pub(crate) fn deliver<H: SocketIoHandler>(
    engine: &Arc<SocketIo<H>>,
    sid: Sid,
    body: Bytes,
) -> Result<(), Error> {
    let packets = match payload::decode_payload(body) {
        Ok(packets) => packets,
        Err(e) => {
            tracing::debug!(?sid, "error parsing payload: {e:?}");
            engine.close_session(sid, DisconnectReason::PacketParsingError);
            return Err(e);
        }
    };
    for packet in packets {
        let Some(session) = engine.get_session(sid) else {
            // an earlier packet of this batch closed the session
            break;
        };
        engine.handle_packet(&session, packet)?;
    }
    Ok(())
}
