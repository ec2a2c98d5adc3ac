//! WebSocket transport (also carries the `flashsocket` transport, whose wire
//! framing is identical).
//!
//! [`new_req`] upgrades an HTTP request into a websocket connection. Modern
//! clients negotiate Hybi/RFC6455 (`Sec-WebSocket-Key`); the pre-standard
//! Hixie-75/76 handshakes live in [`hixie`].
//!
//! A websocket request always names an existing sid (the handshake hands it
//! out first). Binding either takes the session to `Connected`, resumes it
//! within the close window, or upgrades it from a polling transport; in the
//! latter case a NOOP completes any parked poll and the outbound channel
//! lock is handed over, draining queued packets FIFO onto the socket.

use std::sync::Arc;

use futures::{
    SinkExt, StreamExt, TryStreamExt,
    stream::{SplitSink, SplitStream},
};
use http::{HeaderValue, Request, Response, StatusCode};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Message, handshake::derive_accept_key, protocol::Role},
};

use crate::{
    body::ResponseBody,
    engine::SocketIo,
    errors::Error,
    handler::SocketIoHandler,
    packet::{Packet, PacketType},
    payload,
    service::TransportKind,
    session::{Session, SessionState},
    sid::Sid,
};

pub mod hixie;

/// Create the 101 response for a Hybi websocket upgrade.
fn ws_response<B>(ws_key: &HeaderValue) -> Result<Response<ResponseBody<B>>, http::Error> {
    let derived = derive_accept_key(ws_key.as_bytes());
    let sec = derived.parse::<HeaderValue>().unwrap();
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::UPGRADE, HeaderValue::from_static("websocket"))
        .header(
            http::header::CONNECTION,
            HeaderValue::from_static("Upgrade"),
        )
        .header(http::header::SEC_WEBSOCKET_ACCEPT, sec)
        .body(ResponseBody::empty_response())
}

/// Upgrade a websocket (or flashsocket) request on an already handshaken
/// session. Dispatches to the Hixie handshake when the Hybi key is absent.
pub(crate) fn new_req<R, B, H: SocketIoHandler>(
    engine: Arc<SocketIo<H>>,
    kind: TransportKind,
    sid: Sid,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    B: Send + 'static,
{
    // reject unknown sessions before switching protocols
    engine.get_session(sid).ok_or(Error::UnknownSession(sid))?;

    let (parts, _) = req.into_parts();
    if !parts.headers.contains_key("Sec-WebSocket-Key") {
        return hixie::new_req(engine, kind, sid, parts);
    }

    let ws_key = parts
        .headers
        .get("Sec-WebSocket-Key")
        .ok_or(Error::HttpErrorResponse(StatusCode::BAD_REQUEST))?
        .clone();

    let req = Request::from_parts(parts, ());
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(conn) => {
                if let Err(_e) = on_init(engine, conn, kind, sid).await {
                    tracing::debug!(?sid, "ws closed with error: {_e:?}");
                }
            }
            Err(_e) => tracing::debug!(?sid, "ws upgrade error: {_e}"),
        }
    });

    Ok(ws_response(&ws_key)?)
}

/// Attach a freshly upgraded streaming connection to its session. Shared
/// between the Hybi and Hixie paths.
pub(super) fn attach<H: SocketIoHandler>(
    engine: &Arc<SocketIo<H>>,
    kind: TransportKind,
    sid: Sid,
) -> Result<Arc<Session>, Error> {
    let session = engine.get_session(sid).ok_or(Error::UnknownSession(sid))?;
    match session.transport_kind() {
        // a second socket on a live streaming session is not an upgrade;
        // replacing a dropped one within the close window is
        Some(bound) if bound.is_streaming() => {
            if session.state() != SessionState::Disconnecting {
                return Err(Error::UpgradeError);
            }
        }
        Some(_polling) => {
            // wake any parked poll so it completes and releases the channel
            session.send(Packet::noop()).ok();
            tracing::debug!(?sid, "upgrading session from polling");
        }
        None => {}
    }
    engine.bind_transport(&session, kind)?;
    Ok(session)
}

/// The streaming connection ended: either finish an in-progress disconnect
/// or open the close window for a reconnect.
pub(super) fn teardown<H: SocketIoHandler>(engine: &Arc<SocketIo<H>>, session: &Arc<Session>) {
    if session.state() >= SessionState::Disconnecting {
        engine.close_session(session.sid, crate::session::DisconnectReason::TransportClose);
    } else {
        session.transport_dropped();
    }
}

/// Drive a Hybi websocket connection until it ends.
async fn on_init<H: SocketIoHandler, S>(
    engine: Arc<SocketIo<H>>,
    conn: S,
    kind: TransportKind,
    sid: Sid,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = WebSocketStream::from_raw_socket(conn, Role::Server, None).await;
    let session = attach(&engine, kind, sid)?;
    let (tx, rx) = ws.split();
    let write_handle = forward_to_ws(session.clone(), tx);

    match forward_to_handler(&engine, rx, &session).await {
        // a clean end or a connection fault both open the close window; only
        // unparseable input is immediately fatal
        Ok(()) => teardown(&engine, &session),
        Err(e @ (Error::MalformedPacket | Error::ProtocolViolation(_))) => {
            tracing::debug!(?sid, "error when handling ws packet: {e:?}");
            engine.close_session(sid, crate::session::DisconnectReason::PacketParsingError);
        }
        Err(_e) => {
            tracing::debug!(?sid, "ws transport fault: {_e:?}");
            teardown(&engine, &session);
        }
    }
    write_handle.abort();
    Ok(())
}

/// Forward every inbound text frame to the session. A frame may carry a
/// single packet or a framed multi-packet payload.
async fn forward_to_handler<H: SocketIoHandler, S>(
    engine: &Arc<SocketIo<H>>,
    mut rx: SplitStream<WebSocketStream<S>>,
    session: &Arc<Session>,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some(msg) = rx.try_next().await? {
        match msg {
            Message::Text(text) => {
                for packet in payload::decode_payload(text.into())? {
                    engine.handle_packet(session, packet)?;
                }
                if session.state() == SessionState::Disconnected {
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) => {
                return Err(Error::ProtocolViolation("binary frame on a text protocol"));
            }
            // ping/pong answered by the protocol layer
            _ => {}
        }
    }
    Ok(())
}

/// Forward every outbound packet to the websocket, one text frame each.
///
/// Holds the session's channel lock for the connection lifetime; awaiting it
/// here is what drains a pending polling queue onto the socket at upgrade.
fn forward_to_ws<S>(
    session: Arc<Session>,
    mut tx: SplitSink<WebSocketStream<S>, Message>,
) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut rx = session.internal_rx.lock().await;
        while let Some(packet) = rx.recv().await {
            match packet.ptype() {
                // a Noop left over from an upgrade has no business on a
                // streaming transport
                PacketType::Noop => continue,
                // in-band close signal: tell the client, then close the frame
                PacketType::Disconnect
                    if session.state() >= SessionState::Disconnecting =>
                {
                    let text = String::from_utf8_lossy(&packet.encode()).into_owned();
                    tx.send(Message::Text(text)).await.ok();
                    tx.send(Message::Close(None)).await.ok();
                    rx.close();
                    break;
                }
                _ => {
                    let text = String::from_utf8_lossy(&packet.encode()).into_owned();
                    if let Err(_e) = tx.send(Message::Text(text)).await {
                        tracing::debug!(sid = ?session.sid, "error sending ws frame: {_e}");
                        break;
                    }
                }
            }
        }
    })
}
