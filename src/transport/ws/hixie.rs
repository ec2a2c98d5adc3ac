//! Pre-standard WebSocket handshakes: Hixie-76 (draft-76, with the two
//! key-derived MD5 challenge digest) and Hixie-75 (no keys). Both frame text
//! as `0x00 <utf8> 0xFF`, with `0xFF 0x00` as the closing handshake.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode, request::Parts};
use md5::{Digest, Md5};
use tokio::{
    io::{
        AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
        WriteHalf,
    },
    task::JoinHandle,
};

use crate::{
    body::ResponseBody,
    engine::SocketIo,
    errors::Error,
    handler::SocketIoHandler,
    packet::PacketType,
    payload,
    service::TransportKind,
    session::{Session, SessionState},
    sid::Sid,
};

const FRAME_START: u8 = 0x00;
const FRAME_END: u8 = 0xff;

/// Answer a Hixie websocket upgrade. For draft-76 the 8-byte challenge that
/// trails the request headers is read after the protocol switch and the
/// 16-byte digest is written back before any frame.
pub(super) fn new_req<B, H: SocketIoHandler>(
    engine: Arc<SocketIo<H>>,
    kind: TransportKind,
    sid: Sid,
    parts: Parts,
) -> Result<Response<ResponseBody<B>>, Error>
where
    B: Send + 'static,
{
    let header_str = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    let keys = match (
        header_str("Sec-WebSocket-Key1"),
        header_str("Sec-WebSocket-Key2"),
    ) {
        (Some(key1), Some(key2)) => Some((key1, key2)),
        (None, None) => None,
        _ => return Err(Error::HttpErrorResponse(StatusCode::BAD_REQUEST)),
    };

    let scheme = if engine.config.always_secure_ws_location {
        "wss"
    } else {
        "ws"
    };
    let host = header_str("Host").unwrap_or_else(|| "localhost".to_owned());
    let origin = header_str("Origin").unwrap_or_else(|| "*".to_owned());
    let location = format!("{scheme}://{host}{}", parts.uri.path());

    let builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::UPGRADE, HeaderValue::from_static("WebSocket"))
        .header(
            http::header::CONNECTION,
            HeaderValue::from_static("Upgrade"),
        );
    let builder = if keys.is_some() {
        builder
            .header("Sec-WebSocket-Origin", origin)
            .header("Sec-WebSocket-Location", location)
    } else {
        builder
            .header("WebSocket-Origin", origin)
            .header("WebSocket-Location", location)
    };

    let req = Request::from_parts(parts, ());
    tokio::spawn(async move {
        let mut conn = match hyper::upgrade::on(req).await {
            Ok(conn) => conn,
            Err(_e) => {
                tracing::debug!(?sid, "hixie upgrade error: {_e}");
                return;
            }
        };
        if let Some((key1, key2)) = keys {
            let mut challenge = [0u8; 8];
            let digest = match conn.read_exact(&mut challenge).await {
                Ok(_) => challenge_digest(&key1, &key2, &challenge),
                Err(e) => Err(e.into()),
            };
            let written = match digest {
                Ok(digest) => conn.write_all(&digest).await.is_ok(),
                Err(_e) => {
                    tracing::debug!(?sid, "hixie-76 challenge error: {_e:?}");
                    false
                }
            };
            if !written {
                return;
            }
        }
        if let Err(_e) = drive(engine, conn, kind, sid).await {
            tracing::debug!(?sid, "hixie connection closed with error: {_e:?}");
        }
    });

    Ok(builder.body(ResponseBody::empty_response())?)
}

/// The draft-76 challenge: each key yields the big-endian u32 of its digits
/// divided by its space count; MD5 over both followed by the 8 challenge
/// bytes is the response body.
pub fn challenge_digest(key1: &str, key2: &str, challenge: &[u8; 8]) -> Result<[u8; 16], Error> {
    fn key_number(key: &str) -> Result<u32, Error> {
        let digits: String = key.chars().filter(|c| c.is_ascii_digit()).collect();
        let spaces = key.chars().filter(|c| *c == ' ').count() as u64;
        if digits.is_empty() || spaces == 0 {
            return Err(Error::UpgradeError);
        }
        let number: u64 = digits.parse().map_err(|_| Error::UpgradeError)?;
        Ok((number / spaces) as u32)
    }

    let mut input = [0u8; 16];
    input[..4].copy_from_slice(&key_number(key1)?.to_be_bytes());
    input[4..8].copy_from_slice(&key_number(key2)?.to_be_bytes());
    input[8..].copy_from_slice(challenge);

    let mut hasher = Md5::new();
    hasher.update(input);
    Ok(hasher.finalize().into())
}

/// Drive a Hixie connection until it ends.
async fn drive<H: SocketIoHandler, S>(
    engine: Arc<SocketIo<H>>,
    conn: S,
    kind: TransportKind,
    sid: Sid,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let session = super::attach(&engine, kind, sid)?;
    let (read_half, write_half) = tokio::io::split(conn);
    let write_handle = forward_to_stream(session.clone(), write_half);

    match forward_frames(&engine, read_half, &session).await {
        Ok(()) => super::teardown(&engine, &session),
        Err(e @ (Error::MalformedPacket | Error::ProtocolViolation(_))) => {
            tracing::debug!(?sid, "error when handling hixie frame: {e:?}");
            engine.close_session(sid, crate::session::DisconnectReason::PacketParsingError);
        }
        Err(_e) => {
            tracing::debug!(?sid, "hixie transport fault: {_e:?}");
            super::teardown(&engine, &session);
        }
    }
    write_handle.abort();
    Ok(())
}

async fn forward_frames<H: SocketIoHandler, S>(
    engine: &Arc<SocketIo<H>>,
    read_half: ReadHalf<S>,
    session: &Arc<Session>,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut reader = BufReader::new(read_half);
    loop {
        let marker = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        match marker {
            FRAME_START => {
                let mut frame = Vec::new();
                reader.read_until(FRAME_END, &mut frame).await?;
                if frame.last() != Some(&FRAME_END) {
                    break; // connection ended mid-frame
                }
                frame.pop();
                for packet in payload::decode_payload(Bytes::from(frame))? {
                    engine.handle_packet(session, packet)?;
                }
                if session.state() == SessionState::Disconnected {
                    break;
                }
            }
            FRAME_END => {
                // closing handshake `FF 00`
                reader.read_u8().await.ok();
                break;
            }
            _ => return Err(Error::ProtocolViolation("unexpected hixie frame marker")),
        }
    }
    Ok(())
}

fn forward_to_stream<S>(session: Arc<Session>, mut tx: WriteHalf<S>) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let mut rx = session.internal_rx.lock().await;
        while let Some(packet) = rx.recv().await {
            match packet.ptype() {
                PacketType::Noop => continue,
                PacketType::Disconnect if session.state() >= SessionState::Disconnecting => {
                    write_frame(&mut tx, &packet.encode()).await.ok();
                    tx.write_all(&[FRAME_END, FRAME_START]).await.ok();
                    rx.close();
                    break;
                }
                _ => {
                    if let Err(_e) = write_frame(&mut tx, &packet.encode()).await {
                        tracing::debug!(sid = ?session.sid, "error writing hixie frame: {_e}");
                        break;
                    }
                }
            }
        }
    })
}

async fn write_frame<W: AsyncWrite + Unpin>(tx: &mut W, data: &[u8]) -> std::io::Result<()> {
    tx.write_all(&[FRAME_START]).await?;
    tx.write_all(data).await?;
    tx.write_all(&[FRAME_END]).await?;
    tx.flush().await
}
