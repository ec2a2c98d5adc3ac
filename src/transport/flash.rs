//! Flash-socket policy channel.
//!
//! Flash clients probe a raw TCP port with `<policy-file-request/>\0` before
//! opening the actual socket; the server answers the cross-domain policy XML
//! (NUL-terminated) and closes that connection only. The socket itself then
//! speaks the websocket framing and is routed through the `ws` transport
//! under the `flashsocket` name.

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
};

pub const POLICY_REQUEST: &[u8] = b"<policy-file-request/>\0";

pub const CROSS_DOMAIN_POLICY: &str = "<?xml version=\"1.0\"?>\
<!DOCTYPE cross-domain-policy SYSTEM \"http://www.macromedia.com/xml/dtds/cross-domain-policy.dtd\">\
<cross-domain-policy><allow-access-from domain=\"*\" to-ports=\"*\" /></cross-domain-policy>\0";

/// Accept loop for the policy channel (conventionally port 843). Each
/// connection is answered and closed independently.
pub async fn serve_policy(listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(_e) = handle_policy_request(stream).await {
                tracing::debug!("policy request error: {_e}");
            }
        });
    }
}

/// Answer one policy probe: reply with the policy XML if and only if the
/// peer sent the literal request, then close.
pub async fn handle_policy_request<S>(mut stream: S) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; POLICY_REQUEST.len()];
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        // bail out as soon as the bytes stop matching
        if buf[..filled] != POLICY_REQUEST[..filled] {
            break;
        }
    }

    if buf[..filled] == *POLICY_REQUEST {
        stream.write_all(CROSS_DOMAIN_POLICY.as_bytes()).await?;
        stream.flush().await?;
    }
    stream.shutdown().await
}
