//! Flash policy channel over a real TCP listener.

use socketio_legacy::transport::flash::{
    CROSS_DOMAIN_POLICY, POLICY_REQUEST, serve_policy,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[tokio::test]
async fn policy_request_gets_the_xml_and_a_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_policy(listener));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(POLICY_REQUEST).await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();

    assert_eq!(reply, CROSS_DOMAIN_POLICY.as_bytes());
    assert_eq!(reply.last(), Some(&0u8));
}

#[tokio::test]
async fn only_the_probed_connection_is_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_policy(listener));

    // first connection is answered and closed
    let mut probe = TcpStream::connect(addr).await.unwrap();
    probe.write_all(POLICY_REQUEST).await.unwrap();
    let mut reply = Vec::new();
    probe.read_to_end(&mut reply).await.unwrap();
    assert!(!reply.is_empty());

    // a second connection still gets served
    let mut probe = TcpStream::connect(addr).await.unwrap();
    probe.write_all(POLICY_REQUEST).await.unwrap();
    let mut reply = Vec::new();
    probe.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, CROSS_DOMAIN_POLICY.as_bytes());
}
