use crate::*;

use latmesh_core::wire::MAX_LINE_LEN;
use latmesh_services::PingError;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Both roles read exactly the other's line.
#[tokio::test]
async fn test_exchange_is_symmetric() {
    let server_addr = spawn_ping_server("ams", Arc::new(FixedRtt(700)))
        .await
        .unwrap();

    let client = pinger(LOCAL, Arc::new(FixedRtt(1523)));
    let outcome = client.ping(&server_addr.to_string()).await.unwrap();

    assert_eq!(outcome.peer_region, "ams");
    assert_eq!(outcome.rtt_us, 1523);
}

/// The server's side of the exchange, observed from a raw socket.
#[tokio::test]
async fn test_server_sends_own_line_and_accepts_crlf() {
    let server_addr = spawn_ping_server("ams", Arc::new(FixedRtt(1)))
        .await
        .unwrap();

    let mut stream = TcpStream::connect(server_addr).await.unwrap();
    stream.write_all(b"iad\r\n").await.unwrap();

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "ams\n");
}

/// A client talking to something that never answers gives up on time.
#[tokio::test]
async fn test_client_times_out_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let client = Pinger::new(
        LOCAL,
        Arc::new(FixedRtt(1)),
        Duration::from_secs(1),
        Duration::from_millis(200),
    );
    let started = std::time::Instant::now();
    let result = client.ping(&addr.to_string()).await;

    assert!(matches!(result, Err(PingError::HandshakeTimeout)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// An over-long identifier is a protocol error, not a silent truncation.
#[tokio::test]
async fn test_oversized_line_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut line = "x".repeat(MAX_LINE_LEN + 10);
        line.push('\n');
        let _ = stream.write_all(line.as_bytes()).await;
        let mut reader = BufReader::new(stream);
        let mut sink = String::new();
        let _ = reader.read_line(&mut sink).await;
    });

    let client = pinger(LOCAL, Arc::new(FixedRtt(1)));
    let result = client.ping(&addr.to_string()).await;
    assert!(matches!(
        result,
        Err(PingError::Wire(latmesh_core::wire::WireError::TooLong))
    ));
}

/// On Linux the kernel reports an RTT for a live loopback connection.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_kernel_rtt_on_loopback() {
    let probe = latmesh_core::platform_probe();
    assert!(probe.is_supported());

    let server_addr = spawn_ping_server("ams", probe.clone()).await.unwrap();
    let client = pinger(LOCAL, probe);
    let outcome = client.ping(&server_addr.to_string()).await.unwrap();

    assert_eq!(outcome.peer_region, "ams");
    // Loopback RTT is tiny; anything near a second means a timer leaked in.
    assert!(outcome.rtt_us < 1_000_000);
}
