use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use wakedeck::probe::probe;

#[tokio::test]
async fn closed_port_is_offline() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind listener");
        listener.local_addr().expect("local addr").port()
    };

    assert!(!probe("127.0.0.1", port, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn open_port_is_online() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let port = listener.local_addr().expect("local addr").port();

    assert!(probe("127.0.0.1", port, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn unroutable_host_returns_within_timeout() {
    // TEST-NET-1, never routed; the connect either hangs or fails fast.
    let started = Instant::now();
    let online = probe("192.0.2.1", 9, Duration::from_millis(300)).await;
    assert!(!online);
    assert!(started.elapsed() < Duration::from_secs(2));
}
