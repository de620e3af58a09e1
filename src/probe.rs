//! TCP reachability checks used to decide whether the device is up.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// One-shot TCP "ping": returns true if connect succeeds within `limit`.
///
/// Name resolution counts against the same limit. Every failure, including
/// a timeout, is reported as `false`.
pub async fn probe(host: &str, port: u16, limit: Duration) -> bool {
    let online = matches!(
        timeout(limit, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    );
    debug!(host, port, online, "probe finished");
    online
}
