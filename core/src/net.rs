//! Local port probing.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use crate::error::{ForwardError, Result};

/// How long a single connect probe may take before the port counts as free.
const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Returns true if something is accepting connections on the local port.
pub async fn is_port_open(port: u16) -> bool {
    matches!(
        timeout(PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

/// Polls until nothing is listening on the local port.
///
/// Resolves as soon as a probe finds the port free and fails with
/// `PortNotReleased` once `wait_timeout` elapses. A resolved wait does not
/// guarantee the OS socket is reusable beyond that bound.
pub async fn wait_until_free(
    port: u16,
    poll_interval: Duration,
    wait_timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        if !is_port_open(port).await {
            return Ok(());
        }
        if start.elapsed() >= wait_timeout {
            return Err(ForwardError::PortNotReleased {
                port,
                waited_ms: wait_timeout.as_millis() as u64,
            });
        }
        sleep(poll_interval).await;
    }
}
