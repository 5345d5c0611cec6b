//! TCP transport to a router.

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::ClientError;

/// Connect to `host:port`, giving up after `timeout`
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ClientError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ClientError::Timeout(timeout))??;

    // Frames are flushed one at a time; don't let Nagle hold them back.
    stream.set_nodelay(true)?;
    debug!("TCP connection established to {}:{}", host, port);
    Ok(stream)
}
