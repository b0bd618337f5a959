//! Byte pipe between a connection and a local reader/writer pair.
//!
//! Used as the ssh `ProxyCommand` when the authority resolves a target to a
//! plain address: ssh talks to our stdin/stdout, we talk to the host.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Which direction ended the bridge, with the bytes it copied or its error.
#[derive(Debug)]
pub enum BridgeEnd {
    /// The connection reached end-of-stream or failed.
    Remote(io::Result<u64>),
    /// The local input reached end-of-stream or failed.
    Local(io::Result<u64>),
}

/// Copy `conn` to `local_out` and `local_in` to `conn` until either
/// direction finishes.
///
/// Takes ownership of `conn` and drops it on return, closing it.
pub async fn bridge<C, R, W>(conn: C, mut local_in: R, mut local_out: W) -> BridgeEnd
where
    C: AsyncRead + AsyncWrite,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut conn_read, mut conn_write) = tokio::io::split(conn);

    let end = tokio::select! {
        copied = tokio::io::copy(&mut conn_read, &mut local_out) => BridgeEnd::Remote(copied),
        copied = tokio::io::copy(&mut local_in, &mut conn_write) => BridgeEnd::Local(copied),
    };

    match &end {
        BridgeEnd::Remote(result) => tracing::debug!(?result, "remote connection closed"),
        BridgeEnd::Local(result) => tracing::debug!(?result, "local input closed"),
    }
    end
}

/// Connect to `addr` and bridge it to this process's stdin and stdout.
pub async fn bridge_stdio(addr: &str) -> io::Result<BridgeEnd> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(%addr, "connected");
    Ok(bridge(stream, tokio::io::stdin(), tokio::io::stdout()).await)
}
