//! TCP transport for devices reachable over the network.

use std::io;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a TCP connection with Nagle disabled.
///
/// Frames are small and latency-sensitive, so every write goes out
/// immediately.
///
/// # Errors
///
/// `LinkError::Io` with `ErrorKind::TimedOut` if the connection is not
/// established within `timeout`, or the underlying connect error.
pub async fn connect_tcp<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(connected) => connected?,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", timeout),
            )
            .into())
        }
    };

    stream.set_nodelay(true)?;
    if let Ok(peer) = stream.peer_addr() {
        tracing::debug!("Connected to {}", peer);
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_sets_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let stream = connect_tcp(addr, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        let _peer = accept.await.unwrap();

        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connected_stream_carries_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            peer.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = connect_tcp(addr, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        stream.write_all(&[0x7E, 0x02, 0x7F]).await.unwrap();

        assert_eq!(accept.await.unwrap(), [0x7E, 0x02, 0x7F]);
    }

    #[tokio::test]
    async fn test_refused_connection_is_io_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let err = connect_tcp(addr, DEFAULT_CONNECT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, LinkError::Io(_)));
    }
}
