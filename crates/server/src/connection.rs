//! Accepted client connections
//!
//! Graceful transport shutdown waits for every connection to finish, and a
//! client that stops reading keeps its connection alive indefinitely. Each
//! accepted socket is therefore wrapped so the server can sever it: once the
//! disconnect signal is set, every pending or later read and write fails and
//! the connection task exits.

use crate::lifecycle::ShutdownSignal;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::{Stream, StreamExt};
use tonic::transport::server::{Connected, TcpConnectInfo};

/// Accept connections from `listener`, each bound to `disconnect`
pub fn incoming(
    listener: TcpListener,
    disconnect: Arc<ShutdownSignal>,
) -> impl Stream<Item = io::Result<SeverableStream>> {
    TcpListenerStream::new(listener)
        .map(move |conn| conn.map(|stream| SeverableStream::new(stream, disconnect.clone())))
}

/// TCP stream that fails all I/O once its disconnect signal is set
pub struct SeverableStream {
    inner: TcpStream,
    severed: Pin<Box<dyn Future<Output = ()> + Send>>,
    is_severed: bool,
}

impl SeverableStream {
    pub fn new(inner: TcpStream, disconnect: Arc<ShutdownSignal>) -> Self {
        Self {
            inner,
            severed: Box::pin(async move { disconnect.wait().await }),
            is_severed: false,
        }
    }

    /// Registers the task for wakeup when not yet severed
    fn poll_severed(&mut self, cx: &mut Context<'_>) -> bool {
        if !self.is_severed && self.severed.as_mut().poll(cx).is_ready() {
            self.is_severed = true;
        }
        self.is_severed
    }
}

fn severed() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed by server shutdown")
}

impl AsyncRead for SeverableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_severed(cx) {
            return Poll::Ready(Err(severed()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SeverableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.poll_severed(cx) {
            return Poll::Ready(Err(severed()));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.poll_severed(cx) {
            return Poll::Ready(Err(severed()));
        }
        Pin::new(&mut this.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_severed(cx) {
            return Poll::Ready(Err(severed()));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl Connected for SeverableStream {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.inner.connect_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    async fn pair(disconnect: Arc<ShutdownSignal>) -> (SeverableStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut accepted = incoming(listener, disconnect);

        let client = TcpStream::connect(addr).await.unwrap();
        let server = accepted.next().await.unwrap().unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_passes_data_through() {
        let (mut server, mut client) = pair(Arc::new(ShutdownSignal::new())).await;

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_disconnect_wakes_pending_read() {
        let disconnect = Arc::new(ShutdownSignal::new());
        let (mut server, mut client) = pair(disconnect.clone()).await;

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            server.read(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        disconnect.trigger();

        let err = timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);

        // Server side dropped: the peer sees the connection close
        let mut buf = [0u8; 8];
        let read = timeout(Duration::from_secs(1), client.read(&mut buf)).await.unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_writes_fail_after_disconnect() {
        let disconnect = Arc::new(ShutdownSignal::new());
        let (mut server, _client) = pair(disconnect.clone()).await;

        disconnect.trigger();

        let err = server.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }
}
