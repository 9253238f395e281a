use std::{
    fmt,
    future::Future,
    io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use thiserror::Error;
use tokio::time::Instant;

/// A listener handing out one packet-oriented connection per peer
///
/// All methods take `&self`; a listener may be shared between any number of tasks, each of which
/// may be accepting at the same time.
pub trait PacketListener: Send + Sync + fmt::Debug {
    /// Poll for the next connection, along with the address of the peer that opened it
    ///
    /// Once the listener is closed this fails with [`io::ErrorKind::NotConnected`].
    fn poll_accept(
        &self,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<(Arc<dyn PacketConn>, SocketAddr)>>;

    /// Stop accepting connections
    ///
    /// Parked and future accepts fail. Connections handed out earlier are unaffected.
    fn close(&self) -> io::Result<()>;

    /// The local address the listener is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// A connection to a single peer which reads and writes whole datagrams
pub trait PacketConn: Send + Sync + fmt::Debug {
    /// Poll for the next datagram, copying it into `buf`
    ///
    /// Returns the number of bytes read and the address the datagram came from. Datagrams longer
    /// than `buf` are truncated.
    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>>;

    /// Poll for sending `buf` as one datagram to `target`
    fn poll_send_to(
        &self,
        cx: &mut Context<'_>,
        buf: &[u8],
        target: SocketAddr,
    ) -> Poll<io::Result<usize>>;

    /// Close the connection, failing parked reads
    fn close(&self) -> io::Result<()>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Fail reads with [`io::ErrorKind::TimedOut`] from `deadline` on; `None` clears it
    ///
    /// A datagram that is already queued is still returned.
    fn set_read_deadline(&self, deadline: Option<Instant>);

    /// Fail writes with [`io::ErrorKind::TimedOut`] from `deadline` on; `None` clears it
    fn set_write_deadline(&self, deadline: Option<Instant>);

    /// Set both the read and the write deadline
    fn set_deadline(&self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }
}

/// Async conveniences for [`PacketListener`]
pub trait PacketListenerExt: PacketListener {
    /// Wait for the next connection
    fn accept(&self) -> Accept<'_, Self> {
        Accept { listener: self }
    }
}

impl<T: PacketListener + ?Sized> PacketListenerExt for T {}

/// Async conveniences for [`PacketConn`]
pub trait PacketConnExt: PacketConn {
    /// Wait for the next datagram
    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> RecvFrom<'a, Self> {
        RecvFrom { conn: self, buf }
    }

    /// Send one datagram
    fn send_to<'a>(&'a self, buf: &'a [u8], target: SocketAddr) -> SendTo<'a, Self> {
        SendTo {
            conn: self,
            buf,
            target,
        }
    }
}

impl<T: PacketConn + ?Sized> PacketConnExt for T {}

/// Future produced by [`PacketListenerExt::accept`]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Accept<'a, L: ?Sized> {
    listener: &'a L,
}

impl<L: PacketListener + ?Sized> Future for Accept<'_, L> {
    type Output = io::Result<(Arc<dyn PacketConn>, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.listener.poll_accept(cx)
    }
}

/// Future produced by [`PacketConnExt::recv_from`]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct RecvFrom<'a, C: ?Sized> {
    conn: &'a C,
    buf: &'a mut [u8],
}

impl<C: PacketConn + ?Sized> Future for RecvFrom<'_, C> {
    type Output = io::Result<(usize, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.conn.poll_recv_from(cx, this.buf)
    }
}

/// Future produced by [`PacketConnExt::send_to`]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SendTo<'a, C: ?Sized> {
    conn: &'a C,
    buf: &'a [u8],
    target: SocketAddr,
}

impl<C: PacketConn + ?Sized> Future for SendTo<'_, C> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.conn.poll_send_to(cx, self.buf, self.target)
    }
}

/// The listener or connection has been closed
///
/// Carried as the source of [`io::ErrorKind::NotConnected`] errors.
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
#[error("use of closed network connection")]
pub struct Closed;

impl From<Closed> for io::Error {
    fn from(x: Closed) -> Self {
        Self::new(io::ErrorKind::NotConnected, x)
    }
}
