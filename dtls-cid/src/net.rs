//! Packet-oriented views of stream transports
//!
//! A [`Listener`](crate::Listener) consumes a [`PacketListener`]. [`StreamPacketListener`] turns
//! a stream listener such as Tokio's `TcpListener` into one: every accepted stream becomes a
//! [`StreamPacketConn`] whose reads report the stream's peer and whose writes ignore the target.
//! Record framing is the same as over UDP, so a read may return several records or part of one.

use std::{
    fmt, io, mem,
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use tokio::time::Instant;
use udp::{timed_out, Closed, Deadline, Mutex, PacketConn, PacketListener};

/// A listener accepting byte streams
pub trait StreamListener: Send + Sync + 'static {
    /// The accepted stream type
    type Stream: StreamConn;

    /// Poll for the next stream and its peer's address
    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(Self::Stream, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// A connected byte stream usable through a shared reference
pub trait StreamConn: Send + Sync + 'static {
    fn poll_read(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>>;

    fn poll_write(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

#[cfg(feature = "runtime-tokio")]
impl StreamListener for tokio::net::TcpListener {
    type Stream = tokio::net::TcpStream;

    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(Self::Stream, SocketAddr)>> {
        Self::poll_accept(self, cx)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Self::local_addr(self)
    }
}

#[cfg(feature = "runtime-tokio")]
impl StreamConn for tokio::net::TcpStream {
    fn poll_read(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.poll_read_ready(cx))?;
            match self.try_read(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                res => return Poll::Ready(res),
            }
        }
    }

    fn poll_write(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.poll_write_ready(cx))?;
            match self.try_write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                res => return Poll::Ready(res),
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Self::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Self::peer_addr(self)
    }
}

/// A [`PacketListener`] over a [`StreamListener`]
pub struct StreamPacketListener<L> {
    local_addr: SocketAddr,
    state: Mutex<ListenerState<L>>,
}

struct ListenerState<L> {
    /// `None` once closed
    listener: Option<L>,
    /// Tasks parked in `poll_accept`
    ///
    /// The inner listener only wakes the most recent poller; everyone else is woken from here.
    wakers: Vec<Waker>,
}

impl<L: StreamListener> StreamPacketListener<L> {
    pub fn new(listener: L) -> io::Result<Self> {
        Ok(Self {
            local_addr: listener.local_addr()?,
            state: Mutex::new(ListenerState {
                listener: Some(listener),
                wakers: Vec::new(),
            }),
        })
    }
}

impl<L: StreamListener> PacketListener for StreamPacketListener<L> {
    fn poll_accept(
        &self,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<(Arc<dyn PacketConn>, SocketAddr)>> {
        let mut state = self.state.lock("poll_accept");
        let Some(listener) = &state.listener else {
            return Poll::Ready(Err(Closed.into()));
        };
        let res = match listener.poll_accept(cx) {
            Poll::Ready(res) => res,
            Poll::Pending => {
                park(&mut state.wakers, cx);
                return Poll::Pending;
            }
        };

        let wakers = mem::take(&mut state.wakers);
        drop(state);
        for waker in wakers {
            waker.wake();
        }
        Poll::Ready(res.and_then(|(stream, remote)| {
            let conn = StreamPacketConn::with_peer(stream, remote)?;
            Ok((Arc::new(conn) as Arc<dyn PacketConn>, remote))
        }))
    }

    fn close(&self) -> io::Result<()> {
        let (listener, wakers) = {
            let mut state = self.state.lock("close");
            (state.listener.take(), mem::take(&mut state.wakers))
        };
        if listener.is_none() {
            return Err(Closed.into());
        }
        drop(listener);
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

impl<L> fmt::Debug for StreamPacketListener<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPacketListener")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

/// A [`PacketConn`] over a [`StreamConn`]
///
/// Every read reports the stream's peer as the source; writes go to the peer whatever the
/// target.
pub struct StreamPacketConn<S> {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    state: Mutex<ConnState<S>>,
}

struct ConnState<S> {
    /// `None` once closed
    stream: Option<S>,
    read_wakers: Vec<Waker>,
    write_wakers: Vec<Waker>,
    read_deadline: Deadline,
    write_deadline: Deadline,
}

impl<S: StreamConn> StreamPacketConn<S> {
    pub fn new(stream: S) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Self::with_peer(stream, peer)
    }

    fn with_peer(stream: S, peer_addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            local_addr: stream.local_addr()?,
            peer_addr,
            state: Mutex::new(ConnState {
                stream: Some(stream),
                read_wakers: Vec::new(),
                write_wakers: Vec::new(),
                read_deadline: Deadline::default(),
                write_deadline: Deadline::default(),
            }),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl<S: StreamConn> PacketConn for StreamPacketConn<S> {
    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>> {
        let mut state = self.state.lock("poll_recv_from");
        let state = &mut *state;
        let Some(stream) = &state.stream else {
            return Poll::Ready(Err(Closed.into()));
        };
        if state.read_deadline.poll_expired(cx) {
            // The timer only wakes its last poller
            wake_all(&mut state.read_wakers);
            return Poll::Ready(Err(timed_out()));
        }
        let n = match stream.poll_read(cx, buf) {
            Poll::Ready(Ok(n)) => n,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => {
                park(&mut state.read_wakers, cx);
                return Poll::Pending;
            }
        };
        wake_all(&mut state.read_wakers);
        if n == 0 && !buf.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed by peer",
            )));
        }
        Poll::Ready(Ok((n, self.peer_addr)))
    }

    fn poll_send_to(
        &self,
        cx: &mut Context<'_>,
        buf: &[u8],
        _target: SocketAddr,
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock("poll_send_to");
        let state = &mut *state;
        let Some(stream) = &state.stream else {
            return Poll::Ready(Err(Closed.into()));
        };
        if state.write_deadline.poll_expired(cx) {
            wake_all(&mut state.write_wakers);
            return Poll::Ready(Err(timed_out()));
        }
        let res = match stream.poll_write(cx, buf) {
            Poll::Ready(res) => res,
            Poll::Pending => {
                park(&mut state.write_wakers, cx);
                return Poll::Pending;
            }
        };
        wake_all(&mut state.write_wakers);
        Poll::Ready(res)
    }

    fn close(&self) -> io::Result<()> {
        let (stream, read_wakers, write_wakers) = {
            let mut state = self.state.lock("close");
            (
                state.stream.take(),
                mem::take(&mut state.read_wakers),
                mem::take(&mut state.write_wakers),
            )
        };
        if stream.is_none() {
            return Err(Closed.into());
        }
        drop(stream);
        for waker in read_wakers.into_iter().chain(write_wakers) {
            waker.wake();
        }
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        let wakers = {
            let mut state = self.state.lock("set_read_deadline");
            state.read_deadline.set(deadline);
            mem::take(&mut state.read_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) {
        let wakers = {
            let mut state = self.state.lock("set_write_deadline");
            state.write_deadline.set(deadline);
            mem::take(&mut state.write_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<S> fmt::Debug for StreamPacketConn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPacketConn")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

fn park(wakers: &mut Vec<Waker>, cx: &Context<'_>) {
    if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
        wakers.push(cx.waker().clone());
    }
}

fn wake_all(wakers: &mut Vec<Waker>) {
    for waker in wakers.drain(..) {
        waker.wake();
    }
}
