use std::{
    collections::VecDeque,
    fmt, io, mem,
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use bytes::Bytes;
use tokio::time::Instant;
use tracing::trace;

use crate::{
    deadline::{timed_out, Deadline},
    listener::{ConnectionHandle, ListenerInner},
    mutex::Mutex,
    packet::{Closed, PacketConn},
};

/// One peer's view of a shared UDP socket
///
/// Handed out by [`UdpListener`](crate::UdpListener). Receives every datagram the listener
/// routes to this peer and sends through the listener's socket. Closing or dropping the
/// connection removes it from the listener's table.
pub struct UdpConn {
    shared: Arc<ConnShared>,
    listener: Arc<ListenerInner>,
    handle: ConnectionHandle,
    remote: SocketAddr,
}

impl UdpConn {
    pub(crate) fn new(
        shared: Arc<ConnShared>,
        listener: Arc<ListenerInner>,
        handle: ConnectionHandle,
        remote: SocketAddr,
    ) -> Self {
        Self {
            shared,
            listener,
            handle,
            remote,
        }
    }

    /// The address the peer first sent from
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn shutdown(&self) -> Result<(), Closed> {
        self.shared.shutdown()?;
        self.listener.remove(self.handle);
        Ok(())
    }
}

impl PacketConn for UdpConn {
    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<(usize, SocketAddr)>> {
        let mut state = self.shared.state.lock("poll_recv_from");
        if state.closed {
            return Poll::Ready(Err(Closed.into()));
        }
        if let Some((data, from)) = state.queue.pop_front() {
            state.buffered -= data.len();
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            return Poll::Ready(Ok((n, from)));
        }
        if state.read_deadline.poll_expired(cx) {
            // The timer only wakes its last poller; the other parked readers must see it too
            let wakers = mem::take(&mut state.read_wakers);
            drop(state);
            for waker in wakers {
                waker.wake();
            }
            return Poll::Ready(Err(timed_out()));
        }
        if !state.read_wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.read_wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    fn poll_send_to(
        &self,
        cx: &mut Context<'_>,
        buf: &[u8],
        target: SocketAddr,
    ) -> Poll<io::Result<usize>> {
        {
            let mut state = self.shared.state.lock("poll_send_to");
            if state.closed {
                return Poll::Ready(Err(Closed.into()));
            }
            if state.write_deadline.poll_expired(cx) {
                return Poll::Ready(Err(timed_out()));
            }
        }
        self.listener.identify(self.handle, buf);
        self.listener.socket.poll_send_to(cx, buf, target)
    }

    fn close(&self) -> io::Result<()> {
        Ok(self.shutdown()?)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.listener.local_addr)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        let wakers = {
            let mut state = self.shared.state.lock("set_read_deadline");
            state.read_deadline.set(deadline);
            mem::take(&mut state.read_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.shared
            .state
            .lock("set_write_deadline")
            .write_deadline
            .set(deadline);
    }
}

impl Drop for UdpConn {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl fmt::Debug for UdpConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpConn")
            .field("handle", &self.handle)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// The part of a connection the listener's receive task delivers into
#[derive(Debug)]
pub(crate) struct ConnShared {
    state: Mutex<ConnState>,
}

#[derive(Debug, Default)]
struct ConnState {
    /// Datagrams not yet read, with the address each came from
    queue: VecDeque<(Bytes, SocketAddr)>,
    /// Total payload bytes in `queue`
    buffered: usize,
    closed: bool,
    read_wakers: Vec<Waker>,
    read_deadline: Deadline,
    write_deadline: Deadline,
}

impl ConnShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ConnState::default()),
        }
    }

    /// Queue a datagram for reading, unless that would take the queue past `limit` bytes
    pub(crate) fn deliver(&self, data: Bytes, from: SocketAddr, limit: usize) {
        let wakers = {
            let mut state = self.state.lock("deliver");
            if state.closed {
                return;
            }
            if state.buffered + data.len() > limit {
                trace!(len = data.len(), %from, "receive buffer full, dropping datagram");
                return;
            }
            state.buffered += data.len();
            state.queue.push_back((data, from));
            mem::take(&mut state.read_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Mark the connection closed and fail parked reads
    ///
    /// Fails if it was closed already.
    pub(crate) fn shutdown(&self) -> Result<(), Closed> {
        let wakers = {
            let mut state = self.state.lock("shutdown");
            if state.closed {
                return Err(Closed);
            }
            state.closed = true;
            state.queue.clear();
            state.buffered = 0;
            mem::take(&mut state.read_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }
}
