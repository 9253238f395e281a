use std::{
    collections::{HashMap, VecDeque},
    fmt,
    future::Future,
    io, mem,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use bytes::Bytes;
use proto::{ConnectionId, RoutingKey};
use rustc_hash::FxHashMap;
use slab::Slab;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{io::ReadBuf, net::UdpSocket};
use tracing::{debug, error, trace, Instrument, Span};

use crate::{
    conn::{ConnShared, UdpConn},
    mutex::Mutex,
    packet::{Closed, PacketConn, PacketListener},
    IO_LOOP_BOUND, RECEIVE_MTU,
};

/// Decides whether a datagram from an unknown peer may open a connection
pub type AcceptFilter = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;
/// Maps an inbound datagram and its source address to the key of the connection it belongs to
pub type ConnectionResolver = Arc<dyn Fn(&[u8], SocketAddr) -> RoutingKey + Send + Sync>;
/// Extracts the connection ID granted by an outbound datagram, if any
pub type ConnectionIdentifier = Arc<dyn Fn(&[u8]) -> Option<ConnectionId> + Send + Sync>;

/// Settings for [`UdpListener`]
///
/// Without a resolver every datagram is routed by its source address.
#[derive(Clone)]
pub struct ListenConfig {
    pub(crate) backlog: usize,
    pub(crate) receive_buffer_size: usize,
    pub(crate) accept_filter: Option<AcceptFilter>,
    pub(crate) connection_resolver: Option<ConnectionResolver>,
    pub(crate) connection_identifier: Option<ConnectionIdentifier>,
}

impl ListenConfig {
    /// Maximum number of connections waiting to be accepted
    ///
    /// Datagrams from new peers are dropped while the backlog is full.
    pub fn backlog(&mut self, value: usize) -> &mut Self {
        self.backlog = value;
        self
    }

    /// Maximum number of unread payload bytes queued per connection
    pub fn receive_buffer_size(&mut self, value: usize) -> &mut Self {
        self.receive_buffer_size = value;
        self
    }

    /// Only open connections for datagrams `filter` accepts
    pub fn accept_filter(&mut self, filter: Option<AcceptFilter>) -> &mut Self {
        self.accept_filter = filter;
        self
    }

    /// Route inbound datagrams by the key `resolver` returns
    ///
    /// Datagrams whose key matches no connection fall back to their source address.
    pub fn connection_resolver(&mut self, resolver: Option<ConnectionResolver>) -> &mut Self {
        self.connection_resolver = resolver;
        self
    }

    /// Inspect outbound datagrams with `identifier`
    ///
    /// The first non-empty connection ID it reports for a connection becomes an additional
    /// routing key for it.
    pub fn connection_identifier(
        &mut self,
        identifier: Option<ConnectionIdentifier>,
    ) -> &mut Self {
        self.connection_identifier = identifier;
        self
    }

    /// Bind a UDP socket on `addr` and start listening on it
    ///
    /// If an IPv6 address is provided, attempts to make the socket dual-stack. Must be called
    /// from within a Tokio runtime.
    pub fn listen(&self, addr: SocketAddr) -> io::Result<UdpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        if addr.is_ipv6() {
            if let Err(e) = socket.set_only_v6(false) {
                debug!(%e, "unable to make socket dual-stack");
            }
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        self.listen_on(socket.into())
    }

    /// Start listening on an already bound socket
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen_on(&self, socket: std::net::UdpSocket) -> io::Result<UdpListener> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(io::Error::new(io::ErrorKind::Other, "no async runtime found"));
        }
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;
        UdpListener::new(socket, self.clone())
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            backlog: 128,
            receive_buffer_size: 1024 * 1024,
            accept_filter: None,
            connection_resolver: None,
            connection_identifier: None,
        }
    }
}

impl fmt::Debug for ListenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenConfig")
            .field("backlog", &self.backlog)
            .field("receive_buffer_size", &self.receive_buffer_size)
            .field("accept_filter", &self.accept_filter.is_some())
            .field("connection_resolver", &self.connection_resolver.is_some())
            .field("connection_identifier", &self.connection_identifier.is_some())
            .finish()
    }
}

/// A UDP socket demultiplexed into one [`UdpConn`] per peer
///
/// A background task reads the socket and routes every datagram to its connection, creating a
/// connection (subject to the accept filter) for datagrams that match none. The socket is
/// released once the listener is closed and every connection it handed out is gone.
///
/// Dropping the listener closes it.
#[derive(Debug)]
pub struct UdpListener {
    inner: Arc<ListenerInner>,
}

impl UdpListener {
    fn new(socket: UdpSocket, config: ListenConfig) -> io::Result<Self> {
        let local_addr = socket.local_addr()?;
        let inner = Arc::new(ListenerInner {
            socket,
            local_addr,
            config,
            state: Mutex::new(State::default()),
        });
        let driver = ListenerDriver {
            inner: inner.clone(),
            recv_buf: vec![0; RECEIVE_MTU].into(),
        };
        tokio::spawn(
            async {
                if let Err(e) = driver.await {
                    error!("I/O error: {}", e);
                }
            }
            .instrument(Span::current()),
        );
        Ok(Self { inner })
    }

    /// Number of connections currently routed by this listener, accepted or not
    pub fn connection_count(&self) -> usize {
        self.inner.state.lock("connection_count").conns.len()
    }
}

impl PacketListener for UdpListener {
    fn poll_accept(
        &self,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<(Arc<dyn PacketConn>, SocketAddr)>> {
        let mut state = self.inner.state.lock("poll_accept");
        if let Some(conn) = state.backlog.pop_front() {
            let remote = conn.remote_addr();
            return Poll::Ready(Ok((Arc::new(conn), remote)));
        }
        if state.closed {
            return Poll::Ready(Err(Closed.into()));
        }
        if state.driver_lost {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "receive task stopped",
            )));
        }
        if !state.accept_wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.accept_wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    fn close(&self) -> io::Result<()> {
        Ok(self.inner.close()?)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        let _ = self.inner.close();
    }
}

pub(crate) struct ListenerInner {
    pub(crate) socket: UdpSocket,
    pub(crate) local_addr: SocketAddr,
    config: ListenConfig,
    state: Mutex<State>,
}

impl ListenerInner {
    /// Hand `datagram` to the connection it belongs to, opening one if allowed
    fn dispatch(self: &Arc<Self>, datagram: &[u8], from: SocketAddr) {
        let key = match &self.config.connection_resolver {
            Some(resolve) => resolve(datagram, from),
            None => RoutingKey::Remote(from),
        };
        let data = Bytes::copy_from_slice(datagram);
        let limit = self.config.receive_buffer_size;

        let wakers = {
            let mut state = self.state.lock("dispatch");
            let known = state
                .index
                .get(&key)
                .or_else(|| state.index.get(&RoutingKey::Remote(from)));
            if let Some(ch) = known {
                let shared = state.conns[ch.0].shared.clone();
                drop(state);
                shared.deliver(data, from, limit);
                return;
            }

            if state.closed {
                trace!(%from, "listener closed, dropping datagram");
                return;
            }
            if let Some(filter) = &self.config.accept_filter {
                if !filter(datagram) {
                    debug!(%from, len = datagram.len(), "datagram rejected by accept filter");
                    return;
                }
            }
            if state.backlog.len() >= self.config.backlog {
                debug!(%from, "accept backlog full, dropping datagram");
                return;
            }

            let shared = Arc::new(ConnShared::new());
            shared.deliver(data, from, limit);
            let ch = ConnectionHandle(state.conns.insert(ConnMeta {
                shared: shared.clone(),
                remote: from,
                cid: None,
            }));
            state.index.addrs.insert(from, ch);
            let conn = UdpConn::new(shared, self.clone(), ch, from);
            state.backlog.push_back(conn);
            debug!(%from, handle = ch.0, "new connection");
            mem::take(&mut state.accept_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Run the connection identifier over an outbound datagram
    ///
    /// A connection's ID is set at most once; later, different IDs are ignored.
    pub(crate) fn identify(&self, ch: ConnectionHandle, datagram: &[u8]) {
        let Some(identify) = &self.config.connection_identifier else {
            return;
        };
        let cid = match identify(datagram) {
            Some(cid) if !cid.is_empty() => cid,
            _ => return,
        };

        let mut state = self.state.lock("identify");
        let state = &mut *state;
        let Some(meta) = state.conns.get_mut(ch.0) else {
            return;
        };
        match meta.cid {
            None => {
                if let Some(&other) = state.index.cids.get(&cid) {
                    debug!(%cid, handle = other.0, "connection ID already routes elsewhere");
                    return;
                }
                meta.cid = Some(cid);
                state.index.cids.insert(cid, ch);
                debug!(%cid, remote = %meta.remote, "connection ID registered");
            }
            Some(existing) if existing != cid => {
                debug!(%existing, ignored = %cid, "connection ID already assigned");
            }
            Some(_) => {}
        }
    }

    /// Forget a connection
    pub(crate) fn remove(&self, ch: ConnectionHandle) {
        let driver = {
            let mut state = self.state.lock("remove");
            let Some(meta) = state.conns.try_remove(ch.0) else {
                return;
            };
            state.index.remove(ch, &meta);
            match state.closed && state.conns.is_empty() {
                true => state.driver.take(),
                false => None,
            }
        };
        if let Some(driver) = driver {
            driver.wake();
        }
    }

    fn close(&self) -> Result<(), Closed> {
        let (backlog, wakers, driver) = {
            let mut state = self.state.lock("close");
            if state.closed {
                return Err(Closed);
            }
            state.closed = true;
            (
                mem::take(&mut state.backlog),
                mem::take(&mut state.accept_wakers),
                state.driver.take(),
            )
        };
        // Unaccepted connections deregister themselves as they drop
        drop(backlog);
        for waker in wakers {
            waker.wake();
        }
        if let Some(driver) = driver {
            driver.wake();
        }
        Ok(())
    }
}

impl fmt::Debug for ListenerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerInner")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct State {
    /// Set once the listener is closed; no new connections are opened
    closed: bool,
    /// Waker of the receive task
    driver: Option<Waker>,
    /// The receive task has stopped
    driver_lost: bool,
    conns: Slab<ConnMeta>,
    index: ConnectionIndex,
    /// Connections opened but not yet accepted
    backlog: VecDeque<UdpConn>,
    accept_wakers: Vec<Waker>,
}

/// Internal identifier for a connection in a listener's table
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct ConnectionHandle(pub(crate) usize);

struct ConnMeta {
    shared: Arc<ConnShared>,
    /// Address the connection was opened from
    remote: SocketAddr,
    /// Connection ID granted to the peer, once seen on the way out
    cid: Option<ConnectionId>,
}

/// Maps datagrams to existing connections
#[derive(Default, Debug)]
struct ConnectionIndex {
    /// Identifies connections by the address they were opened from
    ///
    /// Uses a standard `HashMap` to protect against hash collision attacks.
    addrs: HashMap<SocketAddr, ConnectionHandle>,
    /// Identifies connections based on locally issued connection IDs
    ///
    /// Uses a cheaper hash function since keys are locally created
    cids: FxHashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionIndex {
    fn get(&self, key: &RoutingKey) -> Option<ConnectionHandle> {
        match key {
            RoutingKey::Remote(addr) => self.addrs.get(addr).copied(),
            RoutingKey::ConnectionId(cid) => self.cids.get(cid).copied(),
        }
    }

    fn remove(&mut self, ch: ConnectionHandle, meta: &ConnMeta) {
        if self.addrs.get(&meta.remote) == Some(&ch) {
            self.addrs.remove(&meta.remote);
        }
        if let Some(cid) = &meta.cid {
            if self.cids.get(cid) == Some(&ch) {
                self.cids.remove(cid);
            }
        }
    }
}

/// A future that reads the listener's socket and routes datagrams to connections
///
/// Terminates once the listener is closed and its last connection is gone, or on an I/O error.
#[must_use = "listener drivers must be spawned for I/O to occur"]
#[derive(Debug)]
struct ListenerDriver {
    inner: Arc<ListenerInner>,
    recv_buf: Box<[u8]>,
}

impl Future for ListenerDriver {
    type Output = Result<(), io::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        {
            let mut state = this.inner.state.lock("driver");
            if state.closed && state.conns.is_empty() {
                return Poll::Ready(Ok(()));
            }
            state.driver = Some(cx.waker().clone());
        }

        for _ in 0..IO_LOOP_BOUND {
            let mut buf = ReadBuf::new(&mut this.recv_buf);
            match this.inner.socket.poll_recv_from(cx, &mut buf) {
                Poll::Ready(Ok(from)) => this.inner.dispatch(buf.filled(), from),
                Poll::Pending => return Poll::Pending,
                // Ignore ECONNRESET, it reports an earlier send to an unreachable peer
                Poll::Ready(Err(ref e)) if e.kind() == io::ErrorKind::ConnectionReset => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            }
        }

        // More datagrams may be waiting; yield so other tasks get to run first.
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

impl Drop for ListenerDriver {
    fn drop(&mut self) {
        let (conns, wakers) = {
            let mut state = self.inner.state.lock("driver drop");
            state.driver_lost = true;
            let conns = state
                .conns
                .iter()
                .map(|(_, meta)| meta.shared.clone())
                .collect::<Vec<_>>();
            (conns, mem::take(&mut state.accept_wakers))
        };
        // Nothing will be delivered any more; fail reads instead of leaving them parked.
        for conn in conns {
            let _ = conn.shutdown();
        }
        for waker in wakers {
            waker.wake();
        }
    }
}
