//! UDP connection table for DTLS listeners
//!
//! [`UdpListener`] reads a single UDP socket and splits the traffic into one [`UdpConn`] per
//! peer. Which connection a datagram belongs to is decided by a pluggable resolver, so peers that
//! negotiated a connection ID keep reaching their connection after changing address.
//!
//! The [`PacketListener`] and [`PacketConn`] traits describe the capability set the DTLS layer
//! consumes; the UDP listener is one implementation of them.


/// 4.
mod conn;
/// 5.
mod deadline;
/// 3.
mod listener;
/// 6.
mod mutex;
/// 2.
mod packet;

pub use proto;

pub use crate::conn::UdpConn;
pub use crate::deadline::{timed_out, Deadline};
pub use crate::listener::{
    AcceptFilter, ConnectionIdentifier, ConnectionResolver, ListenConfig, UdpListener,
};
pub use crate::mutex::{Mutex, MutexGuard};
pub use crate::packet::{
    Accept, Closed, PacketConn, PacketConnExt, PacketListener, PacketListenerExt, RecvFrom,
    SendTo,
};

/// Largest datagram the receive task reads; longer datagrams are truncated by the socket
const RECEIVE_MTU: usize = 8192;

/// Maximum number of datagrams routed before the receive task yields to other tasks
const IO_LOOP_BOUND: usize = 160;
