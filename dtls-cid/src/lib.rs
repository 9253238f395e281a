//! DTLS listeners with Connection ID routing (RFC 9146)
//!
//! A [`Listener`] accepts DTLS sessions over a [`PacketListener`], typically the UDP connection
//! table from [`udp`]. When a [`ConnectionIdGenerator`] is configured, the connection IDs granted
//! during each handshake are learned from the outgoing ServerHello, and inbound records carrying
//! one are routed to their session no matter which address they arrive from.
//!
//! The handshake itself is performed by an external engine plugged in through [`Handshaker`].

#[cfg(feature = "runtime-tokio")]
macro_rules! ready {
    ($e:expr $(,)?) => {
        match $e {
            std::task::Poll::Ready(t) => t,
            std::task::Poll::Pending => return std::task::Poll::Pending,
        }
    };
}


/// 3.
mod handshake;
/// 2.
mod listener;
/// 4.
pub mod net;

pub use udp;

pub use proto::{
    Config, ConfigError, ConnectionId, ConnectionIdGenerator, OnlySendConnectionIdGenerator,
    RandomConnectionIdGenerator, RoutingKey, MAX_CID_SIZE,
};
pub use udp::{PacketConn, PacketConnExt, PacketListener, PacketListenerExt};

pub use crate::handshake::{HandshakeError, HandshakeFuture, Handshaker};
pub use crate::listener::{listen, listen_config, AcceptError, ListenError, Listener};
