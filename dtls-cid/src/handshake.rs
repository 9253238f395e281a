use std::{future::Future, net::SocketAddr, pin::Pin, sync::Arc};

use proto::Config;
use udp::PacketConn;

/// Error reported by a handshake engine
pub type HandshakeError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`Handshaker::accept`]
pub type HandshakeFuture<S> = Pin<Box<dyn Future<Output = Result<S, HandshakeError>> + Send>>;

/// The server side of a DTLS handshake engine
///
/// The engine owns record protection, retransmission and the handshake state machine; the
/// listener only hands it a connection to a new peer. Connection ID negotiation is the engine's
/// part too: it asks the configured generator for the ID to offer, sends that in its ServerHello,
/// and from then on reads inbound `tls12_cid` records with a connection ID of
/// [`Config::cid_len`] bytes. The listener learns the granted ID by watching the ServerHello go
/// out, so no further coordination is needed.
pub trait Handshaker: Send + Sync + 'static {
    /// An established session
    type Session: Send + 'static;

    /// Run the handshake with the peer at `remote` over `conn`
    ///
    /// Dropping `conn` (with the returned future, on failure) removes the peer from the
    /// listener's connection table.
    fn accept(
        &self,
        conn: Arc<dyn PacketConn>,
        remote: SocketAddr,
        config: Arc<Config>,
    ) -> HandshakeFuture<Self::Session>;
}
