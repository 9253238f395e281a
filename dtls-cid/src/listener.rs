use std::{fmt, io, net::SocketAddr, sync::Arc};

use proto::{Config, ConfigError};
use thiserror::Error;
use tracing::{debug, trace};
use udp::{ListenConfig, PacketListener, PacketListenerExt};

use crate::handshake::{HandshakeError, Handshaker};

/// Bind a UDP socket on `addr` and accept DTLS sessions on it
///
/// Datagrams from unknown peers only open a connection if they start with a handshake record.
/// With a connection ID generator configured, inbound `tls12_cid` records are routed by their
/// connection ID and the IDs granted in outgoing ServerHellos are registered for routing.
///
/// Must be called from within a Tokio runtime.
pub fn listen<H: Handshaker>(
    addr: SocketAddr,
    config: Config,
    handshaker: H,
) -> Result<Listener<H>, ListenError> {
    config.validate()?;
    let inner = listen_config(&config).listen(addr)?;
    debug!(local = %inner.local_addr()?, cid_len = ?config.cid_len(), "listening");
    Listener::new(inner, config, handshaker)
}

/// The connection table settings [`listen`] uses for `config`
///
/// Useful to listen on a socket set up by the caller, with [`ListenConfig::listen_on`].
pub fn listen_config(config: &Config) -> ListenConfig {
    let mut lc = ListenConfig::default();
    lc.accept_filter(Some(Arc::new(proto::is_handshake_datagram)));
    // Routing by connection ID only makes sense if we hand out IDs
    if let Some(cid_len) = config.cid_len() {
        lc.connection_resolver(Some(Arc::new(move |datagram: &[u8], remote: SocketAddr| {
            proto::resolve_routing_key(datagram, remote, cid_len)
        })))
        .connection_identifier(Some(Arc::new(proto::identify_connection_id)));
    }
    lc
}

/// A DTLS listener
///
/// Accepts connections from an inner [`PacketListener`] and runs the handshake on each.
pub struct Listener<H: Handshaker> {
    inner: Box<dyn PacketListener>,
    config: Arc<Config>,
    handshaker: H,
}

impl<H: Handshaker> Listener<H> {
    /// Accept DTLS sessions from connections of `inner`
    ///
    /// `inner` is used as is; routing by connection ID is up to it.
    pub fn new(
        inner: impl PacketListener + 'static,
        config: Config,
        handshaker: H,
    ) -> Result<Self, ListenError> {
        config.validate()?;
        Ok(Self {
            inner: Box::new(inner),
            config: Arc::new(config),
            handshaker,
        })
    }

    /// Wait for the next peer and complete a handshake with it
    ///
    /// A failed handshake only fails this call; the listener remains usable. Each call consumes
    /// one connection, so concurrent calls accept different peers.
    pub async fn accept(&self) -> Result<H::Session, AcceptError> {
        let (conn, remote) = self.inner.accept().await?;
        trace!(%remote, "starting handshake");
        match self
            .handshaker
            .accept(conn, remote, self.config.clone())
            .await
        {
            Ok(session) => {
                debug!(%remote, "handshake complete");
                Ok(session)
            }
            Err(e) => {
                debug!(%remote, "handshake failed: {e}");
                Err(AcceptError::Handshake(e))
            }
        }
    }

    /// Stop accepting sessions
    ///
    /// Pending and future [`accept`](Self::accept) calls fail. Sessions accepted earlier keep
    /// working.
    pub fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<H: Handshaker> fmt::Debug for Listener<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Errors setting up a [`Listener`]
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind: {0}")]
    Io(#[from] io::Error),
}

/// Errors from [`Listener::accept`]
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The inner listener failed, most likely because it was closed
    #[error("accept failed: {0}")]
    Io(#[from] io::Error),
    /// The handshake with the new peer failed
    #[error("handshake failed: {0}")]
    Handshake(#[source] HandshakeError),
}
