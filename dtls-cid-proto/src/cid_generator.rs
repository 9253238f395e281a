use rand::{rngs::OsRng, RngCore};

use crate::shared::ConnectionId;
use crate::MAX_CID_SIZE;

/// Generates the connection IDs a server offers its peers
///
/// A generator is invoked once per new session, from whichever task runs that session's
/// handshake, so implementations must be usable concurrently without external locking.
pub trait ConnectionIdGenerator: Send + Sync {
    /// Generates a new CID
    ///
    /// `None` means the local side requests no connection ID at all: the extension is still sent
    /// so the peer may hand out an ID of its own, but records towards us never carry one.
    ///
    /// Connection IDs MUST NOT contain any information that can be used by
    /// an external observer (that is, one that does not cooperate with the
    /// issuer) to correlate them with other connection IDs for the same
    /// connection.
    fn generate_cid(&self) -> Option<ConnectionId>;
    /// Returns the length of the CIDs inbound `tls12_cid` records carry for connections created by
    /// this generator
    fn cid_len(&self) -> usize;
}

/// Generates purely random connection IDs of a certain length
#[derive(Debug, Clone, Copy)]
pub struct RandomConnectionIdGenerator {
    cid_len: usize,
}

impl Default for RandomConnectionIdGenerator {
    fn default() -> Self {
        Self { cid_len: 8 }
    }
}

impl RandomConnectionIdGenerator {
    /// Initialize Random CID generator with a fixed CID length
    ///
    /// A length of zero produces empty, but present, connection IDs.
    ///
    /// Panics if the given length is greater than [`MAX_CID_SIZE`](crate::MAX_CID_SIZE).
    pub fn new(cid_len: usize) -> Self {
        assert!(cid_len <= MAX_CID_SIZE, "connection ID too long");
        Self { cid_len }
    }
}

impl ConnectionIdGenerator for RandomConnectionIdGenerator {
    /// Panics if the operating system cannot supply entropy; there is no safe fallback value.
    fn generate_cid(&self) -> Option<ConnectionId> {
        let mut bytes_arr = [0; MAX_CID_SIZE];
        if let Err(e) = OsRng.try_fill_bytes(&mut bytes_arr[..self.cid_len]) {
            panic!("failed to generate connection ID: {e}");
        }

        Some(ConnectionId::new(&bytes_arr[..self.cid_len]))
    }

    fn cid_len(&self) -> usize {
        self.cid_len
    }
}

/// Never requests a connection ID from the peer
///
/// The local side still honors an ID the peer grants it for outbound records.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnlySendConnectionIdGenerator;

impl ConnectionIdGenerator for OnlySendConnectionIdGenerator {
    fn generate_cid(&self) -> Option<ConnectionId> {
        None
    }

    fn cid_len(&self) -> usize {
        0
    }
}
