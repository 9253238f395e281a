use std::{fmt, net::SocketAddr, ops};

use bytes::{Buf, BufMut};

use crate::MAX_CID_SIZE;

/// Protocol-level identifier for a connection.
///
/// Carried in the header of `tls12_cid` records so the receiver can associate a datagram with a
/// session independently of the sender's address. Absence of a connection ID is expressed as
/// `Option<ConnectionId>::None`; a zero-length `ConnectionId` is a distinct, meaningful value
/// ("send me nothing, but I understand the extension").
#[derive(Clone, Copy, Eq)]
pub struct ConnectionId {
    /// length of CID
    len: u8,
    /// CID in byte array
    bytes: [u8; MAX_CID_SIZE],
}

impl ConnectionId {
    /// Construct a connection ID from a slice
    ///
    /// Panics if `bytes` is longer than [`MAX_CID_SIZE`](crate::MAX_CID_SIZE).
    pub fn new(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= MAX_CID_SIZE);
        let mut res = Self {
            len: bytes.len() as u8,
            bytes: [0; MAX_CID_SIZE],
        };
        res.bytes[..bytes.len()].copy_from_slice(bytes);
        res
    }

    /// Construct a connection ID from a slice, if it fits
    pub fn try_new(bytes: &[u8]) -> Option<Self> {
        (bytes.len() <= MAX_CID_SIZE).then(|| Self::new(bytes))
    }

    /// Constructs a CID by reading `len` bytes from a `Buf`
    ///
    /// Callers need to assure that `buf.remaining() >= len`
    pub fn from_buf(buf: &mut (impl Buf + ?Sized), len: usize) -> Self {
        debug_assert!(len <= MAX_CID_SIZE);
        let mut res = Self {
            len: len as u8,
            bytes: [0; MAX_CID_SIZE],
        };
        buf.copy_to_slice(&mut res[..len]);
        res
    }

    /// Encode the CID without a length prefix
    pub(crate) fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(self);
    }
}

impl ops::Deref for ConnectionId {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.bytes[0..self.len as usize]
    }
}

impl ops::DerefMut for ConnectionId {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[0..self.len as usize]
    }
}

// Only the live prefix takes part in comparisons, so the derives can't be used.
impl PartialEq for ConnectionId {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl std::hash::Hash for ConnectionId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}

impl PartialOrd for ConnectionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConnectionId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (**self).cmp(&**other)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.bytes[0..self.len as usize].fmt(f)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Key under which a connection table files a session
///
/// Sessions are found by the address they were first seen from unless they negotiated a
/// non-empty connection ID, in which case datagrams carrying that ID route to them from anywhere.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RoutingKey {
    /// The remote socket address of the peer
    Remote(SocketAddr),
    /// A connection ID issued by this side
    ConnectionId(ConnectionId),
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(addr) => write!(f, "remote {addr}"),
            Self::ConnectionId(cid) => write!(f, "cid {cid}"),
        }
    }
}
