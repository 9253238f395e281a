//! Connection ID routing for DTLS 1.2 (RFC 9146)
//!
//! This crate contains the I/O-free parts of the routing layer: the connection ID type and its
//! generators, codecs for the record header, the handshake messages and the Connection ID
//! extension, and the two functions which extract routing information from inbound datagrams and
//! outbound server flights. The socket layer lives in `dtls-cid-udp`.

#[cfg(test)]
mod tests;

pub mod coding;

// generating connection IDs
mod cid_generator;
pub use crate::cid_generator::{
    ConnectionIdGenerator, OnlySendConnectionIdGenerator, RandomConnectionIdGenerator,
};

mod config;
pub use crate::config::{Config, ConfigError};

mod datagram;
pub use crate::datagram::unpack_datagram;

pub mod extension;
pub use crate::extension::{ConnectionIdExtension, ExtensionDecodeError};

pub mod handshake;
pub use crate::handshake::HandshakeDecodeError;

pub mod record;
pub use crate::record::{ContentType, ProtocolVersion, RecordDecodeError, RecordHeader};

mod routing;
pub use crate::routing::{
    identify_connection_id, is_handshake_datagram, resolve_connection_id, resolve_routing_key,
};

mod shared;
pub use crate::shared::{ConnectionId, RoutingKey};

/// Largest connection ID the extension's one-byte length prefix can describe
pub const MAX_CID_SIZE: usize = 255;
/// Size of a record header without a connection ID
pub const RECORD_HEADER_SIZE: usize = 13;
/// Size of a handshake message header
pub const HANDSHAKE_HEADER_SIZE: usize = 12;
