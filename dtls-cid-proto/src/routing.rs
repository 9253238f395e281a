//! Extraction of routing information from datagrams
//!
//! Both directions are inspected without decrypting anything: inbound datagrams are read for the
//! connection ID in their record headers, outbound server flights for the connection ID the
//! ServerHello just granted the peer. Neither function reports errors; anything that doesn't
//! parse simply yields no connection ID.

use std::net::SocketAddr;

use tracing::trace;

use crate::{
    datagram::unpack_datagram,
    extension::Extension,
    handshake::{split_message, HandshakeType, ServerHello},
    record::{ContentType, RecordHeader},
    shared::{ConnectionId, RoutingKey},
    RECORD_HEADER_SIZE,
};

/// Find the connection ID carried by an inbound datagram
///
/// `cid_len` is the width of the connection IDs this side issues. The first `tls12_cid` record
/// decides; a datagram that does not parse as a whole carries no usable ID.
pub fn resolve_connection_id(datagram: &[u8], cid_len: usize) -> Option<ConnectionId> {
    let records = match unpack_datagram(datagram, Some(cid_len)) {
        Ok(records) => records,
        Err(e) => {
            trace!("unroutable datagram: {e}");
            return None;
        }
    };

    records.into_iter().find_map(|mut record| {
        RecordHeader::decode(&mut record, Some(cid_len))
            .ok()
            .and_then(|header| header.connection_id)
    })
}

/// Choose the routing key for an inbound datagram from `remote`
///
/// Only a non-empty connection ID can tell sessions apart; everything else is routed by address.
pub fn resolve_routing_key(datagram: &[u8], remote: SocketAddr, cid_len: usize) -> RoutingKey {
    match resolve_connection_id(datagram, cid_len) {
        Some(cid) if !cid.is_empty() => RoutingKey::ConnectionId(cid),
        _ => RoutingKey::Remote(remote),
    }
}

/// Find the connection ID a server flight grants its peer
///
/// Looks at the first complete ServerHello in `datagram` and returns the value of its
/// Connection ID extension. Flights not led by a handshake record, and records that are not a
/// well-formed ServerHello, are passed over.
pub fn identify_connection_id(datagram: &[u8]) -> Option<ConnectionId> {
    let records = unpack_datagram(datagram, None).ok()?;
    if !starts_with_handshake(&records) {
        return None;
    }

    for record in records {
        let mut payload = record;
        let header = match RecordHeader::decode(&mut payload, None) {
            Ok(header) => header,
            Err(_) => continue,
        };
        if header.content_type != ContentType::HANDSHAKE {
            continue;
        }
        let (msg, body) = match split_message(payload) {
            Ok(x) => x,
            Err(e) => {
                trace!("skipping handshake record: {e}");
                continue;
            }
        };
        if msg.msg_type != HandshakeType::SERVER_HELLO {
            continue;
        }
        let hello = match ServerHello::decode(body) {
            Ok(hello) => hello,
            Err(e) => {
                trace!("skipping malformed ServerHello: {e}");
                continue;
            }
        };
        return hello.extensions.iter().find_map(|ext| match ext {
            Extension::ConnectionId(ext) => Some(ext.cid),
            _ => None,
        });
    }

    None
}

/// Whether `datagram` could open a session: its first record must be a handshake record
///
/// Used to filter datagrams from unknown peers before any state is allocated for them.
pub fn is_handshake_datagram(datagram: &[u8]) -> bool {
    match unpack_datagram(datagram, None) {
        Ok(records) => starts_with_handshake(&records),
        Err(_) => false,
    }
}

fn starts_with_handshake(records: &[&[u8]]) -> bool {
    records
        .first()
        .is_some_and(|r| r.len() >= RECORD_HEADER_SIZE && r[0] == ContentType::HANDSHAKE.0)
}
