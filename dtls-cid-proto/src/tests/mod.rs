use std::net::SocketAddr;

use hex_literal::hex;
use tracing::info;

use crate::{
    handshake::HandshakeType,
    identify_connection_id, is_handshake_datagram,
    record::ContentType,
    resolve_connection_id, resolve_routing_key,
    shared::{ConnectionId, RoutingKey},
    unpack_datagram,
};

mod util;
use util::*;

const CID: [u8; 8] = hex!("0102030405060708");

fn remote() -> SocketAddr {
    "[::1]:5684".parse().unwrap()
}

#[test]
fn resolve_sole_cid_record() {
    let _guard = subscribe();
    let datagram = cid_record(&CID, b"ciphertext");
    assert_eq!(
        resolve_connection_id(&datagram, CID.len()),
        Some(ConnectionId::new(&CID))
    );
}

#[test]
fn resolve_without_cid_record() {
    let _guard = subscribe();
    let datagram = [
        record(ContentType::APPLICATION_DATA, None, b"data"),
        record(ContentType::ALERT, None, &[1, 0]),
    ]
    .concat();
    assert_eq!(resolve_connection_id(&datagram, CID.len()), None);
    assert_eq!(resolve_connection_id(&server_flight(None), CID.len()), None);
}

#[test]
fn resolve_first_cid_record_wins() {
    let _guard = subscribe();
    let other = hex!("a0a1a2a3a4a5a6a7");
    let datagram = [
        record(ContentType::ALERT, None, &[1, 0]),
        cid_record(&CID, b"first"),
        cid_record(&other, b"second"),
    ]
    .concat();
    assert_eq!(
        resolve_connection_id(&datagram, CID.len()),
        Some(ConnectionId::new(&CID))
    );
}

#[test]
fn resolve_malformed_is_not_found() {
    let _guard = subscribe();
    assert_eq!(resolve_connection_id(&[], CID.len()), None);

    let mut truncated = cid_record(&CID, b"ciphertext");
    truncated.pop();
    assert_eq!(resolve_connection_id(&truncated, CID.len()), None);

    // A connection ID shorter than the one this side issues can't be read back
    let short = cid_record(&CID[..4], b"ciphertext");
    info!(len = short.len(), "resolving short connection ID");
    assert_eq!(resolve_connection_id(&short, CID.len()), None);
}

#[test]
fn routing_key_selection() {
    let _guard = subscribe();
    assert_eq!(
        resolve_routing_key(&cid_record(&CID, b"x"), remote(), CID.len()),
        RoutingKey::ConnectionId(ConnectionId::new(&CID))
    );
    assert_eq!(
        resolve_routing_key(&server_flight(None), remote(), CID.len()),
        RoutingKey::Remote(remote())
    );
    // An empty connection ID is present but useless for routing
    let empty = cid_record(&[], b"x");
    assert_eq!(resolve_connection_id(&empty, 0), Some(ConnectionId::new(&[])));
    assert_eq!(
        resolve_routing_key(&empty, remote(), 0),
        RoutingKey::Remote(remote())
    );
}

#[test]
fn identify_granted_cid() {
    let _guard = subscribe();
    assert_eq!(
        identify_connection_id(&server_flight(Some(&CID))),
        Some(ConnectionId::new(&CID))
    );
    // A sole ServerHello is just as good as a full flight
    assert_eq!(
        identify_connection_id(&server_hello_record(Some(&CID))),
        Some(ConnectionId::new(&CID))
    );
}

#[test]
fn identify_empty_grant() {
    let _guard = subscribe();
    assert_eq!(
        identify_connection_id(&server_flight(Some(&[]))),
        Some(ConnectionId::new(&[]))
    );
}

#[test]
fn identify_without_extension() {
    let _guard = subscribe();
    assert_eq!(identify_connection_id(&server_flight(None)), None);
}

#[test]
fn identify_requires_leading_handshake() {
    let _guard = subscribe();
    let datagram = [
        record(ContentType::CHANGE_CIPHER_SPEC, None, &[1]),
        server_hello_record(Some(&CID)),
    ]
    .concat();
    assert_eq!(identify_connection_id(&datagram), None);
    assert_eq!(
        identify_connection_id(&record(ContentType::APPLICATION_DATA, None, b"data")),
        None
    );
    assert_eq!(identify_connection_id(&[]), None);
}

#[test]
fn identify_skips_other_messages() {
    let _guard = subscribe();
    let datagram = [
        handshake_record(HandshakeType::HELLO_VERIFY_REQUEST, &hex!("fefd 04 deadbeef")),
        // Handshake record too short to hold a message header
        record(ContentType::HANDSHAKE, None, &[2, 0, 0]),
        // ServerHello whose body is cut short
        handshake_record(HandshakeType::SERVER_HELLO, &[0xfe, 0xfd, 0x01]),
        server_hello_record(Some(&CID)),
    ]
    .concat();
    assert_eq!(
        identify_connection_id(&datagram),
        Some(ConnectionId::new(&CID))
    );
}

#[test]
fn identify_first_server_hello_decides() {
    let _guard = subscribe();
    let datagram = [server_hello_record(None), server_hello_record(Some(&CID))].concat();
    assert_eq!(identify_connection_id(&datagram), None);
}

#[test]
fn identify_unparseable_flight() {
    let _guard = subscribe();
    let mut datagram = server_flight(Some(&CID));
    datagram.truncate(datagram.len() - 1);
    assert_eq!(identify_connection_id(&datagram), None);
}

#[test]
fn handshake_filter() {
    let _guard = subscribe();
    assert!(is_handshake_datagram(&handshake_record(
        HandshakeType::CLIENT_HELLO,
        &[0; 16]
    )));
    assert!(!is_handshake_datagram(&record(
        ContentType::APPLICATION_DATA,
        None,
        b"data"
    )));
    assert!(!is_handshake_datagram(&cid_record(&CID, b"data")));
    assert!(!is_handshake_datagram(&[]));
    assert!(!is_handshake_datagram(&hex!("16 fefd 00")));
}

#[test]
fn flight_unpacks_to_records() {
    let _guard = subscribe();
    let flight = server_flight(Some(&CID));
    let records = unpack_datagram(&flight, None).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r[0] == ContentType::HANDSHAKE.0));
}
