use std::{
    io::{self, Write},
    str,
};

use tracing_subscriber::EnvFilter;

use crate::{
    extension::{ConnectionIdExtension, Extension, ExtensionType},
    handshake::{HandshakeHeader, HandshakeType, ServerHello, RANDOM_LENGTH},
    record::{ContentType, ProtocolVersion, RecordHeader},
    shared::ConnectionId,
};

pub(super) fn subscribe() -> tracing::subscriber::DefaultGuard {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(|| TestWriter)
        .finish();
    tracing::subscriber::set_default(sub)
}

struct TestWriter;

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        print!(
            "{}",
            str::from_utf8(buf).expect("tried to log invalid UTF-8")
        );
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// A record with an arbitrary payload; `cid` is written into the header as given
pub(super) fn record(content_type: ContentType, cid: Option<&[u8]>, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    RecordHeader {
        content_type,
        version: ProtocolVersion::DTLS1_2,
        epoch: u16::from(content_type != ContentType::HANDSHAKE),
        sequence_number: 1,
        connection_id: cid.map(ConnectionId::new),
        content_len: payload.len() as u16,
    }
    .encode(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// A `tls12_cid` record addressed to `cid`
pub(super) fn cid_record(cid: &[u8], payload: &[u8]) -> Vec<u8> {
    record(ContentType::CONNECTION_ID, Some(cid), payload)
}

/// A handshake record holding one unfragmented message
pub(super) fn handshake_record(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    HandshakeHeader::unfragmented(msg_type, 0, body.len() as u32).encode(&mut payload);
    payload.extend_from_slice(body);
    record(ContentType::HANDSHAKE, None, &payload)
}

/// A ServerHello record, granting `cid` through the extension when given
pub(super) fn server_hello_record(cid: Option<&[u8]>) -> Vec<u8> {
    let mut extensions = vec![Extension::Unknown {
        ty: ExtensionType(0xff01),
        data: vec![0],
    }];
    if let Some(cid) = cid {
        extensions.push(Extension::ConnectionId(ConnectionIdExtension::new(
            ConnectionId::new(cid),
        )));
    }
    let hello = ServerHello {
        version: ProtocolVersion::DTLS1_2,
        random: [0x42; RANDOM_LENGTH],
        session_id: vec![1; 32],
        cipher_suite: 0xc0ae,
        compression_method: 0,
        extensions,
    };
    let mut body = Vec::new();
    hello.encode(&mut body);
    handshake_record(HandshakeType::SERVER_HELLO, &body)
}

/// A typical first server flight packed into one datagram
pub(super) fn server_flight(cid: Option<&[u8]>) -> Vec<u8> {
    [
        server_hello_record(cid),
        handshake_record(HandshakeType::CERTIFICATE, &[0; 40]),
        handshake_record(HandshakeType::SERVER_HELLO_DONE, &[]),
    ]
    .concat()
}
