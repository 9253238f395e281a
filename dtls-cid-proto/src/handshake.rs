use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::{
    coding::{self, BufExt, BufMutExt, Codec},
    extension::{Extension, ExtensionDecodeError},
    record::ProtocolVersion,
    HANDSHAKE_HEADER_SIZE,
};

/// Handshake message type
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct HandshakeType(pub u8);

impl Codec for HandshakeType {
    fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Self(buf.get()?))
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write(self.0);
    }
}

macro_rules! handshake_types {
    {$($name:ident($val:expr);)*} => {
        impl HandshakeType {
            $(pub const $name: Self = HandshakeType($val);)*
        }

        impl fmt::Debug for HandshakeType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    x => write!(f, "HandshakeType({x})"),
                }
            }
        }
    }
}

handshake_types! {
    HELLO_REQUEST(0);
    CLIENT_HELLO(1);
    SERVER_HELLO(2);
    HELLO_VERIFY_REQUEST(3);
    CERTIFICATE(11);
    SERVER_KEY_EXCHANGE(12);
    CERTIFICATE_REQUEST(13);
    SERVER_HELLO_DONE(14);
    CERTIFICATE_VERIFY(15);
    CLIENT_KEY_EXCHANGE(16);
    FINISHED(20);
}

/// Header preceding every DTLS handshake message fragment
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HandshakeHeader {
    pub msg_type: HandshakeType,
    /// Length of the complete message body (24 bits)
    pub length: u32,
    pub message_seq: u16,
    /// Offset of this fragment within the message body (24 bits)
    pub fragment_offset: u32,
    /// Length of this fragment (24 bits)
    pub fragment_length: u32,
}

impl HandshakeHeader {
    /// Header for a message sent in a single fragment
    pub fn unfragmented(msg_type: HandshakeType, message_seq: u16, length: u32) -> Self {
        Self {
            msg_type,
            length,
            message_seq,
            fragment_offset: 0,
            fragment_length: length,
        }
    }

    pub fn decode<R: Buf>(r: &mut R) -> Result<Self, HandshakeDecodeError> {
        Ok(Self {
            msg_type: r.get()?,
            length: r.get_uint_n(3)? as u32,
            message_seq: r.get()?,
            fragment_offset: r.get_uint_n(3)? as u32,
            fragment_length: r.get_uint_n(3)? as u32,
        })
    }

    pub fn encode<W: BufMut>(&self, w: &mut W) {
        w.write(self.msg_type);
        w.write_uint_n(self.length.into(), 3);
        w.write(self.message_seq);
        w.write_uint_n(self.fragment_offset.into(), 3);
        w.write_uint_n(self.fragment_length.into(), 3);
    }

    /// Whether this fragment carries the whole message
    pub fn is_complete(&self) -> bool {
        self.fragment_offset == 0 && self.fragment_length == self.length
    }
}

/// Split a handshake record payload into its header and message body
///
/// Only complete messages are returned; the body is borrowed from `payload`.
pub fn split_message(payload: &[u8]) -> Result<(HandshakeHeader, &[u8]), HandshakeDecodeError> {
    if payload.len() < HANDSHAKE_HEADER_SIZE {
        return Err(HandshakeDecodeError::Malformed("truncated handshake header"));
    }
    let mut r = payload;
    let header = HandshakeHeader::decode(&mut r)?;
    if !header.is_complete() {
        return Err(HandshakeDecodeError::Fragmented);
    }
    let body = coding::split_bytes(&mut r, header.fragment_length as usize)
        .map_err(|_| HandshakeDecodeError::Malformed("fragment exceeds record"))?;
    Ok((header, body))
}

/// Length of the hello random
pub const RANDOM_LENGTH: usize = 32;

/// Maximum length of a session ID
pub const MAX_SESSION_ID_LENGTH: usize = 32;

/// The ServerHello message body
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServerHello {
    pub version: ProtocolVersion,
    pub random: [u8; RANDOM_LENGTH],
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    /// Decode the message body (no handshake header)
    ///
    /// The extension block is optional on the wire; a body ending after the compression method
    /// decodes with no extensions.
    pub fn decode(body: &[u8]) -> Result<Self, HandshakeDecodeError> {
        let mut body = body;
        let r = &mut body;
        let version = r.get()?;
        let mut random = [0; RANDOM_LENGTH];
        random.copy_from_slice(coding::split_bytes(r, RANDOM_LENGTH)?);
        let session_id_len = usize::from(r.get::<u8>()?);
        if session_id_len > MAX_SESSION_ID_LENGTH {
            return Err(HandshakeDecodeError::Malformed("session ID too long"));
        }
        let session_id = coding::split_bytes(r, session_id_len)?.to_vec();
        let cipher_suite = r.get()?;
        let compression_method = r.get()?;
        let extensions = match r.is_empty() {
            true => Vec::new(),
            false => Extension::decode_list(r)?,
        };
        if !r.is_empty() {
            return Err(HandshakeDecodeError::Malformed("trailing data after extensions"));
        }
        Ok(Self {
            version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    /// Encode the message body (no handshake header)
    pub fn encode<W: BufMut>(&self, w: &mut W) {
        debug_assert!(self.session_id.len() <= MAX_SESSION_ID_LENGTH);
        w.write(self.version);
        w.put_slice(&self.random);
        w.write(self.session_id.len() as u8);
        w.put_slice(&self.session_id);
        w.write(self.cipher_suite);
        w.write(self.compression_method);
        if !self.extensions.is_empty() {
            Extension::encode_list(&self.extensions, w);
        }
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum HandshakeDecodeError {
    #[error("malformed handshake message: {0}")]
    Malformed(&'static str),
    /// Reassembly of fragmented messages belongs to the handshake engine
    #[error("fragmented handshake message")]
    Fragmented,
    #[error("invalid extension: {0}")]
    Extension(#[from] ExtensionDecodeError),
}

impl From<coding::UnexpectedEnd> for HandshakeDecodeError {
    fn from(_: coding::UnexpectedEnd) -> Self {
        Self::Malformed("unexpected end of message")
    }
}
