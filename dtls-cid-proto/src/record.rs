use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::{
    coding::{self, BufExt, BufMutExt, Codec},
    shared::ConnectionId,
    MAX_CID_SIZE, RECORD_HEADER_SIZE,
};

/// Record content type
///
/// Unknown values are carried through rather than rejected; the record layer above decides what
/// to do with them.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ContentType(pub u8);

impl Codec for ContentType {
    fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Self(buf.get()?))
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write(self.0);
    }
}

macro_rules! content_types {
    {$($name:ident($val:expr) $desc:expr;)*} => {
        impl ContentType {
            $(#[doc = $desc] pub const $name: Self = ContentType($val);)*
        }

        impl fmt::Debug for ContentType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    x => write!(f, "ContentType({x})"),
                }
            }
        }
    }
}

content_types! {
    CHANGE_CIPHER_SPEC(20) "change_cipher_spec";
    ALERT(21) "alert";
    HANDSHAKE(22) "handshake";
    APPLICATION_DATA(23) "application_data";
    CONNECTION_ID(25) "tls12_cid, a record whose header carries a connection ID (RFC 9146)";
}

/// Record-layer protocol version
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// DTLS 1.0, also used on the first ClientHello of a DTLS 1.2 handshake
    pub const DTLS1_0: Self = Self {
        major: 0xfe,
        minor: 0xff,
    };
    /// DTLS 1.2
    pub const DTLS1_2: Self = Self {
        major: 0xfe,
        minor: 0xfd,
    };
}

impl Codec for ProtocolVersion {
    fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Self {
            major: buf.get()?,
            minor: buf.get()?,
        })
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write(self.major);
        buf.write(self.minor);
    }
}

/// Largest sequence number representable in the 48-bit header field
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

/// Header of a single DTLS record
///
/// The wire width depends on whether the reader expects connection IDs: a `tls12_cid` record
/// carries `cid_len` bytes of connection ID between the sequence number and the length, and
/// nothing in the record itself says how long that field is.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    /// 48-bit record sequence number
    pub sequence_number: u64,
    /// Present iff `content_type` is [`ContentType::CONNECTION_ID`] and the header was decoded
    /// with an expected connection ID length
    pub connection_id: Option<ConnectionId>,
    /// Length of the record payload following the header
    pub content_len: u16,
}

#[allow(clippy::len_without_is_empty)]
impl RecordHeader {
    /// Decode a record header
    ///
    /// `cid_len` is `None` when connection IDs are not in use; then no record is assumed to carry
    /// one, whatever its content type.
    pub fn decode<R: Buf>(buf: &mut R, cid_len: Option<usize>) -> Result<Self, RecordDecodeError> {
        let content_type = buf.get::<ContentType>()?;
        let version = buf.get()?;
        let epoch = buf.get()?;
        let sequence_number = buf.get_uint_n(6)?;
        let connection_id = match cid_len {
            Some(len) if content_type == ContentType::CONNECTION_ID => {
                if len > MAX_CID_SIZE {
                    return Err(RecordDecodeError::InvalidHeader("connection ID too long"));
                }
                if buf.remaining() < len {
                    return Err(RecordDecodeError::InvalidHeader("truncated connection ID"));
                }
                Some(ConnectionId::from_buf(buf, len))
            }
            _ => None,
        };
        let content_len = buf.get()?;
        Ok(Self {
            content_type,
            version,
            epoch,
            sequence_number,
            connection_id,
            content_len,
        })
    }

    pub fn encode<W: BufMut>(&self, w: &mut W) {
        debug_assert!(self.sequence_number <= MAX_SEQUENCE_NUMBER);
        w.write(self.content_type);
        w.write(self.version);
        w.write(self.epoch);
        w.write_uint_n(self.sequence_number, 6);
        if let Some(cid) = &self.connection_id {
            cid.encode(w);
        }
        w.write(self.content_len);
    }

    /// Encoded size of the header
    pub fn len(&self) -> usize {
        RECORD_HEADER_SIZE + self.connection_id.map_or(0, |cid| cid.len())
    }

    /// Total size of the record, header included
    pub fn record_len(&self) -> usize {
        self.len() + usize::from(self.content_len)
    }
}

/// Inner plaintext of a `tls12_cid` record (RFC 9146 `DTLSInnerPlaintext`)
///
/// On the wire the payload comes first, then the real content type, then `zeros` bytes of
/// padding. The real content type is never zero, which is what lets the reader find it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConnectionIdData {
    pub real_type: ContentType,
    pub zeros: usize,
    pub data: Vec<u8>,
}

#[allow(clippy::len_without_is_empty)]
impl ConnectionIdData {
    /// Content type of the outer record that carries this plaintext
    pub const fn content_type(&self) -> ContentType {
        ContentType::CONNECTION_ID
    }

    pub fn encode<W: BufMut>(&self, w: &mut W) {
        debug_assert_ne!(self.real_type.0, 0);
        w.put_slice(&self.data);
        w.write(self.real_type);
        w.put_bytes(0, self.zeros);
    }

    pub fn decode(buf: &[u8]) -> Result<Self, RecordDecodeError> {
        let end = buf
            .iter()
            .rposition(|&b| b != 0)
            .ok_or(RecordDecodeError::InvalidInnerPlaintext)?;
        Ok(Self {
            real_type: ContentType(buf[end]),
            zeros: buf.len() - end - 1,
            data: buf[..end].to_vec(),
        })
    }

    /// Encoded size
    pub fn len(&self) -> usize {
        self.data.len() + 1 + self.zeros
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum RecordDecodeError {
    /// A datagram must hold at least one record
    #[error("empty datagram")]
    EmptyDatagram,
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    /// The inner plaintext of a `tls12_cid` record has no content type
    #[error("inner plaintext carries no content type")]
    InvalidInnerPlaintext,
}

impl From<coding::UnexpectedEnd> for RecordDecodeError {
    fn from(_: coding::UnexpectedEnd) -> Self {
        Self::InvalidHeader("unexpected end of record")
    }
}
