//! Hello message extensions
//!
//! Only the Connection ID extension (RFC 9146) is understood; every other extension is carried
//! opaquely so a ServerHello can be walked without knowing its full contents.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::{
    coding::{self, BufExt, BufMutExt, Codec},
    shared::ConnectionId,
};

/// Extension type code point
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    /// `connection_id`, as assigned by RFC 9146
    pub const CONNECTION_ID: Self = Self(54);
}

impl Codec for ExtensionType {
    fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Self(buf.get()?))
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write(self.0);
    }
}

/// The Connection ID extension
///
/// An empty `cid` tells the peer that connection IDs will be sent, but that it need not use one
/// when sending to us. Not sending the extension at all is expressed by not constructing one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConnectionIdExtension {
    pub cid: ConnectionId,
}

#[allow(clippy::len_without_is_empty)]
impl ConnectionIdExtension {
    pub fn new(cid: ConnectionId) -> Self {
        Self { cid }
    }

    /// Encode the extension, type and length prefixes included
    pub fn encode<W: BufMut>(&self, w: &mut W) {
        w.write(ExtensionType::CONNECTION_ID);
        w.write(1 + self.cid.len() as u16);
        w.write(self.cid.len() as u8);
        w.put_slice(&self.cid);
    }

    /// Decode an extension, type and length prefixes included
    ///
    /// Bytes following the extension are left in `r`.
    pub fn decode<R: Buf>(r: &mut R) -> Result<Self, ExtensionDecodeError> {
        let ty = r
            .get::<ExtensionType>()
            .map_err(|_| ExtensionDecodeError::InvalidFormat)?;
        if ty != ExtensionType::CONNECTION_ID {
            return Err(ExtensionDecodeError::InvalidExtensionType(ty.0));
        }
        let body_len = usize::from(r.get::<u16>()?);
        if r.remaining() < body_len {
            return Err(ExtensionDecodeError::InvalidFormat);
        }
        let mut body = Buf::take(&mut *r, body_len);
        let cid_len = usize::from(body.get::<u8>()?);
        if body.remaining() != cid_len {
            // Either the outer length is too short for the CID, or it covers trailing garbage
            body.advance(body.remaining());
            return Err(ExtensionDecodeError::InvalidFormat);
        }
        let cid = ConnectionId::from_buf(&mut body, cid_len);
        Ok(Self { cid })
    }

    /// Encoded size
    pub fn len(&self) -> usize {
        2 + 2 + 1 + self.cid.len()
    }
}

/// One entry of a hello message's extension list
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Extension {
    ConnectionId(ConnectionIdExtension),
    /// Any extension this layer does not interpret, body kept verbatim
    Unknown { ty: ExtensionType, data: Vec<u8> },
}

impl Extension {
    pub fn ty(&self) -> ExtensionType {
        match self {
            Self::ConnectionId(_) => ExtensionType::CONNECTION_ID,
            Self::Unknown { ty, .. } => *ty,
        }
    }

    pub fn encode<W: BufMut>(&self, w: &mut W) {
        match self {
            Self::ConnectionId(ext) => ext.encode(w),
            Self::Unknown { ty, data } => {
                w.write(*ty);
                w.write(data.len() as u16);
                w.put_slice(data);
            }
        }
    }

    pub fn decode(r: &mut &[u8]) -> Result<Self, ExtensionDecodeError> {
        if r.len() < 2 {
            return Err(ExtensionDecodeError::InvalidFormat);
        }
        let ty = ExtensionType(u16::from_be_bytes([r[0], r[1]]));
        if ty == ExtensionType::CONNECTION_ID {
            return ConnectionIdExtension::decode(r).map(Self::ConnectionId);
        }
        r.advance(2);
        let len = usize::from(r.get::<u16>()?);
        let data = coding::split_bytes(r, len)?;
        Ok(Self::Unknown {
            ty,
            data: data.to_vec(),
        })
    }

    /// Decode a `u16`-length-prefixed extension list
    pub fn decode_list(r: &mut &[u8]) -> Result<Vec<Self>, ExtensionDecodeError> {
        let len = usize::from(r.get::<u16>()?);
        let mut list = coding::split_bytes(r, len)?;
        let mut out = Vec::new();
        while !list.is_empty() {
            out.push(Self::decode(&mut list)?);
        }
        Ok(out)
    }

    /// Encode a `u16`-length-prefixed extension list
    pub fn encode_list<W: BufMut>(list: &[Self], w: &mut W) {
        let mut body = Vec::new();
        for ext in list {
            ext.encode(&mut body);
        }
        w.write(body.len() as u16);
        w.put_slice(&body);
    }
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ExtensionDecodeError {
    /// The extension is not the one being decoded
    #[error("invalid extension type {0}")]
    InvalidExtensionType(u16),
    /// The length-prefixed regions don't fit the buffer or each other
    #[error("invalid extension format")]
    InvalidFormat,
}

impl From<coding::UnexpectedEnd> for ExtensionDecodeError {
    fn from(_: coding::UnexpectedEnd) -> Self {
        Self::InvalidFormat
    }
}
