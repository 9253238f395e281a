//! Coding related traits.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Error indicating that the provided buffer was too small
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("unexpected end of buffer")]
pub struct UnexpectedEnd;

/// Coding result type
pub type Result<T> = ::std::result::Result<T, UnexpectedEnd>;

/// Infallible encoding and decoding of fixed-width wire fields
pub trait Codec: Sized {
    /// Decode a `Self` from the provided buffer, if the buffer is large enough
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;
    /// Append the encoding of `self` to the provided buffer
    fn encode<B: BufMut>(&self, buf: &mut B);
}

impl Codec for u8 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(UnexpectedEnd);
        }
        Ok(buf.get_u8())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(*self);
    }
}

impl Codec for u16 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(UnexpectedEnd);
        }
        Ok(buf.get_u16())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(*self);
    }
}

impl Codec for u32 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(UnexpectedEnd);
        }
        Ok(buf.get_u32())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(*self);
    }
}

pub trait BufExt {
    fn get<T: Codec>(&mut self) -> Result<T>;
    /// Read a big-endian unsigned integer of `nbytes` width (24-bit lengths, 48-bit sequence numbers)
    fn get_uint_n(&mut self, nbytes: usize) -> Result<u64>;
}

impl<T: Buf> BufExt for T {
    fn get<U: Codec>(&mut self) -> Result<U> {
        U::decode(self)
    }

    fn get_uint_n(&mut self, nbytes: usize) -> Result<u64> {
        debug_assert!(nbytes <= 8);
        if self.remaining() < nbytes {
            return Err(UnexpectedEnd);
        }
        Ok(self.get_uint(nbytes))
    }
}

/// Split off the next `len` bytes of a borrowed buffer without copying them
pub(crate) fn split_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(UnexpectedEnd);
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

pub trait BufMutExt {
    fn write<T: Codec>(&mut self, x: T);
    /// Write the low `nbytes` of `x` big-endian
    fn write_uint_n(&mut self, x: u64, nbytes: usize);
}

impl<T: BufMut> BufMutExt for T {
    fn write<U: Codec>(&mut self, x: U) {
        x.encode(self);
    }

    fn write_uint_n(&mut self, x: u64, nbytes: usize) {
        debug_assert!(nbytes <= 8);
        self.put_uint(x, nbytes);
    }
}
