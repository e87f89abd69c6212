//! Wire encoding for the store's framing structures.
//!
//! The store format (headers, footers, block indexes, row locations) is
//! framed with a small, hand-owned binary encoding instead of a
//! serialization dependency, so the on-disk representation can never
//! drift under a crate upgrade. Typed column values do *not* pass through
//! here — they use the order-preserving encodings in [`crate::codec`];
//! this module only frames the metadata around them.
//!
//! Unsigned integers are little-endian and fixed-width. Byte sequences
//! carry a `u32` length prefix; vectors of structures carry a `u32`
//! element count followed by the elements back to back. Fixed-size byte
//! arrays are written raw. Nothing here panics: every decoder reports
//! truncation and oversized length fields through [`EncodingError`], with
//! [`MAX_BYTE_LEN`] and [`MAX_VEC_ELEMENTS`] bounding what a corrupted
//! length field can make the decoder allocate.

#[cfg(test)]
mod tests;

use thiserror::Error;

/// Longest byte sequence a decoder will accept (16 MiB). Only the block
/// index of a very large table comes anywhere near this.
pub const MAX_BYTE_LEN: u32 = 16 * 1024 * 1024;

/// Largest element count a decoder will accept for a structure vector
/// (4 M).
pub const MAX_VEC_ELEMENTS: u32 = 4 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while encoding or decoding framing structures.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A length or count field exceeded its safety limit.
    #[error("length overflow: {0}")]
    LengthOverflow(String),
}

impl EncodingError {
    fn eof(needed: usize, available: usize) -> Self {
        Self::UnexpectedEof { needed, available }
    }
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` onto the end of a byte buffer.
///
/// Implementations must be deterministic: the same logical value always
/// produces the same bytes.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from the front of a byte slice.
///
/// Decoders return the number of bytes consumed alongside the value, so
/// a caller can walk a buffer holding several encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Length-prefix helpers
// ------------------------------------------------------------------------------------------------

/// Write `bytes` as `[u32 len][bytes]`.
fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        EncodingError::LengthOverflow(format!("{} bytes cannot carry a u32 length", bytes.len()))
    })?;
    len.encode_to(buf)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Read a `u32` length prefix, enforcing `limit`. Returns the length and
/// the prefix width.
fn decode_len(buf: &[u8], limit: u32, what: &str) -> Result<(usize, usize), EncodingError> {
    let (len, prefix) = u32::decode_from(buf)?;
    if len > limit {
        return Err(EncodingError::LengthOverflow(format!(
            "{what} length {len} exceeds the limit of {limit}"
        )));
    }
    Ok((len as usize, prefix))
}

// ------------------------------------------------------------------------------------------------
// Unsigned integers: fixed-width little-endian
// ------------------------------------------------------------------------------------------------

macro_rules! wire_uint {
    ($($ty:ty),+) => {$(
        impl Encode for $ty {
            #[inline]
            fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
                buf.extend_from_slice(&self.to_le_bytes());
                Ok(())
            }
        }

        impl Decode for $ty {
            #[inline]
            fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
                let Some((bytes, _)) = buf.split_first_chunk::<{ size_of::<$ty>() }>() else {
                    return Err(EncodingError::eof(size_of::<$ty>(), buf.len()));
                };
                Ok((<$ty>::from_le_bytes(*bytes), size_of::<$ty>()))
            }
        }
    )+};
}

wire_uint!(u8, u16, u32, u64);

// ------------------------------------------------------------------------------------------------
// Fixed-size byte arrays: raw, no prefix
// ------------------------------------------------------------------------------------------------

impl<const N: usize> Encode for [u8; N] {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> Decode for [u8; N] {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let Some((bytes, _)) = buf.split_first_chunk::<N>() else {
            return Err(EncodingError::eof(N, buf.len()));
        };
        Ok((*bytes, N))
    }
}

// ------------------------------------------------------------------------------------------------
// Byte sequences: [u32 len][bytes]
// ------------------------------------------------------------------------------------------------

impl Encode for Vec<u8> {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encode_bytes(self, buf)
    }
}

/// Borrowed counterpart of the `Vec<u8>` encoding.
impl Encode for &[u8] {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encode_bytes(self, buf)
    }
}

impl Decode for Vec<u8> {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (len, prefix) = decode_len(buf, MAX_BYTE_LEN, "byte sequence")?;
        let data = buf
            .get(prefix..prefix + len)
            .ok_or_else(|| EncodingError::eof(len, buf.len() - prefix))?;
        Ok((data.to_vec(), prefix + len))
    }
}

// ------------------------------------------------------------------------------------------------
// Structure vectors: [u32 count][T₁][T₂]…
//
// `Vec<u8>` already means "byte sequence" above, so vectors of encoded
// structures go through free functions rather than a blanket impl that
// coherence would reject.
// ------------------------------------------------------------------------------------------------

/// Encode a slice of structures as `[u32 count][T₁][T₂]…`.
pub fn encode_vec<T: Encode>(items: &[T], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    let count = u32::try_from(items.len()).map_err(|_| {
        EncodingError::LengthOverflow(format!("{} items cannot carry a u32 count", items.len()))
    })?;
    count.encode_to(buf)?;
    for item in items {
        item.encode_to(buf)?;
    }
    Ok(())
}

/// Decode a structure vector, capping the element count at
/// [`MAX_VEC_ELEMENTS`].
pub fn decode_vec<T: Decode>(buf: &[u8]) -> Result<(Vec<T>, usize), EncodingError> {
    let (count, mut offset) = decode_len(buf, MAX_VEC_ELEMENTS, "structure vector")?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let (item, consumed) = T::decode_from(&buf[offset..])?;
        offset += consumed;
        items.push(item);
    }
    Ok((items, offset))
}

// ------------------------------------------------------------------------------------------------
// Convenience entry points
// ------------------------------------------------------------------------------------------------

/// Encode a value into a fresh buffer.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`, returning it with the
/// number of bytes consumed.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}
