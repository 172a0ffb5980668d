//! Big-endian field access inside box payloads.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};

/// Return a copy of `payload` with the u32 at `field_offset` replaced by `value`.
///
/// The input is never modified, so captured buffers can be shared with the
/// muxer's working copies.
pub fn patch_u32(payload: &[u8], field_offset: usize, value: u32) -> Result<Bytes> {
    let end = field_offset
        .checked_add(4)
        .filter(|&end| end <= payload.len())
        .ok_or_else(|| {
            Error::malformed(
                field_offset,
                format!("4-byte field does not fit in {}-byte payload", payload.len()),
            )
        })?;

    let mut out = BytesMut::from(payload);
    out[field_offset..end].copy_from_slice(&value.to_be_bytes());
    Ok(out.freeze())
}

/// Read the u32 at `offset`, if it lies inside `payload`.
pub fn read_u32(payload: &[u8], offset: usize) -> Option<u32> {
    let bytes = payload.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
