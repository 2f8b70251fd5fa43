use crate::{FlashError, Result};

/// Rejects `[offset, offset + len)` unless it lies entirely within `capacity`.
///
/// An `offset + len` that overflows `u64` is reported as out of bounds as well, since such a
/// range can never fit.
pub fn checked_range(offset: u64, len: u64, capacity: u64) -> Result<()> {
    let out_of_bounds = FlashError::OutOfBounds {
        offset,
        len,
        capacity,
    };
    let end = offset.checked_add(len).ok_or(out_of_bounds.clone())?;
    if end > capacity {
        return Err(out_of_bounds);
    }
    Ok(())
}

/// Converts an in-bounds offset into a slice index.
pub fn to_index(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| FlashError::InvalidConfig("offset does not fit in usize"))
}
