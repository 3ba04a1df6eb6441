//! Fixed-width little-endian extraction from byte slices.

use crate::error::{JournalError, Result};

/// Copy `N` bytes starting at `at`.
pub fn bytes<const N: usize>(buf: &[u8], at: usize) -> Result<[u8; N]> {
    let slice = at
        .checked_add(N)
        .and_then(|end| buf.get(at..end))
        .ok_or(JournalError::ShortRead {
            offset: at as u64,
            needed: N,
        })?;

    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

/// Read a little-endian `u32` starting at `at`.
pub fn u32_le(buf: &[u8], at: usize) -> Result<u32> {
    bytes::<4>(buf, at).map(u32::from_le_bytes)
}

/// Read a little-endian `u64` starting at `at`.
pub fn u64_le(buf: &[u8], at: usize) -> Result<u64> {
    bytes::<8>(buf, at).map(u64::from_le_bytes)
}
