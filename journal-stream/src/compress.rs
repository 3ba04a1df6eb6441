//! Decompression of data object payloads.
//!
//! The codec is selected by the compression bits in the object header flags.
//! Codecs are consumed as black boxes; the only format knowledge here is the
//! little-endian decompressed-size prefix journald writes in front of LZ4
//! blocks.

use crate::codec;
use crate::error::{JournalError, Result};
use std::borrow::Cow;
use std::io::Read;

/// Object header flag bits for data objects.
pub const OBJECT_COMPRESSED_XZ: u8 = 1 << 0;
pub const OBJECT_COMPRESSED_LZ4: u8 = 1 << 1;
pub const OBJECT_COMPRESSED_ZSTD: u8 = 1 << 2;

/// Upper bound on a decompressed payload, matching the reader's scratch cap.
const DECOMPRESSED_SIZE_MAX: u64 = 1 << 30;

fn failed(codec: &'static str, reason: impl ToString) -> JournalError {
    JournalError::Decompression {
        codec,
        reason: reason.to_string(),
    }
}

/// Decode a data payload according to the object's compression flags.
///
/// Uncompressed payloads are borrowed as-is; each codec path decodes to
/// completion into an owned buffer.
pub fn decode<'a>(flags: u8, payload: &'a [u8]) -> Result<Cow<'a, [u8]>> {
    if flags & OBJECT_COMPRESSED_XZ != 0 {
        let mut decoded = Vec::new();
        xz2::read::XzDecoder::new(payload)
            .read_to_end(&mut decoded)
            .map_err(|err| failed("xz", err))?;
        Ok(Cow::Owned(decoded))
    } else if flags & OBJECT_COMPRESSED_LZ4 != 0 {
        let size = codec::u64_le(payload, 0).map_err(|_| failed("lz4", "truncated size prefix"))?;
        if size > DECOMPRESSED_SIZE_MAX {
            return Err(failed("lz4", format!("declared size {size} too large")));
        }
        let decoded = lz4_flex::block::decompress(&payload[8..], size as usize)
            .map_err(|err| failed("lz4", err))?;
        Ok(Cow::Owned(decoded))
    } else if flags & OBJECT_COMPRESSED_ZSTD != 0 {
        let decoded = zstd::decode_all(payload).map_err(|err| failed("zstd", err))?;
        Ok(Cow::Owned(decoded))
    } else {
        Ok(Cow::Borrowed(payload))
    }
}
