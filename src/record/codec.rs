//! Record codec
//!
//! Fixed binary layout shared by WAL frames and segment data blocks.
//!
//! ## Layout (little endian)
//! ```text
//! ┌───────────┬───────┬─────────────┬─────────┬─────────┬─────────┐
//! │ KeyLen(4) │  Key  │ ValueLen(4) │  Value  │ Seq (8) │ CRC (4) │
//! └───────────┴───────┴─────────────┴─────────┴─────────┴─────────┘
//! ```
//! - `ValueLen = 0xFFFFFFFF` marks a tombstone (no value bytes follow)
//! - CRC32 covers every preceding byte of the record

use bytes::{Buf, BufMut};

use super::Record;
use crate::error::{LineraError, Result};

/// Sentinel value length indicating a tombstone
pub const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Smallest possible record: KeyLen (4) + ValueLen (4) + Seq (8) + CRC (4)
pub const MIN_RECORD_SIZE: usize = 20;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a record into a fresh buffer
pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(record.encoded_len());
    encode_into(record, &mut buf)?;
    Ok(buf)
}

/// Encode a record, appending to `buf`
///
/// Fails with `InvalidArgument` if the key or value cannot be represented
/// (length would collide with the tombstone sentinel).
pub fn encode_into<B: BufMut>(record: &Record, buf: &mut B) -> Result<()> {
    let key_len = checked_len(record.key.len(), "key")?;
    let value_len = match &record.value {
        Some(v) => checked_len(v.len(), "value")?,
        None => TOMBSTONE_MARKER,
    };

    let mut hasher = crc32fast::Hasher::new();

    let key_len_bytes = key_len.to_le_bytes();
    buf.put_slice(&key_len_bytes);
    buf.put_slice(&record.key);
    hasher.update(&key_len_bytes);
    hasher.update(&record.key);

    let value_len_bytes = value_len.to_le_bytes();
    buf.put_slice(&value_len_bytes);
    hasher.update(&value_len_bytes);
    if let Some(v) = &record.value {
        buf.put_slice(v);
        hasher.update(v);
    }

    let seq_bytes = record.seq.to_le_bytes();
    buf.put_slice(&seq_bytes);
    hasher.update(&seq_bytes);

    buf.put_u32_le(hasher.finalize());
    Ok(())
}

fn checked_len(len: usize, what: &str) -> Result<u32> {
    if len >= TOMBSTONE_MARKER as usize {
        return Err(LineraError::InvalidArgument(format!(
            "{} of {} bytes exceeds the record format limit",
            what, len
        )));
    }
    Ok(len as u32)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a buffer holding exactly one record
pub fn decode(bytes: &[u8]) -> Result<Record> {
    let (record, consumed) = decode_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(LineraError::Corruption(format!(
            "{} trailing bytes after record",
            bytes.len() - consumed
        )));
    }
    Ok(record)
}

/// Decode the record at the start of `bytes`
///
/// Returns the record and the number of bytes it occupied, so callers can
/// walk a run of concatenated records.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Record, usize)> {
    let mut cursor = bytes;

    let key_len = read_u32(&mut cursor, "key length")? as usize;
    let key = read_bytes(&mut cursor, key_len, "key")?;

    let value_len = read_u32(&mut cursor, "value length")?;
    let value = if value_len == TOMBSTONE_MARKER {
        None
    } else {
        Some(read_bytes(&mut cursor, value_len as usize, "value")?)
    };

    if cursor.remaining() < 8 {
        return Err(overrun("sequence number", 8, cursor.remaining()));
    }
    let seq = cursor.get_u64_le();

    let body_len = bytes.len() - cursor.remaining();
    let stored_crc = read_u32(&mut cursor, "checksum")?;
    let computed_crc = crc32fast::hash(&bytes[..body_len]);
    if stored_crc != computed_crc {
        return Err(LineraError::Corruption(format!(
            "record checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }

    Ok((Record { key, value, seq }, body_len + 4))
}

fn read_u32(cursor: &mut &[u8], what: &str) -> Result<u32> {
    if cursor.remaining() < 4 {
        return Err(overrun(what, 4, cursor.remaining()));
    }
    Ok(cursor.get_u32_le())
}

fn read_bytes(cursor: &mut &[u8], len: usize, what: &str) -> Result<Vec<u8>> {
    if cursor.remaining() < len {
        return Err(overrun(what, len, cursor.remaining()));
    }
    let out = cursor[..len].to_vec();
    cursor.advance(len);
    Ok(out)
}

fn overrun(what: &str, needed: usize, available: usize) -> LineraError {
    LineraError::Corruption(format!(
        "{} overruns buffer: need {} bytes, {} available",
        what, needed, available
    ))
}
