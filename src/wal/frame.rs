//! WAL Frame definitions
//!
//! Defines the on-disk unit of the log: one encoded record behind a
//! checksummed length prefix.

use crate::error::{LineraError, Result};
use crate::record::{self, Record};

/// Frame header: CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 8;

/// A single frame in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    /// The logged mutation
    pub record: Record,
}

/// Result of parsing a frame from the front of a buffer
#[derive(Debug)]
pub(crate) enum FrameParse {
    /// A valid frame occupying `len` bytes
    Complete { record: Record, len: usize },

    /// The buffer ends before the frame does (torn write at the tail)
    Incomplete,

    /// The frame is fully present but fails its checksum or does not decode
    Corrupt { len: usize },
}

impl LogFrame {
    pub fn new(record: Record) -> Self {
        Self { record }
    }

    /// Serialize to `[crc][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload_len = self.record.encoded_len();
        if payload_len > u32::MAX as usize {
            return Err(LineraError::InvalidArgument(format!(
                "record of {} bytes does not fit in a WAL frame",
                payload_len
            )));
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_len);
        buf.extend_from_slice(&[0u8; 4]); // CRC placeholder
        buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
        record::encode_into(&self.record, &mut buf)?;

        let crc = crc32fast::hash(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Deserialize a buffer holding exactly one frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        match parse_frame(bytes) {
            FrameParse::Complete { record, len } if len == bytes.len() => Ok(Self { record }),
            FrameParse::Complete { len, .. } => Err(LineraError::Corruption(format!(
                "{} trailing bytes after WAL frame",
                bytes.len() - len
            ))),
            FrameParse::Incomplete => Err(LineraError::Corruption(format!(
                "truncated WAL frame ({} bytes)",
                bytes.len()
            ))),
            FrameParse::Corrupt { .. } => Err(LineraError::Corruption(
                "WAL frame checksum mismatch".to_string(),
            )),
        }
    }

    /// Total size of this frame on disk
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.record.encoded_len()
    }
}

/// Read the payload length out of a frame header
pub(crate) fn payload_len(header: &[u8; HEADER_SIZE]) -> usize {
    u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize
}

/// Parse the frame at the front of `buf`
pub(crate) fn parse_frame(buf: &[u8]) -> FrameParse {
    if buf.len() < HEADER_SIZE {
        return FrameParse::Incomplete;
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&buf[..HEADER_SIZE]);
    let len = HEADER_SIZE + payload_len(&header);
    if buf.len() < len {
        return FrameParse::Incomplete;
    }

    let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if crc32fast::hash(&buf[4..len]) != stored_crc {
        return FrameParse::Corrupt { len };
    }

    match record::decode(&buf[HEADER_SIZE..len]) {
        Ok(record) => FrameParse::Complete { record, len },
        Err(_) => FrameParse::Corrupt { len },
    }
}
