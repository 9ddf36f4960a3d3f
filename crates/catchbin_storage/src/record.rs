//! Log record framing.
//!
//! Every store call that changes state appends exactly one record, so a
//! record is the unit of atomicity:
//!
//! ```text
//! magic (4) | version (2) | length (4) | CBOR batch (length) | crc32 (4)
//! ```
//!
//! All integers are little-endian. The CRC covers the CBOR bytes only.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use catchbin_model::{Request, Session};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"CBLG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

/// A single mutation inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    /// Insert or replace a session.
    PutSession(Session),
    /// Delete a session and every request that belongs to it.
    DeleteSession(String),
    /// Insert or replace a request.
    PutRequest(Request),
    /// Delete one request.
    DeleteRequest(String),
    /// Delete every request of a session, keeping the session.
    ClearRequests(String),
    /// Set or clear the last-used session marker.
    SetLastUsed(Option<String>),
}

/// A batch of operations committed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Operations in application order.
    pub ops: Vec<StoreOp>,
}

impl LogRecord {
    /// Creates a record from a batch of operations.
    pub fn new(ops: Vec<StoreOp>) -> Self {
        Self { ops }
    }

    /// Encodes the record into a framed, checksummed byte sequence.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut body = Vec::new();
        ciborium::into_writer(self, &mut body)
            .map_err(|e| StorageError::Codec(format!("failed to encode record: {}", e)))?;

        let len = u32::try_from(body.len()).map_err(|_| {
            StorageError::Codec(format!("record of {} bytes is too large", body.len()))
        })?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + body.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&compute_crc32(&body).to_le_bytes());
        Ok(frame)
    }
}

/// Outcome of reading the record at an offset.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete record and the offset of the next one.
    Record(LogRecord, u64),
    /// Clean end of the log.
    End,
    /// The log ends in a partially written record.
    TornTail,
}

/// Reads the record starting at `offset`.
///
/// An incomplete header or body at the end of the log is reported as
/// [`ReadOutcome::TornTail`]. Bad magic, an unknown version, a CRC mismatch
/// or undecodable CBOR is corruption.
pub fn read_record(backend: &dyn StorageBackend, offset: u64) -> StorageResult<ReadOutcome> {
    let size = backend.size()?;
    if offset == size {
        return Ok(ReadOutcome::End);
    }
    if size - offset < HEADER_SIZE as u64 {
        return Ok(ReadOutcome::TornTail);
    }

    let header = backend.read_at(offset, HEADER_SIZE)?;
    if header[0..4] != LOG_MAGIC {
        return Err(StorageError::corrupted(offset, "bad record magic"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != LOG_VERSION {
        return Err(StorageError::corrupted(
            offset,
            format!("unsupported record version {}", version),
        ));
    }
    let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as u64;

    let body_start = offset + HEADER_SIZE as u64;
    let end = body_start + len + CRC_SIZE as u64;
    if end > size {
        return Ok(ReadOutcome::TornTail);
    }

    let body = backend.read_at(body_start, len as usize)?;
    let crc_bytes = backend.read_at(body_start + len, CRC_SIZE)?;
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if stored_crc != compute_crc32(&body) {
        return Err(StorageError::corrupted(offset, "checksum mismatch"));
    }

    let record: LogRecord = ciborium::from_reader(body.as_slice())
        .map_err(|e| StorageError::corrupted(offset, format!("undecodable record: {}", e)))?;
    Ok(ReadOutcome::Record(record, end))
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn sample() -> LogRecord {
        LogRecord::new(vec![
            StoreOp::SetLastUsed(Some("s1".into())),
            StoreOp::DeleteRequest("r1".into()),
            StoreOp::ClearRequests("s2".into()),
        ])
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn reads_back_framed_records() {
        let mut backend = InMemoryBackend::new();
        let frame = sample().encode().unwrap();
        backend.append(&frame).unwrap();
        backend.append(&frame).unwrap();

        let next = match read_record(&backend, 0).unwrap() {
            ReadOutcome::Record(record, next) => {
                assert_eq!(record, sample());
                next
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(next, frame.len() as u64);
        assert!(matches!(
            read_record(&backend, next).unwrap(),
            ReadOutcome::Record(..)
        ));
        assert!(matches!(
            read_record(&backend, 2 * next).unwrap(),
            ReadOutcome::End
        ));
    }

    #[test]
    fn partial_record_is_torn_tail() {
        let frame = sample().encode().unwrap();
        for cut in [3, HEADER_SIZE + 1, frame.len() - 1] {
            let backend = InMemoryBackend::with_data(frame[..cut].to_vec());
            assert!(matches!(
                read_record(&backend, 0).unwrap(),
                ReadOutcome::TornTail
            ));
        }
    }

    #[test]
    fn flipped_bit_is_corruption() {
        let mut frame = sample().encode().unwrap();
        frame[HEADER_SIZE + 2] ^= 0x01;
        let backend = InMemoryBackend::with_data(frame);
        assert!(matches!(
            read_record(&backend, 0),
            Err(StorageError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut frame = sample().encode().unwrap();
        frame[0] = b'X';
        let backend = InMemoryBackend::with_data(frame);
        assert!(matches!(
            read_record(&backend, 0),
            Err(StorageError::Corrupted { .. })
        ));
    }
}
