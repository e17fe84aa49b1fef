//! Framed record encoding with CRC32 checksums
//!
//! ## Frame Format
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of type + payload + crc (NOT including length itself)
//! - **type**: record type tag (forward compatibility: unknown tags can be
//!   skipped without decoding the payload)
//! - **payload**: bincode-serialized record
//! - **crc32**: checksum over `[type][payload]`
//!
//! Both the transaction log and dump data files use this frame; the tag
//! space differs per file kind.

use crc32fast::Hasher;
use granary_core::{GranaryError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Smallest possible frame body: type(1) + empty payload + crc(4)
const MIN_BODY_LEN: u32 = 5;

/// Largest frame body accepted when decoding
///
/// A length above this is treated as corruption rather than attempted as
/// an allocation.
const MAX_BODY_LEN: u32 = 256 * 1024 * 1024;

/// Encode a record into a checksummed frame
pub fn encode_frame<T: Serialize>(type_tag: u8, record: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)
        .map_err(|e| GranaryError::io(format!("failed to encode record: {}", e)))?;

    let body_len = 1 + payload.len() + 4;
    let mut buf = Vec::with_capacity(4 + body_len);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    buf.push(type_tag);
    buf.extend_from_slice(&payload);

    let mut hasher = Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(&payload);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());

    Ok(buf)
}

/// One decoded frame
#[derive(Debug)]
pub struct Frame<T> {
    /// The record type tag
    pub type_tag: u8,
    /// The decoded record
    pub record: T,
    /// Total encoded size, length prefix included
    pub encoded_len: usize,
}

/// Outcome of pulling one frame off a byte slice
#[derive(Debug)]
pub enum DecodeOutcome<T> {
    /// A complete, valid frame
    Frame(Frame<T>),
    /// The slice is empty: clean end of input
    End,
    /// The slice ends mid-frame: a torn write at the tail
    Truncated,
    /// The frame is structurally invalid or fails its checksum
    Corrupt {
        /// What failed
        reason: String,
    },
}

/// Decode the frame at the start of `buf`
pub fn decode_frame<T: DeserializeOwned>(buf: &[u8]) -> DecodeOutcome<T> {
    if buf.is_empty() {
        return DecodeOutcome::End;
    }
    if buf.len() < 4 {
        return DecodeOutcome::Truncated;
    }
    let body_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if !(MIN_BODY_LEN..=MAX_BODY_LEN).contains(&body_len) {
        return DecodeOutcome::Corrupt {
            reason: format!("implausible frame length {}", body_len),
        };
    }
    let body_len = body_len as usize;
    if buf.len() < 4 + body_len {
        return DecodeOutcome::Truncated;
    }

    let body = &buf[4..4 + body_len];
    let type_tag = body[0];
    let payload = &body[1..body_len - 4];
    let stored_crc = u32::from_le_bytes([
        body[body_len - 4],
        body[body_len - 3],
        body[body_len - 2],
        body[body_len - 1],
    ]);

    let mut hasher = Hasher::new();
    hasher.update(&body[..body_len - 4]);
    if hasher.finalize() != stored_crc {
        return DecodeOutcome::Corrupt {
            reason: "crc mismatch".to_string(),
        };
    }

    match bincode::deserialize(payload) {
        Ok(record) => DecodeOutcome::Frame(Frame {
            type_tag,
            record,
            encoded_len: 4 + body_len,
        }),
        Err(e) => DecodeOutcome::Corrupt {
            reason: format!("payload does not decode: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let buf = encode_frame(7, &("hello".to_string(), 42u64)).unwrap();
        match decode_frame::<(String, u64)>(&buf) {
            DecodeOutcome::Frame(f) => {
                assert_eq!(f.type_tag, 7);
                assert_eq!(f.record, ("hello".to_string(), 42));
                assert_eq!(f.encoded_len, buf.len());
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn bit_flip_is_detected() {
        let mut buf = encode_frame(1, &"payload".to_string()).unwrap();
        let mid = buf.len() / 2;
        buf[mid] ^= 0x40;
        assert!(matches!(
            decode_frame::<String>(&buf),
            DecodeOutcome::Corrupt { .. }
        ));
    }

    #[test]
    fn torn_tail_is_truncated_not_corrupt() {
        let buf = encode_frame(1, &"payload".to_string()).unwrap();
        for cut in 1..buf.len() {
            match decode_frame::<String>(&buf[..cut]) {
                DecodeOutcome::Truncated => {}
                DecodeOutcome::Corrupt { .. } if cut >= 4 => {
                    panic!("prefix of a valid frame misread as corrupt at {}", cut)
                }
                other => panic!("unexpected outcome {:?} at {}", other, cut),
            }
        }
    }

    #[test]
    fn implausible_length_is_corrupt() {
        let mut buf = encode_frame(1, &1u8).unwrap();
        buf[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_frame::<u8>(&buf),
            DecodeOutcome::Corrupt { .. }
        ));
    }

    #[test]
    fn empty_input_is_end() {
        assert!(matches!(decode_frame::<u8>(&[]), DecodeOutcome::End));
    }
}
