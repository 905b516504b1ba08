//! # Record Framing
//!
//! Every value written to the durable log (commit records and checkpoint
//! snapshots) is stored as a frame:
//!
//! - 4 bytes: Magic ("EMBR")
//! - 1 byte: Version
//! - postcard-serialized payload
//!
//! Size and header are validated before the payload is decoded. Any decode
//! failure is reported as `StoreCorrupt`, since it can only mean the bytes on
//! disk are not what this store wrote.

use crate::{GraphError, primitives};
use serde::Serialize;
use serde::de::DeserializeOwned;

// =============================================================================
// FRAME HEADER
// =============================================================================

/// The header that precedes every framed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl FrameHeader {
    /// Create a header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), GraphError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GraphError::StoreCorrupt("Invalid magic bytes".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GraphError::StoreCorrupt(format!(
                "Unsupported format version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; primitives::HEADER_LEN] {
        let mut bytes = [0u8; primitives::HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        if bytes.len() < primitives::HEADER_LEN {
            return Err(GraphError::StoreCorrupt(format!(
                "Record too short: {} bytes, header needs {}",
                bytes.len(),
                primitives::HEADER_LEN
            )));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Serialize `value` into a frame (header + payload).
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, GraphError> {
    let payload =
        postcard::to_stdvec(value).map_err(|e| GraphError::SerializationError(e.to_string()))?;

    if payload.len() + primitives::HEADER_LEN > primitives::MAX_RECORD_SIZE {
        return Err(GraphError::SerializationError(format!(
            "Record of {} bytes exceeds maximum {} bytes",
            payload.len(),
            primitives::MAX_RECORD_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(primitives::HEADER_LEN + payload.len());
    frame.extend_from_slice(&FrameHeader::new().to_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame produced by [`encode_frame`].
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GraphError> {
    if bytes.len() > primitives::MAX_RECORD_SIZE {
        return Err(GraphError::StoreCorrupt(format!(
            "Record of {} bytes exceeds maximum {} bytes",
            bytes.len(),
            primitives::MAX_RECORD_SIZE
        )));
    }

    let header = FrameHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[primitives::HEADER_LEN..])
        .map_err(|e| GraphError::StoreCorrupt(format!("Failed to decode record: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{CommitRecord, Mutation};
    use crate::{NodeId, TransactionId};

    fn record() -> CommitRecord {
        CommitRecord {
            sequence: 3,
            transaction: TransactionId(9),
            next_node_id: 1,
            next_relationship_id: 0,
            mutations: vec![Mutation::CreateNode { node: NodeId(0) }],
        }
    }

    #[test]
    fn frame_starts_with_header() {
        let bytes = encode_frame(&record()).expect("encode");
        assert_eq!(&bytes[0..4], primitives::MAGIC_BYTES);
        assert_eq!(bytes[4], primitives::FORMAT_VERSION);

        let decoded: CommitRecord = decode_frame(&bytes).expect("decode");
        assert_eq!(decoded, record());
    }

    #[test]
    fn invalid_magic_is_corruption() {
        let mut bytes = encode_frame(&record()).expect("encode");
        bytes[0..4].copy_from_slice(b"XXXX");

        let result: Result<CommitRecord, _> = decode_frame(&bytes);
        assert!(matches!(result, Err(GraphError::StoreCorrupt(_))));
    }

    #[test]
    fn future_version_is_corruption() {
        let mut bytes = encode_frame(&record()).expect("encode");
        bytes[4] = primitives::FORMAT_VERSION + 1;

        let result: Result<CommitRecord, _> = decode_frame(&bytes);
        assert!(matches!(result, Err(GraphError::StoreCorrupt(_))));
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let bytes = encode_frame(&record()).expect("encode");

        let short: Result<CommitRecord, _> = decode_frame(&bytes[..3]);
        assert!(matches!(short, Err(GraphError::StoreCorrupt(_))));

        let cut: Result<CommitRecord, _> = decode_frame(&bytes[..bytes.len() - 1]);
        assert!(matches!(cut, Err(GraphError::StoreCorrupt(_))));
    }
}
