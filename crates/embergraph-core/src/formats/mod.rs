//! # Formats
//!
//! Byte-level encodings used by the durable log.

pub mod persistence;

pub use persistence::{FrameHeader, decode_frame, encode_frame};
