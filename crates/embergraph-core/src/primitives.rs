//! # Store Primitives
//!
//! Hardcoded constants for the embergraph core.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Tunables that operators may change live in `config::StoreConfig` instead.

/// Magic bytes for every framed record written by the store.
///
/// - Frame = Magic Bytes ("EMBR") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"EMBR";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the record format.
pub const FORMAT_VERSION: u8 = 1;

/// Length of the frame header (magic + version).
pub const HEADER_LEN: usize = 5;

/// File name of the redb database inside the store directory.
pub const STORE_FILE_NAME: &str = "graph.redb";

/// Default bound on waiting for the commit gate, in milliseconds.
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 5_000;

/// Default bound on waiting for in-flight transactions during close, in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for property keys.
///
/// This prevents memory exhaustion from malicious or malformed input.
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum length for string property values (64KB).
pub const MAX_STRING_VALUE_LENGTH: usize = 65536;

/// Maximum length for index names and relationship type names.
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum size of a single framed record (WAL entry or snapshot).
///
/// Validated BEFORE attempting deserialization.
pub const MAX_RECORD_SIZE: usize = 512 * 1024 * 1024;
