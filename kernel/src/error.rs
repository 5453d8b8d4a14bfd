// Codec Errors
//
// Every encode/decode failure is terminal for the record in progress.
// Nothing here is retried or recovered internally.

use std::io;

/// Errors produced while encoding or decoding a durable record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A value is longer than its fixed-width header can describe.
    #[error("encoding overflow: {len} bytes exceeds maximum of {max}")]
    EncodingOverflow { len: u64, max: u64 },

    /// The source ran out before the record was complete.
    #[error("truncated stream: needed {needed} bytes, only {available} available")]
    TruncatedStream { needed: u64, available: u64 },

    /// A fallback document does not fit the target type.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Bytes could not be turned into a value (bad UTF-8, bad tag, malformed document).
    #[error("codec failure: {0}")]
    CodecFailure(String),

    /// The sink or source itself failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// True when the failure means the stream ended early.
    pub fn is_truncation(&self) -> bool {
        matches!(self, CodecError::TruncatedStream { .. })
    }
}
