//! Error types for Coulomb.

use thiserror::Error;

/// Errors produced while encoding or decoding the binary stats formats.
///
/// Any decode error means the buffer as a whole is untrusted: callers must
/// discard the persisted state entirely rather than keep a partial load.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unexpected end of buffer at offset {0}")]
    UnexpectedEof(usize),

    #[error("bad magic: got {got:#010x}, expected {expected:#010x}")]
    BadMagic { got: u32, expected: u32 },

    #[error("version mismatch: got {got}, expected {expected}")]
    VersionMismatch { got: u32, expected: u32 },

    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in string field at offset {0}")]
    InvalidUtf8(usize),

    #[error("string length {0} exceeds buffer")]
    StringTooLong(u32),
}

/// Errors from the on-disk stats store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to back up previous stats file: {0}")]
    Backup(std::io::Error),
}
