//! Error types for the plfread-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate,
//! with detailed error variants for different failure modes. Decode-layer errors
//! carry the byte offset or block index where they occurred so that a malformed
//! container can be diagnosed without knowledge of its internals.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for plfread operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all plfread operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read an input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The container header is structurally invalid
    #[error("invalid container header: {details}")]
    InvalidHeader {
        /// Detailed description of the violation
        details: String,
    },

    /// The container's top-level format version is outside the known families
    #[error("unsupported format version {raw}: known families are V14 through V20")]
    UnsupportedFormatVersion {
        /// The raw version value from the header
        raw: u32,
    },

    /// Fewer bytes remained than a decode step required
    #[error("truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedInput {
        /// Byte offset where the underrun occurred
        offset: usize,
        /// Number of bytes requested
        needed: usize,
        /// Number of bytes actually available
        available: usize,
    },

    /// Block framing is inconsistent with the container bounds or known patterns
    #[error("malformed block at offset {offset}: {details}")]
    MalformedBlock {
        /// Byte offset of the offending frame
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// A compressed block payload could not be inflated
    #[error("failed to decompress block {block_index}: {details}")]
    Decompression {
        /// Index of the block in framing order
        block_index: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// An embedded metadata schema is not well-formed XML
    #[error("failed to parse embedded schema: {details}")]
    SchemaParse {
        /// Detailed description of the issue
        details: String,
    },

    /// Signature verification failed while strict mode was enabled
    #[error("integrity check failed for block {block_index} at offset {offset}")]
    Integrity {
        /// Index of the block in framing order
        block_index: usize,
        /// Byte offset of the offending frame
        offset: usize,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new invalid header error
    pub fn invalid_header(details: impl Into<String>) -> Self {
        Self::InvalidHeader {
            details: details.into(),
        }
    }

    /// Creates a new truncated input error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedInput {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new malformed block error
    pub fn malformed_block(offset: usize, details: impl Into<String>) -> Self {
        Self::MalformedBlock {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new decompression error
    pub fn decompression(block_index: usize, details: impl Into<String>) -> Self {
        Self::Decompression {
            block_index,
            details: details.into(),
        }
    }

    /// Creates a new schema parse error
    pub fn schema_parse(details: impl Into<String>) -> Self {
        Self::SchemaParse {
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this is a leaf-level error that a lenient read may absorb.
    ///
    /// Decode-layer errors (`TruncatedInput`, `MalformedBlock`) always abort the
    /// read: the container is presumed corrupt and partial results are not
    /// trustworthy. Schema-level gaps can be recorded as notes instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SchemaParse { .. } | Self::Integrity { .. })
    }
}
