//! Error types for `MePak`

use thiserror::Error;

use crate::compression::CompressionType;

/// Broad classification of an [`Error`].
///
/// None of these are retried inside the engine; every kind is a hard failure
/// for the operation that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stream-level I/O failure.
    Io,
    /// The bytes are not a package (or chunk) this engine understands.
    Format,
    /// A block failed to compress or decompress to its declared size.
    Codec,
    /// An internal table/offset invariant was violated.
    Consistency,
}

/// The error type for `MePak` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from stream or file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Format Errors ====================
    /// The stream does not start with the package tag.
    #[error("invalid package magic: expected 0x9E2A83C1, found 0x{found:08X}")]
    InvalidPackageMagic {
        /// The first four bytes of the stream.
        found: u32,
    },

    /// The version/licensee pair does not identify a supported game.
    #[error("unsupported package version {version}/{licensee}")]
    UnsupportedVersion {
        /// Engine version read at offset 4.
        version: u16,
        /// Licensee version read at offset 6.
        licensee: u16,
    },

    /// A compressed chunk does not start with the package tag.
    #[error("chunk {chunk}: invalid chunk magic 0x{found:08X}")]
    InvalidChunkMagic {
        /// Chunk index within the descriptor table.
        chunk: usize,
        /// The magic value found.
        found: u32,
    },

    /// A compressed chunk header or block table is not self-consistent.
    #[error("chunk {chunk}: {message}")]
    InvalidChunkHeader {
        /// Chunk index within the descriptor table.
        chunk: usize,
        /// Description of what is invalid.
        message: String,
    },

    /// The compression enum is not one of None/Zlib/LZO.
    #[error("unknown compression type: {0}")]
    UnknownCompressionType(u32),

    /// Full-file decompression was requested for a package that is not compressed.
    #[error("package is not compressed")]
    NotCompressed,

    /// A length-prefixed string could not be decoded.
    #[error("invalid string at offset {offset}: {message}")]
    InvalidString {
        /// Stream offset of the length prefix.
        offset: u64,
        /// Description of what is invalid.
        message: String,
    },

    /// A table count or offset in the header cannot describe a real table.
    #[error("invalid {table} table: {message}")]
    InvalidTable {
        /// Which table is affected.
        table: &'static str,
        /// Description of what is invalid.
        message: String,
    },

    // ==================== Codec Errors ====================
    /// A block decompressed to a different size than its header declared.
    #[error("{compression} block decompressed to {actual} bytes, expected {expected}")]
    BlockSizeMismatch {
        /// Codec used for the block.
        compression: CompressionType,
        /// Declared uncompressed size.
        expected: usize,
        /// Actual decompressed size.
        actual: usize,
    },

    /// The compressor returned no bytes for non-empty input.
    #[error("{compression} compressor returned no bytes")]
    EmptyCompressionOutput {
        /// Codec used for the block.
        compression: CompressionType,
    },

    /// Zlib (de)compression failed.
    #[error("Zlib failure: {message}")]
    Zlib {
        /// The error message.
        message: String,
    },

    /// LZO (de)compression failed.
    #[error("LZO failure: {message}")]
    Lzo {
        /// The error message.
        message: String,
    },

    /// Blocks cannot be (de)compressed with compression type None.
    #[error("compression type None cannot be used for chunk blocks")]
    NoneCodec,

    // ==================== Consistency Errors ====================
    /// A compressed save was requested but no chunks were prepared.
    #[error("cannot write a compressed header without chunks")]
    NoChunksPrepared,

    /// An index into one of the tables is out of range.
    #[error("{table} index {index} out of range (count {count})")]
    IndexOutOfRange {
        /// Which table was indexed.
        table: &'static str,
        /// The requested index.
        index: i64,
        /// Number of entries in the table.
        count: usize,
    },

    /// An export's property block could not be walked.
    #[error("export {export}: malformed property data: {message}")]
    MalformedProperties {
        /// Zero-based export index.
        export: usize,
        /// Description of what is invalid.
        message: String,
    },

    /// A relocation walk reached outside the export payload.
    #[error("{class} relocation reached offset {offset} outside payload of {len} bytes")]
    RelocationOutOfBounds {
        /// Class of the export being relocated.
        class: String,
        /// Offset inside the payload that was accessed.
        offset: usize,
        /// Payload length.
        len: usize,
    },

    /// A computed offset or size does not fit the 32-bit on-disk field.
    #[error("{what} does not fit in a 32-bit field: {value}")]
    LayoutOverflow {
        /// Which value overflowed.
        what: &'static str,
        /// The value.
        value: u64,
    },

    /// A serialized section did not come out at its planned size.
    #[error("{section} is {actual} bytes, layout planned {expected}")]
    LayoutMismatch {
        /// Which section of the package.
        section: &'static str,
        /// Planned size or end offset.
        expected: usize,
        /// Actual size or end offset.
        actual: usize,
    },

    /// The package was opened header-only and has no tables to operate on.
    #[error("package was opened header-only")]
    HeaderOnly,

    /// A save path has no usable parent directory.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::InvalidPath(_) => ErrorKind::Io,
            Error::InvalidPackageMagic { .. }
            | Error::UnsupportedVersion { .. }
            | Error::InvalidChunkMagic { .. }
            | Error::InvalidChunkHeader { .. }
            | Error::UnknownCompressionType(_)
            | Error::NotCompressed
            | Error::InvalidString { .. }
            | Error::InvalidTable { .. } => ErrorKind::Format,
            Error::BlockSizeMismatch { .. }
            | Error::EmptyCompressionOutput { .. }
            | Error::Zlib { .. }
            | Error::Lzo { .. }
            | Error::NoneCodec => ErrorKind::Codec,
            Error::NoChunksPrepared
            | Error::IndexOutOfRange { .. }
            | Error::MalformedProperties { .. }
            | Error::RelocationOutOfBounds { .. }
            | Error::LayoutOverflow { .. }
            | Error::LayoutMismatch { .. }
            | Error::HeaderOnly => ErrorKind::Consistency,
        }
    }

    /// Returns true for bad magic, unknown versions and malformed chunk framing.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        self.kind() == ErrorKind::Format
    }
}

/// A specialized Result type for `MePak` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InvalidPackageMagic { found: 0 }.kind(), ErrorKind::Format);
        assert_eq!(
            Error::EmptyCompressionOutput { compression: CompressionType::Lzo }.kind(),
            ErrorKind::Codec
        );
        assert_eq!(Error::NoChunksPrepared.kind(), ErrorKind::Consistency);
        assert!(Error::UnsupportedVersion { version: 1, licensee: 2 }.is_format_error());
    }
}
