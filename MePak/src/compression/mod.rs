//! Block compression codecs
//!
//! Packages store a single 32-bit compression enum in their header. Chunk
//! blocks are (de)compressed through a [`BlockCodec`] selected from that enum.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

pub mod lzo;
pub mod zlib;

pub use lzo::LzoCodec;
pub use zlib::ZlibCodec;

/// Compression algorithm recorded in a package header.
///
/// The numeric values are fixed by the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum CompressionType {
    #[default]
    None,
    Zlib,
    Lzo,
}

impl CompressionType {
    /// Parse the on-disk enum value.
    ///
    /// # Errors
    /// Returns [`Error::UnknownCompressionType`] for anything other than 0, 1 or 2.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zlib),
            2 => Ok(CompressionType::Lzo),
            other => Err(Error::UnknownCompressionType(other)),
        }
    }

    /// Convert to the on-disk enum value.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            CompressionType::None => 0,
            CompressionType::Zlib => 1,
            CompressionType::Lzo => 2,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Zlib => "zlib",
            CompressionType::Lzo => "lzo",
        }
    }

    /// The codec for this compression type, or `None` for uncompressed data.
    #[must_use]
    pub fn codec(self) -> Option<&'static dyn BlockCodec> {
        match self {
            CompressionType::None => None,
            CompressionType::Zlib => Some(&ZlibCodec),
            CompressionType::Lzo => Some(&LzoCodec),
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A byte-block compressor/decompressor.
///
/// Implementations only wrap the algorithm; the size contract is enforced by
/// [`compress_block`] and [`decompress_block`].
pub trait BlockCodec: Sync {
    /// The header enum value this codec implements.
    fn compression_type(&self) -> CompressionType;

    /// Compress a whole block.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a whole block whose uncompressed size is known.
    fn decompress(&self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>>;
}

/// Compress one block.
///
/// # Errors
/// Returns [`Error::NoneCodec`] for [`CompressionType::None`], and
/// [`Error::EmptyCompressionOutput`] if the codec produced nothing for
/// non-empty input.
pub fn compress_block(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    let codec = compression.codec().ok_or(Error::NoneCodec)?;
    let compressed = codec.compress(data)?;
    if compressed.is_empty() && !data.is_empty() {
        return Err(Error::EmptyCompressionOutput { compression });
    }
    Ok(compressed)
}

/// Decompress one block, requiring exactly `uncompressed_size` output bytes.
///
/// # Errors
/// Returns [`Error::BlockSizeMismatch`] if the output length differs from the
/// declared size, or the codec's own error if the data is corrupt.
pub fn decompress_block(
    compression: CompressionType,
    compressed: &[u8],
    uncompressed_size: usize,
) -> Result<Vec<u8>> {
    let codec = compression.codec().ok_or(Error::NoneCodec)?;
    let data = codec.decompress(compressed, uncompressed_size)?;
    if data.len() != uncompressed_size {
        return Err(Error::BlockSizeMismatch {
            compression,
            expected: uncompressed_size,
            actual: data.len(),
        });
    }
    Ok(data)
}
