//! Zlib block codec (compression type 1)

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{Error, Result};

use super::{BlockCodec, CompressionType};

/// Zlib codec, the general-purpose choice and the ME3 default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec;

impl BlockCodec for ZlibCodec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Zlib
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder.write_all(data)?;
        encoder.finish().map_err(|e| Error::Zlib {
            message: e.to_string(),
        })
    }

    fn decompress(&self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        // One byte past the declared size is enough to report a mismatch.
        let mut decoder = ZlibDecoder::new(compressed).take(uncompressed_size as u64 + 1);
        let mut decompressed = Vec::with_capacity(uncompressed_size);

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::Zlib {
                message: e.to_string(),
            })?;

        Ok(decompressed)
    }
}
