//! LZO1X block codec (compression type 2)

use crate::error::{Error, Result};

use super::{BlockCodec, CompressionType};

/// LZO1X codec, used by ME1/ME2-era packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LzoCodec;

impl BlockCodec for LzoCodec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Lzo
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lzokay_native::compress(data).map_err(|e| Error::Lzo {
            message: format!("{e:?}"),
        })
    }

    fn decompress(&self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        if compressed.is_empty() && uncompressed_size == 0 {
            return Ok(Vec::new());
        }

        lzokay_native::decompress_all(compressed, Some(uncompressed_size)).map_err(|e| {
            Error::Lzo {
                message: format!("{e:?}"),
            }
        })
    }
}
