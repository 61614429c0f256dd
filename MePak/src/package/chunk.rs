//! Chunk/block compression framing
//!
//! A compressed package stores its uncompressed image as a sequence of chunks.
//! Each chunk is framed as:
//!
//! ```text
//! u32 magic (0x9E2A83C1)
//! u32 block size (MAX_BLOCK_SIZE)
//! u32 sum of block compressed sizes
//! u32 chunk uncompressed size
//! (u32 compressed, u32 uncompressed) per block
//! concatenated compressed block payloads
//! ```
//!
//! Block work is independent, so blocks are (de)compressed with rayon and the
//! results are placed at offsets computed before the parallel region starts.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rayon::prelude::*;
use serde::Serialize;

use super::types::PackageFlags;
use super::PACKAGE_TAG;
use crate::compression::{self, CompressionType};
use crate::error::{Error, Result};

/// Largest uncompressed size a chunk accumulates before a new one is started.
pub const MAX_CHUNK_SIZE: usize = 0x100000;
/// Uncompressed size of every block except the last one of a chunk.
pub const MAX_BLOCK_SIZE: usize = 0x20000;
pub const CHUNK_HEADER_SIZE: usize = 16;
pub const BLOCK_HEADER_SIZE: usize = 8;

/// One entry of the chunk table stored in the package header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChunkDescriptor {
    pub uncompressed_offset: u32,
    pub uncompressed_size: u32,
    pub compressed_offset: u32,
    /// Length of the framed chunk, headers included.
    pub compressed_size: u32,
}

impl ChunkDescriptor {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            uncompressed_offset: reader.read_u32::<LittleEndian>()?,
            uncompressed_size: reader.read_u32::<LittleEndian>()?,
            compressed_offset: reader.read_u32::<LittleEndian>()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.uncompressed_offset)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u32::<LittleEndian>(self.compressed_offset)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        Ok(())
    }
}

/// A compressed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub uncompressed_size: u32,
    pub data: Vec<u8>,
}

impl Block {
    #[must_use]
    pub fn compressed_size(&self) -> u32 {
        self.data.len() as u32
    }
}

/// A compressed chunk, ready to be framed into the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub uncompressed_offset: u32,
    pub uncompressed_size: u32,
    pub blocks: Vec<Block>,
}

impl Chunk {
    /// Number of blocks a chunk of `uncompressed_size` bytes is split into.
    #[must_use]
    pub fn block_count_for(uncompressed_size: usize) -> usize {
        uncompressed_size.div_ceil(MAX_BLOCK_SIZE)
    }

    /// Sum of the compressed block sizes, as written in the chunk header.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }

    /// Length of the framed chunk.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        CHUNK_HEADER_SIZE + BLOCK_HEADER_SIZE * self.blocks.len() + self.payload_size()
    }

    /// Table entry for this chunk once placed at `compressed_offset`.
    pub fn descriptor(&self, compressed_offset: usize) -> Result<ChunkDescriptor> {
        Ok(ChunkDescriptor {
            uncompressed_offset: self.uncompressed_offset,
            uncompressed_size: self.uncompressed_size,
            compressed_offset: to_u32("chunk compressed offset", compressed_offset)?,
            compressed_size: to_u32("chunk compressed size", self.encoded_len())?,
        })
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(PACKAGE_TAG)?;
        writer.write_u32::<LittleEndian>(MAX_BLOCK_SIZE as u32)?;
        writer.write_u32::<LittleEndian>(to_u32("chunk payload size", self.payload_size())?)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        for block in &self.blocks {
            writer.write_u32::<LittleEndian>(block.compressed_size())?;
            writer.write_u32::<LittleEndian>(block.uncompressed_size)?;
        }
        for block in &self.blocks {
            writer.write_all(&block.data)?;
        }
        Ok(())
    }
}

/// Group the table region and export payloads into chunk spans.
///
/// The table region is always its own leading chunk. Payloads are packed in
/// order until adding the next one would exceed [`MAX_CHUNK_SIZE`]; a payload
/// larger than that gets a chunk of its own. Spans never split a payload.
#[must_use]
pub fn plan_chunk_spans(table: Range<usize>, payloads: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if !table.is_empty() {
        spans.push(table);
    }

    let mut current: Option<Range<usize>> = None;
    for payload in payloads.iter().filter(|p| !p.is_empty()) {
        current = match current {
            Some(span) if payload.end - span.start <= MAX_CHUNK_SIZE => Some(span.start..payload.end),
            Some(span) => {
                spans.push(span);
                Some(payload.clone())
            }
            None => Some(payload.clone()),
        };
    }
    if let Some(span) = current {
        spans.push(span);
    }
    spans
}

/// Compress one span of the uncompressed image into a chunk.
///
/// Blocks are compressed in parallel; the first failure aborts the chunk.
pub fn compress_chunk(image: &[u8], span: Range<usize>, compression: CompressionType) -> Result<Chunk> {
    let (start, end) = (span.start, span.end);
    let data = image.get(span).ok_or(Error::LayoutOverflow {
        what: "chunk span end",
        value: end as u64,
    })?;

    let blocks = data
        .par_chunks(MAX_BLOCK_SIZE)
        .map(|block| {
            Ok(Block {
                uncompressed_size: block.len() as u32,
                data: compression::compress_block(compression, block)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Chunk {
        uncompressed_offset: to_u32("chunk uncompressed offset", start)?,
        uncompressed_size: to_u32("chunk uncompressed size", data.len())?,
        blocks,
    })
}

/// Compress the uncompressed image into chunks following [`plan_chunk_spans`].
pub fn compress(
    image: &[u8],
    table: Range<usize>,
    payloads: &[Range<usize>],
    compression: CompressionType,
) -> Result<Vec<Chunk>> {
    if compression == CompressionType::None {
        return Err(Error::NoneCodec);
    }
    let spans = plan_chunk_spans(table, payloads);
    let chunks = spans
        .into_iter()
        .map(|span| compress_chunk(image, span, compression))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        "Compressed {} bytes into {} {compression} chunks ({} blocks)",
        image.len(),
        chunks.len(),
        chunks.iter().map(|c| c.blocks.len()).sum::<usize>()
    );
    Ok(chunks)
}

/// Where the compression enum and chunk table live in a stream.
///
/// `compression` and `chunk_count` are read from the stream when `None`.
/// A field given up front is not present in the stream, so `offset` points
/// at the first field that is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTableLocation {
    pub offset: u64,
    pub compression: Option<CompressionType>,
    pub chunk_count: Option<u32>,
}

impl ChunkTableLocation {
    /// Table at `offset`, with compression enum and count read from the stream.
    #[must_use]
    pub fn at(offset: u64) -> Self {
        Self {
            offset,
            compression: None,
            chunk_count: None,
        }
    }

    /// Read the compression type and descriptor table.
    pub fn read_table<R: Read + Seek>(&self, reader: &mut R) -> Result<(CompressionType, Vec<ChunkDescriptor>)> {
        reader.seek(SeekFrom::Start(self.offset))?;
        let compression = match self.compression {
            Some(compression) => compression,
            None => CompressionType::from_u32(reader.read_u32::<LittleEndian>()?)?,
        };
        let count = match self.chunk_count {
            Some(count) => count,
            None => reader.read_u32::<LittleEndian>()?,
        };
        let mut descriptors = Vec::new();
        for _ in 0..count {
            descriptors.push(ChunkDescriptor::read(reader)?);
        }
        Ok((compression, descriptors))
    }
}

/// The two chunk-table layouts found in the wild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDialect {
    /// Chunk table at a known stream offset. Produces the flat data region:
    /// every chunk scattered at its uncompressed offset, zeros before the first.
    Located(ChunkTableLocation),
    /// ME3 full-file compression. Produces a complete uncompressed package
    /// image, header included, that can be opened directly.
    Me3FullFile,
}

impl ChunkDialect {
    pub fn decompress<R: Read + Seek>(&self, reader: &mut R) -> Result<Vec<u8>> {
        match self {
            ChunkDialect::Located(location) => {
                let (compression, descriptors) = location.read_table(reader)?;
                decompress(reader, compression, &descriptors)
            }
            ChunkDialect::Me3FullFile => decompress_full_file_me3(reader),
        }
    }
}

/// Decompress the chunks described by `descriptors` into a flat buffer.
pub fn decompress<R: Read + Seek>(
    reader: &mut R,
    compression: CompressionType,
    descriptors: &[ChunkDescriptor],
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    decompress_into(reader, compression, descriptors, &mut output)?;
    Ok(output)
}

/// Decompress an ME3 package whose whole body is chunk-compressed.
///
/// The header is walked with fixed skips to find the chunk table. The output
/// keeps the header with a zero chunk count, followed by the chunk contents at
/// their uncompressed offsets.
pub fn decompress_full_file_me3<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(0))?;
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != PACKAGE_TAG {
        return Err(Error::InvalidPackageMagic { found: magic });
    }
    let version = reader.read_u16::<LittleEndian>()?;
    let licensee = reader.read_u16::<LittleEndian>()?;
    if (version, licensee) != (684, 194) {
        return Err(Error::UnsupportedVersion { version, licensee });
    }

    // full header size
    reader.seek(SeekFrom::Current(4))?;
    let folder_len = reader.read_i32::<LittleEndian>()?;
    let folder_bytes = if folder_len >= 0 {
        i64::from(folder_len)
    } else {
        -i64::from(folder_len) * 2
    };
    reader.seek(SeekFrom::Current(folder_bytes))?;

    let flags = PackageFlags(reader.read_u32::<LittleEndian>()?);
    if !flags.is_compressed() {
        return Err(Error::NotCompressed);
    }
    if flags.is_cooked() {
        reader.seek(SeekFrom::Current(4))?;
    }

    // name count, name offset
    let _name_count = reader.read_u32::<LittleEndian>()?;
    let name_offset = reader.read_u32::<LittleEndian>()?;
    // export/import tables, dependency offset, guid offsets, package guid
    reader.seek(SeekFrom::Current(52))?;
    let generations = reader.read_u32::<LittleEndian>()?;
    // versions, unknown6, constant, compression type
    reader.seek(SeekFrom::Current(i64::from(generations) * 12 + 20))?;

    let prefix_len = reader.stream_position()?;
    let chunk_count = reader.read_u32::<LittleEndian>()?;
    let mut descriptors = Vec::new();
    for _ in 0..chunk_count {
        descriptors.push(ChunkDescriptor::read(reader)?);
    }
    let table_end = reader.stream_position()?;

    let mut output = vec![0u8; prefix_len as usize];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut output)?;
    output.write_u32::<LittleEndian>(0)?;

    // package source, additional package count
    reader.seek(SeekFrom::Start(table_end))?;
    let mut trailer = [0u8; 8];
    reader.read_exact(&mut trailer)?;
    output.extend_from_slice(&trailer);

    if flags.contains(PackageFlags::EXTRA_NAME_LIST) {
        let extra = u64::from(name_offset).saturating_sub(output.len() as u64);
        let read = reader.by_ref().take(extra).read_to_end(&mut output)? as u64;
        if read != extra {
            return Err(Error::InvalidTable {
                table: "name",
                message: format!("extra name region of {extra} bytes is truncated to {read}"),
            });
        }
    }

    decompress_into(reader, CompressionType::Zlib, &descriptors, &mut output)?;
    tracing::debug!(
        "Decompressed ME3 full-file package: {} chunks, {} bytes",
        descriptors.len(),
        output.len()
    );
    Ok(output)
}

/// A block located inside a chunk buffer, with its destination in the output.
struct PendingBlock {
    chunk: usize,
    source: Range<usize>,
    destination: usize,
    uncompressed_size: usize,
}

fn decompress_into<R: Read + Seek>(
    reader: &mut R,
    compression: CompressionType,
    descriptors: &[ChunkDescriptor],
    output: &mut Vec<u8>,
) -> Result<()> {
    let stream_len = stream_len(reader)?;
    let mut buffers = Vec::with_capacity(descriptors.len());
    let mut pending = Vec::new();
    // Uncompressed bytes the chunks read so far account for.
    let mut produced = 0u64;

    for (index, descriptor) in descriptors.iter().enumerate() {
        let invalid = |message: String| Error::InvalidChunkHeader { chunk: index, message };
        let compressed_end = u64::from(descriptor.compressed_offset) + u64::from(descriptor.compressed_size);
        if compressed_end > stream_len {
            return Err(invalid(format!(
                "chunk spans 0x{:X}..0x{compressed_end:X}, stream is 0x{stream_len:X} bytes",
                descriptor.compressed_offset
            )));
        }
        if u64::from(descriptor.uncompressed_offset) > stream_len + produced {
            return Err(invalid(format!(
                "uncompressed offset 0x{:X} is past any data the stream can produce",
                descriptor.uncompressed_offset
            )));
        }

        reader.seek(SeekFrom::Start(u64::from(descriptor.compressed_offset)))?;
        let mut buffer = vec![0u8; descriptor.compressed_size as usize];
        reader.read_exact(&mut buffer)?;
        locate_blocks(index, descriptor, &buffer, &mut pending)?;
        buffers.push(buffer);
        produced += u64::from(descriptor.uncompressed_size);
    }

    // Output is only grown once every block has really decompressed.
    let decompressed = pending
        .par_iter()
        .map(|block| {
            compression::decompress_block(
                compression,
                &buffers[block.chunk][block.source.clone()],
                block.uncompressed_size,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let end = descriptors
        .iter()
        .map(|d| d.uncompressed_offset as usize + d.uncompressed_size as usize)
        .max()
        .unwrap_or(0);
    if output.len() < end {
        output.resize(end, 0);
    }

    for (block, data) in pending.iter().zip(decompressed) {
        output[block.destination..block.destination + data.len()].copy_from_slice(&data);
    }

    tracing::debug!(
        "Decompressed {} {compression} chunks ({} blocks)",
        descriptors.len(),
        pending.len()
    );
    Ok(())
}

fn stream_len<R: Seek>(reader: &mut R) -> Result<u64> {
    let position = reader.stream_position()?;
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(position))?;
    Ok(len)
}

/// Parse a chunk header and block table, queueing every block for decompression.
fn locate_blocks(
    index: usize,
    descriptor: &ChunkDescriptor,
    buffer: &[u8],
    pending: &mut Vec<PendingBlock>,
) -> Result<()> {
    let invalid = |message: String| Error::InvalidChunkHeader { chunk: index, message };

    if buffer.len() < CHUNK_HEADER_SIZE {
        return Err(invalid(format!("chunk is only {} bytes", buffer.len())));
    }
    let mut cursor = Cursor::new(buffer);
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != PACKAGE_TAG {
        return Err(Error::InvalidChunkMagic { chunk: index, found: magic });
    }
    let block_size = cursor.read_u32::<LittleEndian>()? as usize;
    let _payload_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()? as usize;

    if uncompressed_size != descriptor.uncompressed_size as usize {
        return Err(invalid(format!(
            "header declares {uncompressed_size} bytes, table declares {}",
            descriptor.uncompressed_size
        )));
    }
    if uncompressed_size == 0 {
        return Ok(());
    }
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(invalid(format!("block size 0x{block_size:X} is out of range")));
    }

    let block_count = uncompressed_size.div_ceil(block_size);
    let mut data_start = CHUNK_HEADER_SIZE + block_count * BLOCK_HEADER_SIZE;
    if data_start > buffer.len() {
        return Err(invalid(format!("{block_count} block headers exceed chunk length")));
    }

    let mut destination = descriptor.uncompressed_offset as usize;
    let mut total = 0usize;
    for _ in 0..block_count {
        let compressed = cursor.read_u32::<LittleEndian>()? as usize;
        let size = cursor.read_u32::<LittleEndian>()? as usize;
        if size > block_size {
            return Err(invalid(format!("block of {size} bytes exceeds block size {block_size}")));
        }
        let source = data_start..data_start + compressed;
        if source.end > buffer.len() {
            return Err(invalid("block data exceeds chunk length".to_string()));
        }
        pending.push(PendingBlock {
            chunk: index,
            source,
            destination,
            uncompressed_size: size,
        });
        data_start += compressed;
        destination += size;
        total += size;
    }

    if total != uncompressed_size {
        return Err(invalid(format!(
            "blocks sum to {total} bytes, chunk declares {uncompressed_size}"
        )));
    }
    Ok(())
}

fn to_u32(what: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::LayoutOverflow { what, value: value as u64 })
}
