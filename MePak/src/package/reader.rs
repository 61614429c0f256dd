//! Table parsing for a package body

use std::io::{Cursor, ErrorKind as IoErrorKind, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::chunk::{ChunkDialect, ChunkTableLocation};
use super::header::PackageHeader;
use super::tables::{ExportEntry, ImportEntry};
use crate::error::{Error, Result};
use crate::utils::read_unreal_string;

// Cap for up-front allocations driven by header counts.
const PREALLOCATE_LIMIT: u32 = 0x10000;

/// Name, import and export tables of a package, with payloads loaded.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub names: Vec<String>,
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<ExportEntry>,
    pub dependency_marker: u32,
}

/// Read the tables following an already parsed header.
///
/// Compressed bodies are decompressed in memory first; the table offsets in
/// the header refer to the decompressed image.
pub(crate) fn read_body<R: Read + Seek>(reader: &mut R, header: &PackageHeader) -> Result<Tables> {
    if header.flags.is_compressed() && !header.chunks.is_empty() {
        let dialect = ChunkDialect::Located(ChunkTableLocation::at(header.compression_info_offset));
        let flat = dialect.decompress(reader)?;
        tracing::debug!("Decompressed package body to {} bytes", flat.len());
        return read_tables(&mut Cursor::new(flat), header);
    }
    read_tables(reader, header)
}

fn read_tables<R: Read + Seek>(reader: &mut R, header: &PackageHeader) -> Result<Tables> {
    let trailer = header.game.name_trailer_len() as i64;

    reader.seek(SeekFrom::Start(u64::from(header.name_offset)))?;
    let mut names = Vec::with_capacity(header.name_count.min(PREALLOCATE_LIMIT) as usize);
    for _ in 0..header.name_count {
        names.push(read_unreal_string(reader)?);
        reader.seek(SeekFrom::Current(trailer))?;
    }

    reader.seek(SeekFrom::Start(u64::from(header.import_offset)))?;
    let mut imports = Vec::with_capacity(header.import_count.min(PREALLOCATE_LIMIT) as usize);
    for index in 0..header.import_count as usize {
        imports.push(ImportEntry::read(reader, index)?);
    }

    reader.seek(SeekFrom::Start(u64::from(header.export_offset)))?;
    let mut exports = Vec::with_capacity(header.export_count.min(PREALLOCATE_LIMIT) as usize);
    for index in 0..header.export_count as usize {
        exports.push(ExportEntry::read(reader, index)?);
    }

    reader.seek(SeekFrom::Start(u64::from(header.dependency_table_offset)))?;
    let dependency_marker = match reader.read_u32::<LittleEndian>() {
        Ok(marker) => marker,
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => {
            tracing::warn!(
                "Dependency table at 0x{:X} is past the end of the package",
                header.dependency_table_offset
            );
            0
        }
        Err(e) => return Err(Error::Io(e)),
    };

    Ok(Tables {
        names,
        imports,
        exports,
        dependency_marker,
    })
}
