//! Package serialization
//!
//! Saving happens in two phases. A layout plan computes every offset from the
//! known section sizes, then the image is written front to back in one pass.
//! A compressed save chunk-compresses that image and writes the header with
//! the final chunk table ahead of the chunks.

use std::ops::Range;

use byteorder::{LittleEndian, WriteBytesExt};
use rayon::prelude::*;

use super::chunk::{self, ChunkDescriptor};
use super::header::PackageHeader;
use super::options::SaveOptions;
use super::relocate::relocate_payload;
use super::tables::{Entry, ExportEntry};
use super::types::{MeGame, PackageFlags};
use super::Package;
use crate::compression::CompressionType;
use crate::error::{Error, Result};
use crate::utils::{write_unreal_string_ascii, write_unreal_string_unicode};

/// Offsets of every section in the uncompressed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub header_len: usize,
    pub name_offset: u32,
    pub import_offset: u32,
    pub export_offset: u32,
    pub dependency_table_offset: u32,
    pub full_header_size: u32,
    pub export_header_offsets: Vec<u32>,
    pub export_data_offsets: Vec<u32>,
    pub total_len: usize,
}

impl LayoutPlan {
    /// Range of export `index`'s payload in the uncompressed image.
    #[must_use]
    pub fn payload_range(&self, index: usize, len: usize) -> Range<usize> {
        let start = self.export_data_offsets[index] as usize;
        start..start + len
    }
}

/// Result of serializing a package.
#[derive(Debug, Clone)]
pub struct WrittenPackage {
    /// The file contents.
    pub bytes: Vec<u8>,
    /// The header as written, including the chunk table for compressed saves.
    pub header: PackageHeader,
    pub plan: LayoutPlan,
    pub compression: CompressionType,
    /// Whether the additional packages list was written.
    pub wrote_additional_packages: bool,
    /// Patched payload per export, `None` where nothing was relocated.
    pub relocated: Vec<Option<Vec<u8>>>,
}

/// Serialize `package` without modifying it.
pub fn write_package(package: &Package, options: &SaveOptions) -> Result<WrittenPackage> {
    let game = package.game();
    let compression = options.resolve_compression(game);
    let write_additional =
        options.include_additional_packages_to_cook || !package.is_compressed_on_disk();

    let exports = package.exports();
    let names_bytes = encode_names(game, package.names())?;
    let mut import_bytes = Vec::new();
    for import in package.imports() {
        import.write(&mut import_bytes)?;
    }

    let mut header = package.header().clone();
    header.flags = header
        .flags
        .with(PackageFlags::COMPRESSED, compression != CompressionType::None);
    header.compression = CompressionType::None;
    header.chunks.clear();
    header.name_count = to_u32("name count", package.names().len())?;
    header.import_count = to_u32("import count", package.imports().len())?;
    header.export_count = to_u32("export count", exports.len())?;

    let plan = plan_layout(
        header.encoded_len(write_additional)?,
        names_bytes.len(),
        import_bytes.len(),
        exports,
        package.dependency_marker(),
    )?;

    header.name_offset = plan.name_offset;
    header.import_offset = plan.import_offset;
    header.export_offset = plan.export_offset;
    header.dependency_table_offset = plan.dependency_table_offset;
    header.full_header_size = plan.full_header_size;
    header.import_export_guids_offset = if game == MeGame::Me3 { plan.full_header_size } else { 0 };

    let relocated = (0..exports.len())
        .into_par_iter()
        .map(|index| {
            let export = &exports[index];
            let uindex = export.uindex();
            relocate_payload(
                game,
                package.names(),
                export,
                &package.class_name(uindex)?,
                &package.object_name(uindex)?,
                plan.export_data_offsets[index],
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let mut image = Vec::with_capacity(plan.total_len);
    header.write(&mut image, write_additional)?;
    expect_len("header", plan.header_len, image.len())?;
    image.extend_from_slice(&names_bytes);
    image.extend_from_slice(&import_bytes);
    for (index, export) in exports.iter().enumerate() {
        let size = to_u32("export data size", export.data().len())?;
        image.extend_from_slice(&export.header_for_layout(size, plan.export_data_offsets[index]));
    }
    expect_len("table region", plan.dependency_table_offset as usize, image.len())?;
    let dependency_entries = if package.dependency_marker() > 0 { exports.len() } else { 1 };
    for _ in 0..dependency_entries {
        image.write_i32::<LittleEndian>(0)?;
    }
    expect_len("full header", plan.full_header_size as usize, image.len())?;
    for (export, patched) in exports.iter().zip(&relocated) {
        image.extend_from_slice(patched.as_deref().unwrap_or(export.data()));
    }
    expect_len("package image", plan.total_len, image.len())?;

    if compression == CompressionType::None {
        tracing::debug!("Serialized uncompressed {game} package: {} bytes", image.len());
        return Ok(WrittenPackage {
            bytes: image,
            header,
            plan,
            compression,
            wrote_additional_packages: write_additional,
            relocated,
        });
    }

    let table = plan.name_offset as usize..plan.full_header_size as usize;
    let payloads: Vec<Range<usize>> = exports
        .iter()
        .enumerate()
        .map(|(index, export)| plan.payload_range(index, export.data().len()))
        .collect();
    let chunks = chunk::compress(&image, table, &payloads, compression)?;

    header.compression = compression;
    header.chunks = vec![ChunkDescriptor::default(); chunks.len()];
    let mut offset = header.encoded_len(write_additional)?;
    let mut descriptors = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        descriptors.push(chunk.descriptor(offset)?);
        offset += chunk.encoded_len();
    }
    header.chunks = descriptors;

    let mut bytes = Vec::with_capacity(offset);
    header.write(&mut bytes, write_additional)?;
    for chunk in &chunks {
        chunk.encode(&mut bytes)?;
    }
    expect_len("compressed package", offset, bytes.len())?;

    tracing::debug!(
        "Serialized {compression} {game} package: {} bytes in {} chunks ({} uncompressed)",
        bytes.len(),
        chunks.len(),
        image.len()
    );

    Ok(WrittenPackage {
        bytes,
        header,
        plan,
        compression,
        wrote_additional_packages: write_additional,
        relocated,
    })
}

/// Compute section offsets from their sizes.
pub fn plan_layout(
    header_len: usize,
    names_len: usize,
    imports_len: usize,
    exports: &[ExportEntry],
    dependency_marker: u32,
) -> Result<LayoutPlan> {
    let name_offset = header_len;
    let import_offset = name_offset + names_len;
    let export_offset = import_offset + imports_len;

    let mut cursor = export_offset;
    let mut export_header_offsets = Vec::with_capacity(exports.len());
    for export in exports {
        export_header_offsets.push(to_u32("export header offset", cursor)?);
        cursor += export.header().len();
    }

    let dependency_table_offset = cursor;
    cursor += if dependency_marker > 0 { 4 * exports.len() } else { 4 };
    let full_header_size = cursor;

    let mut export_data_offsets = Vec::with_capacity(exports.len());
    for export in exports {
        export_data_offsets.push(to_u32("export data offset", cursor)?);
        cursor += export.data().len();
    }
    to_u32("package size", cursor)?;

    Ok(LayoutPlan {
        header_len,
        name_offset: to_u32("name table offset", name_offset)?,
        import_offset: to_u32("import table offset", import_offset)?,
        export_offset: to_u32("export table offset", export_offset)?,
        dependency_table_offset: to_u32("dependency table offset", dependency_table_offset)?,
        full_header_size: to_u32("full header size", full_header_size)?,
        export_header_offsets,
        export_data_offsets,
        total_len: cursor,
    })
}

fn encode_names(game: MeGame, names: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for name in names {
        match game {
            MeGame::Me1 => {
                write_unreal_string_ascii(&mut out, name)?;
                out.write_i32::<LittleEndian>(0)?;
                out.write_i32::<LittleEndian>(458_768)?;
            }
            MeGame::Me2 => {
                write_unreal_string_ascii(&mut out, name)?;
                out.write_i32::<LittleEndian>(-14)?;
            }
            MeGame::Me3 => write_unreal_string_unicode(&mut out, name)?,
        }
    }
    Ok(out)
}

fn expect_len(section: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::LayoutMismatch {
            section,
            expected,
            actual,
        })
    }
}

fn to_u32(what: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::LayoutOverflow {
        what,
        value: value as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::types::NameRef;

    #[test]
    fn test_plan_layout_offsets() {
        let exports = vec![
            ExportEntry::new(0, 0, 0, NameRef::default(), vec![0; 10]),
            ExportEntry::new(0, 0, 0, NameRef::default(), vec![0; 3]),
        ];
        let plan = plan_layout(100, 20, 28, &exports, 1).unwrap();
        assert_eq!(plan.name_offset, 100);
        assert_eq!(plan.import_offset, 120);
        assert_eq!(plan.export_offset, 148);
        assert_eq!(plan.export_header_offsets, vec![148, 220]);
        assert_eq!(plan.dependency_table_offset, 292);
        assert_eq!(plan.full_header_size, 300);
        assert_eq!(plan.export_data_offsets, vec![300, 310]);
        assert_eq!(plan.total_len, 313);
    }

    #[test]
    fn test_zero_dependency_marker_writes_single_entry() {
        let exports = vec![ExportEntry::new(0, 0, 0, NameRef::default(), Vec::new()); 3];
        let plan = plan_layout(0, 0, 0, &exports, 0).unwrap();
        assert_eq!(plan.full_header_size, plan.dependency_table_offset + 4);
    }

    #[test]
    fn test_name_trailers() {
        let names = vec!["Core".to_string()];
        assert_eq!(encode_names(MeGame::Me1, &names).unwrap().len(), 4 + 5 + 8);
        assert_eq!(encode_names(MeGame::Me2, &names).unwrap().len(), 4 + 5 + 4);
        assert_eq!(encode_names(MeGame::Me3, &names).unwrap().len(), 4 + 10);
    }
}
