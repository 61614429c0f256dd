//! Package header (summary) parsing and serialization
//!
//! The header is a strictly sequential, game-dependent layout. Version and
//! engine constants are not retained on read; the writer regenerates them from
//! the game.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use super::chunk::ChunkDescriptor;
use super::types::{Generation, MeGame, PackageFlags};
use super::PACKAGE_TAG;
use crate::compression::CompressionType;
use crate::error::{Error, Result};
use crate::utils::{read_unreal_string, write_unreal_string_ascii, write_unreal_string_unicode};

/// Parsed package header.
///
/// Table offsets always refer to the uncompressed image of the package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageHeader {
    pub game: MeGame,
    pub full_header_size: u32,
    pub folder_name: String,
    pub flags: PackageFlags,
    /// ME3 cooked packages only: 0 for a normal package, 1 for a patch.
    pub package_type_id: i32,
    pub name_count: u32,
    pub name_offset: u32,
    pub export_count: u32,
    pub export_offset: u32,
    pub import_count: u32,
    pub import_offset: u32,
    pub dependency_table_offset: u32,
    /// ME3 only.
    pub import_export_guids_offset: u32,
    pub guid: Uuid,
    pub generation: Generation,
    pub unknown4: i32,
    pub unknown6: i32,
    pub compression: CompressionType,
    pub chunks: Vec<ChunkDescriptor>,
    /// Stream offset of the compression enum, where the chunk table starts.
    pub compression_info_offset: u64,
    pub package_source: u32,
    pub additional_packages_to_cook: Vec<String>,
}

impl PackageHeader {
    /// Header of an empty, uncompressed package.
    #[must_use]
    pub fn new(game: MeGame) -> Self {
        Self {
            game,
            full_header_size: 0,
            folder_name: "None".to_string(),
            flags: PackageFlags::new_package(),
            package_type_id: 0,
            name_count: 0,
            name_offset: 0,
            export_count: 0,
            export_offset: 0,
            import_count: 0,
            import_offset: 0,
            dependency_table_offset: 0,
            import_export_guids_offset: 0,
            guid: Uuid::new_v4(),
            generation: Generation::default(),
            unknown4: 0,
            unknown6: 0,
            compression: CompressionType::None,
            chunks: Vec::new(),
            compression_info_offset: 0,
            package_source: 0,
            additional_packages_to_cook: Vec::new(),
        }
    }

    /// Read the header from the start of the stream.
    ///
    /// # Errors
    /// Returns a format error on a bad magic or unknown version pair before
    /// anything else is read.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != PACKAGE_TAG {
            return Err(Error::InvalidPackageMagic { found: magic });
        }
        let version = reader.read_u16::<LittleEndian>()?;
        let licensee = reader.read_u16::<LittleEndian>()?;
        let game = MeGame::from_version(version, licensee)?;

        let full_header_size = reader.read_u32::<LittleEndian>()?;
        let folder_name = read_unreal_string(reader)?;
        let flags = PackageFlags(reader.read_u32::<LittleEndian>()?);

        let package_type_id = if game == MeGame::Me3 && flags.is_cooked() {
            reader.read_i32::<LittleEndian>()?
        } else {
            0
        };

        let name_count = read_count(reader, "name")?;
        let name_offset = reader.read_u32::<LittleEndian>()?;
        let export_count = read_count(reader, "export")?;
        let export_offset = reader.read_u32::<LittleEndian>()?;
        let import_count = read_count(reader, "import")?;
        let import_offset = reader.read_u32::<LittleEndian>()?;
        let dependency_table_offset = reader.read_u32::<LittleEndian>()?;

        let mut import_export_guids_offset = 0;
        if game == MeGame::Me3 {
            import_export_guids_offset = reader.read_u32::<LittleEndian>()?;
            // import guid count, export guid count, thumbnail table offset
            reader.seek(SeekFrom::Current(12))?;
        }

        let mut guid_bytes = [0u8; 16];
        reader.read_exact(&mut guid_bytes)?;
        let guid = Uuid::from_bytes_le(guid_bytes);

        let generation_count = reader.read_u32::<LittleEndian>()?;
        let mut generation = Generation::default();
        if generation_count > 0 {
            generation = Generation {
                export_count: reader.read_i32::<LittleEndian>()?,
                name_count: reader.read_i32::<LittleEndian>()?,
                net_object_count: reader.read_i32::<LittleEndian>()?,
            };
            reader.seek(SeekFrom::Current(i64::from(generation_count - 1) * 12))?;
        }

        // engine version, cooked content version
        reader.seek(SeekFrom::Current(8))?;

        let mut unknown4 = 0;
        if game != MeGame::Me3 {
            reader.seek(SeekFrom::Current(8))?;
            unknown4 = reader.read_i32::<LittleEndian>()?;
            reader.seek(SeekFrom::Current(4))?;
        }

        let unknown6 = reader.read_i32::<LittleEndian>()?;
        reader.seek(SeekFrom::Current(4))?;
        if game == MeGame::Me1 {
            reader.seek(SeekFrom::Current(4))?;
        }

        let compression_info_offset = reader.stream_position()?;
        let compression = CompressionType::from_u32(reader.read_u32::<LittleEndian>()?)?;
        let chunk_count = reader.read_i32::<LittleEndian>()?;
        if chunk_count < 0 {
            return Err(Error::InvalidTable {
                table: "chunk",
                message: format!("negative chunk count {chunk_count}"),
            });
        }
        let mut chunks = Vec::new();
        for _ in 0..chunk_count {
            chunks.push(ChunkDescriptor::read(reader)?);
        }

        let package_source = reader.read_u32::<LittleEndian>()?;
        if game != MeGame::Me3 {
            reader.seek(SeekFrom::Current(4))?;
        }

        let mut additional_packages_to_cook = Vec::new();
        if game != MeGame::Me1 {
            let count = read_count(reader, "additional package")?;
            for _ in 0..count {
                additional_packages_to_cook.push(read_unreal_string(reader)?);
            }
        }

        tracing::debug!(
            "Parsed {game} header: {name_count} names, {import_count} imports, \
             {export_count} exports, {} {compression} chunks",
            chunks.len()
        );

        Ok(Self {
            game,
            full_header_size,
            folder_name,
            flags,
            package_type_id,
            name_count,
            name_offset,
            export_count,
            export_offset,
            import_count,
            import_offset,
            dependency_table_offset,
            import_export_guids_offset,
            guid,
            generation,
            unknown4,
            unknown6,
            compression,
            chunks,
            compression_info_offset,
            package_source,
            additional_packages_to_cook,
        })
    }

    /// Serialize the header.
    ///
    /// The generation record is written from the current table counts. When
    /// `write_additional_packages` is false a zero count replaces the list.
    ///
    /// # Errors
    /// Returns [`Error::NoChunksPrepared`] if a compression type is set but the
    /// chunk table is empty.
    pub fn write<W: Write>(&self, writer: &mut W, write_additional_packages: bool) -> Result<()> {
        if self.compression != CompressionType::None && self.chunks.is_empty() {
            return Err(Error::NoChunksPrepared);
        }
        let game = self.game;
        let (version, licensee) = game.version_tag();

        writer.write_u32::<LittleEndian>(PACKAGE_TAG)?;
        writer.write_u16::<LittleEndian>(version)?;
        writer.write_u16::<LittleEndian>(licensee)?;
        writer.write_u32::<LittleEndian>(self.full_header_size)?;
        if game.uses_unicode_strings() {
            write_unreal_string_unicode(writer, &self.folder_name)?;
        } else {
            write_unreal_string_ascii(writer, &self.folder_name)?;
        }
        writer.write_u32::<LittleEndian>(self.flags.0)?;

        if game == MeGame::Me3 && self.flags.is_cooked() {
            writer.write_i32::<LittleEndian>(self.package_type_id)?;
        }

        writer.write_u32::<LittleEndian>(self.name_count)?;
        writer.write_u32::<LittleEndian>(self.name_offset)?;
        writer.write_u32::<LittleEndian>(self.export_count)?;
        writer.write_u32::<LittleEndian>(self.export_offset)?;
        writer.write_u32::<LittleEndian>(self.import_count)?;
        writer.write_u32::<LittleEndian>(self.import_offset)?;
        writer.write_u32::<LittleEndian>(self.dependency_table_offset)?;

        if game == MeGame::Me3 {
            writer.write_u32::<LittleEndian>(self.import_export_guids_offset)?;
            writer.write_i32::<LittleEndian>(0)?;
            writer.write_i32::<LittleEndian>(0)?;
            writer.write_i32::<LittleEndian>(0)?;
        }

        writer.write_all(&self.guid.to_bytes_le())?;

        writer.write_u32::<LittleEndian>(1)?;
        writer.write_u32::<LittleEndian>(self.export_count)?;
        writer.write_u32::<LittleEndian>(self.name_count)?;
        writer.write_i32::<LittleEndian>(self.generation.net_object_count)?;

        writer.write_i32::<LittleEndian>(game.engine_version())?;
        writer.write_i32::<LittleEndian>(game.cooked_content_version())?;

        match game {
            MeGame::Me1 => {
                for value in [0, 47699, 0, 1, 0, -1, -1] {
                    writer.write_i32::<LittleEndian>(value)?;
                }
            }
            MeGame::Me2 => {
                for value in [0, 47699, self.unknown4, 1_966_080, -1, -1] {
                    writer.write_i32::<LittleEndian>(value)?;
                }
            }
            MeGame::Me3 => {
                writer.write_i32::<LittleEndian>(self.unknown6)?;
                writer.write_i32::<LittleEndian>(145_358_848)?;
            }
        }

        writer.write_u32::<LittleEndian>(self.compression.to_u32())?;
        let chunk_count = u32::try_from(self.chunks.len()).map_err(|_| Error::LayoutOverflow {
            what: "chunk count",
            value: self.chunks.len() as u64,
        })?;
        writer.write_u32::<LittleEndian>(chunk_count)?;
        for chunk in &self.chunks {
            chunk.write(writer)?;
        }

        writer.write_u32::<LittleEndian>(self.package_source)?;
        if game != MeGame::Me3 {
            writer.write_i32::<LittleEndian>(0)?;
        }

        if game != MeGame::Me1 {
            if write_additional_packages {
                writer.write_u32::<LittleEndian>(self.additional_packages_to_cook.len() as u32)?;
                for package in &self.additional_packages_to_cook {
                    if game.uses_unicode_strings() {
                        write_unreal_string_unicode(writer, package)?;
                    } else {
                        write_unreal_string_ascii(writer, package)?;
                    }
                }
            } else {
                writer.write_u32::<LittleEndian>(0)?;
            }
        }

        Ok(())
    }

    /// Serialized length of this header.
    ///
    /// # Errors
    /// Same conditions as [`PackageHeader::write`].
    pub fn encoded_len(&self, write_additional_packages: bool) -> Result<usize> {
        let mut buf = Vec::new();
        self.write(&mut buf, write_additional_packages)?;
        Ok(buf.len())
    }
}

fn read_count<R: Read>(reader: &mut R, table: &'static str) -> Result<u32> {
    let count = reader.read_i32::<LittleEndian>()?;
    u32::try_from(count).map_err(|_| Error::InvalidTable {
        table,
        message: format!("negative count {count}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample(game: MeGame) -> PackageHeader {
        let mut header = PackageHeader::new(game);
        header.name_count = 3;
        header.name_offset = 120;
        header.import_count = 1;
        header.export_count = 2;
        header.generation.net_object_count = 7;
        header.unknown4 = 99;
        header.package_source = 0xDEAD;
        if game != MeGame::Me1 {
            header.additional_packages_to_cook = vec!["SFXGame".to_string()];
        }
        header
    }

    #[test]
    fn test_header_fields_survive_write_and_read() {
        for game in [MeGame::Me1, MeGame::Me2, MeGame::Me3] {
            let header = sample(game);
            let mut buf = Vec::new();
            header.write(&mut buf, true).unwrap();

            let parsed = PackageHeader::read(&mut Cursor::new(&buf)).unwrap();
            assert_eq!(parsed.game, game);
            assert_eq!(parsed.name_count, 3);
            assert_eq!(parsed.name_offset, 120);
            assert_eq!(parsed.guid, header.guid);
            assert_eq!(parsed.generation.export_count, 2);
            assert_eq!(parsed.generation.net_object_count, 7);
            assert_eq!(parsed.package_source, 0xDEAD);
            assert_eq!(parsed.additional_packages_to_cook, header.additional_packages_to_cook);
            assert_eq!(parsed.folder_name, "None");
        }
    }

    #[test]
    fn test_me2_retains_unknown4() {
        let mut buf = Vec::new();
        sample(MeGame::Me2).write(&mut buf, true).unwrap();
        let parsed = PackageHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.unknown4, 99);
    }

    #[test]
    fn test_compression_info_offset_points_at_enum() {
        let mut header = sample(MeGame::Me3);
        header.compression = CompressionType::Zlib;
        header.chunks = vec![ChunkDescriptor {
            uncompressed_offset: 10,
            uncompressed_size: 20,
            compressed_offset: 30,
            compressed_size: 40,
        }];
        let mut buf = Vec::new();
        header.write(&mut buf, true).unwrap();

        let parsed = PackageHeader::read(&mut Cursor::new(&buf)).unwrap();
        let at = parsed.compression_info_offset as usize;
        assert_eq!(u32::from_le_bytes(buf[at..at + 4].try_into().unwrap()), 1);
        assert_eq!(parsed.chunks, header.chunks);
    }

    #[test]
    fn test_compressed_header_requires_chunks() {
        let mut header = sample(MeGame::Me3);
        header.compression = CompressionType::Zlib;
        let mut buf = Vec::new();
        assert!(matches!(header.write(&mut buf, true), Err(Error::NoChunksPrepared)));
    }

    #[test]
    fn test_additional_packages_can_be_omitted() {
        let header = sample(MeGame::Me3);
        let full = header.encoded_len(true).unwrap();
        let omitted = header.encoded_len(false).unwrap();
        assert!(omitted < full);

        let mut buf = Vec::new();
        header.write(&mut buf, false).unwrap();
        let parsed = PackageHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert!(parsed.additional_packages_to_cook.is_empty());
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let err = PackageHeader::read(&mut Cursor::new(vec![0u8; 64])).unwrap_err();
        assert!(err.is_format_error());
        assert!(matches!(err, Error::InvalidPackageMagic { found: 0 }));
    }
}
