//! Import and export table entries

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::types::{object_flags, NameRef};
use crate::error::{Error, Result};

/// Serialized size of an import entry.
pub const IMPORT_ENTRY_SIZE: usize = 28;
/// Bytes of an export header before the component map.
pub const EXPORT_FIXED_SIZE: usize = 40;
/// Export header with an empty component map and no networked objects.
pub const EXPORT_MIN_SIZE: usize = 72;

const DATA_SIZE_OFFSET: usize = 32;
const DATA_OFFSET_OFFSET: usize = 36;

// Upper bound for the component map and networked object counts.
const MAX_EXPORT_LIST: i32 = 0x10_0000;

/// Capability shared by imports and exports.
pub trait Entry {
    /// Signed table address: positive for exports, negative for imports.
    fn uindex(&self) -> i32;
    fn object_name_ref(&self) -> NameRef;
    /// uindex of the parent object, or 0 for a top-level object.
    fn link(&self) -> i32;
}

/// A reference to an object defined in another package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub(crate) index: usize,
    package_file: NameRef,
    class_name: NameRef,
    link: i32,
    object_name: NameRef,
    pub(crate) header_changed: bool,
}

impl ImportEntry {
    #[must_use]
    pub fn new(package_file: NameRef, class_name: NameRef, link: i32, object_name: NameRef) -> Self {
        Self {
            index: 0,
            package_file,
            class_name,
            link,
            object_name,
            header_changed: true,
        }
    }

    pub(crate) fn read<R: Read>(reader: &mut R, index: usize) -> Result<Self> {
        let read_name = |reader: &mut R| -> Result<NameRef> {
            Ok(NameRef::new(
                reader.read_i32::<LittleEndian>()?,
                reader.read_i32::<LittleEndian>()?,
            ))
        };
        let package_file = read_name(&mut *reader)?;
        let class_name = read_name(&mut *reader)?;
        let link = reader.read_i32::<LittleEndian>()?;
        let object_name = read_name(&mut *reader)?;
        Ok(Self {
            index,
            package_file,
            class_name,
            link,
            object_name,
            header_changed: false,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        for name in [self.package_file, self.class_name] {
            writer.write_i32::<LittleEndian>(name.index)?;
            writer.write_i32::<LittleEndian>(name.number)?;
        }
        writer.write_i32::<LittleEndian>(self.link)?;
        writer.write_i32::<LittleEndian>(self.object_name.index)?;
        writer.write_i32::<LittleEndian>(self.object_name.number)?;
        Ok(())
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn package_file(&self) -> NameRef {
        self.package_file
    }

    #[must_use]
    pub fn class_name_ref(&self) -> NameRef {
        self.class_name
    }

    pub fn set_link(&mut self, link: i32) {
        self.link = link;
        self.header_changed = true;
    }

    pub fn set_object_name(&mut self, name: NameRef) {
        self.object_name = name;
        self.header_changed = true;
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.header_changed
    }
}

impl Entry for ImportEntry {
    fn uindex(&self) -> i32 {
        -(self.index as i32) - 1
    }

    fn object_name_ref(&self) -> NameRef {
        self.object_name
    }

    fn link(&self) -> i32 {
        self.link
    }
}

/// An object defined in this package: its header bytes plus payload.
///
/// The header is kept verbatim; the fixed fields are read from and patched
/// into it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub(crate) index: usize,
    header: Vec<u8>,
    data: Vec<u8>,
    pub(crate) header_offset: u32,
    pub(crate) data_changed: bool,
    pub(crate) header_changed: bool,
}

impl ExportEntry {
    /// A new export with an empty component map and no networked objects.
    #[must_use]
    pub fn new(class: i32, superclass: i32, link: i32, object_name: NameRef, data: Vec<u8>) -> Self {
        let mut header = vec![0u8; EXPORT_MIN_SIZE];
        put_i32(&mut header, 0, class);
        put_i32(&mut header, 4, superclass);
        put_i32(&mut header, 8, link);
        put_i32(&mut header, 12, object_name.index);
        put_i32(&mut header, 16, object_name.number);
        put_i32(&mut header, DATA_SIZE_OFFSET, data.len() as i32);
        Self {
            index: 0,
            header,
            data,
            header_offset: 0,
            data_changed: true,
            header_changed: true,
        }
    }

    /// Read an export header and eagerly load its payload.
    ///
    /// The stream is left positioned after the header.
    pub(crate) fn read<R: Read + Seek>(reader: &mut R, index: usize) -> Result<Self> {
        let header_offset = reader.stream_position()? as u32;

        let mut header = vec![0u8; EXPORT_FIXED_SIZE];
        reader.read_exact(&mut header)?;

        let components = read_list_count(reader, &mut header, index, "component map")?;
        // export flags follow the component map
        read_more(reader, &mut header, components as usize * 12 + 4)?;
        let net_objects = read_list_count(reader, &mut header, index, "networked object")?;
        // package guid, package flags, networked object list
        read_more(reader, &mut header, 20 + net_objects as usize * 4)?;

        let mut export = Self {
            index,
            header,
            data: Vec::new(),
            header_offset,
            data_changed: false,
            header_changed: false,
        };

        let size = export.data_size();
        let offset = export.data_offset();
        if size < 0 || offset < 0 {
            return Err(Error::InvalidTable {
                table: "export",
                message: format!("export {index} has data size {size} at offset {offset}"),
            });
        }
        let end = reader.stream_position()?;
        reader.seek(SeekFrom::Start(offset as u64))?;
        let read = reader.by_ref().take(size as u64).read_to_end(&mut export.data)?;
        if read != size as usize {
            return Err(Error::InvalidTable {
                table: "export",
                message: format!("export {index} declares {size} bytes at offset {offset}, only {read} present"),
            });
        }
        reader.seek(SeekFrom::Start(end))?;

        Ok(export)
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw header bytes, including the DataSize/DataOffset fields.
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    #[must_use]
    pub fn header_offset(&self) -> u32 {
        self.header_offset
    }

    #[must_use]
    pub fn class_index(&self) -> i32 {
        get_i32(&self.header, 0)
    }

    #[must_use]
    pub fn super_index(&self) -> i32 {
        get_i32(&self.header, 4)
    }

    #[must_use]
    pub fn archetype(&self) -> i32 {
        get_i32(&self.header, 20)
    }

    #[must_use]
    pub fn object_flags(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.header[24..32]);
        u64::from_le_bytes(bytes)
    }

    #[must_use]
    pub fn has_stack(&self) -> bool {
        self.object_flags() & object_flags::HAS_STACK != 0
    }

    #[must_use]
    pub fn data_size(&self) -> i32 {
        get_i32(&self.header, DATA_SIZE_OFFSET)
    }

    #[must_use]
    pub fn data_offset(&self) -> i32 {
        get_i32(&self.header, DATA_OFFSET_OFFSET)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload and update DataSize.
    pub fn set_data(&mut self, data: Vec<u8>) {
        put_i32(&mut self.header, DATA_SIZE_OFFSET, data.len() as i32);
        self.data = data;
        self.data_changed = true;
    }

    pub fn set_link(&mut self, link: i32) {
        put_i32(&mut self.header, 8, link);
        self.header_changed = true;
    }

    pub fn set_object_name(&mut self, name: NameRef) {
        put_i32(&mut self.header, 12, name.index);
        put_i32(&mut self.header, 16, name.number);
        self.header_changed = true;
    }

    pub fn set_object_flags(&mut self, flags: u64) {
        self.header[24..32].copy_from_slice(&flags.to_le_bytes());
        self.header_changed = true;
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.data_changed || self.header_changed
    }

    /// Adopt a saved layout without marking the export as modified.
    pub(crate) fn commit_layout(&mut self, header_offset: u32, data_offset: u32, data: Option<Vec<u8>>) {
        if let Some(data) = data {
            self.data = data;
        }
        put_i32(&mut self.header, DATA_SIZE_OFFSET, self.data.len() as i32);
        put_i32(&mut self.header, DATA_OFFSET_OFFSET, data_offset as i32);
        self.header_offset = header_offset;
        self.data_changed = false;
        self.header_changed = false;
    }

    /// Header bytes with DataSize/DataOffset set for a given layout.
    pub(crate) fn header_for_layout(&self, data_size: u32, data_offset: u32) -> Vec<u8> {
        let mut header = self.header.clone();
        put_i32(&mut header, DATA_SIZE_OFFSET, data_size as i32);
        put_i32(&mut header, DATA_OFFSET_OFFSET, data_offset as i32);
        header
    }
}

impl Entry for ExportEntry {
    fn uindex(&self) -> i32 {
        self.index as i32 + 1
    }

    fn object_name_ref(&self) -> NameRef {
        NameRef::new(get_i32(&self.header, 12), get_i32(&self.header, 16))
    }

    fn link(&self) -> i32 {
        get_i32(&self.header, 8)
    }
}

/// Borrowed view of either kind of entry, as returned by uindex lookups.
#[derive(Debug, Clone, Copy)]
pub enum EntryRef<'a> {
    Import(&'a ImportEntry),
    Export(&'a ExportEntry),
}

impl Entry for EntryRef<'_> {
    fn uindex(&self) -> i32 {
        match self {
            EntryRef::Import(import) => import.uindex(),
            EntryRef::Export(export) => export.uindex(),
        }
    }

    fn object_name_ref(&self) -> NameRef {
        match self {
            EntryRef::Import(import) => import.object_name_ref(),
            EntryRef::Export(export) => export.object_name_ref(),
        }
    }

    fn link(&self) -> i32 {
        match self {
            EntryRef::Import(import) => import.link(),
            EntryRef::Export(export) => export.link(),
        }
    }
}

fn read_list_count<R: Read>(reader: &mut R, header: &mut Vec<u8>, index: usize, what: &str) -> Result<i32> {
    let count = reader.read_i32::<LittleEndian>()?;
    header.extend_from_slice(&count.to_le_bytes());
    if !(0..=MAX_EXPORT_LIST).contains(&count) {
        return Err(Error::InvalidTable {
            table: "export",
            message: format!("export {index} has {what} count {count}"),
        });
    }
    Ok(count)
}

fn read_more<R: Read>(reader: &mut R, header: &mut Vec<u8>, len: usize) -> Result<()> {
    let start = header.len();
    header.resize(start + len, 0);
    reader.read_exact(&mut header[start..])?;
    Ok(())
}

fn get_i32(bytes: &[u8], at: usize) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    i32::from_le_bytes(buf)
}

fn put_i32(bytes: &mut [u8], at: usize, value: i32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
