//! In-memory package: header, tables and export payloads

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::chunk::ChunkDescriptor;
use super::header::PackageHeader;
use super::options::{OpenOptions, SaveOptions};
use super::properties::scan_properties;
use super::reader::{read_body, Tables};
use super::tables::{Entry, EntryRef, ExportEntry, ImportEntry};
use super::types::{MeGame, NameRef, PackageFlags};
use super::writer::{write_package, WrittenPackage};
use crate::compression::CompressionType;
use crate::error::{Error, Result};

/// An Unreal package from one of the three supported games.
///
/// Table counts always equal the table lengths; every mutation keeps the
/// header counts in step.
#[derive(Debug, Clone)]
pub struct Package {
    header: PackageHeader,
    names: Vec<String>,
    imports: Vec<ImportEntry>,
    exports: Vec<ExportEntry>,
    dependency_marker: u32,
    names_changed: bool,
    header_only: bool,
    compressed_on_disk: bool,
    file_path: Option<PathBuf>,
}

/// Header summary, as printed by `mepak info`.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub game: MeGame,
    pub version: u16,
    pub licensee_version: u16,
    pub flags: PackageFlags,
    pub cooked: bool,
    pub compressed: bool,
    pub compression: CompressionType,
    pub chunks: Vec<ChunkDescriptor>,
    pub name_count: u32,
    pub import_count: u32,
    pub export_count: u32,
    pub full_header_size: u32,
    pub guid: String,
    pub folder_name: String,
    pub package_source: u32,
    pub additional_packages_to_cook: Vec<String>,
}

impl Package {
    /// Create an empty, uncompressed package.
    #[must_use]
    pub fn new(game: MeGame) -> Self {
        let mut package = Self {
            header: PackageHeader::new(game),
            names: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            dependency_marker: 0,
            names_changed: true,
            header_only: false,
            compressed_on_disk: false,
            file_path: None,
        };
        package.sync_counts();
        package
    }

    /// Open a package file.
    ///
    /// # Errors
    /// Returns a format error if the file is not a supported package. No
    /// partially loaded package is returned on failure.
    pub fn open<P: AsRef<Path>>(path: P, header_only: bool) -> Result<Self> {
        Self::open_with_options(path, &OpenOptions::new().with_header_only(header_only))
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut package = Self::from_reader(&mut BufReader::new(file), options)?;
        package.file_path = Some(path.to_path_buf());
        tracing::info!(
            "Opened {} package {} ({} exports)",
            package.game(),
            path.display(),
            package.export_count()
        );
        Ok(package)
    }

    /// Read a package from any seekable stream.
    pub fn from_reader<R: Read + Seek>(reader: &mut R, options: &OpenOptions) -> Result<Self> {
        let header = PackageHeader::read(reader)?;
        let compressed_on_disk = header.flags.is_compressed();

        let tables = if options.header_only {
            Tables::default()
        } else {
            read_body(reader, &header)?
        };

        Ok(Self {
            header,
            names: tables.names,
            imports: tables.imports,
            exports: tables.exports,
            dependency_marker: tables.dependency_marker,
            names_changed: false,
            header_only: options.header_only,
            compressed_on_disk,
            file_path: None,
        })
    }

    /// Fully load a package held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(&mut Cursor::new(bytes), &OpenOptions::new())
    }

    /// Re-save a package image uncompressed.
    ///
    /// When `mixin_rules` is set and the source was compressed, the additional
    /// packages list is not written. Uncompressed sources always keep it.
    pub fn decompressed_stream(bytes: &[u8], mixin_rules: bool) -> Result<Vec<u8>> {
        let package = Self::from_bytes(bytes)?;
        let options = SaveOptions::new().with_additional_packages_to_cook(!mixin_rules);
        Ok(package.write(&options)?.bytes)
    }

    // ==================== Header ====================

    #[must_use]
    pub fn game(&self) -> MeGame {
        self.header.game
    }

    /// The header as last read or saved. Table offsets are those of the
    /// on-disk layout, not of pending changes.
    #[must_use]
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    #[must_use]
    pub fn flags(&self) -> PackageFlags {
        self.header.flags
    }

    #[must_use]
    pub fn guid(&self) -> Uuid {
        self.header.guid
    }

    #[must_use]
    pub fn additional_packages_to_cook(&self) -> &[String] {
        &self.header.additional_packages_to_cook
    }

    /// Replace the "additional packages to cook" list. ME1 headers have no
    /// such list, so it is not written for ME1 packages.
    pub fn set_additional_packages_to_cook(&mut self, packages: Vec<String>) {
        self.header.additional_packages_to_cook = packages;
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Whether the package was compressed when read (or last saved).
    #[must_use]
    pub fn is_compressed_on_disk(&self) -> bool {
        self.compressed_on_disk
    }

    #[must_use]
    pub fn is_header_only(&self) -> bool {
        self.header_only
    }

    #[must_use]
    pub fn name_count(&self) -> u32 {
        self.header.name_count
    }

    #[must_use]
    pub fn import_count(&self) -> u32 {
        self.header.import_count
    }

    #[must_use]
    pub fn export_count(&self) -> u32 {
        self.header.export_count
    }

    pub(crate) fn dependency_marker(&self) -> u32 {
        self.dependency_marker
    }

    #[must_use]
    pub fn summary(&self) -> PackageSummary {
        let (version, licensee_version) = self.game().version_tag();
        PackageSummary {
            game: self.game(),
            version,
            licensee_version,
            flags: self.header.flags,
            cooked: self.header.flags.is_cooked(),
            compressed: self.header.flags.is_compressed(),
            compression: self.header.compression,
            chunks: self.header.chunks.clone(),
            name_count: self.name_count(),
            import_count: self.import_count(),
            export_count: self.export_count(),
            full_header_size: self.header.full_header_size,
            guid: self.header.guid.to_string(),
            folder_name: self.header.folder_name.clone(),
            package_source: self.header.package_source,
            additional_packages_to_cook: self.header.additional_packages_to_cook.clone(),
        }
    }

    // ==================== Names ====================

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn find_name(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Append a name unless it is already present. Returns its index.
    pub fn add_name(&mut self, name: &str) -> usize {
        if let Some(index) = self.find_name(name) {
            return index;
        }
        self.names.push(name.to_string());
        self.names_changed = true;
        self.sync_counts();
        self.names.len() - 1
    }

    /// Same as [`Package::add_name`]; kept for callers that read better with it.
    pub fn find_or_add_name(&mut self, name: &str) -> usize {
        self.add_name(name)
    }

    /// Replace a name in place. Its index, and every reference to it, stays valid.
    pub fn replace_name(&mut self, index: usize, name: &str) -> Result<()> {
        let count = self.names.len();
        let slot = self.names.get_mut(index).ok_or(Error::IndexOutOfRange {
            table: "name",
            index: index as i64,
            count,
        })?;
        if slot != name {
            *slot = name.to_string();
            self.names_changed = true;
        }
        Ok(())
    }

    fn resolve(&self, name: NameRef) -> Result<String> {
        name.resolve(&self.names).ok_or(Error::IndexOutOfRange {
            table: "name",
            index: i64::from(name.index),
            count: self.names.len(),
        })
    }

    // ==================== Imports and exports ====================

    #[must_use]
    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    #[must_use]
    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    /// Append an import. Returns its uindex.
    pub fn add_import(&mut self, mut import: ImportEntry) -> i32 {
        import.index = self.imports.len();
        import.header_changed = true;
        self.imports.push(import);
        self.sync_counts();
        -(self.imports.len() as i32)
    }

    /// Append an export. Returns its uindex.
    pub fn add_export(&mut self, mut export: ExportEntry) -> i32 {
        export.index = self.exports.len();
        export.header_changed = true;
        export.data_changed = true;
        self.exports.push(export);
        self.sync_counts();
        self.exports.len() as i32
    }

    #[must_use]
    pub fn is_export(&self, uindex: i32) -> bool {
        uindex > 0 && (uindex as usize) <= self.exports.len()
    }

    #[must_use]
    pub fn is_import(&self, uindex: i32) -> bool {
        uindex < 0 && (uindex.unsigned_abs() as usize) <= self.imports.len()
    }

    /// Entry addressed by a uindex; `None` for 0 or out of range.
    #[must_use]
    pub fn entry(&self, uindex: i32) -> Option<EntryRef<'_>> {
        if self.is_export(uindex) {
            Some(EntryRef::Export(&self.exports[uindex as usize - 1]))
        } else if self.is_import(uindex) {
            Some(EntryRef::Import(&self.imports[uindex.unsigned_abs() as usize - 1]))
        } else {
            None
        }
    }

    fn entry_or_err(&self, uindex: i32) -> Result<EntryRef<'_>> {
        self.entry(uindex).ok_or_else(|| {
            let (table, count) = if uindex > 0 {
                ("export", self.exports.len())
            } else {
                ("import", self.imports.len())
            };
            Error::IndexOutOfRange {
                table,
                index: i64::from(uindex),
                count,
            }
        })
    }

    /// Object name of an entry; uindex 0 is `Class`.
    pub fn object_name(&self, uindex: i32) -> Result<String> {
        if uindex == 0 {
            return Ok("Class".to_string());
        }
        self.resolve(self.entry_or_err(uindex)?.object_name_ref())
    }

    /// Class name of an entry; uindex 0 is `Class`.
    pub fn class_name(&self, uindex: i32) -> Result<String> {
        if uindex == 0 {
            return Ok("Class".to_string());
        }
        match self.entry_or_err(uindex)? {
            EntryRef::Export(export) => self.object_name(export.class_index()),
            EntryRef::Import(import) => self.resolve(import.class_name_ref()),
        }
    }

    fn export_at(&self, index: usize) -> Result<&ExportEntry> {
        self.exports.get(index).ok_or(Error::IndexOutOfRange {
            table: "export",
            index: index as i64,
            count: self.exports.len(),
        })
    }

    /// Payload of export `index` (zero-based).
    pub fn export_payload(&self, index: usize) -> Result<&[u8]> {
        Ok(self.export_at(index)?.data())
    }

    /// Replace the payload of export `index` (zero-based).
    pub fn set_export_payload(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        let count = self.exports.len();
        let export = self.exports.get_mut(index).ok_or(Error::IndexOutOfRange {
            table: "export",
            index: index as i64,
            count,
        })?;
        export.set_data(data);
        Ok(())
    }

    /// Mutable access to an export's header fields.
    pub fn export_mut(&mut self, index: usize) -> Option<&mut ExportEntry> {
        self.exports.get_mut(index)
    }

    pub fn import_mut(&mut self, index: usize) -> Option<&mut ImportEntry> {
        self.imports.get_mut(index)
    }

    /// Offset of the first byte after export `index`'s property block.
    pub fn export_props_end(&self, index: usize) -> Result<usize> {
        Ok(scan_properties(self.game(), &self.names, self.export_at(index)?)?.end)
    }

    /// True if any name, import or export changed since load or the last save.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.names_changed
            || self.imports.iter().any(ImportEntry::is_modified)
            || self.exports.iter().any(ExportEntry::is_modified)
    }

    // ==================== Saving ====================

    /// Serialize without touching the in-memory package.
    pub fn write(&self, options: &SaveOptions) -> Result<WrittenPackage> {
        if self.header_only {
            return Err(Error::HeaderOnly);
        }
        write_package(self, options)
    }

    /// Serialize into memory and adopt the written layout.
    pub fn save_to_vec(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        let written = self.write(options)?;
        Ok(self.commit(written))
    }

    /// Save to `path`, compressed with the game's default codec if requested.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, compress: bool) -> Result<()> {
        self.save_with_options(path, &SaveOptions::new().with_compress(compress))
    }

    /// Save to `path` through a temporary file and an atomic rename.
    pub fn save_with_options<P: AsRef<Path>>(&mut self, path: P, options: &SaveOptions) -> Result<()> {
        let path = path.as_ref();
        let written = self.write(options)?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            Some(_) => Path::new("."),
            None => return Err(Error::InvalidPath(path.display().to_string())),
        };
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&written.bytes)?;
        temp.flush()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!(
            "Saved {} package {} ({} bytes, {})",
            self.game(),
            path.display(),
            written.bytes.len(),
            written.compression
        );
        self.commit(written);
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Adopt a written layout and clear the modification flags.
    fn commit(&mut self, written: WrittenPackage) -> Vec<u8> {
        let WrittenPackage {
            bytes,
            mut header,
            plan,
            compression,
            wrote_additional_packages,
            relocated,
        } = written;

        for ((index, export), patched) in self.exports.iter_mut().enumerate().zip(relocated) {
            export.commit_layout(
                plan.export_header_offsets[index],
                plan.export_data_offsets[index],
                patched,
            );
        }
        for import in &mut self.imports {
            import.header_changed = false;
        }
        if !wrote_additional_packages {
            header.additional_packages_to_cook.clear();
        }
        self.header = header;
        self.compressed_on_disk = compression != CompressionType::None;
        self.names_changed = false;
        bytes
    }

    fn sync_counts(&mut self) {
        if self.header_only {
            return;
        }
        self.header.name_count = self.names.len() as u32;
        self.header.import_count = self.imports.len() as u32;
        self.header.export_count = self.exports.len() as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Package {
        let mut package = Package::new(MeGame::Me3);
        let core = package.add_name("Core") as i32;
        let class = package.add_name("Class") as i32;
        let object = package.add_name("Object") as i32;
        let name = package.add_name("Thing") as i32;
        let import = package.add_import(ImportEntry::new(
            NameRef::new(core, 0),
            NameRef::new(class, 0),
            0,
            NameRef::new(object, 0),
        ));
        package.add_export(ExportEntry::new(import, 0, 0, NameRef::new(name, 2), vec![0; 12]));
        package
    }

    #[test]
    fn test_counts_follow_tables() {
        let package = sample();
        assert_eq!(package.name_count(), 4);
        assert_eq!(package.import_count(), 1);
        assert_eq!(package.export_count(), 1);
        assert!(package.is_modified());
    }

    #[test]
    fn test_add_name_deduplicates() {
        let mut package = sample();
        assert_eq!(package.add_name("Core"), 0);
        assert_eq!(package.find_or_add_name("New"), 4);
        assert_eq!(package.name_count(), 5);
    }

    #[test]
    fn test_replace_name_keeps_index() {
        let mut package = sample();
        package.replace_name(3, "Renamed").unwrap();
        assert_eq!(package.name(3), Some("Renamed"));
        assert_eq!(package.object_name(1).unwrap(), "Renamed_1");
        assert!(package.replace_name(40, "x").is_err());
    }

    #[test]
    fn test_uindex_lookups() {
        let package = sample();
        assert!(package.is_export(1));
        assert!(package.is_import(-1));
        assert!(!package.is_export(2));
        assert!(package.entry(0).is_none());
        assert_eq!(package.object_name(0).unwrap(), "Class");
        assert_eq!(package.object_name(-1).unwrap(), "Object");
        assert_eq!(package.class_name(-1).unwrap(), "Class");
        assert_eq!(package.class_name(1).unwrap(), "Object");
        assert_eq!(package.object_name(1).unwrap(), "Thing_1");
        assert!(matches!(
            package.object_name(5),
            Err(Error::IndexOutOfRange { table: "export", .. })
        ));
    }

    #[test]
    fn test_payload_access() {
        let mut package = sample();
        assert_eq!(package.export_payload(0).unwrap().len(), 12);
        package.set_export_payload(0, vec![1, 2]).unwrap();
        assert_eq!(package.exports()[0].data_size(), 2);
        assert!(package.set_export_payload(3, Vec::new()).is_err());
    }

    #[test]
    fn test_save_clears_modified() {
        let mut package = sample();
        let bytes = package.save_to_vec(&SaveOptions::new()).unwrap();
        assert!(!package.is_modified());
        assert_eq!(package.exports()[0].data_offset() as u32, package.header().full_header_size);

        let reopened = Package::from_bytes(&bytes).unwrap();
        assert!(!reopened.is_modified());
        assert_eq!(reopened.names(), package.names());
    }

    #[test]
    fn test_header_only_cannot_save() {
        let mut package = sample();
        let bytes = package.save_to_vec(&SaveOptions::new()).unwrap();
        let header_only = Package::from_reader(&mut Cursor::new(&bytes), &OpenOptions::header_only()).unwrap();
        assert_eq!(header_only.export_count(), 1);
        assert!(header_only.exports().is_empty());
        assert!(matches!(header_only.write(&SaveOptions::new()), Err(Error::HeaderOnly)));
    }
}
